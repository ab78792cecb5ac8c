//! dockflow-viewer: receptor and ligand-pose rendering.
//!
//! Structure references are resolved into [`StructureSource`]s, fetched in
//! order (receptor first, then ligand) and composed into layers on a
//! [`RenderContext`]. A failing ligand only drops its own layer; a failing
//! receptor puts the whole view into an error state.

pub mod adapter;
pub mod fetch;
pub mod scene;
pub mod source;

pub use adapter::{
    ApplyOutcome, DisplayOptions, FetchedStructures, LigandOrigin, LigandState, LoadPlan, LoadScope,
    StructureVisualizationAdapter, ViewInputs, ViewPhase,
};
pub use fetch::{HttpStructureFetcher, InMemoryFetcher, StructureFetcher};
pub use scene::{RenderContext, SceneGraph};
pub use source::{SourceResolver, StructureSource};
