//! dockflow-molecules - Docking workflow orchestration.
//!
//! This crate drives the four-stage docking workflow:
//! 1. Preparing the receptor protein (cleaning, cysteine detection)
//! 2. Ingesting ligands from SMILES, SMILES batches, SDF files, curated
//!    libraries or a PubChem search
//! 3. Configuring standard or covalent docking
//! 4. Dispatching one docking request per ligand and ranking the outcomes
//!
//! The scientific work itself happens in a remote computation service,
//! reached through the `ComputationService` trait.

pub mod protein;
pub mod ligand;
pub mod library;
pub mod service;
pub mod docking;
pub mod scoring;
pub mod report;
pub mod pipeline;

pub use dockflow_common::{DockflowError, Result};
