//! Render context seam and an in-memory scene implementation.

use serde::Serialize;
use std::collections::BTreeMap;

use dockflow_common::{DockflowError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StructureFormat {
    Pdb,
    Pdbqt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ModelId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ShapeId(pub u64);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelStyle {
    Cartoon { color: String },
    Sticks { colorscheme: String },
    Hidden,
}

impl ModelStyle {
    pub fn receptor() -> Self {
        ModelStyle::Cartoon { color: "spectrum".to_string() }
    }

    pub fn ligand_from_file() -> Self {
        ModelStyle::Sticks { colorscheme: "greenCarbon".to_string() }
    }

    pub fn ligand_inline() -> Self {
        ModelStyle::Sticks { colorscheme: "purpleCarbon".to_string() }
    }
}

/// Van der Waals surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurfaceStyle {
    pub opacity: f64,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SphereSpec {
    pub center: [f64; 3],
    pub radius: f64,
    pub color: String,
    pub opacity: f64,
}

/// The 3D viewer the adapter draws into.
pub trait RenderContext: Send {
    /// Parse and add a model. Parse failures leave the context unchanged.
    fn add_model(&mut self, data: &str, format: StructureFormat) -> Result<ModelId>;
    fn remove_model(&mut self, id: ModelId);
    fn set_style(&mut self, id: ModelId, style: ModelStyle);
    fn add_surface(&mut self, model: ModelId, style: SurfaceStyle) -> ShapeId;
    fn remove_surface(&mut self, id: ShapeId);
    fn add_sphere(&mut self, sphere: SphereSpec) -> ShapeId;
    fn remove_sphere(&mut self, id: ShapeId);
    /// Drop every model and shape.
    fn clear(&mut self);
    fn zoom_to(&mut self);
    fn render(&mut self);
}

#[derive(Debug, Clone, Serialize)]
pub struct SceneModel {
    pub format: StructureFormat,
    pub atoms: usize,
    pub style: Option<ModelStyle>,
}

/// Headless render context that records what would be drawn.
#[derive(Debug, Default)]
pub struct SceneGraph {
    models: BTreeMap<ModelId, SceneModel>,
    surfaces: BTreeMap<ShapeId, (ModelId, SurfaceStyle)>,
    spheres: BTreeMap<ShapeId, SphereSpec>,
    next_id: u64,
    renders: usize,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn model(&self, id: ModelId) -> Option<&SceneModel> {
        self.models.get(&id)
    }

    pub fn models(&self) -> impl Iterator<Item = (&ModelId, &SceneModel)> {
        self.models.iter()
    }

    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    pub fn surface_count(&self) -> usize {
        self.surfaces.len()
    }

    pub fn spheres(&self) -> impl Iterator<Item = &SphereSpec> {
        self.spheres.values()
    }

    pub fn sphere_count(&self) -> usize {
        self.spheres.len()
    }

    pub fn render_count(&self) -> usize {
        self.renders
    }

    /// One line per visible layer, for terminal output.
    pub fn describe(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for (id, model) in &self.models {
            let style = match &model.style {
                Some(ModelStyle::Cartoon { color }) => format!("cartoon ({})", color),
                Some(ModelStyle::Sticks { colorscheme }) => format!("sticks ({})", colorscheme),
                Some(ModelStyle::Hidden) => "hidden".to_string(),
                None => "unstyled".to_string(),
            };
            lines.push(format!("model {} [{:?}] {} atoms, {}", id.0, model.format, model.atoms, style));
        }
        for (model, surface) in self.surfaces.values() {
            lines.push(format!(
                "surface on model {} ({}, opacity {:.1})",
                model.0, surface.color, surface.opacity
            ));
        }
        for sphere in self.spheres.values() {
            lines.push(format!(
                "binding site at ({:.2}, {:.2}, {:.2}) r={:.1} ({})",
                sphere.center[0], sphere.center[1], sphere.center[2], sphere.radius, sphere.color
            ));
        }
        lines
    }
}

/// Count coordinate records in a PDB/PDBQT payload.
fn count_atoms(data: &str) -> usize {
    data.lines()
        .filter(|l| l.starts_with("ATOM") || l.starts_with("HETATM"))
        .count()
}

impl RenderContext for SceneGraph {
    fn add_model(&mut self, data: &str, format: StructureFormat) -> Result<ModelId> {
        let atoms = count_atoms(data);
        if atoms == 0 {
            return Err(DockflowError::VisualizationLoad(format!(
                "{:?} payload has no ATOM/HETATM records",
                format
            )));
        }
        let id = ModelId(self.next());
        self.models.insert(id, SceneModel { format, atoms, style: None });
        Ok(id)
    }

    fn remove_model(&mut self, id: ModelId) {
        self.models.remove(&id);
        self.surfaces.retain(|_, (model, _)| *model != id);
    }

    fn set_style(&mut self, id: ModelId, style: ModelStyle) {
        if let Some(model) = self.models.get_mut(&id) {
            model.style = Some(style);
        }
    }

    fn add_surface(&mut self, model: ModelId, style: SurfaceStyle) -> ShapeId {
        let id = ShapeId(self.next());
        self.surfaces.insert(id, (model, style));
        id
    }

    fn remove_surface(&mut self, id: ShapeId) {
        self.surfaces.remove(&id);
    }

    fn add_sphere(&mut self, sphere: SphereSpec) -> ShapeId {
        let id = ShapeId(self.next());
        self.spheres.insert(id, sphere);
        id
    }

    fn remove_sphere(&mut self, id: ShapeId) {
        self.spheres.remove(&id);
    }

    fn clear(&mut self) {
        self.models.clear();
        self.surfaces.clear();
        self.spheres.clear();
    }

    fn zoom_to(&mut self) {}

    fn render(&mut self) {
        self.renders += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_ATOMS: &str = "HEADER    TEST\n\
ATOM      1  N   MET A   1      11.104  13.207   9.188  1.00 20.00           N\n\
HETATM    2  C1  LIG B   1      12.000  14.000  10.000  1.00 20.00           C\n\
END\n";

    #[test]
    fn test_add_model_counts_atoms() {
        let mut scene = SceneGraph::new();
        let id = scene.add_model(TWO_ATOMS, StructureFormat::Pdb).unwrap();
        assert_eq!(scene.model(id).map(|m| m.atoms), Some(2));
    }

    #[test]
    fn test_payload_without_atoms_is_rejected() {
        let mut scene = SceneGraph::new();
        let err = scene.add_model("<html>Not Found</html>", StructureFormat::Pdbqt).unwrap_err();
        assert!(matches!(err, DockflowError::VisualizationLoad(_)));
        assert_eq!(scene.model_count(), 0);
    }

    #[test]
    fn test_removing_model_drops_its_surface() {
        let mut scene = SceneGraph::new();
        let id = scene.add_model(TWO_ATOMS, StructureFormat::Pdb).unwrap();
        scene.add_surface(id, SurfaceStyle { opacity: 0.7, color: "white".into() });
        scene.remove_model(id);
        assert_eq!(scene.surface_count(), 0);
    }

    #[test]
    fn test_clear_releases_everything() {
        let mut scene = SceneGraph::new();
        let id = scene.add_model(TWO_ATOMS, StructureFormat::Pdb).unwrap();
        scene.add_surface(id, SurfaceStyle { opacity: 0.7, color: "white".into() });
        scene.add_sphere(SphereSpec { center: [0.0; 3], radius: 3.0, color: "yellow".into(), opacity: 0.5 });
        scene.clear();
        assert_eq!(scene.model_count() + scene.surface_count() + scene.sphere_count(), 0);
        assert!(scene.describe().is_empty());
    }
}
