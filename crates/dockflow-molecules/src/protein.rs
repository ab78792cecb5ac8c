//! Receptor protein descriptors and preparation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, instrument};
use uuid::Uuid;

use dockflow_common::{DockflowError, Result};
use crate::service::ComputationService;

/// A cysteine residue that can serve as a covalent-attachment target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CysteineSite {
    pub chain: String,
    pub residue_number: i64,
    #[serde(default = "default_residue_name")]
    pub residue_name: String,
}

fn default_residue_name() -> String { "CYS".to_string() }

impl CysteineSite {
    pub fn new(chain: &str, residue_number: i64) -> Self {
        Self {
            chain: chain.to_string(),
            residue_number,
            residue_name: default_residue_name(),
        }
    }

    /// Identifier used by the docking service, e.g. `A_145`.
    pub fn target_id(&self) -> String {
        format!("{}_{}", self.chain, self.residue_number)
    }
}

/// Response body of the protein preparation endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct PreparedProtein {
    #[serde(default)]
    pub id: Option<String>,
    pub cleaned_structure_url: String,
    #[serde(default)]
    pub filesystem_path: Option<String>,
    #[serde(default)]
    pub cysteines: Vec<CysteineSite>,
    #[serde(default)]
    pub chain_groups: BTreeMap<String, Vec<i64>>,
    #[serde(default)]
    pub potential_disulfide_bonds: Vec<serde_json::Value>,
}

/// A prepared receptor. Replaced wholesale on every upload, never edited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProteinDescriptor {
    pub id: Uuid,
    pub name: Option<String>,
    /// Reference the viewer loads (public URL of the cleaned structure).
    pub visual_ref: Option<String>,
    /// Reference the docking service reads (usually a filesystem path).
    pub docking_ref: Option<String>,
    pub cysteines: Vec<CysteineSite>,
    pub chain_groups: BTreeMap<String, Vec<i64>>,
    pub potential_disulfide_bonds: Vec<serde_json::Value>,
}

impl ProteinDescriptor {
    pub fn new(visual_ref: Option<&str>, docking_ref: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: None,
            visual_ref: visual_ref.map(str::to_string),
            docking_ref: docking_ref.map(str::to_string),
            cysteines: Vec::new(),
            chain_groups: BTreeMap::new(),
            potential_disulfide_bonds: Vec::new(),
        }
    }

    pub fn with_cysteines(mut self, cysteines: Vec<CysteineSite>) -> Self {
        self.cysteines = cysteines;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Build a descriptor from the preparation response. The filesystem
    /// path wins as docking reference; the cleaned URL is the fallback.
    pub fn from_prepared(prepared: PreparedProtein, name: Option<&str>) -> Self {
        let docking_ref = prepared
            .filesystem_path
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| prepared.cleaned_structure_url.clone());

        Self {
            id: prepared
                .id
                .as_deref()
                .and_then(|id| Uuid::parse_str(id).ok())
                .unwrap_or_else(Uuid::new_v4),
            name: name.map(str::to_string),
            visual_ref: Some(prepared.cleaned_structure_url),
            docking_ref: Some(docking_ref),
            cysteines: prepared.cysteines,
            chain_groups: prepared.chain_groups,
            potential_disulfide_bonds: prepared.potential_disulfide_bonds,
        }
    }

    /// Eligible for docking only with a usable docking reference.
    pub fn is_docking_eligible(&self) -> bool {
        self.docking_structure_ref().is_some()
    }

    pub fn docking_structure_ref(&self) -> Option<&str> {
        self.docking_ref
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty() && *r != "#")
    }

    pub fn find_cysteine(&self, target_id: &str) -> Option<&CysteineSite> {
        self.cysteines.iter().find(|c| c.target_id() == target_id)
    }
}

/// Upload a PDB file to the service and build the descriptor from its answer.
#[instrument(skip(service))]
pub async fn prepare_protein_file(
    service: &dyn ComputationService,
    path: &Path,
) -> Result<ProteinDescriptor> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| DockflowError::Precondition(format!("Not a file path: {}", path.display())))?
        .to_string();

    if !file_name.to_lowercase().ends_with(".pdb") {
        return Err(DockflowError::Precondition(format!(
            "Protein structure must be a .pdb file, got {}",
            file_name
        )));
    }

    let contents = tokio::fs::read(path).await?;
    info!(file = %file_name, bytes = contents.len(), "Uploading protein structure");

    let prepared = service.prepare_protein(&file_name, contents).await?;
    let stem = path.file_stem().and_then(|s| s.to_str());
    let protein = ProteinDescriptor::from_prepared(prepared, stem);

    info!(
        cysteines = protein.cysteines.len(),
        docking_ref = ?protein.docking_ref,
        "Protein prepared"
    );
    Ok(protein)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prepared(filesystem_path: Option<&str>) -> PreparedProtein {
        PreparedProtein {
            id: None,
            cleaned_structure_url: "/uploads/prepared/mk2_cleaned.pdb".to_string(),
            filesystem_path: filesystem_path.map(str::to_string),
            cysteines: vec![CysteineSite::new("A", 145)],
            chain_groups: BTreeMap::new(),
            potential_disulfide_bonds: vec![],
        }
    }

    #[test]
    fn test_filesystem_path_preferred_for_docking() {
        let p = ProteinDescriptor::from_prepared(prepared(Some("/srv/prepared/mk2.pdb")), None);
        assert_eq!(p.docking_structure_ref(), Some("/srv/prepared/mk2.pdb"));
        assert_eq!(p.visual_ref.as_deref(), Some("/uploads/prepared/mk2_cleaned.pdb"));
    }

    #[test]
    fn test_cleaned_url_is_docking_fallback() {
        let p = ProteinDescriptor::from_prepared(prepared(None), Some("mk2"));
        assert_eq!(p.docking_structure_ref(), Some("/uploads/prepared/mk2_cleaned.pdb"));
        assert_eq!(p.name.as_deref(), Some("mk2"));
    }

    #[test]
    fn test_eligibility_requires_docking_ref() {
        assert!(!ProteinDescriptor::new(Some("/uploads/a.pdb"), None).is_docking_eligible());
        assert!(!ProteinDescriptor::new(None, Some("  ")).is_docking_eligible());
        assert!(!ProteinDescriptor::new(None, Some("#")).is_docking_eligible());
        assert!(ProteinDescriptor::new(None, Some("/srv/a.pdb")).is_docking_eligible());
    }

    #[test]
    fn test_cysteine_lookup_by_target_id() {
        let p = ProteinDescriptor::new(None, Some("/srv/a.pdb"))
            .with_cysteines(vec![CysteineSite::new("A", 145), CysteineSite::new("B", 12)]);
        assert_eq!(p.find_cysteine("B_12").map(|c| c.residue_number), Some(12));
        assert!(p.find_cysteine("A_12").is_none());
    }

    #[test]
    fn test_cysteine_deserializes_service_shape() {
        let site: CysteineSite = serde_json::from_str(
            r#"{"chain":"A","residue_number":145,"residue_name":"CYS"}"#,
        )
        .unwrap();
        assert_eq!(site.target_id(), "A_145");
    }
}
