//! Ligand descriptors and ingestion through the computation service.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use dockflow_common::{DockflowError, Result};
use crate::library::{batch_lists, LibraryKind};
use crate::service::ComputationService;

/// A ligand as returned by the molecule processing endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoleculeRecord {
    #[serde(default)]
    pub name: Option<String>,
    pub smiles: String,
    #[serde(default)]
    pub pdb_url: Option<String>,
    #[serde(default)]
    pub pdbqt_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// A ligand in the workflow. Never mutated in place; updates replace it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoleculeDescriptor {
    pub id: Uuid,
    pub name: Option<String>,
    pub smiles: String,
    pub pdb_url: Option<String>,
    pub pdbqt_url: Option<String>,
    /// Set when the service could not build 3D structures for this entry.
    pub error: Option<String>,
}

impl MoleculeDescriptor {
    pub fn new(smiles: &str, name: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.map(str::to_string),
            smiles: smiles.to_string(),
            pdb_url: None,
            pdbqt_url: None,
            error: None,
        }
    }

    /// Name for display, defaulting to a 1-based index label.
    pub fn display_name(&self, index: usize) -> String {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("Molecule {}", index + 1),
        }
    }
}

impl From<MoleculeRecord> for MoleculeDescriptor {
    fn from(record: MoleculeRecord) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: record.name,
            smiles: record.smiles,
            pdb_url: record.pdb_url,
            pdbqt_url: record.pdbqt_url,
            error: record.error,
        }
    }
}

/// One batch of ligand input.
#[derive(Debug, Clone)]
pub enum MoleculeInput {
    Smiles { smiles: String, name: Option<String> },
    /// Newline-separated SMILES.
    Batch(String),
    Sdf { file_name: String, contents: Vec<u8> },
    /// Every molecule of a curated library. The test set is processed on
    /// the service side in one call.
    Library(LibraryKind),
    /// The compounds the PubChem search reports for the target.
    PubChem,
}

/// Split batch text into SMILES strings, skipping blank lines.
pub fn split_batch(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Outcome of processing one input batch.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub molecules: Vec<MoleculeDescriptor>,
    pub processed: usize,
    pub rejected: usize,
}

/// Send one input batch to the service. Entries the service flagged with an
/// error are kept (and counted) so the caller can show them.
#[instrument(skip(service, input))]
pub async fn ingest(service: &dyn ComputationService, input: MoleculeInput) -> Result<IngestReport> {
    let records = match input {
        MoleculeInput::Smiles { smiles, name } => {
            let smiles = smiles.trim();
            if smiles.is_empty() {
                return Err(DockflowError::Precondition("Please enter a SMILES string".into()));
            }
            service.process_smiles(smiles, name.as_deref()).await?
        }
        MoleculeInput::Batch(text) => {
            let list = split_batch(&text);
            if list.is_empty() {
                return Err(DockflowError::Precondition("No valid SMILES strings found".into()));
            }
            service.batch_process_smiles(&list, None).await?
        }
        MoleculeInput::Sdf { file_name, contents } => {
            if !file_name.to_lowercase().ends_with(".sdf") {
                return Err(DockflowError::Precondition("File must be an SDF file".into()));
            }
            service.process_sdf(&file_name, contents).await?
        }
        MoleculeInput::Library(LibraryKind::TestSet) => service.process_test_set().await?,
        MoleculeInput::Library(kind) => {
            let entries = service.library(kind).await?;
            if entries.is_empty() {
                return Err(DockflowError::Precondition(format!("No molecules found in the {} library", kind)));
            }
            let (smiles, names) = batch_lists(entries.iter().map(|e| (e.name.as_str(), e.smiles.as_str())));
            service.batch_process_smiles(&smiles, Some(names.as_slice())).await?
        }
        MoleculeInput::PubChem => {
            let hits = service.search_pubchem().await?;
            if hits.is_empty() {
                return Err(DockflowError::Precondition("PubChem search returned no compounds".into()));
            }
            let (smiles, names) = batch_lists(hits.iter().map(|h| (h.name.as_str(), h.smiles.as_str())));
            service.batch_process_smiles(&smiles, Some(names.as_slice())).await?
        }
    };

    let molecules: Vec<MoleculeDescriptor> = records.into_iter().map(Into::into).collect();
    let rejected = molecules.iter().filter(|m| m.error.is_some()).count();
    for m in molecules.iter().filter(|m| m.error.is_some()) {
        warn!(smiles = %m.smiles, error = ?m.error, "Service could not process molecule");
    }

    info!(
        processed = molecules.len() - rejected,
        rejected,
        "Molecule batch processed"
    );

    Ok(IngestReport {
        processed: molecules.len() - rejected,
        rejected,
        molecules,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{CompoundHit, LibraryEntry};
    use crate::service::MockComputationService;

    fn entry(name: &str, smiles: &str) -> LibraryEntry {
        LibraryEntry { name: name.to_string(), smiles: smiles.to_string(), description: None }
    }

    fn test_set_service() -> MockComputationService {
        MockComputationService::new()
            .with_invalid_smiles("invalid(((smiles")
            .with_library(
                LibraryKind::TestSet,
                vec![entry("MK2-IN-1", "CCOC(=O)c1c(C)[nH]c(C)c1"), entry("broken", "invalid(((smiles")],
            )
    }

    #[tokio::test]
    async fn test_library_input_keeps_names() {
        let svc = MockComputationService::new().with_library(
            LibraryKind::Warheads,
            vec![entry("acrylamide", "C=CC(=O)N"), entry("chloroacetamide", "ClCC(=O)N")],
        );
        let report = ingest(&svc, MoleculeInput::Library(LibraryKind::Warheads)).await.unwrap();
        assert_eq!(report.processed, 2);
        let names: Vec<_> = report.molecules.iter().map(|m| m.display_name(0)).collect();
        assert_eq!(names, vec!["acrylamide", "chloroacetamide"]);
        assert_eq!(report.molecules[1].pdbqt_url.as_deref(), Some("/uploads/molecules/chloroacetamide.pdbqt"));
    }

    #[tokio::test]
    async fn test_test_set_counts_rejected_entries() {
        let svc = test_set_service();
        let report = ingest(&svc, MoleculeInput::Library(LibraryKind::TestSet)).await.unwrap();
        assert_eq!(report.molecules.len(), 2);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.molecules[1].name.as_deref(), Some("broken"));
    }

    #[tokio::test]
    async fn test_empty_library_is_precondition() {
        let svc = MockComputationService::new();
        let err = ingest(&svc, MoleculeInput::Library(LibraryKind::Covalent)).await.unwrap_err();
        assert!(matches!(err, DockflowError::Precondition(_)));
        assert!(!err.is_per_item());
    }

    #[tokio::test]
    async fn test_pubchem_hits_are_processed() {
        let hit = CompoundHit {
            name: "CID_904".into(),
            smiles: "CC(=O)Nc1ccccc1".into(),
            molecular_weight: Some("135.16".into()),
            molecular_formula: None,
            pubchem_cid: Some("904".into()),
        };
        let svc = MockComputationService::new().with_pubchem_hits(vec![hit]);
        let report = ingest(&svc, MoleculeInput::PubChem).await.unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.molecules[0].name.as_deref(), Some("CID_904"));

        let empty = MockComputationService::new();
        assert!(ingest(&empty, MoleculeInput::PubChem).await.is_err());
    }


    #[test]
    fn test_display_name_defaults_to_index_label() {
        let unnamed = MoleculeDescriptor::new("CCO", None);
        assert_eq!(unnamed.display_name(0), "Molecule 1");
        assert_eq!(unnamed.display_name(4), "Molecule 5");

        let blank = MoleculeDescriptor::new("CCO", Some("  "));
        assert_eq!(blank.display_name(1), "Molecule 2");

        let named = MoleculeDescriptor::new("CCO", Some("ethanol"));
        assert_eq!(named.display_name(7), "ethanol");
    }

    #[test]
    fn test_split_batch_trims_and_skips_blank_lines() {
        let text = "CCO\n\n  c1ccccc1  \r\n\t\nCC(=O)Nc1ccccc1\n";
        assert_eq!(split_batch(text), vec!["CCO", "c1ccccc1", "CC(=O)Nc1ccccc1"]);
    }

    #[test]
    fn test_record_with_error_keeps_message() {
        let record: MoleculeRecord = serde_json::from_str(
            r#"{"name":"bad","smiles":"invalid(((smiles","error":"Invalid SMILES string"}"#,
        )
        .unwrap();
        let m = MoleculeDescriptor::from(record);
        assert_eq!(m.error.as_deref(), Some("Invalid SMILES string"));
        assert!(m.pdbqt_url.is_none());
    }
}
