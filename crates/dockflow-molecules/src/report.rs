//! Report generation request built from a ranked result set.

use serde::{Deserialize, Serialize};

use dockflow_common::{DockflowError, Result};
use crate::docking::{CovalentLikelihood, DockingConfiguration, DockingMode};
use crate::protein::{CysteineSite, ProteinDescriptor};
use crate::scoring::RankedResultSet;

#[derive(Debug, Clone, Serialize)]
pub struct ReportPose {
    pub affinity: f64,
    pub rmsd_lb: f64,
    pub rmsd_ub: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportDockingResults {
    pub poses: Vec<ReportPose>,
    pub best_affinity: f64,
    pub warhead_distance: Option<f64>,
    /// "High", "Low" or "N/A".
    pub covalent_potential: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportProteinInfo {
    pub name: String,
    pub pdb_id: String,
    pub cysteines: Vec<CysteineSite>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportMoleculeInfo {
    pub name: String,
    pub smiles: String,
}

/// Body of the `/generate-report` call.
#[derive(Debug, Clone, Serialize)]
pub struct ReportRequest {
    pub docking_results: ReportDockingResults,
    pub protein_info: ReportProteinInfo,
    pub molecule_info: ReportMoleculeInfo,
}

impl ReportRequest {
    /// Summarise the best docking result. Needs at least one scored entry.
    pub fn from_results(
        protein: &ProteinDescriptor,
        config: &DockingConfiguration,
        ranked: &RankedResultSet,
    ) -> Result<Self> {
        let best = ranked
            .best()
            .ok_or_else(|| DockflowError::Precondition("No successful docking result to report".into()))?;
        let best_affinity = best
            .score()
            .ok_or_else(|| DockflowError::Precondition("Best result has no score".into()))?;

        let poses = ranked
            .entries()
            .filter_map(|o| o.score())
            .map(|affinity| ReportPose { affinity, rmsd_lb: 0.0, rmsd_ub: 0.0 })
            .collect();

        let covalent = config.mode == DockingMode::Covalent;
        let covalent_potential = match best.covalent {
            CovalentLikelihood::Likely => "High",
            CovalentLikelihood::Unlikely => "Low",
            CovalentLikelihood::NotApplicable | CovalentLikelihood::Unknown => "N/A",
        };

        Ok(Self {
            docking_results: ReportDockingResults {
                poses,
                best_affinity,
                warhead_distance: if covalent { best.warhead_distance } else { None },
                covalent_potential: covalent_potential.to_string(),
            },
            protein_info: ReportProteinInfo {
                name: protein.name.clone().unwrap_or_else(|| "Target Protein".to_string()),
                pdb_id: "Unknown".to_string(),
                cysteines: config.cysteine_target(Some(protein)).cloned().into_iter().collect(),
            },
            molecule_info: ReportMoleculeInfo {
                name: best.molecule_name.clone(),
                smiles: best.molecule.smiles.clone(),
            },
        })
    }
}

/// Where the generated report lives and how it was anchored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "ReceiptWire")]
pub struct ReportReceipt {
    pub report_url: String,
    pub cid: Option<String>,
    pub signature: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ReportHash {
    Anchored {
        cid: Option<String>,
        #[serde(default)]
        store_signature: Option<String>,
    },
    Plain(String),
}

#[derive(Deserialize)]
struct ReceiptWire {
    #[serde(default)]
    report_url: String,
    #[serde(default)]
    hash: Option<ReportHash>,
}

impl From<ReceiptWire> for ReportReceipt {
    fn from(wire: ReceiptWire) -> Self {
        let (cid, signature) = match wire.hash {
            Some(ReportHash::Anchored { cid, store_signature }) => (cid, store_signature),
            Some(ReportHash::Plain(cid)) => (Some(cid), None),
            None => (None, None),
        };
        Self { report_url: wire.report_url, cid, signature }
    }
}
