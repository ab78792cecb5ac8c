//! Docking configuration, per-ligand outcomes and the concurrent dispatcher.

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use dockflow_common::{DockflowError, DomainErrorKind, Result};
use crate::ligand::MoleculeDescriptor;
use crate::protein::{CysteineSite, ProteinDescriptor};
use crate::scoring::{RankedResultSet, ResultRanker};
use crate::service::{ComputationService, DockingResponse, PoseRecord};

// ── Configuration ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DockingMode {
    #[default]
    Standard,
    Covalent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DockingAlgorithm {
    #[default]
    #[serde(rename = "autodock")]
    AutoDockVina,
    #[serde(rename = "glide")]
    Glide,
    #[serde(rename = "gold")]
    Gold,
}

impl DockingAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            DockingAlgorithm::AutoDockVina => "autodock",
            DockingAlgorithm::Glide => "glide",
            DockingAlgorithm::Gold => "gold",
        }
    }
}

impl fmt::Display for DockingAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DockingAlgorithm {
    type Err = DockflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "autodock" | "autodock-vina" | "vina" => Ok(DockingAlgorithm::AutoDockVina),
            "glide" => Ok(DockingAlgorithm::Glide),
            "gold" => Ok(DockingAlgorithm::Gold),
            other => Err(DockflowError::Config(format!("Unknown docking algorithm: {}", other))),
        }
    }
}

/// How to dock: mode, algorithm and (covalent only) the target cysteine.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DockingConfiguration {
    pub mode: DockingMode,
    pub algorithm: DockingAlgorithm,
    /// Cysteine identifier such as `A_145`. Ignored in standard mode.
    pub covalent_target: Option<String>,
}

impl DockingConfiguration {
    pub fn standard(algorithm: DockingAlgorithm) -> Self {
        Self {
            mode: DockingMode::Standard,
            algorithm,
            covalent_target: None,
        }
    }

    pub fn covalent(algorithm: DockingAlgorithm, target: Option<&str>) -> Self {
        Self {
            mode: DockingMode::Covalent,
            algorithm,
            covalent_target: target.map(str::to_string),
        }
    }

    /// The selected cysteine, if covalent and it exists on `protein`.
    pub fn cysteine_target<'p>(&self, protein: Option<&'p ProteinDescriptor>) -> Option<&'p CysteineSite> {
        if self.mode != DockingMode::Covalent {
            return None;
        }
        let target = self.covalent_target.as_deref()?;
        protein?.find_cysteine(target)
    }

    /// Standard mode is always complete; covalent needs a valid target.
    pub fn is_complete(&self, protein: Option<&ProteinDescriptor>) -> bool {
        match self.mode {
            DockingMode::Standard => true,
            DockingMode::Covalent => self.cysteine_target(protein).is_some(),
        }
    }
}

// ── Request ───────────────────────────────────────────────────────────────────

/// Body of one `/dock` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DockingRequest {
    pub smiles: String,
    pub protein_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cysteine_id: Option<String>,
}

impl DockingRequest {
    pub fn build(
        molecule: &MoleculeDescriptor,
        protein: &ProteinDescriptor,
        config: &DockingConfiguration,
    ) -> Result<Self> {
        let protein_path = protein.docking_structure_ref().ok_or_else(|| {
            DockflowError::Precondition("Protein has no docking structure reference".into())
        })?;
        Ok(Self {
            smiles: molecule.smiles.clone(),
            protein_path: protein_path.to_string(),
            cysteine_id: config.cysteine_target(Some(protein)).map(CysteineSite::target_id),
        })
    }
}

// ── Outcome ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub id: u32,
    pub affinity: f64,
    pub rmsd_lower_bound: Option<f64>,
    pub rmsd_upper_bound: Option<f64>,
    pub structure_url: Option<String>,
    pub inline_coordinates: Option<String>,
    pub distance_to_cysteine: Option<f64>,
}

impl Pose {
    fn from_record(index: usize, record: PoseRecord) -> Self {
        Self {
            id: record
                .mode
                .unwrap_or_else(|| u32::try_from(index.saturating_add(1)).unwrap_or(u32::MAX)),
            affinity: record.affinity,
            rmsd_lower_bound: record.rmsd_lb,
            rmsd_upper_bound: record.rmsd_ub,
            structure_url: record.pdbqt_url.or(record.pose_file),
            inline_coordinates: record.coordinates,
            distance_to_cysteine: record.distance_to_cysteine,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CovalentLikelihood {
    Likely,
    Unlikely,
    NotApplicable,
    Unknown,
}

impl CovalentLikelihood {
    fn classify(mode: DockingMode, potential: Option<&str>) -> Self {
        match mode {
            DockingMode::Standard => CovalentLikelihood::NotApplicable,
            DockingMode::Covalent if potential == Some("High") => CovalentLikelihood::Likely,
            DockingMode::Covalent => CovalentLikelihood::Unlikely,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CovalentLikelihood::Likely => "likely",
            CovalentLikelihood::Unlikely => "unlikely",
            CovalentLikelihood::NotApplicable => "n/a",
            CovalentLikelihood::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingMode {
    Stable,
    NoBinding,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transport,
    Status,
    InvalidStructure,
    Rejected,
    Malformed,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReason {
    pub kind: FailureKind,
    pub message: String,
}

impl FailureReason {
    pub fn from_error(err: &DockflowError, molecule_name: &str) -> Self {
        let kind = match err {
            DockflowError::RemoteRequest { status: None, .. } | DockflowError::Http(_) => FailureKind::Transport,
            DockflowError::RemoteRequest { status: Some(_), .. } => FailureKind::Status,
            DockflowError::RemoteDomain { kind: DomainErrorKind::InvalidStructure, .. } => {
                FailureKind::InvalidStructure
            }
            DockflowError::RemoteDomain { kind: DomainErrorKind::Rejected, .. } => FailureKind::Rejected,
            DockflowError::Serialization(_) => FailureKind::Malformed,
            _ => FailureKind::Internal,
        };
        let message = match kind {
            FailureKind::InvalidStructure => format!(
                "Invalid molecule structure in {}. Please check the SMILES string.",
                molecule_name
            ),
            _ => err.to_string(),
        };
        Self { kind, message }
    }
}

/// Settled result of docking one ligand. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DockingOutcome {
    /// Position of the ligand in the dispatched batch.
    pub input_index: usize,
    pub molecule: MoleculeDescriptor,
    pub molecule_name: String,
    /// Lower is better.
    pub affinity: Option<f64>,
    pub poses: Vec<Pose>,
    pub covalent: CovalentLikelihood,
    pub binding_mode: BindingMode,
    pub warhead_distance: Option<f64>,
    pub has_warhead: bool,
    pub status: Option<String>,
    /// Structure reference of the first pose.
    pub pose_ref: Option<String>,
    pub success: bool,
    pub failure: Option<FailureReason>,
}

impl DockingOutcome {
    pub fn settle(
        input_index: usize,
        molecule: MoleculeDescriptor,
        mode: DockingMode,
        result: Result<DockingResponse>,
    ) -> Self {
        match result {
            Ok(response) => Self::succeeded(input_index, molecule, mode, response),
            Err(err) => Self::failed(input_index, molecule, &err),
        }
    }

    fn succeeded(input_index: usize, molecule: MoleculeDescriptor, mode: DockingMode, response: DockingResponse) -> Self {
        let molecule_name = molecule.display_name(input_index);
        let poses: Vec<Pose> = response
            .poses
            .into_iter()
            .enumerate()
            .map(|(i, p)| Pose::from_record(i, p))
            .collect();

        let affinity = response
            .best_affinity
            .or_else(|| poses.iter().map(|p| p.affinity).reduce(f64::min))
            .filter(|a| a.is_finite());

        let warhead_distance = response
            .warhead_distance
            .or_else(|| poses.first().and_then(|p| p.distance_to_cysteine));
        let pose_ref = poses.first().and_then(|p| p.structure_url.clone());
        let binding_mode = if poses.is_empty() { BindingMode::NoBinding } else { BindingMode::Stable };

        Self {
            input_index,
            molecule,
            molecule_name,
            affinity,
            covalent: CovalentLikelihood::classify(mode, response.covalent_potential.as_deref()),
            binding_mode,
            warhead_distance,
            has_warhead: response.has_warhead,
            status: response.status,
            pose_ref,
            poses,
            success: true,
            failure: None,
        }
    }

    pub fn failed(input_index: usize, molecule: MoleculeDescriptor, err: &DockflowError) -> Self {
        let molecule_name = molecule.display_name(input_index);
        let failure = FailureReason::from_error(err, &molecule_name);
        Self {
            input_index,
            molecule,
            molecule_name,
            affinity: None,
            poses: Vec::new(),
            covalent: CovalentLikelihood::Unknown,
            binding_mode: BindingMode::Error,
            warhead_distance: None,
            has_warhead: false,
            status: Some("error".to_string()),
            pose_ref: None,
            success: false,
            failure: Some(failure),
        }
    }

    /// Score usable for ranking: present, finite, and from a success.
    pub fn score(&self) -> Option<f64> {
        if !self.success {
            return None;
        }
        self.affinity.filter(|a| a.is_finite())
    }
}

// ── Progress events ───────────────────────────────────────────────────────────

/// Progress event emitted as each docking request settles.
#[derive(Debug, Clone, Serialize)]
pub struct DockingProgress {
    pub job_id: Uuid,
    pub molecule: String,
    pub completed: usize,
    pub total: usize,
    pub success: bool,
    pub error: Option<String>,
    pub settled_at: DateTime<Utc>,
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

/// Issues one docking request per ligand, concurrently, and ranks the
/// settled outcomes. A failing request never cancels its siblings.
///
/// Holds no state between calls; every `dispatch` is independent.
pub struct DockingTaskDispatcher {
    service: Arc<dyn ComputationService>,
    ranker: ResultRanker,
    progress_tx: Option<broadcast::Sender<DockingProgress>>,
}

impl DockingTaskDispatcher {
    pub fn new(service: Arc<dyn ComputationService>) -> Self {
        Self {
            service,
            ranker: ResultRanker::new(),
            progress_tx: None,
        }
    }

    pub fn with_progress(mut self, tx: broadcast::Sender<DockingProgress>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    #[instrument(skip_all, fields(n = molecules.len(), mode = ?config.mode, algorithm = %config.algorithm))]
    pub async fn dispatch(
        &self,
        protein: &ProteinDescriptor,
        molecules: &[MoleculeDescriptor],
        config: &DockingConfiguration,
    ) -> Result<RankedResultSet> {
        if molecules.is_empty() {
            return Err(DockflowError::Precondition("No molecules to dock".into()));
        }
        if !protein.is_docking_eligible() {
            return Err(DockflowError::Precondition(
                "Protein has no docking structure reference".into(),
            ));
        }
        if config.mode == DockingMode::Covalent && config.cysteine_target(Some(protein)).is_none() {
            warn!(target = ?config.covalent_target, "Covalent target not found on protein, docking without it");
        }

        let requests = molecules
            .iter()
            .map(|m| DockingRequest::build(m, protein, config))
            .collect::<Result<Vec<_>>>()?;

        let job_id = Uuid::new_v4();
        let total = molecules.len();
        let completed = AtomicUsize::new(0);
        info!(job_id = %job_id, total, "Dispatching docking requests");

        let tasks = molecules
            .iter()
            .cloned()
            .zip(requests)
            .enumerate()
            .map(|(index, (molecule, request))| {
                let completed = &completed;
                async move {
                    let result = self.service.dock(&request).await;
                    let outcome = DockingOutcome::settle(index, molecule, config.mode, result);
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;

                    match &outcome.failure {
                        None => debug!(molecule = %outcome.molecule_name, affinity = ?outcome.affinity, "Docking settled"),
                        Some(f) => warn!(molecule = %outcome.molecule_name, kind = ?f.kind, "Docking failed: {}", f.message),
                    }
                    self.emit(DockingProgress {
                        job_id,
                        molecule: outcome.molecule_name.clone(),
                        completed: done,
                        total,
                        success: outcome.success,
                        error: outcome.failure.as_ref().map(|f| f.message.clone()),
                        settled_at: Utc::now(),
                    });
                    outcome
                }
            });

        let outcomes = join_all(tasks).await;
        let ranked = self.ranker.rank(outcomes);
        info!(job_id = %job_id, "{}", ranked.summary());
        Ok(ranked)
    }

    fn emit(&self, progress: DockingProgress) {
        if let Some(ref tx) = self.progress_tx {
            let _ = tx.send(progress);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{MockComputationService, MockReply};

    fn mk2() -> ProteinDescriptor {
        ProteinDescriptor::new(Some("/uploads/mk2.pdb"), Some("/srv/mk2.pdb"))
            .with_cysteines(vec![CysteineSite::new("A", 145)])
    }

    #[test]
    fn test_covalent_without_target_is_incomplete() {
        let protein = mk2();
        let config = DockingConfiguration::covalent(DockingAlgorithm::Glide, None);
        assert!(!config.is_complete(Some(&protein)));

        let wrong = DockingConfiguration::covalent(DockingAlgorithm::Glide, Some("B_12"));
        assert!(!wrong.is_complete(Some(&protein)));

        let ok = DockingConfiguration::covalent(DockingAlgorithm::Glide, Some("A_145"));
        assert!(ok.is_complete(Some(&protein)));
        assert!(DockingConfiguration::standard(DockingAlgorithm::Gold).is_complete(None));
    }

    #[test]
    fn test_cysteine_id_only_for_valid_covalent_target() {
        let protein = mk2();
        let m = MoleculeDescriptor::new("CCO", None);

        let std_req = DockingRequest::build(&m, &protein, &DockingConfiguration::default()).unwrap();
        assert_eq!(std_req.cysteine_id, None);
        assert!(!serde_json::to_string(&std_req).unwrap().contains("cysteine_id"));

        let cov = DockingConfiguration::covalent(DockingAlgorithm::AutoDockVina, Some("A_145"));
        let cov_req = DockingRequest::build(&m, &protein, &cov).unwrap();
        assert_eq!(cov_req.cysteine_id.as_deref(), Some("A_145"));
        assert_eq!(cov_req.protein_path, "/srv/mk2.pdb");

        let stale = DockingConfiguration { mode: DockingMode::Standard, ..cov };
        assert_eq!(DockingRequest::build(&m, &protein, &stale).unwrap().cysteine_id, None);
    }

    #[test]
    fn test_algorithm_parsing() {
        assert_eq!("autodock".parse::<DockingAlgorithm>().unwrap(), DockingAlgorithm::AutoDockVina);
        assert_eq!("GLIDE".parse::<DockingAlgorithm>().unwrap(), DockingAlgorithm::Glide);
        assert!("rosetta".parse::<DockingAlgorithm>().is_err());
    }

    #[test]
    fn test_score_falls_back_to_best_pose() {
        let response = DockingResponse {
            poses: vec![
                PoseRecord { affinity: -6.1, ..Default::default() },
                PoseRecord { affinity: -7.3, pdbqt_url: Some("/uploads/p2.pdbqt".into()), ..Default::default() },
            ],
            covalent_potential: Some("High".into()),
            ..Default::default()
        };
        let o = DockingOutcome::settle(0, MoleculeDescriptor::new("CCO", None), DockingMode::Covalent, Ok(response));
        assert_eq!(o.score(), Some(-7.3));
        assert_eq!(o.covalent, CovalentLikelihood::Likely);
        assert_eq!(o.binding_mode, BindingMode::Stable);
        assert_eq!(o.poses[1].id, 2);
        assert_eq!(o.pose_ref, None);
    }

    #[test]
    fn test_pose_id_saturates_on_huge_index() {
        let pose = Pose::from_record(usize::MAX, PoseRecord { affinity: -5.0, ..Default::default() });
        assert_eq!(pose.id, u32::MAX);
        let pose = Pose::from_record(3, PoseRecord { mode: Some(9), affinity: -5.0, ..Default::default() });
        assert_eq!(pose.id, 9);
    }

    #[test]
    fn test_success_without_poses_has_no_score() {
        let o = DockingOutcome::settle(
            2,
            MoleculeDescriptor::new("CCO", None),
            DockingMode::Standard,
            Ok(DockingResponse::default()),
        );
        assert!(o.success);
        assert_eq!(o.score(), None);
        assert_eq!(o.binding_mode, BindingMode::NoBinding);
        assert_eq!(o.covalent, CovalentLikelihood::NotApplicable);
        assert_eq!(o.molecule_name, "Molecule 3");
    }

    #[test]
    fn test_non_finite_affinity_is_absent() {
        let response = DockingResponse { best_affinity: Some(f64::NAN), ..Default::default() };
        let o = DockingOutcome::settle(0, MoleculeDescriptor::new("C", None), DockingMode::Standard, Ok(response));
        assert_eq!(o.score(), None);
    }

    #[test]
    fn test_structure_complaint_gets_specific_reason() {
        let err = DockflowError::RemoteDomain {
            kind: DomainErrorKind::InvalidStructure,
            message: "SMARTS Parse Error".into(),
        };
        let o = DockingOutcome::failed(1, MoleculeDescriptor::new("x(((", Some("bad")), &err);
        let reason = o.failure.unwrap();
        assert_eq!(reason.kind, FailureKind::InvalidStructure);
        assert!(reason.message.contains("Invalid molecule structure in bad"));
        assert_eq!(o.covalent, CovalentLikelihood::Unknown);
    }

    #[tokio::test]
    async fn test_dispatch_rejects_empty_batch_without_requests() {
        let service = Arc::new(MockComputationService::new());
        let dispatcher = DockingTaskDispatcher::new(service.clone());
        let err = dispatcher.dispatch(&mk2(), &[], &DockingConfiguration::default()).await.unwrap_err();
        assert!(matches!(err, DockflowError::Precondition(_)));
        assert_eq!(service.dock_calls(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_rejects_ineligible_protein() {
        let service = Arc::new(MockComputationService::new().with_affinity("CCO", -5.0));
        let dispatcher = DockingTaskDispatcher::new(service.clone());
        let protein = ProteinDescriptor::new(Some("/uploads/a.pdb"), None);
        let err = dispatcher
            .dispatch(&protein, &[MoleculeDescriptor::new("CCO", None)], &DockingConfiguration::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DockflowError::Precondition(_)));
        assert_eq!(service.dock_calls(), 0);
    }

    #[tokio::test]
    async fn test_progress_reports_every_settlement() {
        let service = Arc::new(
            MockComputationService::new()
                .with_affinity("CCO", -5.0)
                .with_reply("N", MockReply::Transport("connection refused".into())),
        );
        let (tx, mut rx) = broadcast::channel(16);
        let dispatcher = DockingTaskDispatcher::new(service).with_progress(tx);
        let molecules = vec![MoleculeDescriptor::new("CCO", None), MoleculeDescriptor::new("N", None)];

        dispatcher.dispatch(&mk2(), &molecules, &DockingConfiguration::default()).await.unwrap();

        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        assert_eq!(events.len(), 2);
        assert_eq!(events.iter().map(|e| e.completed).max(), Some(2));
        assert_eq!(events.iter().filter(|e| !e.success).count(), 1);
    }
}
