//! Client for the remote computation service.
//!
//! Endpoints used (relative to the configured base URL):
//!   POST prepare-protein        multipart `file`
//!   POST process-smiles         {smiles, name?}
//!   POST batch-process-smiles   {smiles_list, names?}
//!   POST process-sdf            multipart `file`
//!   POST dock                   {smiles, protein_path, cysteine_id?}
//!   POST generate-report        see `report::ReportRequest`
//!   GET  library/*, search/pubchem  see `library`

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use dockflow_common::{DockflowError, DomainErrorKind, Result, SandboxClient};
use crate::docking::DockingRequest;
use crate::library::{CompoundHit, LibraryEntry, LibraryEnvelope, LibraryKind};
use crate::ligand::MoleculeRecord;
use crate::protein::{CysteineSite, PreparedProtein};
use crate::report::{ReportReceipt, ReportRequest};

/// Substrings that mark a structure-notation parse failure in a service body.
const STRUCTURE_ERROR_SIGNATURES: &[&str] = &["SMARTS Parse Error", "SMILES"];

/// One docked pose as the service reports it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoseRecord {
    #[serde(default)]
    pub mode: Option<u32>,
    pub affinity: f64,
    #[serde(default)]
    pub rmsd_lb: Option<f64>,
    #[serde(default)]
    pub rmsd_ub: Option<f64>,
    #[serde(default)]
    pub pdbqt_url: Option<String>,
    #[serde(default)]
    pub pose_file: Option<String>,
    #[serde(default)]
    pub coordinates: Option<String>,
    #[serde(default)]
    pub distance_to_cysteine: Option<f64>,
}

/// Body of a successful docking response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DockingResponse {
    #[serde(default)]
    pub poses: Vec<PoseRecord>,
    #[serde(default)]
    pub best_affinity: Option<f64>,
    #[serde(default)]
    pub warhead_distance: Option<f64>,
    /// "High", "Medium" or "Low".
    #[serde(default)]
    pub covalent_potential: Option<String>,
    #[serde(default)]
    pub has_warhead: bool,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MoleculesEnvelope {
    #[serde(default)]
    molecules: Vec<MoleculeRecord>,
}

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    #[serde(default)]
    molecules: Vec<serde_json::Value>,
}

/// Operations the workflow needs from the computation service.
#[async_trait]
pub trait ComputationService: Send + Sync {
    async fn prepare_protein(&self, file_name: &str, contents: Vec<u8>) -> Result<PreparedProtein>;

    async fn process_smiles(&self, smiles: &str, name: Option<&str>) -> Result<Vec<MoleculeRecord>>;

    async fn batch_process_smiles(
        &self,
        smiles_list: &[String],
        names: Option<&[String]>,
    ) -> Result<Vec<MoleculeRecord>>;

    async fn process_sdf(&self, file_name: &str, contents: Vec<u8>) -> Result<Vec<MoleculeRecord>>;

    /// Dock one ligand. Errors are per-item and must not abort a batch.
    async fn dock(&self, request: &DockingRequest) -> Result<DockingResponse>;

    async fn generate_report(&self, request: &ReportRequest) -> Result<ReportReceipt>;

    /// List a curated library. Nothing is processed.
    async fn library(&self, kind: LibraryKind) -> Result<Vec<LibraryEntry>>;

    /// Build 3D structures for the whole test set on the service side.
    async fn process_test_set(&self) -> Result<Vec<MoleculeRecord>>;

    /// PubChem compounds reported for the docking target.
    async fn search_pubchem(&self) -> Result<Vec<CompoundHit>>;
}

/// Whether a service body carries a structure-parse complaint.
pub fn has_structure_signature(body: &str) -> bool {
    STRUCTURE_ERROR_SIGNATURES.iter().any(|sig| body.contains(sig))
}

/// Pull the human-readable part out of an error body (`detail`, `message`
/// or `error` field), falling back to the raw text.
pub fn error_detail(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["detail", "message", "error"] {
            if let Some(text) = value.get(key).and_then(|v| v.as_str()) {
                return text.to_string();
            }
        }
    }
    body.trim().to_string()
}

/// Classify a failed service answer. `status` is the HTTP status for
/// non-success responses and `None` for an error embedded in a 2xx body.
pub fn classify_failure(status: Option<u16>, body: &str) -> DockflowError {
    let detail = error_detail(body);
    if has_structure_signature(body) {
        return DockflowError::RemoteDomain {
            kind: DomainErrorKind::InvalidStructure,
            message: detail,
        };
    }
    match status {
        Some(code) => DockflowError::RemoteRequest {
            status: Some(code),
            message: format!("service returned {}: {}", code, detail),
        },
        None => DockflowError::RemoteDomain {
            kind: DomainErrorKind::Rejected,
            message: detail,
        },
    }
}

/// `ComputationService` over HTTP.
pub struct HttpComputationService {
    client: SandboxClient,
    base_url: String,
}

impl HttpComputationService {
    pub fn new(base_url: &str, client: SandboxClient) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Build a client allowed to reach `base_url` only.
    pub fn connect(base_url: &str, timeout: Duration, extra_hosts: &[String]) -> Result<Self> {
        let client = SandboxClient::for_service(base_url, timeout, extra_hosts)?;
        Ok(Self::new(base_url, client))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.endpoint(path);
        debug!(%url, "POST");
        let resp = self.client.post(&url)?.json(body).send().await.map_err(transport_error)?;
        read_response(resp).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.endpoint(path);
        debug!(%url, "GET");
        let resp = self.client.get(&url)?.send().await.map_err(transport_error)?;
        read_response(resp).await
    }

    async fn post_file<T: DeserializeOwned>(&self, path: &str, file_name: &str, contents: Vec<u8>) -> Result<T> {
        let url = self.endpoint(path);
        debug!(%url, file = file_name, "POST multipart");
        let part = Part::bytes(contents).file_name(file_name.to_string());
        let form = Form::new().part("file", part);
        let resp = self.client.post(&url)?.multipart(form).send().await.map_err(transport_error)?;
        read_response(resp).await
    }
}

fn transport_error(e: reqwest::Error) -> DockflowError {
    DockflowError::RemoteRequest {
        status: None,
        message: format!("transport error: {}", e),
    }
}

async fn read_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    let body = resp.text().await.map_err(transport_error)?;

    if !status.is_success() {
        warn!(status = status.as_u16(), "Service returned error status");
        return Err(classify_failure(Some(status.as_u16()), &body));
    }

    let value: serde_json::Value = serde_json::from_str(&body)?;
    if value.get("status").and_then(|s| s.as_str()) == Some("error") {
        return Err(classify_failure(None, &body));
    }
    Ok(serde_json::from_value(value)?)
}

#[async_trait]
impl ComputationService for HttpComputationService {
    #[instrument(skip(self, contents))]
    async fn prepare_protein(&self, file_name: &str, contents: Vec<u8>) -> Result<PreparedProtein> {
        self.post_file("prepare-protein", file_name, contents).await
    }

    #[instrument(skip(self))]
    async fn process_smiles(&self, smiles: &str, name: Option<&str>) -> Result<Vec<MoleculeRecord>> {
        let body = serde_json::json!({ "smiles": smiles, "name": name });
        let envelope: MoleculesEnvelope = self.post_json("process-smiles", &body).await?;
        Ok(envelope.molecules)
    }

    #[instrument(skip(self, smiles_list, names), fields(n = smiles_list.len()))]
    async fn batch_process_smiles(
        &self,
        smiles_list: &[String],
        names: Option<&[String]>,
    ) -> Result<Vec<MoleculeRecord>> {
        let body = serde_json::json!({ "smiles_list": smiles_list, "names": names });
        let envelope: MoleculesEnvelope = self.post_json("batch-process-smiles", &body).await?;
        Ok(envelope.molecules)
    }

    #[instrument(skip(self, contents))]
    async fn process_sdf(&self, file_name: &str, contents: Vec<u8>) -> Result<Vec<MoleculeRecord>> {
        let envelope: MoleculesEnvelope = self.post_file("process-sdf", file_name, contents).await?;
        Ok(envelope.molecules)
    }

    #[instrument(skip(self, request), fields(smiles = %request.smiles))]
    async fn dock(&self, request: &DockingRequest) -> Result<DockingResponse> {
        self.post_json("dock", request).await
    }

    #[instrument(skip(self, request))]
    async fn generate_report(&self, request: &ReportRequest) -> Result<ReportReceipt> {
        self.post_json("generate-report", request).await
    }

    #[instrument(skip(self))]
    async fn library(&self, kind: LibraryKind) -> Result<Vec<LibraryEntry>> {
        let envelope: LibraryEnvelope = self.get_json(&kind.path()).await?;
        Ok(envelope.into_entries())
    }

    #[instrument(skip(self))]
    async fn process_test_set(&self) -> Result<Vec<MoleculeRecord>> {
        let envelope: MoleculesEnvelope = self.get_json("library/process-test-set").await?;
        Ok(envelope.molecules)
    }

    #[instrument(skip(self))]
    async fn search_pubchem(&self) -> Result<Vec<CompoundHit>> {
        let envelope: SearchEnvelope = self.get_json("search/pubchem").await?;
        let total = envelope.molecules.len();
        let hits: Vec<CompoundHit> = envelope.molecules.iter().filter_map(CompoundHit::from_json).collect();
        if hits.len() < total {
            warn!(skipped = total - hits.len(), "PubChem hits without SMILES ignored");
        }
        Ok(hits)
    }
}

// ── Mock Implementation for Testing ────────────────────────────────────────

/// Scripted docking answer for one SMILES string.
#[derive(Debug, Clone)]
pub enum MockReply {
    Docked(DockingResponse),
    /// Non-success HTTP status with the given body.
    Status(u16, String),
    /// 2xx body with `"status": "error"` and the given message.
    Embedded(String),
    Transport(String),
}

/// In-memory service with scripted answers, for unit and integration tests.
pub struct MockComputationService {
    replies: HashMap<String, MockReply>,
    delays: HashMap<String, Duration>,
    invalid: HashSet<String>,
    cysteines: Vec<CysteineSite>,
    libraries: HashMap<LibraryKind, Vec<LibraryEntry>>,
    pubchem: Vec<CompoundHit>,
    dock_calls: AtomicUsize,
    requests: Mutex<Vec<DockingRequest>>,
}

impl MockComputationService {
    pub fn new() -> Self {
        Self {
            replies: HashMap::new(),
            delays: HashMap::new(),
            invalid: HashSet::new(),
            cysteines: Vec::new(),
            libraries: HashMap::new(),
            pubchem: Vec::new(),
            dock_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Dock `smiles` successfully with a single pose of the given affinity.
    pub fn with_affinity(self, smiles: &str, affinity: f64) -> Self {
        let response = DockingResponse {
            poses: vec![PoseRecord {
                mode: Some(1),
                affinity,
                rmsd_lb: Some(0.0),
                rmsd_ub: Some(0.0),
                pdbqt_url: Some(format!("/uploads/docking/{}_pose1.pdbqt", self.replies.len())),
                ..PoseRecord::default()
            }],
            best_affinity: Some(affinity),
            status: Some("success".to_string()),
            ..DockingResponse::default()
        };
        self.with_reply(smiles, MockReply::Docked(response))
    }

    pub fn with_reply(mut self, smiles: &str, reply: MockReply) -> Self {
        self.replies.insert(smiles.to_string(), reply);
        self
    }

    /// Hold the answer for `smiles` back by `delay`.
    pub fn with_delay(mut self, smiles: &str, delay: Duration) -> Self {
        self.delays.insert(smiles.to_string(), delay);
        self
    }

    /// Molecule processing reports an error for `smiles`.
    pub fn with_invalid_smiles(mut self, smiles: &str) -> Self {
        self.invalid.insert(smiles.to_string());
        self
    }

    pub fn with_cysteines(mut self, cysteines: Vec<CysteineSite>) -> Self {
        self.cysteines = cysteines;
        self
    }

    pub fn with_library(mut self, kind: LibraryKind, entries: Vec<LibraryEntry>) -> Self {
        self.libraries.insert(kind, entries);
        self
    }

    pub fn with_pubchem_hits(mut self, hits: Vec<CompoundHit>) -> Self {
        self.pubchem = hits;
        self
    }

    pub fn dock_calls(&self) -> usize {
        self.dock_calls.load(Ordering::SeqCst)
    }

    pub fn dock_requests(&self) -> Vec<DockingRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn record(&self, smiles: &str, name: Option<&str>) -> MoleculeRecord {
        if self.invalid.contains(smiles) {
            return MoleculeRecord {
                name: name.map(str::to_string),
                smiles: smiles.to_string(),
                pdb_url: None,
                pdbqt_url: None,
                error: Some("Invalid SMILES string".to_string()),
            };
        }
        let stem = name.unwrap_or("ligand").replace(' ', "_");
        MoleculeRecord {
            name: name.map(str::to_string),
            smiles: smiles.to_string(),
            pdb_url: Some(format!("/uploads/molecules/{}.pdb", stem)),
            pdbqt_url: Some(format!("/uploads/molecules/{}.pdbqt", stem)),
            error: None,
        }
    }
}

impl Default for MockComputationService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ComputationService for MockComputationService {
    async fn prepare_protein(&self, file_name: &str, _contents: Vec<u8>) -> Result<PreparedProtein> {
        let stem = file_name.trim_end_matches(".pdb");
        Ok(PreparedProtein {
            id: None,
            cleaned_structure_url: format!("/uploads/prepared/{}_cleaned.pdb", stem),
            filesystem_path: Some(format!("/srv/uploads/prepared/{}_cleaned.pdb", stem)),
            cysteines: self.cysteines.clone(),
            chain_groups: Default::default(),
            potential_disulfide_bonds: Vec::new(),
        })
    }

    async fn process_smiles(&self, smiles: &str, name: Option<&str>) -> Result<Vec<MoleculeRecord>> {
        Ok(vec![self.record(smiles, name)])
    }

    async fn batch_process_smiles(
        &self,
        smiles_list: &[String],
        names: Option<&[String]>,
    ) -> Result<Vec<MoleculeRecord>> {
        Ok(smiles_list
            .iter()
            .enumerate()
            .map(|(i, s)| self.record(s, names.and_then(|n| n.get(i)).map(String::as_str)))
            .collect())
    }

    async fn process_sdf(&self, file_name: &str, _contents: Vec<u8>) -> Result<Vec<MoleculeRecord>> {
        Ok(vec![self.record("C1=CC=CC=C1", Some(file_name.trim_end_matches(".sdf")))])
    }

    async fn dock(&self, request: &DockingRequest) -> Result<DockingResponse> {
        self.dock_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if let Some(delay) = self.delays.get(&request.smiles) {
            tokio::time::sleep(*delay).await;
        }

        match self.replies.get(&request.smiles) {
            Some(MockReply::Docked(response)) => Ok(response.clone()),
            Some(MockReply::Status(code, body)) => Err(classify_failure(Some(*code), body)),
            Some(MockReply::Embedded(message)) => {
                let body = serde_json::json!({ "status": "error", "message": message }).to_string();
                Err(classify_failure(None, &body))
            }
            Some(MockReply::Transport(message)) => Err(DockflowError::RemoteRequest {
                status: None,
                message: message.clone(),
            }),
            None => Err(DockflowError::RemoteRequest {
                status: Some(404),
                message: format!("no scripted reply for {}", request.smiles),
            }),
        }
    }

    async fn generate_report(&self, request: &ReportRequest) -> Result<ReportReceipt> {
        Ok(ReportReceipt {
            report_url: format!(
                "/uploads/reports/{}.pdf",
                request.molecule_info.name.replace(' ', "_")
            ),
            cid: Some("bafkreimockcid".to_string()),
            signature: None,
        })
    }

    async fn library(&self, kind: LibraryKind) -> Result<Vec<LibraryEntry>> {
        Ok(self.libraries.get(&kind).cloned().unwrap_or_default())
    }

    async fn process_test_set(&self) -> Result<Vec<MoleculeRecord>> {
        Ok(self
            .libraries
            .get(&LibraryKind::TestSet)
            .map(|entries| entries.iter().map(|e| self.record(&e.smiles, Some(e.name.as_str()))).collect())
            .unwrap_or_default())
    }

    async fn search_pubchem(&self) -> Result<Vec<CompoundHit>> {
        Ok(self.pubchem.clone())
    }
}
