use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What kind of rejection the computation service reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainErrorKind {
    /// The structure notation (SMILES/SMARTS) could not be parsed.
    InvalidStructure,
    /// Any other input the service refused to process.
    Rejected,
}

#[derive(Debug, Error)]
pub enum DockflowError {
    /// A stage ran without the data a previous stage should have produced.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Transport failure or a non-success status without a recognisable
    /// domain signature.
    #[error("Remote request failed: {message}")]
    RemoteRequest {
        status: Option<u16>,
        message: String,
    },

    #[error("Remote service rejected input ({kind:?}): {message}")]
    RemoteDomain {
        kind: DomainErrorKind,
        message: String,
    },

    #[error("Structure load failed: {0}")]
    VisualizationLoad(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Security error: {0}")]
    Security(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DockflowError {
    /// True for failures that belong to a single item and must never abort
    /// a batch.
    pub fn is_per_item(&self) -> bool {
        matches!(
            self,
            DockflowError::RemoteRequest { .. }
                | DockflowError::RemoteDomain { .. }
                | DockflowError::Http(_)
                | DockflowError::Serialization(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DockflowError>;
