//! dockflow-common: shared errors, the allowlisted HTTP client and
//! generation tickets used across all dockflow crates.

pub mod error;
pub mod generation;
pub mod sandbox;

// Re-export commonly used types
pub use error::{DockflowError, DomainErrorKind, Result};
pub use generation::{Generation, GenerationTicket};
pub use sandbox::SandboxClient;
