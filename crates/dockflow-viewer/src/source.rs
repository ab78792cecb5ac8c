//! Normalisation of structure references.

use tracing::warn;
use url::Url;

use dockflow_common::{DockflowError, Result};

/// Reference value the service uses for "no file".
pub const NO_FILE_SENTINEL: &str = "#";

/// Where a structure comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructureSource {
    Remote(Url),
    /// Coordinates delivered with the docking response.
    Inline(String),
    Absent,
}

impl StructureSource {
    pub fn is_absent(&self) -> bool {
        matches!(self, StructureSource::Absent)
    }
}

/// Turns service references into fetchable sources. Relative paths such
/// as `/uploads/prepared/x.pdb` are served from the backend's origin.
#[derive(Debug, Clone)]
pub struct SourceResolver {
    origin: Url,
}

impl SourceResolver {
    pub fn new(backend_url: &str) -> Result<Self> {
        let parsed = Url::parse(backend_url)
            .map_err(|e| DockflowError::Config(format!("Invalid backend URL {}: {}", backend_url, e)))?;
        let origin = parsed
            .join("/")
            .map_err(|e| DockflowError::Config(format!("Backend URL has no origin {}: {}", backend_url, e)))?;
        Ok(Self { origin })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn resolve(&self, reference: Option<&str>) -> StructureSource {
        let reference = match reference.map(str::trim) {
            None | Some("") | Some(NO_FILE_SENTINEL) => return StructureSource::Absent,
            Some(r) => r,
        };

        if reference.starts_with("http://") || reference.starts_with("https://") {
            return match Url::parse(reference) {
                Ok(url) => StructureSource::Remote(url),
                Err(e) => {
                    warn!(reference, "Unparseable structure URL: {}", e);
                    StructureSource::Absent
                }
            };
        }

        match self.origin.join(reference) {
            Ok(url) => StructureSource::Remote(url),
            Err(e) => {
                warn!(reference, "Cannot resolve structure path: {}", e);
                StructureSource::Absent
            }
        }
    }

    pub fn resolve_inline(coordinates: Option<&str>) -> StructureSource {
        match coordinates {
            Some(c) if !c.trim().is_empty() => StructureSource::Inline(c.to_string()),
            _ => StructureSource::Absent,
        }
    }

    /// Ligand sources in the order they should be tried: the pose file,
    /// then inline coordinates. Absent entries are left out.
    pub fn ligand_candidates(&self, reference: Option<&str>, inline: Option<&str>) -> Vec<StructureSource> {
        [self.resolve(reference), Self::resolve_inline(inline)]
            .into_iter()
            .filter(|s| !s.is_absent())
            .collect()
    }
}
