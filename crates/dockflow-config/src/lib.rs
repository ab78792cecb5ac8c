//! Configuration loading for dockflow.
//! Reads dockflow.toml from the current directory or path in DOCKFLOW_CONFIG env var.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub docking: DockingDefaults,
    #[serde(default)]
    pub viewer: ViewerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the remote computation service lives and how to talk to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Docking a single ligand can take minutes.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub allowed_hosts: Vec<String>,
}

fn default_base_url()     -> String { "http://localhost:8000/api".to_string() }
fn default_timeout_secs() -> u64    { 300 }

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            allowed_hosts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockingDefaults {
    #[serde(default = "default_algorithm")]
    pub default_algorithm: String,
    #[serde(default = "default_progress_capacity")]
    pub progress_capacity: usize,
}

fn default_algorithm()         -> String { "autodock".to_string() }
fn default_progress_capacity() -> usize  { 256 }

impl Default for DockingDefaults {
    fn default() -> Self {
        Self {
            default_algorithm: default_algorithm(),
            progress_capacity: default_progress_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerConfig {
    #[serde(default = "default_site_radius")]
    pub binding_site_radius: f64,
    #[serde(default = "default_surface_opacity")]
    pub surface_opacity: f64,
    #[serde(default)]
    pub show_surface: bool,
    #[serde(default = "bool_true")]
    pub show_binding_site: bool,
    #[serde(default = "bool_true")]
    pub show_ligand: bool,
}

fn default_site_radius()     -> f64  { 3.0 }
fn default_surface_opacity() -> f64  { 0.7 }
fn bool_true()               -> bool { true }

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            binding_site_radius: default_site_radius(),
            surface_opacity: default_surface_opacity(),
            show_surface: false,
            show_binding_site: true,
            show_ligand: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_filter() -> String { "dockflow=debug,info".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { filter: default_filter() }
    }
}


impl Config {
    /// Load configuration from dockflow.toml.
    /// Checks DOCKFLOW_CONFIG env var first, then current directory.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("DOCKFLOW_CONFIG")
            .unwrap_or_else(|_| "dockflow.toml".to_string());
        Self::load_from(&path)
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!(
                "Config file not found: {}\n\
                 Create dockflow.toml or point DOCKFLOW_CONFIG at one.",
                path.display()
            );
        }

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        if config.service.timeout_secs == 0 {
            anyhow::bail!("service.timeout_secs must be greater than zero");
        }
        Ok(config)
    }
}
