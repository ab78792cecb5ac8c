//! Structure downloads.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use dockflow_common::{DockflowError, Result, SandboxClient};

/// Fetches structure files as text.
#[async_trait]
pub trait StructureFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<String>;
}

/// Fetches structures over HTTP, restricted to allowlisted hosts.
pub struct HttpStructureFetcher {
    client: SandboxClient,
}

impl HttpStructureFetcher {
    pub fn new(client: SandboxClient) -> Self {
        Self { client }
    }

    /// Client allowed to reach the backend host (plus `extra_hosts`).
    pub fn for_backend(backend_url: &str, timeout: Duration, extra_hosts: &[String]) -> Result<Self> {
        Ok(Self::new(SandboxClient::for_service(backend_url, timeout, extra_hosts)?))
    }
}

fn load_error(url: &Url, e: impl std::fmt::Display) -> DockflowError {
    DockflowError::VisualizationLoad(format!("{}: {}", url, e))
}

#[async_trait]
impl StructureFetcher for HttpStructureFetcher {
    async fn fetch(&self, url: &Url) -> Result<String> {
        info!(%url, "Fetching structure");
        let response = self
            .client
            .get(url.as_str())?
            .send()
            .await
            .map_err(|e| load_error(url, e))?
            .error_for_status()
            .map_err(|e| load_error(url, e))?;
        let body = response.text().await.map_err(|e| load_error(url, e))?;
        debug!(%url, bytes = body.len(), "Structure fetched");
        Ok(body)
    }
}

/// Serves structures from memory and counts requests per URL.
#[derive(Default)]
pub struct InMemoryFetcher {
    files: HashMap<String, String>,
    calls: Mutex<HashMap<String, usize>>,
}

impl InMemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, url: &str, contents: &str) -> Self {
        self.files.insert(url.to_string(), contents.to_string());
        self
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.calls
            .lock()
            .map(|c| c.get(url).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().map(|c| c.values().sum()).unwrap_or(0)
    }
}

#[async_trait]
impl StructureFetcher for InMemoryFetcher {
    async fn fetch(&self, url: &Url) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(url.to_string()).or_insert(0) += 1;
        }
        self.files
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| load_error(url, "404 Not Found"))
    }
}
