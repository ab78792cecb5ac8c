use reqwest::{Client, ClientBuilder};
use std::collections::HashSet;
use std::time::Duration;
use tracing::warn;
use url::Url;
use crate::error::DockflowError;

/// An HTTP client that only talks to approved hosts: the computation
/// service it was built for, plus loopback.
#[derive(Debug, Clone)]
pub struct SandboxClient {
    client: Client,
    allowlist: HashSet<String>,
}

impl SandboxClient {
    /// Creates a client whose allowlist only contains loopback hosts.
    pub fn new(timeout: Duration) -> Result<Self, DockflowError> {
        let mut allowlist = HashSet::new();
        for d in ["localhost", "127.0.0.1"] {
            allowlist.insert(d.to_string());
        }

        let client = ClientBuilder::new()
            .timeout(timeout)
            .build()
            .map_err(|e| DockflowError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, allowlist })
    }

    /// Creates a client allowed to reach the host of `base_url` and any
    /// extra hosts given.
    pub fn for_service(
        base_url: &str,
        timeout: Duration,
        extra_hosts: &[String],
    ) -> Result<Self, DockflowError> {
        let parsed = Url::parse(base_url)
            .map_err(|e| DockflowError::Config(format!("Invalid service URL {}: {}", base_url, e)))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| DockflowError::Config(format!("Service URL has no host: {}", base_url)))?
            .to_string();

        let mut sandbox = Self::new(timeout)?;
        sandbox.allow_domain(&host);
        for extra in extra_hosts {
            sandbox.allow_domain(extra);
        }
        Ok(sandbox)
    }

    /// Appends an exact hostname to the allowlist.
    pub fn allow_domain(&mut self, domain: &str) {
        self.allowlist.insert(domain.to_string());
    }

    /// Validates if a URL is permitted under the current sandbox policy.
    pub fn is_allowed(&self, url: &str) -> bool {
        if let Ok(parsed) = Url::parse(url) {
            if let Some(host) = parsed.host_str() {
                for allowed in &self.allowlist {
                    if host == allowed || host.ends_with(&format!(".{}", allowed)) {
                        return true;
                    }
                }
            }
        }
        false
    }

    fn check(&self, url: &str) -> Result<(), DockflowError> {
        if self.is_allowed(url) {
            Ok(())
        } else {
            warn!("Blocked request outside the allowlist: {}", url);
            Err(DockflowError::Security(format!(
                "Host not in allowlist for URL {}",
                url
            )))
        }
    }

    pub fn get(&self, url: &str) -> Result<reqwest::RequestBuilder, DockflowError> {
        self.check(url)?;
        Ok(self.client.get(url))
    }

    pub fn post(&self, url: &str) -> Result<reqwest::RequestBuilder, DockflowError> {
        self.check(url)?;
        Ok(self.client.post(url))
    }
}
