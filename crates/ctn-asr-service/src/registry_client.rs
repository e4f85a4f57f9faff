//! HTTP registry clients for the service binary.
//!
//! One thin reqwest-backed [`RegistryClient`] serves all three upstreams;
//! the per-registry differences (base URL, timeout) come from
//! configuration. The client performs exactly one request per lookup: no
//! internal retries, because the circuit breaker wrapped around it needs
//! to see the true failure frequency, and no timeout beyond the reqwest
//! client timeout configured at construction.

use async_trait::async_trait;
use ctn_asr_core::verification::{LookupError, RegistryClient};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

/// Registry client performing a GET against `{base_url}/{identifier}`.
pub struct HttpRegistryClient {
    registry: String,
    base_url: String,
    http: reqwest::Client,
}

impl HttpRegistryClient {
    /// Construct a client for one registry.
    ///
    /// # Arguments
    ///
    /// * `registry` - Canonical registry name (matches the breaker name)
    /// * `base_url` - Lookup endpoint base; a trailing slash is tolerated
    /// * `timeout` - Per-request timeout on the underlying HTTP client.
    ///   This is the only timeout bounding a lookup.
    pub fn new(
        registry: &str,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ctn-asr/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            registry: registry.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn lookup_url(&self, identifier: &str) -> String {
        format!("{}/{}", self.base_url, identifier)
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    fn registry(&self) -> &str {
        &self.registry
    }

    /// Perform one lookup request.
    ///
    /// Status mapping:
    /// - 2xx with a JSON body: the registry's record
    /// - 404: definitive not-found ([`LookupError::NotFound`])
    /// - any other status: [`LookupError::UpstreamStatus`]
    /// - transport failure: [`LookupError::Network`]
    /// - 2xx with an unparseable body: [`LookupError::InvalidResponse`]
    #[instrument(skip(self), fields(registry = %self.registry))]
    async fn lookup(&self, identifier: &str) -> Result<Value, LookupError> {
        let url = self.lookup_url(identifier);
        debug!(url = %url, "registry lookup");

        let response = self
            .http
            .get(&url)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| LookupError::Network {
                registry: self.registry.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(LookupError::NotFound {
                registry: self.registry.clone(),
                identifier: identifier.to_string(),
            });
        }

        if !status.is_success() {
            return Err(LookupError::UpstreamStatus {
                registry: self.registry.clone(),
                status: status.as_u16(),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| LookupError::InvalidResponse {
                registry: self.registry.clone(),
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
#[path = "registry_client_tests.rs"]
mod tests;
