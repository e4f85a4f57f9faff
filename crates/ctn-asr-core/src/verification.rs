//! Identifier verification against external registries.
//!
//! The KvK Handelsregister, the GLEIF LEI database, and the Peppol
//! directory are collaborators behind the [`RegistryClient`] trait; the
//! only contract the core relies on is "an async lookup that may fail".
//! Every client is paired with its circuit breaker in a
//! [`GuardedRegistryClient`] so that a failing upstream degrades into
//! fast-fail responses instead of piling up slow requests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::circuit_breaker::{
    CircuitBreaker, CircuitBreakerError, CircuitBreakerRegistry, WindowedCircuitBreaker,
};
use crate::Timestamp;

/// Registry name for the Dutch Chamber of Commerce.
pub const KVK_REGISTRY: &str = "kvk";

/// Registry name for the GLEIF LEI database.
pub const GLEIF_REGISTRY: &str = "gleif";

/// Registry name for the Peppol directory.
pub const PEPPOL_REGISTRY: &str = "peppol";

/// Breaker type shared by all registry lookups.
pub type VerificationBreaker = WindowedCircuitBreaker<VerificationOutcome, LookupError>;

/// Breaker registry type owned by the composition root.
pub type VerificationBreakerRegistry = CircuitBreakerRegistry<VerificationOutcome, LookupError>;

/// Error type returned by guarded verification calls.
pub type VerificationError = CircuitBreakerError<LookupError>;

// ============================================================================
// Lookup Errors
// ============================================================================

/// Errors from a single registry lookup.
#[derive(Debug, Clone, Error)]
pub enum LookupError {
    /// The registry answered definitively: no such identifier.
    ///
    /// This is a successful lookup with a negative answer, not an upstream
    /// failure; it must never count against the circuit breaker.
    #[error("identifier '{identifier}' not found in {registry}")]
    NotFound {
        registry: String,
        identifier: String,
    },

    /// The registry returned a non-success status.
    #[error("{registry} returned status {status}")]
    UpstreamStatus { registry: String, status: u16 },

    /// The request never produced a response (DNS, connect, timeout).
    #[error("{registry} request failed: {message}")]
    Network { registry: String, message: String },

    /// The registry responded with a body the client could not interpret.
    #[error("{registry} returned an unparseable response: {message}")]
    InvalidResponse { registry: String, message: String },
}

impl LookupError {
    /// Check whether this is a definitive not-found answer.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

// ============================================================================
// Registry Client Trait
// ============================================================================

/// One external registry, reduced to its lookup operation.
///
/// Implementations must not retry internally and must not swallow
/// failures; the circuit breaker wrapped around every client needs to see
/// the true failure frequency.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Registry name, matching the breaker registered for it.
    fn registry(&self) -> &str;

    /// Look up an identifier, returning the registry's record for it.
    async fn lookup(&self, identifier: &str) -> Result<Value, LookupError>;
}

// ============================================================================
// Verification Outcome
// ============================================================================

/// Result of verifying one identifier against one registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    /// Registry the identifier was checked against
    pub registry: String,

    /// The identifier as presented
    pub identifier: String,

    /// Whether the registry knows the identifier
    pub verified: bool,

    /// The registry's record, when the identifier was found
    pub payload: Option<Value>,

    /// When the check completed
    pub checked_at: Timestamp,
}

impl VerificationOutcome {
    /// Outcome for an identifier the registry knows.
    pub fn registered(registry: &str, identifier: &str, payload: Value) -> Self {
        Self {
            registry: registry.to_string(),
            identifier: identifier.to_string(),
            verified: true,
            payload: Some(payload),
            checked_at: Timestamp::now(),
        }
    }

    /// Outcome for an identifier the registry definitively does not know.
    pub fn not_registered(registry: &str, identifier: &str) -> Self {
        Self {
            registry: registry.to_string(),
            identifier: identifier.to_string(),
            verified: false,
            payload: None,
            checked_at: Timestamp::now(),
        }
    }
}

// ============================================================================
// Guarded Registry Client
// ============================================================================

/// A registry client paired with its circuit breaker.
///
/// All verification traffic for one upstream flows through one instance,
/// so the breaker observes every failure. A definitive not-found answer
/// maps to an unverified outcome on the success path and therefore does
/// not count against the breaker.
pub struct GuardedRegistryClient {
    client: Arc<dyn RegistryClient>,
    breaker: Arc<VerificationBreaker>,
}

impl GuardedRegistryClient {
    /// Pair a client with the breaker guarding its upstream.
    pub fn new(client: Arc<dyn RegistryClient>, breaker: Arc<VerificationBreaker>) -> Self {
        Self { client, breaker }
    }

    /// Name of the registry this client verifies against.
    pub fn registry(&self) -> &str {
        self.client.registry()
    }

    /// The breaker guarding this upstream.
    pub fn breaker(&self) -> &Arc<VerificationBreaker> {
        &self.breaker
    }

    /// Verify an identifier through the circuit breaker.
    ///
    /// # Errors
    ///
    /// - [`CircuitBreakerError::CircuitOpen`] /
    ///   [`CircuitBreakerError::HalfOpenLimitExceeded`] when admission is
    ///   denied; the upstream was not contacted.
    /// - [`CircuitBreakerError::OperationFailed`] carrying the original
    ///   [`LookupError`] when the lookup itself failed.
    pub async fn verify(
        &self,
        identifier: &str,
    ) -> Result<VerificationOutcome, VerificationError> {
        let client = Arc::clone(&self.client);
        let identifier = identifier.to_string();

        self.breaker
            .execute(|| async move {
                match client.lookup(&identifier).await {
                    Ok(payload) => Ok(VerificationOutcome::registered(
                        client.registry(),
                        &identifier,
                        payload,
                    )),
                    Err(error) if error.is_not_found() => Ok(VerificationOutcome::not_registered(
                        client.registry(),
                        &identifier,
                    )),
                    Err(error) => Err(error),
                }
            })
            .await
    }
}

// ============================================================================
// Verification Service
// ============================================================================

/// The set of guarded registry clients, keyed by registry name.
///
/// Owned by the composition root and injected into the HTTP layer.
#[derive(Default)]
pub struct VerificationService {
    clients: HashMap<String, GuardedRegistryClient>,
}

impl VerificationService {
    /// Create an empty service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a guarded client under its registry name.
    pub fn register(&mut self, client: GuardedRegistryClient) {
        self.clients.insert(client.registry().to_string(), client);
    }

    /// Builder-style variant of [`Self::register`].
    pub fn with_client(mut self, client: GuardedRegistryClient) -> Self {
        self.register(client);
        self
    }

    /// Look up the guarded client for a registry.
    pub fn client(&self, registry: &str) -> Option<&GuardedRegistryClient> {
        self.clients.get(registry)
    }

    /// Registered registry names, sorted for stable output.
    pub fn registries(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clients.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
#[path = "verification_tests.rs"]
mod tests;
