//! Common test utilities for ctn-asr-api integration tests
//!
//! This module provides:
//! - Scriptable mock implementations of RegistryClient and TokenVerifier
//! - Helpers for building a fully wired AppState
//! - Request and body helpers for driving the router with tower::oneshot

// Each integration test binary compiles its own copy of this module and
// uses a different subset of the helpers.
#![allow(dead_code)]

use axum::body::Body;
use axum::http::Request;
use ctn_asr_api::{AppState, ServiceConfig, ServiceMetrics};
use ctn_asr_core::audit::InMemoryAuditSink;
use ctn_asr_core::circuit_breaker::CircuitBreakerConfig;
use ctn_asr_core::middleware::{AuthError, AuthenticatedRequest, TokenVerifier};
use ctn_asr_core::verification::{
    GuardedRegistryClient, LookupError, RegistryClient, VerificationBreakerRegistry,
    VerificationService, GLEIF_REGISTRY, KVK_REGISTRY, PEPPOL_REGISTRY,
};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Admin token accepted by the test verifier.
pub const ADMIN_TOKEN: &str = "integration-admin-token";

// ============================================================================
// Mock Registry Client
// ============================================================================

/// Registry client replaying a scripted sequence of lookup results.
///
/// Additional results can be pushed while the router is live, so tests
/// can script recovery after a breaker trips.
pub struct ScriptedClient {
    registry: String,
    responses: Arc<Mutex<VecDeque<Result<Value, LookupError>>>>,
}

impl ScriptedClient {
    pub fn new(registry: &str) -> Self {
        Self {
            registry: registry.to_string(),
            responses: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Handle for pushing results after the client is registered.
    pub fn script(&self) -> ScriptHandle {
        ScriptHandle {
            registry: self.registry.clone(),
            responses: Arc::clone(&self.responses),
        }
    }
}

/// Push-side handle for a [`ScriptedClient`].
#[derive(Clone)]
pub struct ScriptHandle {
    registry: String,
    responses: Arc<Mutex<VecDeque<Result<Value, LookupError>>>>,
}

impl ScriptHandle {
    pub fn push_ok(&self, payload: Value) {
        self.responses.lock().unwrap().push_back(Ok(payload));
    }

    pub fn push_upstream_failure(&self) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(LookupError::UpstreamStatus {
                registry: self.registry.clone(),
                status: 502,
            }));
    }

    pub fn push_not_found(&self, identifier: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(LookupError::NotFound {
                registry: self.registry.clone(),
                identifier: identifier.to_string(),
            }));
    }
}

#[async_trait::async_trait]
impl RegistryClient for ScriptedClient {
    fn registry(&self) -> &str {
        &self.registry
    }

    async fn lookup(&self, identifier: &str) -> Result<Value, LookupError> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(LookupError::Network {
                    registry: self.registry.clone(),
                    message: format!("script exhausted for {identifier}"),
                })
            })
    }
}

// ============================================================================
// Mock Token Verifier
// ============================================================================

/// Token verifier accepting exactly [`ADMIN_TOKEN`].
pub struct TestAdminVerifier;

#[async_trait::async_trait]
impl TokenVerifier for TestAdminVerifier {
    async fn verify(&self, token: &str) -> Result<AuthenticatedRequest, AuthError> {
        if token == ADMIN_TOKEN {
            Ok(AuthenticatedRequest::new(
                "admin@ctn.nl",
                vec!["admin".to_string()],
            ))
        } else {
            Err(AuthError::InvalidToken)
        }
    }
}

// ============================================================================
// App State Builder
// ============================================================================

/// Everything a test needs to drive and observe the wired application.
pub struct TestApp {
    pub state: AppState,
    pub audit: Arc<InMemoryAuditSink>,
    pub kvk: ScriptHandle,
    pub gleif: ScriptHandle,
    pub peppol: ScriptHandle,
}

/// Build a fully wired AppState with scriptable clients.
///
/// Breakers trip after 2 failures and cool down after `open_duration_ms`
/// so tests can exercise the full open-probe-recover cycle quickly.
pub fn create_test_app_state(open_duration_ms: u64) -> TestApp {
    let breakers = Arc::new(VerificationBreakerRegistry::new());
    let mut verification = VerificationService::new();
    let mut handles = Vec::new();

    for registry in [KVK_REGISTRY, GLEIF_REGISTRY, PEPPOL_REGISTRY] {
        let breaker = breakers.register(CircuitBreakerConfig {
            name: registry.to_string(),
            error_threshold: 2,
            open_duration_ms,
            half_open_max_requests: 2,
            monitor_window_ms: 60_000,
        });

        let client = ScriptedClient::new(registry);
        handles.push(client.script());
        verification.register(GuardedRegistryClient::new(Arc::new(client), breaker));
    }

    let audit = Arc::new(InMemoryAuditSink::new());
    let state = AppState::new(
        ServiceConfig::default(),
        Arc::new(verification),
        breakers,
        Arc::new(TestAdminVerifier),
        audit.clone(),
        ServiceMetrics::new().expect("metrics registry"),
    );

    let mut handles = handles.into_iter();
    TestApp {
        state,
        audit,
        kvk: handles.next().unwrap(),
        gleif: handles.next().unwrap(),
        peppol: handles.next().unwrap(),
    }
}

// ============================================================================
// Request Helpers
// ============================================================================

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn admin_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {ADMIN_TOKEN}"))
        .body(Body::empty())
        .unwrap()
}

pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}
