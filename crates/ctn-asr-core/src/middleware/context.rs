//! Request, response, and per-request context types for the pipeline.
//!
//! These types are transport-agnostic: the HTTP layer converts its native
//! request into an [`ApiRequest`] before invoking a pipeline and converts
//! the returned [`ApiResponse`] back. Headers are plain maps keyed by
//! lower-cased name with `Option`-returning lookups, so no stage ever
//! needs a defensive wrapper around header access.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{RequestId, Timestamp};

// ============================================================================
// Request
// ============================================================================

/// Inbound request as seen by the pipeline.
///
/// Immutable from the pipeline's perspective; stages communicate through
/// [`RequestContext`] instead of mutating the request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// Upper-cased HTTP method
    pub method: String,

    /// Request path (no query string)
    pub path: String,

    /// Route path parameters, filled by the transport adapter
    path_params: HashMap<String, String>,

    /// Headers keyed by lower-cased name
    headers: HashMap<String, String>,

    /// Raw request body
    pub body: Bytes,
}

impl ApiRequest {
    /// Create a request with no headers, parameters, or body.
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into().to_uppercase(),
            path: path.into(),
            path_params: HashMap::new(),
            headers: HashMap::new(),
            body: Bytes::new(),
        }
    }

    /// Add a header (name lower-cased); builder style for adapters and tests.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_lowercase(), value.into());
        self
    }

    /// Add a route path parameter; builder style for adapters and tests.
    pub fn with_path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.insert(name.into(), value.into());
        self
    }

    /// Attach a body; builder style for adapters and tests.
    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    /// Look up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Look up a route path parameter.
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    /// Extract the bearer token from the `authorization` header, if any.
    ///
    /// The scheme comparison is case-insensitive; surrounding whitespace on
    /// the token is trimmed.
    pub fn bearer_token(&self) -> Option<&str> {
        let value = self.header("authorization")?;
        let (scheme, token) = value.split_once(' ')?;
        if scheme.eq_ignore_ascii_case("bearer") {
            let token = token.trim();
            (!token.is_empty()).then_some(token)
        } else {
            None
        }
    }
}

// ============================================================================
// Response
// ============================================================================

/// Response produced by a stage or terminal handler.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status code
    pub status: u16,

    /// Headers keyed by lower-cased name
    headers: HashMap<String, String>,

    /// JSON response body
    pub body: Value,
}

impl ApiResponse {
    /// Create a JSON response with the given status.
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body,
        }
    }

    /// Create a 200 response with the given body.
    pub fn ok(body: Value) -> Self {
        Self::json(200, body)
    }

    /// Create an error response with a machine-readable code.
    pub fn error(status: u16, code: &str) -> Self {
        Self::json(status, serde_json::json!({ "error": code }))
    }

    /// Create an error response with a code and a human-readable message.
    pub fn error_with_message(status: u16, code: &str, message: impl Into<String>) -> Self {
        Self::json(
            status,
            serde_json::json!({ "error": code, "message": message.into() }),
        )
    }

    /// The fixed-shape 500 response emitted when a stage or handler fails.
    ///
    /// Carries only the request ID for correlation; internal error details
    /// stay in the server-side log.
    pub fn internal_error(request_id: RequestId) -> Self {
        Self::json(
            500,
            serde_json::json!({
                "error": "internal_error",
                "request_id": request_id.as_str(),
            }),
        )
    }

    /// Set a header (name lower-cased), replacing any existing value.
    pub fn set_header(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.headers
            .insert(name.as_ref().to_lowercase(), value.into());
    }

    /// Builder-style variant of [`Self::set_header`].
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    /// Look up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    /// All headers, for the transport adapter.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Check for a 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// ============================================================================
// Authenticated Request
// ============================================================================

/// Identity attached to the context by an authentication stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedRequest {
    /// Stable subject identifier from the verified token
    pub subject: String,

    /// Roles granted to the subject
    pub roles: Vec<String>,

    /// When authentication completed
    pub authenticated_at: Timestamp,
}

impl AuthenticatedRequest {
    /// Create a new authenticated identity.
    pub fn new(subject: impl Into<String>, roles: Vec<String>) -> Self {
        Self {
            subject: subject.into(),
            roles,
            authenticated_at: Timestamp::now(),
        }
    }

    /// Check whether the subject carries the given role.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

// ============================================================================
// Request Context
// ============================================================================

/// Mutable per-request state threaded through every stage.
///
/// Created once per inbound request by the pipeline and discarded after
/// the response is sent; never shared across requests, so no locking is
/// required. Mutations by an earlier stage are visible to all later
/// stages and to the terminal handler.
#[derive(Debug)]
pub struct RequestContext {
    /// The inbound request
    pub request: ApiRequest,

    /// Unique identifier generated at pipeline entry
    pub request_id: RequestId,

    /// Wall-clock time the pipeline was entered
    pub start_time: Timestamp,

    /// Monotonic start instant for duration measurement
    started: std::time::Instant,

    /// Populated by an authentication stage; absent until then.
    ///
    /// Stages that require authentication must fail closed (401) when this
    /// is `None` rather than assume it is present.
    pub authenticated: Option<AuthenticatedRequest>,

    /// Set by authentication, attached to the response by the composer
    pub csrf_token_to_set: Option<String>,

    /// Open mapping for inter-stage data passing
    pub metadata: HashMap<String, Value>,
}

impl RequestContext {
    /// Create a fresh context for one inbound request.
    pub fn new(request: ApiRequest) -> Self {
        Self {
            request,
            request_id: RequestId::new(),
            start_time: Timestamp::now(),
            started: std::time::Instant::now(),
            authenticated: None,
            csrf_token_to_set: None,
            metadata: HashMap::new(),
        }
    }

    /// Elapsed time since pipeline entry.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Store a metadata value for later stages.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    /// Read a metadata value stored by an earlier stage.
    pub fn get_metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
