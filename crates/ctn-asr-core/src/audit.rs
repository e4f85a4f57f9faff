//! Audit trail events and sinks.
//!
//! Every privileged or externally visible action produces an
//! [`AuditEvent`] carrying who did what to which resource with what
//! outcome, correlated to the originating request. Events flow through an
//! injected [`AuditSink`]; the default sink writes structured log lines,
//! and tests capture events in memory.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::Ulid;

use crate::{RequestId, Timestamp};

// ============================================================================
// Core Types
// ============================================================================

/// Unique identifier for an audit entry
///
/// Uses ULID so entries sort lexicographically by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditEventId(Ulid);

impl AuditEventId {
    /// Generate a new unique audit event ID
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Get string representation
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for AuditEventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AuditEventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Actor who initiated an auditable action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditActor {
    /// Internal system activity (startup, scheduled maintenance)
    System,

    /// Unauthenticated caller
    Anonymous,

    /// Authenticated member-portal user
    Member { subject: String },

    /// Authenticated admin-portal user
    Admin { subject: String },
}

/// Result of the audited action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// The action completed
    Success,
    /// The action was rejected by authentication or authorization
    Denied,
    /// The action failed
    Failure,
}

/// Immutable audit event record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique identifier for this audit entry
    pub audit_id: AuditEventId,

    /// When the auditable event occurred
    pub occurred_at: Timestamp,

    /// Actor who initiated the action
    pub actor: AuditActor,

    /// Action label, e.g. `verify_lei` or `reset_breaker`
    pub action: String,

    /// Resource the action touched, typically the request path
    pub resource: String,

    /// Result of the action
    pub outcome: AuditOutcome,

    /// Originating request, when the action came over HTTP
    pub request_id: Option<RequestId>,

    /// Additional structured context
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AuditEvent {
    /// Create a new audit event stamped with the current time.
    pub fn new(
        actor: AuditActor,
        action: impl Into<String>,
        resource: impl Into<String>,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            audit_id: AuditEventId::new(),
            occurred_at: Timestamp::now(),
            actor,
            action: action.into(),
            resource: resource.into(),
            outcome,
            request_id: None,
            metadata: HashMap::new(),
        }
    }

    /// Attach the originating request ID.
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Attach a metadata value.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

// ============================================================================
// Audit Sink
// ============================================================================

/// Errors from recording audit events.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The sink's backing store could not accept the event.
    #[error("audit sink unavailable: {message}")]
    SinkUnavailable { message: String },
}

/// Destination for audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Record one audit event.
    async fn record(&self, event: AuditEvent) -> Result<(), AuditError>;
}

/// Sink that emits each event as a structured log line.
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        tracing::info!(
            target: "audit",
            audit_id = %event.audit_id,
            actor = ?event.actor,
            action = %event.action,
            resource = %event.resource,
            outcome = ?event.outcome,
            request_id = ?event.request_id,
            "audit event"
        );
        Ok(())
    }
}

/// Sink that keeps events in memory, for tests and local development.
#[derive(Default)]
pub struct InMemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl InMemoryAuditSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every recorded event, in recording order.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        Ok(())
    }
}

#[cfg(test)]
#[path = "audit_tests.rs"]
mod tests;
