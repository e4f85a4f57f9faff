//! Built-in middleware stages.
//!
//! The stages every route chain is assembled from: request logging,
//! bearer-token authentication, fail-closed authorization, and audit
//! recording. Stage structs hold their collaborators as injected trait
//! objects so tests can swap in doubles.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{ApiResponse, AuthenticatedRequest, Middleware, Next, RequestContext, StageResult};
use crate::audit::{AuditActor, AuditEvent, AuditOutcome, AuditSink};

// ============================================================================
// Token Verification
// ============================================================================

/// Errors from bearer-token verification.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The token is malformed, unknown, or expired.
    #[error("token rejected")]
    InvalidToken,

    /// The verifier's backing store could not be reached.
    #[error("token verification unavailable: {message}")]
    Unavailable { message: String },
}

/// Verifies a bearer token and resolves it to an identity.
///
/// Token formats are an infrastructure concern; implementations live in
/// the service crate and are injected at composition time.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verify `token` and return the identity it proves.
    async fn verify(&self, token: &str) -> Result<AuthenticatedRequest, AuthError>;
}

// ============================================================================
// Request Logging Stage
// ============================================================================

/// Logs request start and completion with the request ID and duration.
///
/// The completion log level follows the response status: 5xx logs at
/// error, 4xx at warn, everything else at info. Because the completion
/// log runs in the post-phase it also observes short-circuit responses
/// produced by inner stages.
pub struct RequestLoggingStage;

#[async_trait]
impl Middleware for RequestLoggingStage {
    fn name(&self) -> &'static str {
        "request_logging"
    }

    async fn handle(&self, ctx: &mut RequestContext, next: Next<'_>) -> StageResult {
        info!(
            request_id = %ctx.request_id,
            method = %ctx.request.method,
            path = %ctx.request.path,
            "request started"
        );

        let result = next.run(ctx).await;
        let duration_ms = ctx.elapsed().as_millis() as u64;

        match &result {
            Ok(response) if response.status >= 500 => {
                tracing::error!(
                    request_id = %ctx.request_id,
                    method = %ctx.request.method,
                    path = %ctx.request.path,
                    status = response.status,
                    duration_ms,
                    "request completed with server error"
                );
            }
            Ok(response) if response.status >= 400 => {
                warn!(
                    request_id = %ctx.request_id,
                    method = %ctx.request.method,
                    path = %ctx.request.path,
                    status = response.status,
                    duration_ms,
                    "request completed with client error"
                );
            }
            Ok(response) => {
                info!(
                    request_id = %ctx.request_id,
                    method = %ctx.request.method,
                    path = %ctx.request.path,
                    status = response.status,
                    duration_ms,
                    "request completed"
                );
            }
            Err(error) => {
                tracing::error!(
                    request_id = %ctx.request_id,
                    method = %ctx.request.method,
                    path = %ctx.request.path,
                    duration_ms,
                    error = %error,
                    "request failed in pipeline"
                );
            }
        }

        result
    }
}

// ============================================================================
// Authentication Stage
// ============================================================================

/// Resolves the `authorization: Bearer` header to an identity.
///
/// On successful verification the stage populates `ctx.authenticated` and
/// mints a CSRF token for the composer to attach to the response. A
/// missing or rejected token is NOT an error and does not short-circuit:
/// the request continues unauthenticated and downstream stages decide
/// whether that matters.
pub struct AuthenticationStage {
    verifier: Arc<dyn TokenVerifier>,
}

impl AuthenticationStage {
    /// Create an authentication stage with the given verifier.
    pub fn new(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self { verifier }
    }
}

#[async_trait]
impl Middleware for AuthenticationStage {
    fn name(&self) -> &'static str {
        "authentication"
    }

    async fn handle(&self, ctx: &mut RequestContext, next: Next<'_>) -> StageResult {
        let token = ctx.request.bearer_token().map(str::to_owned);

        if let Some(token) = token {
            match self.verifier.verify(&token).await {
                Ok(identity) => {
                    debug!(
                        request_id = %ctx.request_id,
                        subject = %identity.subject,
                        "request authenticated"
                    );
                    ctx.authenticated = Some(identity);
                    ctx.csrf_token_to_set = Some(Uuid::new_v4().to_string());
                }
                Err(AuthError::InvalidToken) => {
                    debug!(
                        request_id = %ctx.request_id,
                        "bearer token rejected; continuing unauthenticated"
                    );
                }
                Err(AuthError::Unavailable { message }) => {
                    warn!(
                        request_id = %ctx.request_id,
                        message = %message,
                        "token verifier unavailable; continuing unauthenticated"
                    );
                }
            }
        }

        next.run(ctx).await
    }
}

// ============================================================================
// Authorization Stage
// ============================================================================

/// Fails closed when the request is not authenticated.
///
/// Returns 401 as an ordinary short-circuit response when
/// `ctx.authenticated` is absent, and 403 when a required role is missing.
/// Denials are control flow, never `StageError`s.
pub struct RequireAuthStage {
    required_role: Option<String>,
}

impl RequireAuthStage {
    /// Require authentication only.
    pub fn new() -> Self {
        Self {
            required_role: None,
        }
    }

    /// Require authentication plus the given role.
    pub fn with_role(role: impl Into<String>) -> Self {
        Self {
            required_role: Some(role.into()),
        }
    }
}

impl Default for RequireAuthStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Middleware for RequireAuthStage {
    fn name(&self) -> &'static str {
        "require_auth"
    }

    async fn handle(&self, ctx: &mut RequestContext, next: Next<'_>) -> StageResult {
        let Some(identity) = ctx.authenticated.as_ref() else {
            debug!(
                request_id = %ctx.request_id,
                path = %ctx.request.path,
                "unauthenticated request rejected"
            );
            return Ok(ApiResponse::error(401, "unauthorized"));
        };

        if let Some(role) = &self.required_role {
            if !identity.has_role(role) {
                debug!(
                    request_id = %ctx.request_id,
                    subject = %identity.subject,
                    required_role = %role,
                    "request lacks required role"
                );
                return Ok(ApiResponse::error(403, "forbidden"));
            }
        }

        next.run(ctx).await
    }
}

// ============================================================================
// Audit Stage
// ============================================================================

/// Records an audit event after the inner chain resolves.
///
/// The outcome is derived from the response status; sink failures are
/// logged and swallowed so that auditing never breaks request handling.
pub struct AuditStage {
    sink: Arc<dyn AuditSink>,
    action: String,
}

impl AuditStage {
    /// Create an audit stage recording under the given action label.
    pub fn new(sink: Arc<dyn AuditSink>, action: impl Into<String>) -> Self {
        Self {
            sink,
            action: action.into(),
        }
    }

    fn actor_for(ctx: &RequestContext) -> AuditActor {
        match ctx.authenticated.as_ref() {
            Some(identity) if identity.has_role("admin") => AuditActor::Admin {
                subject: identity.subject.clone(),
            },
            Some(identity) => AuditActor::Member {
                subject: identity.subject.clone(),
            },
            None => AuditActor::Anonymous,
        }
    }

    fn outcome_for(result: &StageResult) -> AuditOutcome {
        match result {
            Ok(response) if response.is_success() => AuditOutcome::Success,
            Ok(response) if response.status == 401 || response.status == 403 => {
                AuditOutcome::Denied
            }
            _ => AuditOutcome::Failure,
        }
    }
}

#[async_trait]
impl Middleware for AuditStage {
    fn name(&self) -> &'static str {
        "audit"
    }

    async fn handle(&self, ctx: &mut RequestContext, next: Next<'_>) -> StageResult {
        let result = next.run(ctx).await;

        let event = AuditEvent::new(
            Self::actor_for(ctx),
            self.action.clone(),
            ctx.request.path.clone(),
            Self::outcome_for(&result),
        )
        .with_request_id(ctx.request_id);

        if let Err(error) = self.sink.record(event).await {
            warn!(
                request_id = %ctx.request_id,
                action = %self.action,
                error = %error,
                "failed to record audit event"
            );
        }

        result
    }
}

#[cfg(test)]
#[path = "stages_tests.rs"]
mod tests;
