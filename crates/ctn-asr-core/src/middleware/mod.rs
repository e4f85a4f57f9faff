//! Composable middleware pipeline for HTTP request handling.
//!
//! A [`Pipeline`] is built once at route-registration time from an ordered
//! list of [`Middleware`] stages plus a terminal [`Handler`], and then
//! serves every request for that route. Stages run in registration order
//! on the way in; each stage decides whether to call [`Next::run`]
//! (continuing the chain) or return a response directly (short-circuiting,
//! skipping all later stages and the terminal handler). Logic after
//! `next.run()` is the post-phase and executes innermost-first, exactly
//! like nested function wrapping.
//!
//! Two cross-cutting behaviors live at the composition boundary itself so
//! that no individual route author can forget them:
//!
//! - every response carries the `x-request-id` header, and
//! - any stage or handler error becomes a fixed-shape 500 response after
//!   being logged with the request ID; no error escapes to the transport.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use ctn_asr_core::middleware::{
//!     handler_fn, ApiRequest, ApiResponse, BoxFuture, Pipeline, RequestContext,
//!     RequestLoggingStage, StageResult,
//! };
//!
//! fn status_handler(_ctx: &mut RequestContext) -> BoxFuture<'_, StageResult> {
//!     Box::pin(async { Ok(ApiResponse::ok(serde_json::json!({ "status": "ok" }))) })
//! }
//!
//! # async fn example() {
//! let pipeline = Pipeline::new(
//!     vec![Arc::new(RequestLoggingStage)],
//!     Arc::new(handler_fn(status_handler)),
//! );
//! let response = pipeline.handle(ApiRequest::new("GET", "/status")).await;
//! assert!(response.header("x-request-id").is_some());
//! # }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::error;

mod context;
mod stages;

pub use context::{ApiRequest, ApiResponse, AuthenticatedRequest, RequestContext};
pub use stages::{
    AuditStage, AuthError, AuthenticationStage, RequestLoggingStage, RequireAuthStage,
    TokenVerifier,
};

/// Response header carrying the per-request identifier.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Response header delivering a freshly minted CSRF token.
pub const CSRF_TOKEN_HEADER: &str = "x-csrf-token";

/// Boxed future returned by handler closures.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result type produced by stages and terminal handlers.
pub type StageResult = Result<ApiResponse, StageError>;

// ============================================================================
// Stage Error
// ============================================================================

/// Error raised by a middleware stage or terminal handler.
///
/// Caught at the composition boundary, logged with full context, and
/// converted into a generic 500 response. Expected control-flow denials
/// (401/403) are ordinary responses, never `StageError`s.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct StageError(#[from] anyhow::Error);

impl StageError {
    /// Wrap any error type.
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self(anyhow::Error::new(error))
    }

    /// Create an error from a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self(anyhow::anyhow!(message.into()))
    }
}

// ============================================================================
// Middleware and Handler Traits
// ============================================================================

/// One stage in a request pipeline.
///
/// A stage may inspect and mutate the shared [`RequestContext`], return a
/// response directly (short-circuit), or delegate to the rest of the chain
/// via [`Next::run`] and optionally post-process the returned response.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Stage name for logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Process the request, delegating to `next` to continue the chain.
    async fn handle(&self, ctx: &mut RequestContext, next: Next<'_>) -> StageResult;
}

/// Terminal handler at the end of a pipeline: the actual route logic,
/// invoked only when no stage short-circuits.
///
/// Handlers must not assume `ctx.authenticated` is present unless an
/// authentication stage is known to precede them in the configured chain.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Produce the route's response.
    async fn call(&self, ctx: &mut RequestContext) -> StageResult;
}

/// Adapter turning a closure into a [`Handler`].
pub struct HandlerFn<F> {
    f: F,
}

/// Wrap a closure as a terminal [`Handler`].
///
/// The closure receives the mutable request context and returns a boxed
/// future, which keeps the borrow of the context inside the future.
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, StageResult> + Send + Sync,
{
    HandlerFn { f }
}

#[async_trait]
impl<F> Handler for HandlerFn<F>
where
    F: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, StageResult> + Send + Sync,
{
    async fn call(&self, ctx: &mut RequestContext) -> StageResult {
        (self.f)(ctx).await
    }
}

// ============================================================================
// Next
// ============================================================================

/// Continuation of the pipeline: the remaining stages plus the terminal
/// handler.
///
/// Consumed by [`Next::run`]; a stage that drops it without running it has
/// short-circuited the chain.
pub struct Next<'a> {
    stages: &'a [Arc<dyn Middleware>],
    terminal: &'a dyn Handler,
}

impl<'a> Next<'a> {
    /// Run the next stage, or the terminal handler when no stages remain.
    pub async fn run(self, ctx: &mut RequestContext) -> StageResult {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                stage
                    .handle(
                        ctx,
                        Next {
                            stages: rest,
                            terminal: self.terminal,
                        },
                    )
                    .await
            }
            None => self.terminal.call(ctx).await,
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// An ordered middleware chain composed with a terminal handler.
///
/// Composed once at route registration; [`Pipeline::handle`] is then the
/// single entry point for every request to that route.
pub struct Pipeline {
    stages: Vec<Arc<dyn Middleware>>,
    terminal: Arc<dyn Handler>,
}

impl Pipeline {
    /// Compose a pipeline from stages (run in order) and a terminal handler.
    pub fn new(stages: Vec<Arc<dyn Middleware>>, terminal: Arc<dyn Handler>) -> Self {
        Self { stages, terminal }
    }

    /// Compose a pipeline with no stages, only a terminal handler.
    pub fn terminal_only(terminal: Arc<dyn Handler>) -> Self {
        Self::new(Vec::new(), terminal)
    }

    /// Handle one inbound request.
    ///
    /// Creates a fresh [`RequestContext`], drives the chain, and applies
    /// the composition-boundary guarantees: request-ID header on every
    /// response and stage errors converted to a fixed-shape 500.
    pub async fn handle(&self, request: ApiRequest) -> ApiResponse {
        let mut ctx = RequestContext::new(request);
        let request_id = ctx.request_id;

        let next = Next {
            stages: &self.stages,
            terminal: self.terminal.as_ref(),
        };

        let mut response = match next.run(&mut ctx).await {
            Ok(response) => response,
            Err(error) => {
                error!(
                    request_id = %request_id,
                    method = %ctx.request.method,
                    path = %ctx.request.path,
                    error = %error,
                    "request pipeline failed"
                );
                ApiResponse::internal_error(request_id)
            }
        };

        // Final response assembly, owned by the composer so no stage can
        // forget it.
        if let Some(csrf_token) = ctx.csrf_token_to_set.take() {
            response.set_header(CSRF_TOKEN_HEADER, csrf_token);
        }
        response.set_header(REQUEST_ID_HEADER, request_id.as_str());

        response
    }

    /// Number of stages ahead of the terminal handler.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Check whether the pipeline has no stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
