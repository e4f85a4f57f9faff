//! # CTN ASR HTTP Service
//!
//! HTTP server for the CTN association-registry backend.
//!
//! This service provides:
//! - Identifier verification endpoints guarded by per-registry circuit
//!   breakers (KvK, GLEIF, Peppol)
//! - Health check and readiness endpoints
//! - Admin API for circuit breaker inspection and reset
//! - Prometheus metrics
//!
//! Every `/api` and `/admin` route is a middleware [`Pipeline`] composed
//! once at route registration: request logging, bearer-token
//! authentication, audit recording, and (for admin routes) fail-closed
//! authorization run around the terminal handler, with request-ID
//! propagation and error-to-500 conversion enforced at the composition
//! boundary.

// Public modules
pub mod errors;
pub mod metrics;



use axum::{
    extract::{RawPathParams, State},
    http::{HeaderName, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post, MethodRouter},
    Router,
};
use ctn_asr_core::{
    circuit_breaker::{CircuitBreakerConfig, CircuitStats},
    middleware::{
        ApiRequest, ApiResponse, AuditStage, AuthenticationStage, Handler, Middleware, Pipeline,
        RequestContext, RequestLoggingStage, RequireAuthStage, StageError, StageResult,
        TokenVerifier,
    },
    verification::{
        VerificationBreakerRegistry, VerificationService, GLEIF_REGISTRY, KVK_REGISTRY,
        PEPPOL_REGISTRY,
    },
    AuditSink, KvkNumber, Lei, PeppolParticipantId, Timestamp, ValidationError,
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, net::IpAddr, net::SocketAddr, sync::Arc};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{info, instrument};

pub use metrics::ServiceMetrics;

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration for the service
    pub config: ServiceConfig,

    /// Guarded registry clients for identifier verification
    pub verification: Arc<VerificationService>,

    /// Circuit breaker registry owned by the composition root
    pub breakers: Arc<VerificationBreakerRegistry>,

    /// Bearer-token verifier for portal and admin callers
    pub token_verifier: Arc<dyn TokenVerifier>,

    /// Audit sink recording privileged and externally visible actions
    pub audit: Arc<dyn AuditSink>,

    /// Metrics collector for observability
    pub metrics: Arc<ServiceMetrics>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        config: ServiceConfig,
        verification: Arc<VerificationService>,
        breakers: Arc<VerificationBreakerRegistry>,
        token_verifier: Arc<dyn TokenVerifier>,
        audit: Arc<dyn AuditSink>,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        Self {
            config,
            verification,
            breakers,
            token_verifier,
            audit,
            metrics,
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Security settings
    pub security: SecurityConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// External registry settings
    pub registries: RegistriesConfig,
}

impl ServiceConfig {
    /// Validate the configuration before startup.
    ///
    /// A malformed value is a hard error: it indicates deliberate but
    /// broken operator configuration and the service must not start.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid {
                message: "server.port must be non-zero".to_string(),
            });
        }

        self.server
            .host
            .parse::<IpAddr>()
            .map_err(|_| ConfigError::Invalid {
                message: format!("server.host '{}' is not an IP address", self.server.host),
            })?;

        if self.server.max_body_size == 0 {
            return Err(ConfigError::Invalid {
                message: "server.max_body_size must be non-zero".to_string(),
            });
        }

        if let Some(token) = &self.security.admin_token {
            if token.is_empty() {
                return Err(ConfigError::Invalid {
                    message: "security.admin_token must not be empty when set".to_string(),
                });
            }
        }

        for target in [
            &self.registries.kvk,
            &self.registries.gleif,
            &self.registries.peppol,
        ] {
            target.validate()?;
        }

        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,

    /// Maximum request size in bytes
    pub max_body_size: usize,

    /// Enable CORS
    pub enable_cors: bool,

    /// Enable compression
    pub enable_compression: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_timeout_seconds: 30,
            max_body_size: 1024 * 1024, // 1MB; verification requests are small
            enable_cors: true,
            enable_compression: true,
        }
    }
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Literal admin bearer token.
    ///
    /// When absent, admin routes always answer 401. Production deployments
    /// should inject the token from a secret store, not a config file.
    pub admin_token: Option<String>,

    /// Subject reported for the admin token in logs and audit records
    pub admin_subject: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            admin_token: None,
            admin_subject: "admin".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Settings for all external registries
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistriesConfig {
    /// KvK Handelsregister
    pub kvk: RegistryTargetConfig,

    /// GLEIF LEI database
    pub gleif: RegistryTargetConfig,

    /// Peppol directory
    pub peppol: RegistryTargetConfig,
}

impl Default for RegistriesConfig {
    fn default() -> Self {
        Self {
            kvk: RegistryTargetConfig {
                base_url: "https://api.kvk.nl/api/v1/basisprofielen".to_string(),
                timeout_seconds: 10,
                breaker: ctn_asr_core::circuit_breaker::kvk_circuit_breaker_config(),
            },
            gleif: RegistryTargetConfig {
                base_url: "https://api.gleif.org/api/v1/lei-records".to_string(),
                timeout_seconds: 10,
                breaker: ctn_asr_core::circuit_breaker::gleif_circuit_breaker_config(),
            },
            peppol: RegistryTargetConfig {
                base_url: "https://directory.peppol.eu/search/1.0/json".to_string(),
                timeout_seconds: 10,
                breaker: ctn_asr_core::circuit_breaker::peppol_circuit_breaker_config(),
            },
        }
    }
}

/// Settings for one external registry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryTargetConfig {
    /// Base URL of the registry API
    pub base_url: String,

    /// HTTP client timeout for lookups (seconds).
    ///
    /// This is the only timeout bounding a lookup; the circuit breaker
    /// adds none of its own.
    pub timeout_seconds: u64,

    /// Circuit breaker settings for this upstream
    pub breaker: CircuitBreakerConfig,
}

impl Default for RegistryTargetConfig {
    fn default() -> Self {
        Self {
            // An empty base URL fails validation with a pointed message;
            // a partially overridden registry section must not silently
            // fall back to another registry's endpoint.
            base_url: String::new(),
            timeout_seconds: 10,
            breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl RegistryTargetConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.base_url).map_err(|e| ConfigError::Invalid {
            message: format!(
                "registries.{}.base_url '{}' is invalid: {}",
                self.breaker.name, self.base_url, e
            ),
        })?;

        if self.breaker.error_threshold == 0 {
            return Err(ConfigError::Invalid {
                message: format!(
                    "registries.{}.breaker.error_threshold must be positive",
                    self.breaker.name
                ),
            });
        }

        if self.breaker.half_open_max_requests == 0 {
            return Err(ConfigError::Invalid {
                message: format!(
                    "registries.{}.breaker.half_open_max_requests must be positive",
                    self.breaker.name
                ),
            });
        }

        Ok(())
    }
}

// ============================================================================
// Service Errors
// ============================================================================

/// Configuration errors detected at startup
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Fatal service errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("{0}")]
    Configuration(#[from] ConfigError),
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create HTTP router with all endpoints.
///
/// Every `/api` and `/admin` route is composed into its pipeline here,
/// once, at registration time.
pub fn create_router(state: AppState) -> Router {
    let logging: Arc<dyn Middleware> = Arc::new(RequestLoggingStage);
    let authentication: Arc<dyn Middleware> =
        Arc::new(AuthenticationStage::new(Arc::clone(&state.token_verifier)));

    let public_stages = |audit_action: &str| -> Vec<Arc<dyn Middleware>> {
        vec![
            Arc::clone(&logging),
            Arc::clone(&authentication),
            Arc::new(AuditStage::new(Arc::clone(&state.audit), audit_action)),
        ]
    };

    // Audit sits outside the authorization gate so denials are recorded.
    let admin_stages = |audit_action: &str| -> Vec<Arc<dyn Middleware>> {
        vec![
            Arc::clone(&logging),
            Arc::clone(&authentication),
            Arc::new(AuditStage::new(Arc::clone(&state.audit), audit_action)),
            Arc::new(RequireAuthStage::with_role("admin")),
        ]
    };

    let max_body_size = state.config.server.max_body_size;

    let verify_routes = Router::new()
        .route(
            "/api/verify/kvk/{number}",
            pipeline_get(
                Pipeline::new(
                    public_stages("verify_kvk"),
                    Arc::new(RegistryVerifyHandler {
                        registry: KVK_REGISTRY,
                        param: "number",
                        validate: validate_kvk,
                        verification: Arc::clone(&state.verification),
                        metrics: Arc::clone(&state.metrics),
                    }),
                ),
                max_body_size,
            ),
        )
        .route(
            "/api/verify/lei/{lei}",
            pipeline_get(
                Pipeline::new(
                    public_stages("verify_lei"),
                    Arc::new(RegistryVerifyHandler {
                        registry: GLEIF_REGISTRY,
                        param: "lei",
                        validate: validate_lei,
                        verification: Arc::clone(&state.verification),
                        metrics: Arc::clone(&state.metrics),
                    }),
                ),
                max_body_size,
            ),
        )
        .route(
            "/api/verify/peppol/{participant}",
            pipeline_get(
                Pipeline::new(
                    public_stages("verify_peppol"),
                    Arc::new(RegistryVerifyHandler {
                        registry: PEPPOL_REGISTRY,
                        param: "participant",
                        validate: validate_peppol,
                        verification: Arc::clone(&state.verification),
                        metrics: Arc::clone(&state.metrics),
                    }),
                ),
                max_body_size,
            ),
        );

    let admin_routes = Router::new()
        .route(
            "/admin/breakers",
            pipeline_get(
                Pipeline::new(
                    admin_stages("list_breakers"),
                    Arc::new(BreakerStatsHandler {
                        breakers: Arc::clone(&state.breakers),
                    }),
                ),
                max_body_size,
            ),
        )
        .route(
            "/admin/breakers/{name}/reset",
            pipeline_post(
                Pipeline::new(
                    admin_stages("reset_breaker"),
                    Arc::new(BreakerResetHandler {
                        breakers: Arc::clone(&state.breakers),
                    }),
                ),
                max_body_size,
            ),
        );

    let health_routes = Router::new()
        .route("/health", get(handle_health_check))
        .route("/health/deep", get(handle_deep_health_check))
        .route("/ready", get(handle_readiness_check));

    let observability_routes = Router::new().route("/metrics", get(metrics_endpoint));

    let mut router = Router::new()
        .merge(verify_routes)
        .merge(admin_routes)
        .merge(health_routes)
        .merge(observability_routes)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            metrics_middleware,
        ));

    if state.config.server.enable_compression {
        router = router.layer(CompressionLayer::new());
    }
    if state.config.server.enable_cors {
        router = router.layer(CorsLayer::permissive());
    }

    router.with_state(state)
}

/// Start HTTP server
pub async fn start_server(
    config: ServiceConfig,
    verification: Arc<VerificationService>,
    breakers: Arc<VerificationBreakerRegistry>,
    token_verifier: Arc<dyn TokenVerifier>,
    audit: Arc<dyn AuditSink>,
) -> Result<(), ServiceError> {
    config.validate()?;

    let metrics = ServiceMetrics::new().map_err(|e| {
        ServiceError::Configuration(ConfigError::Invalid {
            message: format!("Failed to initialize metrics: {}", e),
        })
    })?;

    let shutdown_timeout =
        std::time::Duration::from_secs(config.server.shutdown_timeout_seconds);

    let host: IpAddr = config
        .server
        .host
        .parse()
        .map_err(|_| ConfigError::Invalid {
            message: format!("server.host '{}' is not an IP address", config.server.host),
        })?;
    let addr = SocketAddr::new(host, config.server.port);

    let state = AppState::new(
        config,
        verification,
        breakers,
        token_verifier,
        audit,
        metrics,
    );
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ServiceError::BindFailed {
            address: addr.to_string(),
            message: e.to_string(),
        })?;

    info!("Starting HTTP server on {}", addr);

    let shutdown_signal = async move {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C signal handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!(
                    "Received SIGINT (Ctrl+C), initiating graceful shutdown with {}s timeout",
                    shutdown_timeout.as_secs()
                );
            },
            _ = terminate => {
                info!(
                    "Received SIGTERM, initiating graceful shutdown with {}s timeout",
                    shutdown_timeout.as_secs()
                );
            },
        }
    };

    // In-flight requests complete before shutdown; new connections are
    // refused as soon as the signal arrives.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .map_err(|e| ServiceError::ServerFailed {
            message: e.to_string(),
        })?;

    info!("HTTP server shutdown complete");
    Ok(())
}

// ============================================================================
// Pipeline <-> Axum Bridge
// ============================================================================

/// Register a pipeline as a GET route.
fn pipeline_get(pipeline: Pipeline, max_body_size: usize) -> MethodRouter<AppState> {
    let pipeline = Arc::new(pipeline);
    get(move |params: RawPathParams, request: axum::extract::Request| {
        run_pipeline(Arc::clone(&pipeline), params, request, max_body_size)
    })
}

/// Register a pipeline as a POST route.
fn pipeline_post(pipeline: Pipeline, max_body_size: usize) -> MethodRouter<AppState> {
    let pipeline = Arc::new(pipeline);
    post(move |params: RawPathParams, request: axum::extract::Request| {
        run_pipeline(Arc::clone(&pipeline), params, request, max_body_size)
    })
}

/// Convert the transport request, drive the pipeline, convert back.
///
/// The bridge injects no headers of its own; request-ID propagation is the
/// pipeline's job.
async fn run_pipeline(
    pipeline: Arc<Pipeline>,
    params: RawPathParams,
    request: axum::extract::Request,
    max_body_size: usize,
) -> Response {
    let (parts, body) = request.into_parts();

    let mut api_request = ApiRequest::new(parts.method.as_str(), parts.uri.path());

    for (name, value) in params.iter() {
        api_request = api_request.with_path_param(name, value);
    }

    for (name, value) in parts.headers.iter() {
        if let Ok(value) = value.to_str() {
            api_request = api_request.with_header(name.as_str(), value);
        }
    }

    let body = match axum::body::to_bytes(body, max_body_size).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(serde_json::json!({ "error": "payload_too_large" })),
            )
                .into_response();
        }
    };

    let response = pipeline.handle(api_request.with_body(body)).await;
    into_axum_response(response)
}

/// Convert a pipeline response into the transport response shape.
fn into_axum_response(response: ApiResponse) -> Response {
    let status =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut http_response = (status, Json(response.body.clone())).into_response();

    for (name, value) in response.headers() {
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            (Ok(name), Ok(value)) => {
                http_response.headers_mut().insert(name, value);
            }
            _ => {
                tracing::warn!(header = %name, "dropping response header with invalid name or value");
            }
        }
    }

    http_response
}

// ============================================================================
// Verification Handlers
// ============================================================================

fn validate_kvk(raw: &str) -> Result<String, ValidationError> {
    KvkNumber::new(raw).map(|v| v.as_str().to_string())
}

fn validate_lei(raw: &str) -> Result<String, ValidationError> {
    Lei::new(raw).map(|v| v.as_str().to_string())
}

fn validate_peppol(raw: &str) -> Result<String, ValidationError> {
    PeppolParticipantId::new(raw).map(|v| v.as_str().to_string())
}

/// Terminal handler verifying one identifier kind against one registry.
struct RegistryVerifyHandler {
    registry: &'static str,
    param: &'static str,
    validate: fn(&str) -> Result<String, ValidationError>,
    verification: Arc<VerificationService>,
    metrics: Arc<ServiceMetrics>,
}

#[async_trait::async_trait]
impl Handler for RegistryVerifyHandler {
    async fn call(&self, ctx: &mut RequestContext) -> StageResult {
        let raw = ctx.request.path_param(self.param).unwrap_or_default();

        let identifier = match (self.validate)(raw) {
            Ok(identifier) => identifier,
            Err(error) => return Ok(errors::invalid_identifier_response(&error)),
        };

        let client = self.verification.client(self.registry).ok_or_else(|| {
            StageError::msg(format!("no client registered for {}", self.registry))
        })?;

        self.metrics.record_registry_lookup(self.registry);

        match client.verify(&identifier).await {
            Ok(outcome) if outcome.verified => {
                let body = serde_json::to_value(&outcome).map_err(StageError::new)?;
                Ok(ApiResponse::ok(body))
            }
            Ok(outcome) => Ok(ApiResponse::error_with_message(
                404,
                "not_registered",
                format!(
                    "'{}' is not registered in {}",
                    outcome.identifier, outcome.registry
                ),
            )),
            Err(error) => {
                let retry_after_secs =
                    client.breaker().config().open_duration_ms.div_ceil(1000).max(1);
                Ok(errors::verification_error_response(
                    self.registry,
                    &error,
                    retry_after_secs,
                    &self.metrics,
                ))
            }
        }
    }
}

// ============================================================================
// Admin Handlers
// ============================================================================

/// Terminal handler listing circuit breaker stats.
struct BreakerStatsHandler {
    breakers: Arc<VerificationBreakerRegistry>,
}

#[async_trait::async_trait]
impl Handler for BreakerStatsHandler {
    async fn call(&self, _ctx: &mut RequestContext) -> StageResult {
        let stats: Vec<CircuitStats> = self.breakers.stats();
        Ok(ApiResponse::ok(serde_json::json!({ "breakers": stats })))
    }
}

/// Terminal handler forcing a breaker back to closed.
struct BreakerResetHandler {
    breakers: Arc<VerificationBreakerRegistry>,
}

#[async_trait::async_trait]
impl Handler for BreakerResetHandler {
    async fn call(&self, ctx: &mut RequestContext) -> StageResult {
        let name = ctx.request.path_param("name").unwrap_or_default().to_string();

        if self.breakers.reset(&name) {
            info!(breaker = %name, "circuit breaker reset by operator");
            Ok(ApiResponse::ok(serde_json::json!({
                "status": "reset",
                "breaker": name,
            })))
        } else {
            Ok(ApiResponse::error_with_message(
                404,
                "unknown_breaker",
                format!("no circuit breaker named '{name}'"),
            ))
        }
    }
}

// ============================================================================
// Health Check Handlers
// ============================================================================

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: Timestamp,
    pub version: String,
    pub checks: HashMap<String, String>,
}

/// Readiness check response
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub timestamp: Timestamp,
}

/// Basic health check endpoint
#[instrument]
async fn handle_health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Timestamp::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HashMap::new(),
    })
}

/// Deep health check reporting per-registry breaker state.
///
/// An open breaker means the dependency is unreachable; the service
/// reports degraded with 503 so orchestrators can route around it.
#[instrument(skip(state))]
async fn handle_deep_health_check(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, (StatusCode, Json<HealthResponse>)> {
    let mut checks = HashMap::new();
    let mut degraded = false;

    for stats in state.breakers.stats() {
        let status = match stats.state {
            ctn_asr_core::circuit_breaker::CircuitState::Closed => "closed",
            ctn_asr_core::circuit_breaker::CircuitState::HalfOpen => "half_open",
            ctn_asr_core::circuit_breaker::CircuitState::Open => {
                degraded = true;
                "open"
            }
        };
        checks.insert(stats.config.name.clone(), status.to_string());
    }

    let response = HealthResponse {
        status: if degraded { "degraded" } else { "healthy" }.to_string(),
        timestamp: Timestamp::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks,
    };

    if degraded {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    } else {
        Ok(Json(response))
    }
}

/// Readiness check for orchestration platforms
#[instrument]
async fn handle_readiness_check() -> Json<ReadinessResponse> {
    Json(ReadinessResponse {
        ready: true,
        timestamp: Timestamp::now(),
    })
}

// ============================================================================
// Observability Handlers
// ============================================================================

/// Prometheus metrics endpoint
#[instrument(skip_all)]
async fn metrics_endpoint(State(state): State<AppState>) -> Result<String, StatusCode> {
    state
        .metrics
        .encode()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

// ============================================================================
// Transport Middleware
// ============================================================================

/// Metrics collection middleware
///
/// Records request counts and duration for every route, including the
/// plain health and metrics endpoints that sit outside the pipelines.
async fn metrics_middleware(
    State(state): State<AppState>,
    request: axum::extract::Request,
    next: middleware::Next,
) -> Response {
    let start = std::time::Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    state.metrics.record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed(),
    );

    response
}
