//! Error-to-response mapping for the HTTP service.
//!
//! Verification failures map to HTTP statuses following REST conventions:
//!
//! - `422 Unprocessable Entity`: the identifier is malformed (permanent,
//!   do not retry)
//! - `404 Not Found`: the registry definitively does not know the
//!   identifier
//! - `502 Bad Gateway`: the upstream registry failed (transient)
//! - `503 Service Unavailable`: the circuit breaker rejected the call
//!   without contacting the upstream; a `retry-after` header tells the
//!   client when the breaker will probe again
//!
//! Messages returned to clients are sanitized; detailed upstream errors
//! stay in the server-side log keyed by request ID.

use ctn_asr_core::middleware::ApiResponse;
use ctn_asr_core::verification::{LookupError, VerificationError};
use ctn_asr_core::ValidationError;
use tracing::warn;

use crate::metrics::ServiceMetrics;

/// Response for an identifier that fails newtype validation.
pub fn invalid_identifier_response(error: &ValidationError) -> ApiResponse {
    ApiResponse::error_with_message(422, "invalid_identifier", error.to_string())
}

/// Map a guarded-verification failure to a client-facing response.
///
/// Breaker rejections surface as 503 with a `retry-after` hint computed
/// from the breaker's configured cooldown; upstream failures surface as
/// 502 without leaking upstream error detail.
pub fn verification_error_response(
    registry: &str,
    error: &VerificationError,
    retry_after_secs: u64,
    metrics: &ServiceMetrics,
) -> ApiResponse {
    match error {
        VerificationError::CircuitOpen { name } => {
            metrics.record_breaker_rejection(name);
            warn!(registry = %name, "lookup rejected: circuit open");
            ApiResponse::error(503, "registry_unavailable")
                .with_header("retry-after", retry_after_secs.to_string())
        }
        VerificationError::HalfOpenLimitExceeded { name } => {
            metrics.record_breaker_rejection(name);
            warn!(registry = %name, "lookup rejected: half-open trial budget exhausted");
            ApiResponse::error(503, "registry_unavailable")
                .with_header("retry-after", retry_after_secs.to_string())
        }
        VerificationError::OperationFailed(LookupError::NotFound { identifier, .. }) => {
            // Guarded clients map not-found onto the success path; this arm
            // only fires for a client wired without that mapping.
            ApiResponse::error_with_message(
                404,
                "not_registered",
                format!("'{identifier}' is not registered in {registry}"),
            )
        }
        VerificationError::OperationFailed(lookup_error) => {
            warn!(registry = %registry, error = %lookup_error, "registry lookup failed");
            ApiResponse::error_with_message(
                502,
                "registry_error",
                format!("{registry} lookup failed"),
            )
        }
    }
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;
