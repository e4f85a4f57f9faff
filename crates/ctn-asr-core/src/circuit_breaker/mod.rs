//! Circuit breaker resilience patterns for preventing cascading failures.
//!
//! This module implements the circuit breaker pattern to protect against
//! cascading failures when external registries (KvK, GLEIF, Peppol) are
//! failing or slow.
//!
//! # Circuit Breaker States
//!
//! - **Closed**: Normal operation, requests pass through
//! - **Open**: Upstream is failing, requests are rejected immediately
//! - **Half-Open**: Testing recovery, limited trial requests allowed
//!
//! # Example
//!
//! ```rust
//! use ctn_asr_core::circuit_breaker::{
//!     CircuitBreaker, CircuitBreakerConfig, WindowedCircuitBreaker,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let breaker: WindowedCircuitBreaker<String, String> =
//!     WindowedCircuitBreaker::new(CircuitBreakerConfig::default());
//! let value = breaker.execute(|| async { Ok("ok".to_string()) }).await?;
//! assert_eq!(value, "ok");
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use thiserror::Error;

use crate::Timestamp;

// Re-export implementation
mod breaker;
mod registry;
pub use breaker::WindowedCircuitBreaker;
pub use registry::CircuitBreakerRegistry;

// ============================================================================
// Circuit Breaker Trait
// ============================================================================

/// Circuit breaker protection for external service operations.
///
/// Implements the circuit breaker pattern to protect against cascading
/// failures by failing fast when an upstream is experiencing issues.
///
/// # Type Parameters
///
/// - `T`: Success result type
/// - `E`: Operation error type
///
/// # States
///
/// - **Closed**: Normal operation, tracking failures in a sliding window
/// - **Open**: Fast-fail mode after the window threshold is reached
/// - **Half-Open**: Testing upstream recovery with a bounded trial budget
#[async_trait]
pub trait CircuitBreaker<T, E>: Send + Sync {
    /// Execute operation with circuit breaker protection.
    ///
    /// # Arguments
    ///
    /// - `operation`: Async closure that performs the protected operation
    ///
    /// # Returns
    ///
    /// - `Ok(T)`: Operation succeeded
    /// - `Err(CircuitBreakerError)`: Circuit protection or operation failure
    ///
    /// # Behavior
    ///
    /// - **Closed**: Execute operation, track failures
    /// - **Open**: Reject immediately with [`CircuitBreakerError::CircuitOpen`]
    ///   unless the cooldown has elapsed, in which case the breaker moves to
    ///   half-open and this call becomes the first trial
    /// - **Half-Open**: Allow up to the configured number of trial calls;
    ///   further calls are rejected with
    ///   [`CircuitBreakerError::HalfOpenLimitExceeded`]
    ///
    /// The breaker never retries on the caller's behalf; errors from the
    /// wrapped operation propagate unchanged after bookkeeping.
    async fn execute<F, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send;

    /// Get current circuit breaker state.
    fn state(&self) -> CircuitState;

    /// Get a diagnostic snapshot of the breaker.
    ///
    /// `recent_errors_in_window` is recomputed against the current time on
    /// every call, so repeated calls with no new activity converge as old
    /// failures age out of the monitor window.
    fn stats(&self) -> CircuitStats;

    /// Reset circuit breaker to closed state (admin operation).
    ///
    /// Forces the circuit back to closed from any state, clearing all
    /// failure counters and timestamps. Intended for operator recovery
    /// and test teardown.
    fn reset(&self);

    /// Check if circuit breaker is healthy (allowing requests).
    fn is_healthy(&self) -> bool {
        self.state().allows_requests()
    }
}

// ============================================================================
// Circuit State
// ============================================================================

/// Current state of the circuit breaker.
///
/// Circuit breakers transition between these states based on
/// success and failure patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Circuit is closed, allowing requests through.
    ///
    /// Normal operation mode, tracking failures to detect issues.
    Closed,

    /// Circuit is open, rejecting all requests.
    ///
    /// Fast-fail mode after windowed failures exceeded the threshold.
    Open,

    /// Circuit is half-open, allowing limited trial requests.
    ///
    /// Testing recovery with a bounded number of probe calls.
    HalfOpen,
}

impl CircuitState {
    /// Check if requests are allowed in current state.
    ///
    /// # Returns
    ///
    /// - `true`: Closed or HalfOpen states allow requests
    /// - `false`: Open state rejects all requests
    pub fn allows_requests(&self) -> bool {
        matches!(self, Self::Closed | Self::HalfOpen)
    }

    /// Check if circuit is in a failure state.
    pub fn is_failure_state(&self) -> bool {
        matches!(self, Self::Open | Self::HalfOpen)
    }
}

// ============================================================================
// Circuit Breaker Configuration
// ============================================================================

/// Configuration for circuit breaker behavior.
///
/// Controls when the circuit trips, how long it stays open, and how many
/// trial requests the half-open state admits.
///
/// # Default Configuration
///
/// - Error threshold: 5 failures within the monitor window
/// - Open duration: 30 seconds before the first trial is allowed
/// - Half-open max requests: 3 concurrent/sequential trials
/// - Monitor window: 60 seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Breaker name, used in error messages, logs, and the admin API.
    pub name: String,

    /// Number of failures within the monitor window that trips the circuit.
    pub error_threshold: u32,

    /// Time the circuit stays open before allowing a trial (milliseconds).
    ///
    /// This is a cooldown, not a per-call timeout; the breaker imposes no
    /// timeout of its own on wrapped operations.
    pub open_duration_ms: u64,

    /// Maximum number of trial requests admitted while half-open.
    pub half_open_max_requests: u32,

    /// Sliding window over which failures are counted (milliseconds).
    pub monitor_window_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            name: "unknown".to_string(),
            error_threshold: 5,
            open_duration_ms: 30_000,
            half_open_max_requests: 3,
            monitor_window_ms: 60_000,
        }
    }
}

// ============================================================================
// Circuit Stats
// ============================================================================

/// Diagnostic snapshot of a circuit breaker.
///
/// Purely informational; taking a snapshot never mutates breaker state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitStats {
    /// Current circuit state.
    pub state: CircuitState,

    /// Consecutive failures since the last success.
    pub failure_count: u32,

    /// Failures inside the monitor window, relative to snapshot time.
    pub recent_errors_in_window: u32,

    /// Time of the most recent failure, if any.
    pub last_failure_time: Option<Timestamp>,

    /// Trial requests admitted since entering half-open.
    pub half_open_requests: u32,

    /// The configuration the breaker was constructed with.
    pub config: CircuitBreakerConfig,
}

// ============================================================================
// Circuit Breaker Error
// ============================================================================

/// Errors that can occur with circuit breaker operations.
///
/// Wraps operation errors and adds circuit breaker-specific failures.
#[derive(Debug, Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit breaker is open and the cooldown has not elapsed.
    ///
    /// Fast-fail mode; callers should treat the upstream as unavailable
    /// and try again later rather than retrying in a tight loop.
    #[error("circuit breaker '{name}' is OPEN - requests rejected")]
    CircuitOpen { name: String },

    /// Half-open trial budget is exhausted.
    ///
    /// Semantically identical to [`Self::CircuitOpen`] from the caller's
    /// perspective, kept distinct for diagnostics. Does not count as a
    /// failure against the breaker.
    #[error("circuit breaker '{name}' HALF_OPEN trial limit exceeded")]
    HalfOpenLimitExceeded { name: String },

    /// The wrapped operation itself failed.
    ///
    /// The original error is propagated unchanged after being recorded as
    /// a breaker failure.
    #[error("operation failed: {0}")]
    OperationFailed(E),
}

impl<E> CircuitBreakerError<E> {
    /// Check if error should count as a failure for the circuit breaker.
    pub fn counts_as_failure(&self) -> bool {
        matches!(self, Self::OperationFailed(_))
    }

    /// Check if error is due to circuit breaker admission control
    /// (as opposed to an error from the wrapped operation).
    pub fn is_circuit_protection(&self) -> bool {
        matches!(
            self,
            Self::CircuitOpen { .. } | Self::HalfOpenLimitExceeded { .. }
        )
    }
}

// ============================================================================
// Registry-Specific Configurations
// ============================================================================

/// Circuit breaker configuration for the KvK Handelsregister API.
///
/// Tuned for KvK lookup patterns:
/// - 5 windowed failures to trip
/// - 30 second cooldown
/// - 3 trial requests while half-open
pub fn kvk_circuit_breaker_config() -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        name: "kvk".to_string(),
        error_threshold: 5,
        open_duration_ms: 30_000,
        half_open_max_requests: 3,
        monitor_window_ms: 60_000,
    }
}

/// Circuit breaker configuration for the GLEIF LEI API.
///
/// GLEIF rate-limits aggressively, so the cooldown is longer and the
/// half-open probing more conservative:
/// - 5 windowed failures to trip
/// - 60 second cooldown
/// - 2 trial requests while half-open
/// - 2 minute monitor window
pub fn gleif_circuit_breaker_config() -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        name: "gleif".to_string(),
        error_threshold: 5,
        open_duration_ms: 60_000,
        half_open_max_requests: 2,
        monitor_window_ms: 120_000,
    }
}

/// Circuit breaker configuration for the Peppol directory.
///
/// The Peppol SML/SMP chain degrades noisily, so trip earlier:
/// - 3 windowed failures to trip
/// - 30 second cooldown
/// - 2 trial requests while half-open
pub fn peppol_circuit_breaker_config() -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        name: "peppol".to_string(),
        error_threshold: 3,
        open_duration_ms: 30_000,
        half_open_max_requests: 2,
        monitor_window_ms: 60_000,
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
