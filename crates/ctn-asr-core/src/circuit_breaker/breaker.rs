//! Windowed circuit breaker implementation.
//!
//! Provides a thread-safe circuit breaker that counts failures in a
//! sliding time window rather than as a bare consecutive-failure counter,
//! so isolated errors in a quiet period do not trip the circuit while a
//! genuine failure cluster still does.

use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState, CircuitStats,
};
use crate::Timestamp;

// ============================================================================
// Internal State
// ============================================================================

/// Mutable breaker state, owned exclusively by one breaker instance.
///
/// Protected by RwLock for thread-safe access.
#[derive(Debug)]
struct InternalState {
    /// Current circuit state
    current_state: CircuitState,

    /// Consecutive failures since the last success
    failure_count: u32,

    /// Failure timestamps inside the monitor window, oldest first.
    /// Entries older than the window are pruned lazily.
    failure_timestamps: VecDeque<Timestamp>,

    /// Time of the most recent failure
    last_failure_time: Option<Timestamp>,

    /// Time the circuit last transitioned to open
    opened_at: Option<Timestamp>,

    /// Trial requests admitted since entering half-open
    half_open_requests: u32,
}

impl InternalState {
    fn new() -> Self {
        Self {
            current_state: CircuitState::Closed,
            failure_count: 0,
            failure_timestamps: VecDeque::new(),
            last_failure_time: None,
            opened_at: None,
            half_open_requests: 0,
        }
    }
}

// ============================================================================
// Windowed Circuit Breaker
// ============================================================================

/// Circuit breaker with sliding-window failure counting.
///
/// One instance guards one upstream dependency and is shared by every
/// request that calls that upstream. The admission decision (state check,
/// open-to-half-open transition, trial-slot increment) happens under a
/// single synchronous lock acquisition before the wrapped operation is
/// first polled, so two concurrent trials can never both pass the
/// half-open limit check.
///
/// The breaker performs admission control only: it imposes no timeout on
/// the wrapped operation and never retries on the caller's behalf.
pub struct WindowedCircuitBreaker<T, E> {
    config: CircuitBreakerConfig,
    state: Arc<RwLock<InternalState>>,
    _phantom: std::marker::PhantomData<fn() -> (T, E)>,
}

impl<T, E> WindowedCircuitBreaker<T, E> {
    /// Create new circuit breaker with configuration.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(InternalState::new())),
            _phantom: std::marker::PhantomData,
        }
    }

    /// The configuration this breaker was constructed with.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Breaker name from the configuration.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    // Lock poisoning can only happen if a panic occurs while holding the
    // guard; the guarded values are plain counters that stay consistent,
    // so recovering the inner value is safe.
    fn read_state(&self) -> RwLockReadGuard<'_, InternalState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, InternalState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn monitor_window(&self) -> Duration {
        Duration::from_millis(self.config.monitor_window_ms)
    }

    /// Drop window entries older than the monitor window.
    fn prune_window(&self, state: &mut InternalState, now: Timestamp) {
        let cutoff = now.subtract_duration(self.monitor_window());
        while let Some(oldest) = state.failure_timestamps.front() {
            if *oldest < cutoff {
                state.failure_timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Count window entries still inside the monitor window without mutating.
    fn recent_errors(&self, state: &InternalState, now: Timestamp) -> u32 {
        let cutoff = now.subtract_duration(self.monitor_window());
        state
            .failure_timestamps
            .iter()
            .filter(|ts| **ts >= cutoff)
            .count() as u32
    }

    /// Check whether the open cooldown has elapsed.
    fn cooldown_elapsed(&self, state: &InternalState, now: Timestamp) -> bool {
        match state.opened_at {
            Some(opened_at) => {
                now.duration_since(opened_at) >= Duration::from_millis(self.config.open_duration_ms)
            }
            // Open without a recorded open time cannot happen through the
            // public API; allow recovery rather than wedging the breaker.
            None => true,
        }
    }

    /// Transition circuit to open state.
    fn trip_circuit(&self, state: &mut InternalState, now: Timestamp) {
        state.current_state = CircuitState::Open;
        state.opened_at = Some(now);
        state.half_open_requests = 0;
    }

    /// Transition circuit to half-open state.
    fn transition_to_half_open(&self, state: &mut InternalState) {
        state.current_state = CircuitState::HalfOpen;
        state.half_open_requests = 0;
    }

    /// Transition circuit to closed state.
    fn close_circuit(&self, state: &mut InternalState) {
        state.current_state = CircuitState::Closed;
        state.opened_at = None;
        state.half_open_requests = 0;
        state.failure_count = 0;
        state.failure_timestamps.clear();
    }

    /// Record a successful operation.
    fn record_success(&self, state: &mut InternalState, now: Timestamp) {
        state.failure_count = 0;
        self.prune_window(state, now);

        match state.current_state {
            CircuitState::Closed => {
                // Normal operation, no state change
            }
            CircuitState::HalfOpen => {
                // One successful trial is enough to close, even with other
                // trials still outstanding. Deliberate bias toward fast
                // recovery; a failing outstanding trial re-opens immediately.
                self.close_circuit(state);
            }
            CircuitState::Open => {
                // A trial that resolved after another trial already
                // re-opened the circuit. The newer failure wins; stay open.
            }
        }
    }

    /// Record a failed operation.
    fn record_failure(&self, state: &mut InternalState, now: Timestamp) {
        state.failure_count += 1;
        state.last_failure_time = Some(now);
        state.failure_timestamps.push_back(now);
        self.prune_window(state, now);

        match state.current_state {
            CircuitState::Closed => {
                if state.failure_timestamps.len() as u32 >= self.config.error_threshold {
                    self.trip_circuit(state, now);
                }
            }
            CircuitState::HalfOpen => {
                // Any trial failure re-opens immediately, discarding the
                // remaining trial budget.
                self.trip_circuit(state, now);
            }
            CircuitState::Open => {
                // A trial that resolved after the circuit already re-opened.
                // Refresh the cooldown so the probe cadence restarts.
                self.trip_circuit(state, now);
            }
        }
    }
}

#[async_trait]
impl<T, E> CircuitBreaker<T, E> for WindowedCircuitBreaker<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    async fn execute<F, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut + Send,
        Fut: std::future::Future<Output = Result<T, E>> + Send,
    {
        // Admission decision. Synchronous, single lock acquisition, no
        // suspension point between the state check and the trial-slot
        // increment.
        {
            let now = Timestamp::now();
            let mut state = self.write_state();

            match state.current_state {
                CircuitState::Closed => {}
                CircuitState::Open => {
                    if self.cooldown_elapsed(&state, now) {
                        // Move to half-open first, then admit this call as
                        // the first trial.
                        self.transition_to_half_open(&mut state);
                        state.half_open_requests = 1;
                    } else {
                        return Err(CircuitBreakerError::CircuitOpen {
                            name: self.config.name.clone(),
                        });
                    }
                }
                CircuitState::HalfOpen => {
                    if state.half_open_requests >= self.config.half_open_max_requests {
                        // Budget exhausted; rejected without touching the
                        // wrapped operation and without counting as failure.
                        return Err(CircuitBreakerError::HalfOpenLimitExceeded {
                            name: self.config.name.clone(),
                        });
                    }
                    state.half_open_requests += 1;
                }
            }
        }

        // Lock released; only now may the operation suspend.
        let result = operation().await;

        let now = Timestamp::now();
        let mut state = self.write_state();

        match result {
            Ok(value) => {
                self.record_success(&mut state, now);
                Ok(value)
            }
            Err(error) => {
                self.record_failure(&mut state, now);
                Err(CircuitBreakerError::OperationFailed(error))
            }
        }
    }

    fn state(&self) -> CircuitState {
        self.read_state().current_state
    }

    fn stats(&self) -> CircuitStats {
        let state = self.read_state();
        let now = Timestamp::now();

        CircuitStats {
            state: state.current_state,
            failure_count: state.failure_count,
            recent_errors_in_window: self.recent_errors(&state, now),
            last_failure_time: state.last_failure_time,
            half_open_requests: state.half_open_requests,
            config: self.config.clone(),
        }
    }

    fn reset(&self) {
        let mut state = self.write_state();
        self.close_circuit(&mut state);
        state.last_failure_time = None;
    }
}

#[cfg(test)]
#[path = "breaker_tests.rs"]
mod tests;
