//! Tests for the windowed circuit breaker implementation.
//!
//! These tests verify the complete behavior of the WindowedCircuitBreaker
//! including state transitions, sliding-window counting, half-open trial
//! budgeting, and thread safety.

use super::*;
use crate::circuit_breaker::{
    gleif_circuit_breaker_config, kvk_circuit_breaker_config, peppol_circuit_breaker_config,
};
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::Notify;

// ============================================================================
// Helper Functions
// ============================================================================

/// Create test circuit breaker with custom thresholds
fn create_test_breaker(
    error_threshold: u32,
    open_duration_ms: u64,
) -> WindowedCircuitBreaker<String, String> {
    let config = CircuitBreakerConfig {
        name: "test-upstream".to_string(),
        error_threshold,
        open_duration_ms,
        half_open_max_requests: 2,
        monitor_window_ms: 60_000,
    };
    WindowedCircuitBreaker::new(config)
}

/// Successful operation
async fn successful_operation() -> Result<String, String> {
    Ok("success".to_string())
}

/// Failing operation
async fn failing_operation() -> Result<String, String> {
    Err("boom".to_string())
}

/// Trip a breaker by driving `error_threshold` failures through it
async fn trip_breaker(breaker: &WindowedCircuitBreaker<String, String>, failures: u32) {
    for _ in 0..failures {
        let _ = breaker.execute(failing_operation).await;
    }
}

// ============================================================================
// Basic State Tests
// ============================================================================

mod basic_state_tests {
    use super::*;

    /// Verify initial circuit state is Closed.
    #[test]
    fn test_initial_state_is_closed() {
        let breaker = create_test_breaker(5, 30_000);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.is_healthy());
    }

    /// Verify successful requests pass through in closed state.
    #[tokio::test]
    async fn test_closed_state_allows_requests() {
        let breaker = create_test_breaker(5, 30_000);

        let result = breaker.execute(successful_operation).await;
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), "success");
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    /// Verify operation errors propagate unchanged after bookkeeping.
    #[tokio::test]
    async fn test_operation_error_propagates_unchanged() {
        let breaker = create_test_breaker(5, 30_000);

        let result = breaker.execute(failing_operation).await;
        match result {
            Err(CircuitBreakerError::OperationFailed(message)) => {
                assert_eq!(message, "boom");
            }
            other => panic!("expected OperationFailed, got {:?}", other.map(|_| ())),
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    /// Verify reset forces closed state and zeroes counters from any state.
    #[tokio::test]
    async fn test_reset_operation() {
        let breaker = create_test_breaker(2, 30_000);

        trip_breaker(&breaker, 2).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);

        let stats = breaker.stats();
        assert_eq!(stats.failure_count, 0);
        assert_eq!(stats.recent_errors_in_window, 0);
        assert!(stats.last_failure_time.is_none());
        assert_eq!(stats.half_open_requests, 0);
    }

    /// Verify success resets the consecutive failure counter.
    #[tokio::test]
    async fn test_success_resets_failure_counter() {
        let breaker = create_test_breaker(5, 30_000);

        trip_breaker(&breaker, 3).await;
        assert_eq!(breaker.stats().failure_count, 3);

        let _ = breaker.execute(successful_operation).await;

        assert_eq!(breaker.stats().failure_count, 0);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}

// ============================================================================
// Circuit Tripping Tests
// ============================================================================

mod circuit_tripping_tests {
    use super::*;

    /// Verify the threshold-minus-one failure leaves the circuit closed
    /// and the threshold-th failure opens it.
    #[tokio::test]
    async fn test_windowed_failures_trip_circuit() {
        let breaker = create_test_breaker(5, 30_000);

        for _ in 0..4 {
            let result = breaker.execute(failing_operation).await;
            assert!(matches!(
                result,
                Err(CircuitBreakerError::OperationFailed(_))
            ));
            assert_eq!(breaker.state(), CircuitState::Closed);
        }

        let result = breaker.execute(failing_operation).await;
        assert!(matches!(
            result,
            Err(CircuitBreakerError::OperationFailed(_))
        ));
        assert_eq!(breaker.state(), CircuitState::Open);

        let stats = breaker.stats();
        assert_eq!(stats.failure_count, 5);
        assert_eq!(stats.recent_errors_in_window, 5);
    }

    /// Verify open circuit rejects requests without invoking the operation.
    #[tokio::test]
    async fn test_open_state_rejects_without_invoking_operation() {
        let breaker = create_test_breaker(2, 30_000);
        trip_breaker(&breaker, 2).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        let invocations = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&invocations);

        let result = breaker
            .execute(|| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok("should not run".to_string())
            })
            .await;

        assert!(matches!(
            result,
            Err(CircuitBreakerError::CircuitOpen { .. })
        ));
        assert_eq!(invocations.load(Ordering::SeqCst), 0);
    }

    /// Verify the open error carries the breaker name for diagnostics.
    #[tokio::test]
    async fn test_open_error_names_the_breaker() {
        let breaker = create_test_breaker(1, 30_000);
        trip_breaker(&breaker, 1).await;

        let result = breaker.execute(successful_operation).await;
        match result {
            Err(CircuitBreakerError::CircuitOpen { name }) => {
                assert_eq!(name, "test-upstream");
            }
            other => panic!("expected CircuitOpen, got {:?}", other.map(|_| ())),
        }
    }

    /// Verify interleaved successes keep the window below the threshold.
    #[tokio::test]
    async fn test_interleaved_successes_do_not_trip() {
        let breaker = create_test_breaker(3, 30_000);

        // failure, success, failure, success... never three in the window
        // while failure_count keeps resetting; the window still counts all
        // failures, so cap at two failures between successes.
        let _ = breaker.execute(failing_operation).await;
        let _ = breaker.execute(successful_operation).await;
        let _ = breaker.execute(failing_operation).await;

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.stats().failure_count, 1);
    }
}

// ============================================================================
// Monitor Window Tests
// ============================================================================

mod monitor_window_tests {
    use super::*;

    fn short_window_breaker(error_threshold: u32) -> WindowedCircuitBreaker<String, String> {
        WindowedCircuitBreaker::new(CircuitBreakerConfig {
            name: "short-window".to_string(),
            error_threshold,
            open_duration_ms: 30_000,
            half_open_max_requests: 2,
            monitor_window_ms: 100,
        })
    }

    /// Verify failures older than the monitor window are pruned and do not
    /// contribute to tripping the circuit.
    #[tokio::test]
    async fn test_stale_failures_age_out_of_window() {
        let breaker = short_window_breaker(3);

        trip_breaker(&breaker, 2).await;
        assert_eq!(breaker.state(), CircuitState::Closed);

        // Let both failures fall out of the 100ms window.
        tokio::time::sleep(Duration::from_millis(150)).await;

        let _ = breaker.execute(failing_operation).await;
        assert_eq!(
            breaker.state(),
            CircuitState::Closed,
            "a single fresh failure must not trip a threshold of 3"
        );
    }

    /// Verify stats recompute the window against the current time and are
    /// idempotent with no new activity.
    #[tokio::test]
    async fn test_stats_window_count_is_recomputed() {
        let breaker = short_window_breaker(10);

        trip_breaker(&breaker, 2).await;
        assert_eq!(breaker.stats().recent_errors_in_window, 2);

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(breaker.stats().recent_errors_in_window, 0);
        // Repeated call with no new activity returns the same answer.
        assert_eq!(breaker.stats().recent_errors_in_window, 0);
        // The consecutive counter is untouched by window aging.
        assert_eq!(breaker.stats().failure_count, 2);
    }

    /// Verify last_failure_time survives window pruning.
    #[tokio::test]
    async fn test_last_failure_time_recorded() {
        let breaker = short_window_breaker(10);
        let before = crate::Timestamp::now();

        let _ = breaker.execute(failing_operation).await;

        let stats = breaker.stats();
        let last = stats.last_failure_time.expect("failure time recorded");
        assert!(last >= before);
    }
}

// ============================================================================
// Half-Open State Tests
// ============================================================================

mod half_open_tests {
    use super::*;

    /// Verify the first call after the cooldown transitions to half-open
    /// and is counted as the first trial.
    #[tokio::test]
    async fn test_first_call_after_cooldown_is_first_trial() {
        let breaker = Arc::new(create_test_breaker(2, 100));

        trip_breaker(&breaker, 2).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(150)).await;

        // Observe the breaker from inside the trial operation: the
        // transition happens before the operation runs.
        let observer = Arc::clone(&breaker);
        let result = breaker
            .execute(|| async move {
                let stats = observer.stats();
                assert_eq!(stats.state, CircuitState::HalfOpen);
                assert_eq!(stats.half_open_requests, 1);
                Ok("probe".to_string())
            })
            .await;

        assert!(result.is_ok());
    }

    /// Verify a single successful trial closes the circuit even though the
    /// trial budget allows more probes.
    #[tokio::test]
    async fn test_single_success_closes_circuit() {
        let breaker = create_test_breaker(2, 100);

        trip_breaker(&breaker, 2).await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        let result = breaker.execute(successful_operation).await;
        assert!(result.is_ok());
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.stats().failure_count, 0);
    }

    /// Verify a failed trial re-opens the circuit immediately.
    #[tokio::test]
    async fn test_failed_trial_reopens_circuit() {
        let breaker = create_test_breaker(2, 100);

        trip_breaker(&breaker, 2).await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        let result = breaker.execute(failing_operation).await;
        assert!(matches!(
            result,
            Err(CircuitBreakerError::OperationFailed(_))
        ));
        assert_eq!(breaker.state(), CircuitState::Open);

        // Fresh cooldown: the very next call is rejected again.
        let result = breaker.execute(successful_operation).await;
        assert!(matches!(
            result,
            Err(CircuitBreakerError::CircuitOpen { .. })
        ));
    }

    /// Verify trial admission stops at half_open_max_requests while trials
    /// are still in flight, and that the rejection does not invoke the
    /// wrapped operation or count as a breaker failure.
    #[tokio::test]
    async fn test_half_open_trial_budget_is_enforced() {
        let breaker = Arc::new(create_test_breaker(2, 100));

        trip_breaker(&breaker, 2).await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        // Park two trials inside the operation so both slots stay taken.
        let release = Arc::new(Notify::new());
        let mut trials = Vec::new();
        for _ in 0..2 {
            let breaker = Arc::clone(&breaker);
            let release = Arc::clone(&release);
            trials.push(tokio::spawn(async move {
                breaker
                    .execute(|| async move {
                        release.notified().await;
                        Ok("probe".to_string())
                    })
                    .await
            }));
        }

        // Let both tasks pass admission.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(breaker.stats().half_open_requests, 2);

        // Third call exceeds the budget.
        let invocations = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&invocations);
        let result = breaker
            .execute(|| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok("should not run".to_string())
            })
            .await;

        assert!(matches!(
            result,
            Err(CircuitBreakerError::HalfOpenLimitExceeded { .. })
        ));
        assert_eq!(invocations.load(Ordering::SeqCst), 0);

        // Release the parked trials; the first success closes the circuit.
        release.notify_waiters();
        for trial in trials {
            let outcome = trial.await.expect("trial task panicked");
            assert!(outcome.is_ok());
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}

// ============================================================================
// End-to-End Scenario Tests
// ============================================================================

mod scenario_tests {
    use super::*;

    /// Three failures open the circuit, the fourth call fails fast without
    /// touching the upstream, and after the cooldown a successful probe
    /// closes the circuit again.
    #[tokio::test]
    async fn test_full_open_probe_recover_cycle() {
        let breaker = WindowedCircuitBreaker::<String, String>::new(CircuitBreakerConfig {
            name: "cycle".to_string(),
            error_threshold: 3,
            open_duration_ms: 1_000,
            half_open_max_requests: 2,
            monitor_window_ms: 60_000,
        });

        for _ in 0..3 {
            let _ = breaker.execute(failing_operation).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let invocations = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&invocations);
        let result = breaker
            .execute(|| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok("nope".to_string())
            })
            .await;
        assert!(matches!(
            result,
            Err(CircuitBreakerError::CircuitOpen { .. })
        ));
        assert_eq!(invocations.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(1_100)).await;

        let result = breaker.execute(successful_operation).await;
        assert!(result.is_ok());
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.stats().failure_count, 0);
    }
}

// ============================================================================
// Thread Safety Tests
// ============================================================================

mod thread_safety_tests {
    use super::*;

    /// Verify concurrent mixed traffic leaves the breaker in a consistent
    /// state.
    #[tokio::test]
    async fn test_concurrent_mixed_traffic() {
        let breaker = Arc::new(create_test_breaker(1_000, 30_000));
        let mut handles = Vec::new();

        for i in 0..100 {
            let breaker = Arc::clone(&breaker);
            handles.push(tokio::spawn(async move {
                if i % 3 == 0 {
                    breaker.execute(failing_operation).await
                } else {
                    breaker.execute(successful_operation).await
                }
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }

        let stats = breaker.stats();
        assert_eq!(stats.state, breaker.state());
        assert_eq!(stats.state, CircuitState::Closed);
    }

    /// Verify concurrent failures trip the circuit exactly into Open.
    #[tokio::test]
    async fn test_concurrent_failures_trip_consistently() {
        let breaker = Arc::new(create_test_breaker(5, 30_000));
        let mut handles = Vec::new();

        for _ in 0..20 {
            let breaker = Arc::clone(&breaker);
            handles.push(tokio::spawn(
                async move { breaker.execute(failing_operation).await },
            ));
        }

        for handle in handles {
            let _ = handle.await;
        }

        let stats = breaker.stats();
        assert_eq!(stats.state, CircuitState::Open);
        assert_eq!(stats.state, breaker.state());
    }
}

// ============================================================================
// Registry-Specific Configuration Tests
// ============================================================================

mod registry_config_tests {
    use super::*;

    /// Verify the KvK preset trips after five failures.
    #[tokio::test]
    async fn test_kvk_configuration() {
        let breaker: WindowedCircuitBreaker<String, String> =
            WindowedCircuitBreaker::new(kvk_circuit_breaker_config());

        assert_eq!(breaker.state(), CircuitState::Closed);
        trip_breaker(&breaker, 5).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    /// Verify the GLEIF preset trips after five failures.
    #[tokio::test]
    async fn test_gleif_configuration() {
        let breaker: WindowedCircuitBreaker<String, String> =
            WindowedCircuitBreaker::new(gleif_circuit_breaker_config());

        trip_breaker(&breaker, 5).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    /// Verify the Peppol preset is more sensitive (three failures).
    #[tokio::test]
    async fn test_peppol_configuration_is_more_sensitive() {
        let breaker: WindowedCircuitBreaker<String, String> =
            WindowedCircuitBreaker::new(peppol_circuit_breaker_config());

        trip_breaker(&breaker, 3).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }
}
