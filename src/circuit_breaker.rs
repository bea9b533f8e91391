//! # Circuit Breaker Module
//!
//! Guards operator notification delivery. After repeated delivery failures
//! the breaker opens and notices fail fast until the reset window passes, so a
//! broken admin bot does not pile up stalled background tasks.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::config::NotifierRecoveryConfig;

#[derive(Debug, Default)]
struct BreakerState {
    failure_count: u32,
    last_failure_time: Option<Instant>,
}

/// Circuit breaker for notification delivery
///
/// # State Machine
///
/// - **Closed**: Normal operation, notices are delivered
/// - **Open**: Failure threshold reached, notices fail fast
/// - **Half-Open**: Reset window elapsed, the next attempt decides
///
/// # Configuration
///
/// Uses [`NotifierRecoveryConfig`] for:
/// - `failure_threshold`: Consecutive failures before opening (default: 5)
/// - `reset_secs`: Time before attempting delivery again (default: 60s)
#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    config: NotifierRecoveryConfig,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    ///
    /// ```rust
    /// use perfume_support_bot::circuit_breaker::CircuitBreaker;
    /// use perfume_support_bot::config::NotifierRecoveryConfig;
    ///
    /// let breaker = CircuitBreaker::new(NotifierRecoveryConfig::default());
    /// assert!(!breaker.is_open());
    /// ```
    pub fn new(config: NotifierRecoveryConfig) -> Self {
        Self {
            state: Mutex::new(BreakerState::default()),
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Check if the breaker is open (delivery should be skipped)
    ///
    /// Resets to closed once the reset window has elapsed since the last failure.
    pub fn is_open(&self) -> bool {
        let mut state = self.lock();

        if state.failure_count >= self.config.failure_threshold {
            if let Some(last_time) = state.last_failure_time {
                if last_time.elapsed() < Duration::from_secs(self.config.reset_secs) {
                    return true;
                }
                *state = BreakerState::default();
            }
        }
        false
    }

    /// Record a failed delivery
    pub fn record_failure(&self) {
        let mut state = self.lock();
        state.failure_count = state.failure_count.saturating_add(1);
        state.last_failure_time = Some(Instant::now());
    }

    /// Record a successful delivery, closing the breaker
    pub fn record_success(&self) {
        *self.lock() = BreakerState::default();
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }
}
