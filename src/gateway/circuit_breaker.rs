//! Circuit breaker guarding the gateway's calls to the backing service.
//!
//! - **Closed**: calls pass through, consecutive failures are counted.
//! - **Open**: calls are rejected without running until `timeout` elapses.
//! - **HalfOpen**: trial calls run one at a time, other callers are rejected;
//!   `success_threshold` successes close the circuit, any failure opens it
//!   again.
//!
//! There is no terminal state, the breaker keeps cycling with the health of
//! the dependency.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: usize,
    /// How long the circuit stays open before a trial call.
    pub timeout: Duration,
    /// Successes in `HalfOpen` needed to close the circuit.
    pub success_threshold: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(60),
            success_threshold: 2,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder {
            config: Self::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    pub fn failure_threshold(mut self, threshold: usize) -> Self {
        self.config.failure_threshold = threshold.max(1);
        self
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.config.timeout = duration;
        self
    }

    pub fn success_threshold(mut self, threshold: usize) -> Self {
        self.config.success_threshold = threshold.max(1);
        self
    }

    pub fn build(self) -> CircuitBreakerConfig {
        self.config
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            State::Closed => "CLOSED",
            State::Open => "OPEN",
            State::HalfOpen => "HALF_OPEN",
        })
    }
}

#[derive(Error, Debug)]
pub enum CircuitBreakerError<E> {
    #[error("Circuit breaker is open")]
    Open,
    #[error("Operation failed: {0}")]
    Inner(E),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerMetrics {
    pub total_calls: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub total_rejections: u64,
}

#[derive(Debug, Default)]
struct Counters {
    calls: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    rejections: AtomicU64,
}

#[derive(Debug)]
struct Circuit {
    state: State,
    consecutive_failures: usize,
    trial_successes: usize,
    opened_at: Option<Instant>,
    /// At most one call tries the dependency while half open.
    trial_in_flight: bool,
}

impl Circuit {
    fn open(&mut self) {
        self.state = State::Open;
        self.opened_at = Some(Instant::now());
        self.trial_successes = 0;
    }

    fn close(&mut self) {
        self.state = State::Closed;
        self.consecutive_failures = 0;
        self.trial_successes = 0;
        self.opened_at = None;
    }
}

/// Admission of one call. A trial permit that is dropped without an outcome
/// (the caller gave up on the future) frees the trial slot again.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    admitted_as: State,
    recorded: bool,
}

impl Permit<'_> {
    fn record(mut self, succeeded: bool) {
        self.recorded = true;
        self.breaker.record(self.admitted_as, succeeded);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.recorded && self.admitted_as == State::HalfOpen {
            self.breaker.circuit().trial_in_flight = false;
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: Arc<CircuitBreakerConfig>,
    circuit: Arc<Mutex<Circuit>>,
    counters: Arc<Counters>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config: Arc::new(config),
            circuit: Arc::new(Mutex::new(Circuit {
                state: State::Closed,
                consecutive_failures: 0,
                trial_successes: 0,
                opened_at: None,
                trial_in_flight: false,
            })),
            counters: Arc::new(Counters::default()),
        }
    }

    fn circuit(&self) -> MutexGuard<'_, Circuit> {
        self.circuit.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> State {
        self.circuit().state
    }

    /// Runs `operation` if the circuit admits it. While half open only one
    /// trial runs at a time, concurrent callers are rejected like in `Open`.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.counters.calls.fetch_add(1, Ordering::Relaxed);

        let Some(permit) = self.admit() else {
            self.counters.rejections.fetch_add(1, Ordering::Relaxed);
            return Err(CircuitBreakerError::Open);
        };

        let outcome = operation().await;
        permit.record(outcome.is_ok());
        match outcome {
            Ok(result) => {
                self.counters.successes.fetch_add(1, Ordering::Relaxed);
                Ok(result)
            }
            Err(err) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                Err(CircuitBreakerError::Inner(err))
            }
        }
    }

    /// Like [`CircuitBreaker::call`], but a rejection or failure yields
    /// `fallback()` instead of an error.
    pub async fn call_with_fallback<F, Fut, T, E, FB>(&self, operation: F, fallback: FB) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
        FB: FnOnce() -> T,
    {
        match self.call(operation).await {
            Ok(result) => result,
            Err(CircuitBreakerError::Open) => {
                warn!("Circuit breaker rejected the call, serving fallback");
                fallback()
            }
            Err(CircuitBreakerError::Inner(e)) => {
                warn!("Guarded call failed due to: {}, serving fallback", e);
                fallback()
            }
        }
    }

    fn admit(&self) -> Option<Permit<'_>> {
        let mut circuit = self.circuit();

        let admitted_as = match circuit.state {
            State::Closed => State::Closed,
            State::Open => {
                let elapsed = circuit.opened_at.map_or(true, |at| at.elapsed() >= self.config.timeout);
                if !elapsed {
                    return None;
                }
                info!("Circuit breaker transitioning OPEN -> HALF_OPEN");
                circuit.state = State::HalfOpen;
                circuit.trial_successes = 0;
                circuit.trial_in_flight = true;
                State::HalfOpen
            }
            State::HalfOpen if circuit.trial_in_flight => return None,
            State::HalfOpen => {
                circuit.trial_in_flight = true;
                State::HalfOpen
            }
        };

        Some(Permit { breaker: self, admitted_as, recorded: false })
    }

    fn record(&self, admitted_as: State, succeeded: bool) {
        let mut circuit = self.circuit();
        if admitted_as == State::HalfOpen {
            circuit.trial_in_flight = false;
        }
        // Outcomes of calls admitted under an earlier state do not count.
        if circuit.state != admitted_as {
            return;
        }

        match (circuit.state, succeeded) {
            (State::Closed, true) => circuit.consecutive_failures = 0,
            (State::Closed, false) => {
                circuit.consecutive_failures += 1;
                if circuit.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        "Circuit breaker transitioning CLOSED -> OPEN after {} consecutive failures",
                        circuit.consecutive_failures
                    );
                    circuit.open();
                }
            }
            (State::HalfOpen, true) => {
                circuit.trial_successes += 1;
                if circuit.trial_successes >= self.config.success_threshold {
                    info!("Circuit breaker transitioning HALF_OPEN -> CLOSED");
                    circuit.close();
                }
            }
            (State::HalfOpen, false) => {
                warn!("Circuit breaker transitioning HALF_OPEN -> OPEN, trial call failed");
                circuit.open();
            }
            (State::Open, _) => {}
        }
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        CircuitBreakerMetrics {
            total_calls: self.counters.calls.load(Ordering::Relaxed),
            total_successes: self.counters.successes.load(Ordering::Relaxed),
            total_failures: self.counters.failures.load(Ordering::Relaxed),
            total_rejections: self.counters.rejections.load(Ordering::Relaxed),
        }
    }
}
