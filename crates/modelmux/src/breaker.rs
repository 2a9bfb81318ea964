//! Circuit Breaker Bank: per-model health state machines.
//!
//! Each model id owns one breaker: Closed → Open after a threshold of
//! consecutive failures, Open → HalfOpen once the cooldown elapses,
//! HalfOpen → Closed on a successful probe or back to Open (with a
//! doubled cooldown, capped) on a failed one.
//!
//! The bank exposes transition operations only, never raw state. All
//! transitions happen under one lock, so two requests racing to probe
//! the same HalfOpen model cannot both be admitted: `admit()` claims the
//! probe slot atomically and the loser is told to fall back.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::config::BreakerConfig;

/// Observable breaker state, for routing decisions and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Healthy; requests dispatched normally.
    Closed,
    /// Tripped; no live dispatch until the cooldown expires.
    Open,
    /// Cooldown expired; a single probe may go through.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Outcome of asking the bank to admit a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Breaker is Closed; dispatch normally.
    Allow,
    /// Breaker moved to HalfOpen and this caller holds the probe slot.
    AllowProbe,
    /// Open within cooldown, or another probe is already in flight.
    Deny,
}

#[derive(Debug, Clone, Copy)]
enum State {
    Closed { consecutive_failures: u32 },
    Open { opened_at: Instant, cooldown: Duration },
    HalfOpen { probe_in_flight: bool },
}

#[derive(Debug, Clone, Copy)]
struct ModelBreaker {
    state: State,
    /// Times this breaker has opened since its last success, drives the
    /// exponential cooldown.
    reopen_count: u32,
}

impl ModelBreaker {
    fn new() -> Self {
        Self {
            state: State::Closed {
                consecutive_failures: 0,
            },
            reopen_count: 0,
        }
    }
}

/// Bank of per-model circuit breakers. Cheap to share (`Arc`) across
/// concurrent request pipelines; this is the only write-shared state in
/// the orchestrator.
#[derive(Debug)]
pub struct BreakerBank {
    config: BreakerConfig,
    inner: Mutex<HashMap<String, ModelBreaker>>,
}

impl BreakerBank {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(HashMap::new()),
        }
    }

    fn cooldown_for(&self, reopen_count: u32) -> Duration {
        let factor = 1u32.checked_shl(reopen_count).unwrap_or(u32::MAX);
        self.config
            .base_cooldown
            .saturating_mul(factor)
            .min(self.config.cooldown_cap)
    }

    /// Atomically decide whether a dispatch to `model` may proceed.
    ///
    /// Closed admits unconditionally. Open past its cooldown flips to
    /// HalfOpen and hands this caller the probe slot; Open within the
    /// cooldown, or HalfOpen with a probe already in flight, is denied.
    pub fn admit(&self, model: &str) -> Admission {
        let mut bank = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let breaker = bank.entry(model.to_string()).or_insert_with(ModelBreaker::new);

        match breaker.state {
            State::Closed { .. } => Admission::Allow,
            State::Open { opened_at, cooldown } => {
                if opened_at.elapsed() >= cooldown {
                    breaker.state = State::HalfOpen {
                        probe_in_flight: true,
                    };
                    tracing::info!(model, "breaker half-open, admitting probe");
                    Admission::AllowProbe
                } else {
                    Admission::Deny
                }
            }
            State::HalfOpen { probe_in_flight } => {
                if probe_in_flight {
                    Admission::Deny
                } else {
                    breaker.state = State::HalfOpen {
                        probe_in_flight: true,
                    };
                    Admission::AllowProbe
                }
            }
        }
    }

    /// Record a successful attempt: resets the breaker to Closed and
    /// clears the cooldown escalation.
    pub fn record_success(&self, model: &str) {
        let mut bank = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let breaker = bank.entry(model.to_string()).or_insert_with(ModelBreaker::new);
        if !matches!(breaker.state, State::Closed { consecutive_failures: 0 }) {
            tracing::debug!(model, "breaker reset to closed");
        }
        breaker.state = State::Closed {
            consecutive_failures: 0,
        };
        breaker.reopen_count = 0;
    }

    /// Record a failed attempt: increments the failure count and may
    /// flip the breaker to Open. A failed HalfOpen probe reopens with a
    /// doubled cooldown, up to the cap.
    pub fn record_failure(&self, model: &str) {
        let mut bank = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let breaker = bank.entry(model.to_string()).or_insert_with(ModelBreaker::new);

        match breaker.state {
            State::Closed {
                consecutive_failures,
            } => {
                let failures = consecutive_failures + 1;
                if failures >= self.config.failure_threshold {
                    let cooldown = self.cooldown_for(breaker.reopen_count);
                    breaker.reopen_count += 1;
                    breaker.state = State::Open {
                        opened_at: Instant::now(),
                        cooldown,
                    };
                    tracing::warn!(
                        model,
                        failures,
                        cooldown_secs = cooldown.as_secs(),
                        "breaker opened"
                    );
                } else {
                    breaker.state = State::Closed {
                        consecutive_failures: failures,
                    };
                }
            }
            State::HalfOpen { .. } => {
                let cooldown = self.cooldown_for(breaker.reopen_count);
                breaker.reopen_count += 1;
                breaker.state = State::Open {
                    opened_at: Instant::now(),
                    cooldown,
                };
                tracing::warn!(
                    model,
                    cooldown_secs = cooldown.as_secs(),
                    "probe failed, breaker reopened"
                );
            }
            // A late failure against an already-open breaker changes nothing.
            State::Open { .. } => {}
        }
    }

    /// Release a probe slot claimed by `admit` without recording an
    /// outcome, for dispatch paths that abort before reaching the
    /// backend. A no-op unless this breaker holds an in-flight probe.
    pub fn release_probe(&self, model: &str) {
        let mut bank = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(breaker) = bank.get_mut(model) {
            if matches!(
                breaker.state,
                State::HalfOpen {
                    probe_in_flight: true
                }
            ) {
                breaker.state = State::HalfOpen {
                    probe_in_flight: false,
                };
                tracing::debug!(model, "probe slot released without an attempt");
            }
        }
    }

    /// Non-mutating snapshot of the breaker state for `model`. An Open
    /// breaker whose cooldown has elapsed reports HalfOpen (the flip
    /// itself only happens inside `admit`).
    pub fn state(&self, model: &str) -> CircuitState {
        let bank = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match bank.get(model).map(|b| b.state) {
            None | Some(State::Closed { .. }) => CircuitState::Closed,
            Some(State::Open { opened_at, cooldown }) => {
                if opened_at.elapsed() >= cooldown {
                    CircuitState::HalfOpen
                } else {
                    CircuitState::Open
                }
            }
            Some(State::HalfOpen { .. }) => CircuitState::HalfOpen,
        }
    }

    /// Consecutive failures recorded while Closed.
    pub fn failure_count(&self, model: &str) -> u32 {
        let bank = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match bank.get(model).map(|b| b.state) {
            Some(State::Closed {
                consecutive_failures,
            }) => consecutive_failures,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank(threshold: u32, cooldown_ms: u64) -> BreakerBank {
        BreakerBank::new(BreakerConfig {
            failure_threshold: threshold,
            base_cooldown: Duration::from_millis(cooldown_ms),
            cooldown_cap: Duration::from_millis(cooldown_ms * 8),
        })
    }

    #[test]
    fn test_starts_closed() {
        let bank = bank(3, 10_000);
        assert_eq!(bank.state("m"), CircuitState::Closed);
        assert_eq!(bank.admit("m"), Admission::Allow);
    }

    #[test]
    fn test_opens_at_threshold() {
        let bank = bank(3, 10_000);
        bank.record_failure("m");
        bank.record_failure("m");
        assert_eq!(bank.state("m"), CircuitState::Closed);
        assert_eq!(bank.failure_count("m"), 2);
        bank.record_failure("m");
        assert_eq!(bank.state("m"), CircuitState::Open);
        assert_eq!(bank.admit("m"), Admission::Deny);
    }

    #[test]
    fn test_success_resets_failures() {
        let bank = bank(3, 10_000);
        bank.record_failure("m");
        bank.record_failure("m");
        bank.record_success("m");
        assert_eq!(bank.failure_count("m"), 0);
        bank.record_failure("m");
        bank.record_failure("m");
        assert_eq!(bank.state("m"), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_after_cooldown_single_probe() {
        let bank = bank(1, 0);
        bank.record_failure("m");
        // Zero cooldown: the next admit claims the probe slot.
        assert_eq!(bank.admit("m"), Admission::AllowProbe);
        // Second caller must not get a second probe.
        assert_eq!(bank.admit("m"), Admission::Deny);
    }

    #[test]
    fn test_probe_success_closes() {
        let bank = bank(1, 0);
        bank.record_failure("m");
        assert_eq!(bank.admit("m"), Admission::AllowProbe);
        bank.record_success("m");
        assert_eq!(bank.state("m"), CircuitState::Closed);
        assert_eq!(bank.admit("m"), Admission::Allow);
    }

    #[test]
    fn test_probe_failure_reopens_with_doubled_cooldown() {
        let bank = bank(1, 50);
        bank.record_failure("m");
        assert_eq!(bank.state("m"), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(bank.admit("m"), Admission::AllowProbe);
        bank.record_failure("m");
        assert_eq!(bank.state("m"), CircuitState::Open);

        // Doubled cooldown: the base interval is no longer enough.
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(bank.admit("m"), Admission::Deny);
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(bank.admit("m"), Admission::AllowProbe);
    }

    #[test]
    fn test_cooldown_capped() {
        let bank = bank(1, 50);
        // cooldown_for doubles per reopen but never exceeds the cap (8x).
        assert_eq!(bank.cooldown_for(0), Duration::from_millis(50));
        assert_eq!(bank.cooldown_for(2), Duration::from_millis(200));
        assert_eq!(bank.cooldown_for(10), Duration::from_millis(400));
        assert_eq!(bank.cooldown_for(40), Duration::from_millis(400));
    }

    #[test]
    fn test_released_probe_slot_admits_next_caller() {
        let bank = bank(1, 0);
        bank.record_failure("m");
        assert_eq!(bank.admit("m"), Admission::AllowProbe);
        assert_eq!(bank.admit("m"), Admission::Deny);
        // An aborted dispatch hands the slot back instead of pinning
        // the model at Deny until some other outcome is recorded.
        bank.release_probe("m");
        assert_eq!(bank.admit("m"), Admission::AllowProbe);
    }

    #[test]
    fn test_release_probe_ignores_closed_breaker() {
        let bank = bank(3, 10_000);
        bank.record_failure("m");
        bank.release_probe("m");
        assert_eq!(bank.state("m"), CircuitState::Closed);
        assert_eq!(bank.failure_count("m"), 1);
    }

    #[test]
    fn test_concurrent_probe_exclusion() {
        use std::sync::Arc;

        let bank = Arc::new(bank(1, 0));
        bank.record_failure("m");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let bank = Arc::clone(&bank);
            handles.push(std::thread::spawn(move || bank.admit("m")));
        }
        let admissions: Vec<Admission> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let probes = admissions
            .iter()
            .filter(|a| **a == Admission::AllowProbe)
            .count();
        assert_eq!(probes, 1, "exactly one probe must be admitted");
        assert!(admissions
            .iter()
            .all(|a| matches!(a, Admission::AllowProbe | Admission::Deny)));
    }

    #[test]
    fn test_independent_models() {
        let bank = bank(1, 10_000);
        bank.record_failure("down");
        assert_eq!(bank.state("down"), CircuitState::Open);
        assert_eq!(bank.state("up"), CircuitState::Closed);
        assert_eq!(bank.admit("up"), Admission::Allow);
    }
}
