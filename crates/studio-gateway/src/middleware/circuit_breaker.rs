//! Circuit breaker for outbound providers.
//!
//! When a provider keeps failing (overloaded, unreachable, timing out), the
//! circuit opens and the service answers `Overloaded` immediately instead of
//! queueing more users behind a dead upstream.
//!
//! ```text
//!      ┌──────────┐ failures ┌──────────┐ open_timeout ┌───────────┐
//!      │  CLOSED  │ ───────► │   OPEN   │ ───────────► │ HALF-OPEN │
//!      └──────────┘          └──────────┘              └───────────┘
//!            ▲                     ▲     probe failure       │
//!            │                     └─────────────────────────┤
//!            └───────────────────────────────────────────────┘
//!                          success_threshold probes ok
//! ```
//!
//! Only upstream-health failures should be recorded; a rejected prompt or a
//! bad user password says nothing about the provider.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - calls pass through
    Closed,
    /// Calls are rejected until `open_timeout` elapses
    Open,
    /// Probe calls are let through
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub enabled: bool,
    /// Consecutive failures before opening
    pub failure_threshold: u32,
    /// Successful probes in half-open before closing
    pub success_threshold: u32,
    /// Time spent open before probing
    pub open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            success_threshold: 1,
            open_timeout: Duration::from_secs(30),
        }
    }
}

struct ProviderCircuit {
    state: CircuitState,
    consecutive_failures: u32,
    probe_successes: u32,
    opened_at: Option<Instant>,
    last_transition: Instant,
    total_calls: u64,
    total_failures: u64,
}

impl ProviderCircuit {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            probe_successes: 0,
            opened_at: None,
            last_transition: Instant::now(),
            total_calls: 0,
            total_failures: 0,
        }
    }

    fn transition(&mut self, to: CircuitState) {
        self.state = to;
        self.last_transition = Instant::now();
        match to {
            CircuitState::Open => {
                self.opened_at = Some(self.last_transition);
                self.probe_successes = 0;
            }
            CircuitState::HalfOpen => self.probe_successes = 0,
            CircuitState::Closed => {
                self.opened_at = None;
                self.consecutive_failures = 0;
                self.probe_successes = 0;
            }
        }
    }
}

/// Circuits keyed by provider name ("generation", "enhancement", ...).
pub struct CircuitBreakerManager {
    circuits: RwLock<HashMap<&'static str, ProviderCircuit>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreakerManager {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            circuits: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Admit a call to `provider`, or return how long the circuit stays open.
    pub fn try_acquire(&self, provider: &'static str) -> Result<(), Duration> {
        if !self.config.enabled {
            return Ok(());
        }
        let mut circuits = self.circuits.write();
        let circuit = circuits.entry(provider).or_insert_with(ProviderCircuit::new);
        circuit.total_calls += 1;

        if circuit.state != CircuitState::Open {
            return Ok(());
        }
        let elapsed = circuit
            .opened_at
            .map(|at| at.elapsed())
            .unwrap_or(self.config.open_timeout);
        if elapsed >= self.config.open_timeout {
            info!(provider, "Circuit half-open, probing provider");
            circuit.transition(CircuitState::HalfOpen);
            Ok(())
        } else {
            let remaining = self.config.open_timeout - elapsed;
            debug!(provider, remaining_ms = remaining.as_millis() as u64, "Circuit open, rejecting call");
            Err(remaining)
        }
    }

    pub fn record_success(&self, provider: &'static str) {
        if !self.config.enabled {
            return;
        }
        let mut circuits = self.circuits.write();
        let Some(circuit) = circuits.get_mut(provider) else {
            return;
        };
        match circuit.state {
            CircuitState::Closed => circuit.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                circuit.probe_successes += 1;
                if circuit.probe_successes >= self.config.success_threshold {
                    info!(provider, "Circuit closed, provider recovered");
                    circuit.transition(CircuitState::Closed);
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self, provider: &'static str) {
        if !self.config.enabled {
            return;
        }
        let mut circuits = self.circuits.write();
        let circuit = circuits.entry(provider).or_insert_with(ProviderCircuit::new);
        circuit.total_failures += 1;

        match circuit.state {
            CircuitState::Closed => {
                circuit.consecutive_failures += 1;
                if circuit.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        provider,
                        failures = circuit.consecutive_failures,
                        open_secs = self.config.open_timeout.as_secs(),
                        "Circuit opened"
                    );
                    circuit.transition(CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                warn!(provider, "Probe failed, circuit reopened");
                circuit.transition(CircuitState::Open);
            }
            CircuitState::Open => circuit.opened_at = Some(Instant::now()),
        }
    }

    pub fn state(&self, provider: &str) -> CircuitState {
        self.circuits
            .read()
            .get(provider)
            .map(|c| c.state)
            .unwrap_or(CircuitState::Closed)
    }

    /// Snapshot of every circuit, sorted by provider name.
    pub fn stats(&self) -> Vec<CircuitStats> {
        let circuits = self.circuits.read();
        let mut stats: Vec<_> = circuits
            .iter()
            .map(|(provider, circuit)| CircuitStats {
                provider: (*provider).to_string(),
                state: circuit.state,
                consecutive_failures: circuit.consecutive_failures,
                total_calls: circuit.total_calls,
                total_failures: circuit.total_failures,
                time_in_state_ms: circuit.last_transition.elapsed().as_millis() as u64,
            })
            .collect();
        stats.sort_by(|a, b| a.provider.cmp(&b.provider));
        stats
    }

    pub fn reset(&self, provider: &str) {
        if let Some(circuit) = self.circuits.write().get_mut(provider) {
            info!(provider, "Circuit manually reset");
            circuit.transition(CircuitState::Closed);
        }
    }
}

/// Statistics for one provider circuit
#[derive(Debug, Clone, Serialize)]
pub struct CircuitStats {
    pub provider: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub total_calls: u64,
    pub total_failures: u64,
    pub time_in_state_ms: u64,
}
