//! Build phase detection

use crate::error::{PrecacheError, Result};
use std::fmt;

/// Environment variable consulted by [`EnvPhase`]
pub const PHASE_ENV_VAR: &str = "PRECACHE_PHASE";

/// Whether the process is producing compiled artifacts or running normally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Building,
    Running,
}

impl Phase {
    /// Parse a phase name, ignoring case and surrounding whitespace
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "building" | "build" => Ok(Phase::Building),
            "running" | "run" => Ok(Phase::Running),
            other => Err(PrecacheError::GateMisconfiguration(format!(
                "unrecognized phase {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Building => f.write_str("building"),
            Phase::Running => f.write_str("running"),
        }
    }
}

/// Answers "are we currently in build mode?"
///
/// Sampled once per scope entry and never cached by callers.
pub trait PhaseOracle: Send + Sync {
    /// Current phase, or a misconfiguration error when no answer is possible
    fn phase(&self) -> Result<Phase>;
}

/// Oracle with a constant answer
#[derive(Debug, Clone, Copy)]
pub struct FixedPhase(pub Phase);

impl PhaseOracle for FixedPhase {
    fn phase(&self) -> Result<Phase> {
        Ok(self.0)
    }
}

/// Oracle reading the phase from an environment variable
#[derive(Debug, Clone)]
pub struct EnvPhase {
    var: String,
}

impl EnvPhase {
    /// Read from [`PHASE_ENV_VAR`]
    pub fn new() -> Self {
        Self::with_var(PHASE_ENV_VAR)
    }

    /// Read from a custom variable
    pub fn with_var(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvPhase {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseOracle for EnvPhase {
    fn phase(&self) -> Result<Phase> {
        match std::env::var(&self.var) {
            Ok(raw) => Phase::parse(&raw),
            Err(_) => Err(PrecacheError::GateMisconfiguration(format!(
                "{} is not set",
                self.var
            ))),
        }
    }
}
