//! Process-wide mode flags and the run gate

use crate::phase::Phase;
use crate::preferences::Preferences;
use parking_lot::RwLock;
use std::collections::HashSet;

/// Process-wide capture switches.
///
/// Read-mostly. Every scope entry takes one [`FlagSnapshot`] so the gate
/// never sees a half-applied update.
#[derive(Debug, Default)]
pub struct ModeFlags {
    state: RwLock<FlagSnapshot>,
}

/// Consistent view of the flags at one instant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagSnapshot {
    pub force_run: bool,
    pub verbose: bool,
    skipped: HashSet<String>,
}

impl FlagSnapshot {
    /// Whether a unit has opted out of capture
    pub fn skip_capture(&self, unit: &str) -> bool {
        self.skipped.contains(unit)
    }

    /// Whether workloads run outside the build phase
    pub fn forced(&self) -> bool {
        self.force_run || self.verbose
    }

    /// Gate decision for a unit in a given phase.
    ///
    /// Forcing overrides the phase but never an opt-out.
    pub fn should_run(&self, unit: &str, phase: Phase) -> bool {
        if self.skip_capture(unit) {
            return false;
        }
        phase == Phase::Building || self.forced()
    }
}

impl ModeFlags {
    /// All flags off
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize from a loaded preference store
    pub fn from_preferences(prefs: &Preferences) -> Self {
        let flags = Self::new();
        flags.reload(prefs);
        flags
    }

    /// Replace every flag with the values from a preference store
    pub fn reload(&self, prefs: &Preferences) {
        let skipped = prefs
            .units
            .iter()
            .filter(|(_, u)| u.skip_capture)
            .map(|(name, _)| name.clone())
            .collect();

        *self.state.write() = FlagSnapshot {
            force_run: prefs.force_run,
            verbose: prefs.verbose,
            skipped,
        };
    }

    /// Take a consistent copy of all flags
    pub fn snapshot(&self) -> FlagSnapshot {
        self.state.read().clone()
    }

    /// Gate decision for a unit in a given phase
    pub fn should_run(&self, unit: &str, phase: Phase) -> bool {
        self.state.read().should_run(unit, phase)
    }

    pub fn force_run(&self) -> bool {
        self.state.read().force_run
    }

    pub fn set_force_run(&self, force: bool) {
        self.state.write().force_run = force;
    }

    pub fn verbose(&self) -> bool {
        self.state.read().verbose
    }

    pub fn set_verbose(&self, verbose: bool) {
        self.state.write().verbose = verbose;
    }

    pub fn skip_capture(&self, unit: &str) -> bool {
        self.state.read().skip_capture(unit)
    }

    pub fn set_skip_capture(&self, unit: &str, skip: bool) {
        let mut state = self.state.write();
        if skip {
            state.skipped.insert(unit.to_string());
        } else {
            state.skipped.remove(unit);
        }
    }
}
