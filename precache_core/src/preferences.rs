//! Preference store loading

use crate::error::{PrecacheError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// File name looked up by [`PreferenceLoader::load_dir`]
pub const PREFERENCES_FILE: &str = "precache.yaml";

/// User-facing capture preferences
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    /// Run workloads even outside the build phase
    #[serde(default)]
    pub force_run: bool,

    /// Log every captured signature; implies `force_run`
    #[serde(default)]
    pub verbose: bool,

    /// Per-unit overrides
    #[serde(default)]
    pub units: HashMap<String, UnitPreferences>,
}

/// Overrides for one logical unit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitPreferences {
    /// Disable capture for this unit entirely
    #[serde(default)]
    pub skip_capture: bool,
}

impl Preferences {
    /// Whether a unit has opted out of capture
    pub fn skip_capture(&self, unit: &str) -> bool {
        self.units.get(unit).map(|u| u.skip_capture).unwrap_or(false)
    }

    /// Set the opt-out for a unit
    pub fn set_skip_capture(&mut self, unit: &str, skip: bool) {
        self.units.entry(unit.to_string()).or_default().skip_capture = skip;
    }
}

/// Loads preference files
pub struct PreferenceLoader;

impl PreferenceLoader {
    /// Create a new loader
    pub fn new() -> Self {
        Self
    }

    /// Load preferences from a file. A missing file yields the defaults.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<Preferences> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("No preference file at {}, using defaults", path.display());
            return Ok(Preferences::default());
        }
        let content = std::fs::read_to_string(path)?;
        self.load_string(&content)
    }

    /// Load [`PREFERENCES_FILE`] from a directory
    pub fn load_dir<P: AsRef<Path>>(&self, dir: P) -> Result<Preferences> {
        self.load_file(dir.as_ref().join(PREFERENCES_FILE))
    }

    /// Load preferences from a YAML string
    pub fn load_string(&self, content: &str) -> Result<Preferences> {
        if content.trim().is_empty() {
            return Ok(Preferences::default());
        }
        let prefs: Preferences = serde_yaml::from_str(content)?;
        self.validate(&prefs)?;
        Ok(prefs)
    }

    /// Write preferences back to a file
    pub fn save_file<P: AsRef<Path>>(&self, path: P, prefs: &Preferences) -> Result<()> {
        self.validate(prefs)?;
        let content = serde_yaml::to_string(prefs)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self, prefs: &Preferences) -> Result<()> {
        for name in prefs.units.keys() {
            if name.is_empty() {
                return Err(PrecacheError::PreferenceError {
                    path: "units".to_string(),
                    message: "Unit name must not be empty".to_string(),
                });
            }
            if name.trim() != name {
                return Err(PrecacheError::PreferenceError {
                    path: format!("units.{}", name),
                    message: "Unit name has surrounding whitespace".to_string(),
                });
            }
        }

        if prefs.verbose && !prefs.force_run {
            tracing::debug!("verbose set without force_run; workloads will still be forced");
        }

        Ok(())
    }
}

impl Default for PreferenceLoader {
    fn default() -> Self {
        Self::new()
    }
}
