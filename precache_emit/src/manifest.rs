//! Per-artifact directive manifests on disk

use crate::directive::Directive;
use precache_core::{CallSignature, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Suffix appended to the artifact identifier
pub const MANIFEST_SUFFIX: &str = ".directives.json";

/// Everything emitted for one artifact, in emission order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub artifact: String,
    pub signatures: Vec<CallSignature>,
    /// Rendered form of each signature, same order
    pub directives: Vec<String>,
}

impl Manifest {
    pub fn new(artifact: &str, directives: &[Directive]) -> Self {
        Self {
            artifact: artifact.to_string(),
            signatures: directives.iter().map(|d| d.signature.clone()).collect(),
            directives: directives.iter().map(Directive::render).collect(),
        }
    }

    /// Path of an artifact's manifest inside `dir`
    pub fn path_in(dir: &Path, artifact: &str) -> PathBuf {
        dir.join(format!("{}{}", artifact, MANIFEST_SUFFIX))
    }

    /// Write the manifest into `dir`, replacing any previous one
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = Self::path_in(dir, &self.artifact);
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Read a manifest back
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
