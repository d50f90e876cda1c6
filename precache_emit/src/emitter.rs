//! Directive emitter
//!
//! Turns captured signatures into compile directives, one ordered list per
//! artifact. Signatures already emitted for an artifact by an earlier capture
//! in the same build are skipped.

use crate::directive::Directive;
use crate::manifest::Manifest;
use indexmap::IndexMap;
use parking_lot::Mutex;
use precache_core::{CallSignature, DirectiveSink, PrecacheError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// A directive together with when it was first emitted
#[derive(Debug, Clone)]
pub struct EmittedDirective {
    pub directive: Directive,
    pub emitted_at: Instant,
}

impl EmittedDirective {
    fn new(signature: CallSignature) -> Self {
        Self {
            directive: Directive::new(signature),
            emitted_at: Instant::now(),
        }
    }
}

type ArtifactDirectives = IndexMap<CallSignature, EmittedDirective>;

/// Directive sink keeping every artifact's directives for the build
pub struct DirectiveEmitter {
    artifacts: Mutex<HashMap<String, ArtifactDirectives>>,
    /// Where manifests are written, if anywhere
    manifest_dir: Option<PathBuf>,
}

impl DirectiveEmitter {
    /// Create an emitter that keeps directives in memory only
    pub fn new() -> Self {
        Self {
            artifacts: Mutex::new(HashMap::new()),
            manifest_dir: None,
        }
    }

    /// Create an emitter that also writes a manifest per artifact
    pub fn with_manifest_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            artifacts: Mutex::new(HashMap::new()),
            manifest_dir: Some(dir.as_ref().to_path_buf()),
        }
    }

    /// Check if a signature already has a directive for an artifact
    pub fn is_emitted(&self, artifact: &str, signature: &CallSignature) -> bool {
        self.artifacts
            .lock()
            .get(artifact)
            .map(|entries| entries.contains_key(signature))
            .unwrap_or(false)
    }

    /// Directives for an artifact in emission order
    pub fn directives(&self, artifact: &str) -> Vec<Directive> {
        self.artifacts
            .lock()
            .get(artifact)
            .map(|entries| entries.values().map(|e| e.directive.clone()).collect())
            .unwrap_or_default()
    }

    /// Drop everything emitted so far
    pub fn clear(&self) {
        self.artifacts.lock().clear();
    }

    /// Get emission statistics
    pub fn stats(&self) -> EmitStats {
        let artifacts = self.artifacts.lock();
        EmitStats {
            artifacts: artifacts.len(),
            entries: artifacts.values().map(IndexMap::len).sum(),
            oldest: artifacts
                .values()
                .flat_map(|entries| entries.values())
                .map(|e| e.emitted_at)
                .min(),
        }
    }

    fn validate_artifact(artifact: &str) -> Result<()> {
        let reason = if artifact.trim().is_empty() {
            Some("artifact identifier is empty")
        } else if artifact.contains(|c: char| c == '/' || c == '\\')
            || artifact == "."
            || artifact == ".."
        {
            Some("artifact identifier must not be a path")
        } else {
            None
        };

        match reason {
            Some(message) => Err(PrecacheError::EmissionFailed {
                artifact: artifact.to_string(),
                message: message.to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl Default for DirectiveEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectiveSink for DirectiveEmitter {
    /// The manifest, when configured, is written before anything is committed
    /// in memory. A failed write leaves the artifact exactly as it was.
    fn emit(&self, artifact: &str, signatures: &[CallSignature]) -> Result<()> {
        Self::validate_artifact(artifact)?;

        let mut artifacts = self.artifacts.lock();
        let existing = artifacts.get(artifact);

        let mut fresh: Vec<CallSignature> = Vec::new();
        for signature in signatures {
            let known = existing.is_some_and(|entries| entries.contains_key(signature));
            if !known && !fresh.contains(signature) {
                fresh.push(signature.clone());
            }
        }

        let all: Vec<Directive> = existing
            .into_iter()
            .flat_map(|entries| entries.values().map(|e| e.directive.clone()))
            .chain(fresh.iter().cloned().map(Directive::new))
            .collect();

        if let Some(dir) = &self.manifest_dir {
            let path = Manifest::new(artifact, &all).write_to(dir)?;
            tracing::debug!("Wrote manifest {}", path.display());
        }

        let added = fresh.len();
        let entries = artifacts.entry(artifact.to_string()).or_default();
        for signature in fresh {
            entries.insert(signature.clone(), EmittedDirective::new(signature));
        }

        tracing::info!(
            "Emitted {} new directives for artifact {} ({} total)",
            added,
            artifact,
            all.len()
        );

        Ok(())
    }
}

/// Statistics about emitted directives
pub struct EmitStats {
    /// Number of artifacts with at least one emission
    pub artifacts: usize,
    /// Number of directives across all artifacts
    pub entries: usize,
    /// Earliest emission timestamp
    pub oldest: Option<Instant>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use precache_core::{FixedPhase, ModeFlags, Phase, Precompiler, RuntimeHost, Value};
    use std::sync::Arc;

    fn sig(routine: &str, types: &[&str]) -> CallSignature {
        CallSignature::new(routine, types.iter().copied())
    }

    #[test]
    fn test_dedupes_across_emissions() {
        let emitter = DirectiveEmitter::new();

        emitter
            .emit("app", &[sig("a", &["Int64"]), sig("b", &["String"])])
            .unwrap();
        emitter
            .emit("app", &[sig("b", &["String"]), sig("c", &[])])
            .unwrap();
        emitter.emit("lib", &[sig("a", &["Int64"])]).unwrap();

        let rendered: Vec<String> = emitter
            .directives("app")
            .iter()
            .map(Directive::render)
            .collect();
        assert_eq!(
            rendered,
            [
                "precompile(a, (Int64))",
                "precompile(b, (String))",
                "precompile(c, ())"
            ]
        );
        assert!(emitter.is_emitted("lib", &sig("a", &["Int64"])));
        assert!(!emitter.is_emitted("lib", &sig("b", &["String"])));

        let stats = emitter.stats();
        assert_eq!(stats.artifacts, 2);
        assert_eq!(stats.entries, 4);
        assert!(stats.oldest.is_some());

        emitter.clear();
        assert_eq!(emitter.stats().entries, 0);
    }

    #[test]
    fn test_rejects_bad_artifact() {
        let emitter = DirectiveEmitter::new();

        for artifact in ["", "  ", "../escape", "a/b", ".."] {
            let result = emitter.emit(artifact, &[sig("a", &["Int64"])]);
            assert!(
                matches!(result, Err(PrecacheError::EmissionFailed { .. })),
                "artifact {:?}",
                artifact
            );
        }
        assert_eq!(emitter.stats().artifacts, 0);
    }

    #[test]
    fn test_writes_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let emitter = DirectiveEmitter::with_manifest_dir(dir.path());

        emitter.emit("app", &[sig("a", &["Int64"])]).unwrap();
        emitter.emit("app", &[sig("b", &["Vector"])]).unwrap();

        let manifest = Manifest::load(Manifest::path_in(dir.path(), "app")).unwrap();
        assert_eq!(manifest.artifact, "app");
        assert_eq!(
            manifest.signatures,
            [sig("a", &["Int64"]), sig("b", &["Vector"])]
        );
        assert_eq!(manifest.directives[1], "precompile(b, (Vector))");
    }

    #[test]
    fn test_failed_manifest_write_commits_nothing() {
        let blocker = tempfile::NamedTempFile::new().unwrap();
        let emitter = DirectiveEmitter::with_manifest_dir(blocker.path());

        let result = emitter.emit("app", &[sig("a", &["Int64"])]);

        assert!(matches!(result, Err(PrecacheError::IoError(_))));
        assert!(!emitter.is_emitted("app", &sig("a", &["Int64"])));
        assert!(emitter.directives("app").is_empty());
        assert_eq!(emitter.stats().entries, 0);
    }

    #[test]
    fn test_capture_into_emitter() {
        let host = Arc::new(RuntimeHost::new());
        host.register("scale", ["Float64", "Int64"], |_, args| {
            let x = args[0].as_float().unwrap_or(0.0);
            let k = args[1].as_float().unwrap_or(0.0);
            Ok(Value::Float(x * k))
        });

        let emitter = Arc::new(DirectiveEmitter::new());
        let pc = Precompiler::new(
            "geometry",
            Arc::new(FixedPhase(Phase::Building)),
            Arc::new(ModeFlags::new()),
            host.clone(),
            emitter.clone(),
        );

        for _ in 0..2 {
            pc.compile_workload(|| host.invoke("scale", &[Value::Float(1.5), Value::Int(2)]))
                .unwrap();
        }

        assert_eq!(
            emitter.directives("geometry"),
            [Directive::new(sig("scale", &["Float64", "Int64"]))]
        );
    }
}
