//! Directive sink boundary

use crate::error::Result;
use crate::types::CallSignature;
use parking_lot::Mutex;

/// Consumes captured signatures and turns them into compile directives
pub trait DirectiveSink: Send + Sync {
    /// Hand over one drained capture set, in first-seen order
    fn emit(&self, artifact: &str, signatures: &[CallSignature]) -> Result<()>;
}

/// One call to [`DirectiveSink::emit`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emission {
    pub artifact: String,
    pub signatures: Vec<CallSignature>,
}

/// Sink that keeps every emission in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    emissions: Mutex<Vec<Emission>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every emission so far
    pub fn emissions(&self) -> Vec<Emission> {
        self.emissions.lock().clone()
    }

    /// All emitted signatures, flattened across emissions
    pub fn signatures(&self) -> Vec<CallSignature> {
        self.emissions
            .lock()
            .iter()
            .flat_map(|e| e.signatures.iter().cloned())
            .collect()
    }
}

impl DirectiveSink for RecordingSink {
    fn emit(&self, artifact: &str, signatures: &[CallSignature]) -> Result<()> {
        self.emissions.lock().push(Emission {
            artifact: artifact.to_string(),
            signatures: signatures.to_vec(),
        });
        Ok(())
    }
}
