//! Insertion-ordered set of captured call signatures

use crate::types::CallSignature;
use indexmap::IndexMap;

/// Signatures recorded during one capture scope.
///
/// Each signature appears once, in first-seen order. The hit count per
/// signature is kept for introspection only.
#[derive(Debug, Default)]
pub struct CaptureSet {
    entries: IndexMap<CallSignature, usize>,
}

impl CaptureSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a signature. Returns true the first time it is seen.
    pub fn record(&mut self, signature: CallSignature) -> bool {
        match self.entries.get_mut(&signature) {
            Some(hits) => {
                *hits += 1;
                false
            }
            None => {
                self.entries.insert(signature, 1);
                true
            }
        }
    }

    /// Check whether a signature has been recorded
    pub fn contains(&self, signature: &CallSignature) -> bool {
        self.entries.contains_key(signature)
    }

    /// Number of dispatch events that resolved to this signature
    pub fn hits(&self, signature: &CallSignature) -> usize {
        self.entries.get(signature).copied().unwrap_or(0)
    }

    /// Number of distinct signatures
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate signatures in first-seen order
    pub fn iter(&self) -> impl Iterator<Item = &CallSignature> {
        self.entries.keys()
    }

    /// Take every signature out of the set, leaving it empty
    pub fn drain(&mut self) -> Vec<CallSignature> {
        self.entries.drain(..).map(|(sig, _)| sig).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_is_idempotent() {
        let mut set = CaptureSet::new();
        let sig = CallSignature::new("length", ["Vector"]);

        assert!(set.record(sig.clone()));
        for _ in 0..4 {
            assert!(!set.record(sig.clone()));
        }

        assert_eq!(set.len(), 1);
        assert_eq!(set.hits(&sig), 5);
    }

    #[test]
    fn test_drain_keeps_first_seen_order() {
        let mut set = CaptureSet::new();
        set.record(CallSignature::new("b", ["Int64"]));
        set.record(CallSignature::new("a", ["Int64"]));
        set.record(CallSignature::new("b", ["Int64"]));
        set.record(CallSignature::new("c", ["String"]));

        let drained = set.drain();
        let names: Vec<&str> = drained.iter().map(|s| s.routine.as_str()).collect();
        assert_eq!(names, ["b", "a", "c"]);
        assert!(set.is_empty());
    }
}
