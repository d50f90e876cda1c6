//! Dispatch monitor
//!
//! Subscribes to the host's dynamic dispatch events while a capture scope is
//! armed and records every resolved signature into one [`CaptureSet`].
//!
//! The hook is process-global on the host side, so its ownership lives there
//! too: every bus carries one [`HookOwnership`], and every monitor built over
//! the same bus arms through it. A single thread may own the hook at a time.
//! Nested arming on the owning thread, from any monitor, only bumps a depth
//! counter: the host hook is installed by the outermost `begin` and removed by
//! the matching outermost `end`, and everything recorded at any depth flows
//! into the outermost set. Arming from a second thread fails with
//! [`PrecacheError::ReentrancyViolation`].

use crate::capture_set::CaptureSet;
use crate::error::{PrecacheError, Result};
use crate::types::CallSignature;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, ThreadId};

/// Receives dispatch resolution events from a host
pub trait DispatchListener: Send + Sync {
    /// Called each time a call is resolved from runtime argument types
    fn on_dispatch(&self, signature: &CallSignature);
}

/// The host's dispatch hook point
pub trait DispatchBus: Send + Sync {
    /// Route every dispatch resolution to `listener` until removed
    fn install_hook(&self, listener: Arc<dyn DispatchListener>);

    /// Stop routing dispatch events
    fn remove_hook(&self);

    /// Ownership record of this bus's hook, one per bus
    fn ownership(&self) -> &HookOwnership;
}

/// Listener installed on the host while armed
struct Recorder {
    set: Mutex<CaptureSet>,
    verbose: bool,
}

impl DispatchListener for Recorder {
    fn on_dispatch(&self, signature: &CallSignature) {
        let fresh = self.set.lock().record(signature.clone());
        if fresh && self.verbose {
            tracing::info!("Captured {}", signature);
        }
    }
}

struct Armed {
    owner: ThreadId,
    depth: usize,
    recorder: Arc<Recorder>,
}

/// Which thread holds a bus's hook and how deeply it is nested
#[derive(Default)]
pub struct HookOwnership {
    armed: Mutex<Option<Armed>>,
}

impl HookOwnership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a capture currently holds the hook
    pub fn is_armed(&self) -> bool {
        self.armed.lock().is_some()
    }
}

/// Nesting position of an armed monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nesting {
    /// This `begin` installed the host hook
    Outermost,
    /// Already armed by an enclosing scope on this thread
    Nested(usize),
}

/// Records dispatch events for the lifetime of a capture scope
pub struct DispatchMonitor {
    bus: Arc<dyn DispatchBus>,
}

impl DispatchMonitor {
    /// Create a monitor over a host dispatch bus
    pub fn new(bus: Arc<dyn DispatchBus>) -> Self {
        Self { bus }
    }

    /// Start recording into a fresh set, or join the enclosing one
    pub fn begin(&self, unit: &str, verbose: bool) -> Result<Nesting> {
        let current = thread::current().id();
        let mut armed = self.bus.ownership().armed.lock();

        if let Some(active) = armed.as_mut() {
            if active.owner != current {
                tracing::error!(
                    "Capture for unit {} attempted while thread {:?} holds the monitor",
                    unit,
                    active.owner
                );
                return Err(PrecacheError::ReentrancyViolation {
                    unit: unit.to_string(),
                });
            }
            active.depth += 1;
            tracing::debug!("Nested capture for unit {} at depth {}", unit, active.depth);
            return Ok(Nesting::Nested(active.depth));
        }

        let recorder = Arc::new(Recorder {
            set: Mutex::new(CaptureSet::new()),
            verbose,
        });
        self.bus.install_hook(recorder.clone());
        *armed = Some(Armed {
            owner: current,
            depth: 0,
            recorder,
        });

        tracing::debug!("Dispatch monitor armed for unit {}", unit);
        Ok(Nesting::Outermost)
    }

    /// Leave one nesting level.
    ///
    /// Returns the recorded set when the outermost level ends and the host
    /// hook has been removed; nested levels return `None`.
    pub fn end(&self) -> Option<CaptureSet> {
        let mut armed = self.bus.ownership().armed.lock();

        let Some(active) = armed.as_mut() else {
            tracing::warn!("Dispatch monitor ended while not armed");
            return None;
        };

        if active.depth > 0 {
            active.depth -= 1;
            return None;
        }

        let active = armed.take()?;
        self.bus.remove_hook();

        let set = std::mem::take(&mut *active.recorder.set.lock());
        tracing::debug!("Dispatch monitor disarmed with {} signatures", set.len());
        Some(set)
    }

    /// Whether any scope currently holds the monitor
    pub fn is_armed(&self) -> bool {
        self.bus.ownership().is_armed()
    }

    /// Signatures recorded so far by the active scope, in first-seen order
    pub fn recorded(&self) -> Vec<CallSignature> {
        match self.bus.ownership().armed.lock().as_ref() {
            Some(active) => active.recorder.set.lock().iter().cloned().collect(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakeBus {
        listener: Mutex<Option<Arc<dyn DispatchListener>>>,
        installs: Mutex<usize>,
        ownership: HookOwnership,
    }

    impl FakeBus {
        fn fire(&self, signature: CallSignature) {
            let listener = self.listener.lock().clone();
            if let Some(listener) = listener {
                listener.on_dispatch(&signature);
            }
        }
    }

    impl DispatchBus for FakeBus {
        fn install_hook(&self, listener: Arc<dyn DispatchListener>) {
            *self.installs.lock() += 1;
            *self.listener.lock() = Some(listener);
        }

        fn remove_hook(&self) {
            *self.listener.lock() = None;
        }

        fn ownership(&self) -> &HookOwnership {
            &self.ownership
        }
    }

    #[test]
    fn test_records_only_while_armed() {
        let bus = Arc::new(FakeBus::default());
        let monitor = DispatchMonitor::new(bus.clone());

        bus.fire(CallSignature::new("before", ["Int64"]));
        assert_eq!(monitor.begin("unit", false).unwrap(), Nesting::Outermost);
        bus.fire(CallSignature::new("during", ["Int64"]));
        bus.fire(CallSignature::new("during", ["Int64"]));
        let set = monitor.end().unwrap();
        bus.fire(CallSignature::new("after", ["Int64"]));

        let sigs: Vec<_> = set.iter().map(ToString::to_string).collect();
        assert_eq!(sigs, ["during(Int64)"]);
        assert!(!monitor.is_armed());
    }

    #[test]
    fn test_nested_begin_flattens_into_outer_set() {
        let bus = Arc::new(FakeBus::default());
        let monitor = DispatchMonitor::new(bus.clone());

        monitor.begin("outer", false).unwrap();
        bus.fire(CallSignature::new("a", ["Int64"]));
        assert_eq!(monitor.begin("inner", false).unwrap(), Nesting::Nested(1));
        bus.fire(CallSignature::new("b", ["Int64"]));
        assert!(monitor.end().is_none());
        assert!(monitor.is_armed());
        bus.fire(CallSignature::new("c", ["Int64"]));

        assert_eq!(monitor.recorded().len(), 3);
        let set = monitor.end().unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(*bus.installs.lock(), 1);
    }

    #[test]
    fn test_second_thread_is_rejected() {
        let bus = Arc::new(FakeBus::default());
        let monitor = Arc::new(DispatchMonitor::new(bus));

        monitor.begin("owner", false).unwrap();

        let other = monitor.clone();
        let result = thread::spawn(move || other.begin("intruder", false))
            .join()
            .unwrap();

        assert!(matches!(
            result,
            Err(PrecacheError::ReentrancyViolation { ref unit }) if unit == "intruder"
        ));
        assert!(monitor.end().is_some());
    }

    #[test]
    fn test_monitors_on_one_bus_share_ownership() {
        let bus = Arc::new(FakeBus::default());
        let outer = DispatchMonitor::new(bus.clone());
        let inner = DispatchMonitor::new(bus.clone());

        outer.begin("outer", false).unwrap();
        assert_eq!(inner.begin("inner", false).unwrap(), Nesting::Nested(1));
        bus.fire(CallSignature::new("a", ["Int64"]));
        assert!(inner.end().is_none());
        bus.fire(CallSignature::new("b", ["Int64"]));

        let other = DispatchMonitor::new(bus.clone());
        let result = thread::spawn(move || other.begin("intruder", false))
            .join()
            .unwrap();
        assert!(matches!(
            result,
            Err(PrecacheError::ReentrancyViolation { .. })
        ));

        let set = outer.end().unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(*bus.installs.lock(), 1);
        assert!(!bus.ownership().is_armed());
    }

    #[test]
    fn test_end_without_begin() {
        let monitor = DispatchMonitor::new(Arc::new(FakeBus::default()));
        assert!(monitor.end().is_none());
    }
}
