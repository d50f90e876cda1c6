//! Precache Core
//!
//! Scoped capture of the call specializations a workload exercises.
//! A capture scope runs only in the build phase (or when forced), locks out
//! the host interpreter, records every dynamically dispatched call signature
//! reached by its body and hands them to a directive sink so exactly those
//! specializations can be compiled ahead of time.

pub mod capture_set;
pub mod error;
pub mod flags;
pub mod host;
pub mod lockout;
pub mod monitor;
pub mod phase;
pub mod preferences;
pub mod scope;
pub mod sink;
pub mod types;

pub use capture_set::CaptureSet;
pub use error::{PrecacheError, Result};
pub use flags::ModeFlags;
pub use host::RuntimeHost;
pub use lockout::{CompileMode, ExecutionEngine, InterpreterLockout};
pub use monitor::{DispatchBus, DispatchListener, DispatchMonitor, HookOwnership};
pub use phase::{EnvPhase, FixedPhase, Phase, PhaseOracle};
pub use preferences::{PreferenceLoader, Preferences};
pub use scope::{CaptureGuard, CaptureReport, Precompiler};
pub use sink::{DirectiveSink, RecordingSink};
pub use types::{CallSignature, Value};
