//! Interpreter lockout

use std::sync::Arc;

/// How the host executes code it has not compiled yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompileMode {
    /// The host may run top-level statements in its interpreter
    #[default]
    Adaptive,
    /// Every statement is compiled before it runs
    Forced,
}

/// The host's execution-mode switch
pub trait ExecutionEngine: Send + Sync {
    fn compile_mode(&self) -> CompileMode;

    fn set_compile_mode(&self, mode: CompileMode);
}

/// Forces compilation for as long as it is held.
///
/// Dropping the guard restores the mode that was active when it was created,
/// on every exit path including unwinding.
#[must_use = "the lockout is released as soon as the guard is dropped"]
pub struct InterpreterLockout {
    engine: Arc<dyn ExecutionEngine>,
    previous: CompileMode,
}

impl InterpreterLockout {
    /// Switch the engine to [`CompileMode::Forced`]
    pub fn enable(engine: Arc<dyn ExecutionEngine>) -> Self {
        let previous = engine.compile_mode();
        engine.set_compile_mode(CompileMode::Forced);
        tracing::debug!("Interpreter lockout enabled (was {:?})", previous);
        Self { engine, previous }
    }

    /// Mode that will be restored on release
    pub fn previous(&self) -> CompileMode {
        self.previous
    }

    /// Release explicitly
    pub fn disable(self) {
        drop(self);
    }
}

impl Drop for InterpreterLockout {
    fn drop(&mut self) {
        self.engine.set_compile_mode(self.previous);
        tracing::debug!("Interpreter lockout released, restored {:?}", self.previous);
    }
}
