//! In-process runtime host
//!
//! A method table with dynamic dispatch on runtime argument types, a dispatch
//! hook point and a compile-mode switch. It stands in for the host toolchain
//! the capture engine is embedded into.

use crate::error::{PrecacheError, Result};
use crate::lockout::{CompileMode, ExecutionEngine};
use crate::monitor::{DispatchBus, DispatchListener, HookOwnership};
use crate::types::{CallSignature, Value, ANY_TYPE};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Body of a registered method
pub type Method = Arc<dyn Fn(&RuntimeHost, &[Value]) -> Result<Value> + Send + Sync>;

struct MethodEntry {
    pattern: Vec<String>,
    method: Method,
}

impl MethodEntry {
    /// Number of concretely typed positions, or `None` if the types don't fit
    fn specificity(&self, arg_types: &[String]) -> Option<usize> {
        if self.pattern.len() != arg_types.len() {
            return None;
        }
        let mut concrete = 0;
        for (want, got) in self.pattern.iter().zip(arg_types) {
            if want == ANY_TYPE {
                continue;
            }
            if want != got {
                return None;
            }
            concrete += 1;
        }
        Some(concrete)
    }
}

/// Runtime host with a dynamically dispatched method table
pub struct RuntimeHost {
    methods: RwLock<HashMap<String, Vec<MethodEntry>>>,
    listener: RwLock<Option<Arc<dyn DispatchListener>>>,
    ownership: HookOwnership,
    mode: RwLock<CompileMode>,
    depth: AtomicUsize,
}

/// Restores the call depth when a method body returns or unwinds
struct DepthGuard<'a>(&'a AtomicUsize);

impl<'a> DepthGuard<'a> {
    fn enter(depth: &'a AtomicUsize) -> Self {
        depth.fetch_add(1, Ordering::SeqCst);
        Self(depth)
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl RuntimeHost {
    /// Create an empty host
    pub fn new() -> Self {
        Self {
            methods: RwLock::new(HashMap::new()),
            listener: RwLock::new(None),
            ownership: HookOwnership::new(),
            mode: RwLock::new(CompileMode::Adaptive),
            depth: AtomicUsize::new(0),
        }
    }

    /// Register a method for a routine and an argument type pattern.
    ///
    /// [`ANY_TYPE`] in the pattern matches every concrete type. Registering
    /// the same pattern twice replaces the earlier method.
    pub fn register<R, I, T, F>(&self, routine: R, pattern: I, method: F)
    where
        R: Into<String>,
        I: IntoIterator<Item = T>,
        T: Into<String>,
        F: Fn(&RuntimeHost, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        let pattern: Vec<String> = pattern.into_iter().map(Into::into).collect();
        let mut methods = self.methods.write();
        let entries = methods.entry(routine.into()).or_default();
        entries.retain(|e| e.pattern != pattern);
        entries.push(MethodEntry {
            pattern,
            method: Arc::new(method),
        });
    }

    /// Call a routine, resolving the method from the runtime argument types.
    ///
    /// Publishes a dispatch event when the calling code is compiled: always
    /// under [`CompileMode::Forced`], and only from inside method bodies under
    /// [`CompileMode::Adaptive`] where top-level statements are interpreted.
    pub fn invoke(&self, routine: &str, args: &[Value]) -> Result<Value> {
        let signature = CallSignature::of_call(routine, args);
        let method = self.resolve(&signature)?;

        if self.is_compiled_context() {
            self.publish(&signature);
        }

        let _depth = DepthGuard::enter(&self.depth);
        method(self, args)
    }

    /// Call a routine whose target is known without looking at runtime types.
    ///
    /// Never publishes a dispatch event.
    pub fn invoke_static(&self, routine: &str, args: &[Value]) -> Result<Value> {
        let signature = CallSignature::of_call(routine, args);
        let method = self.resolve(&signature)?;

        let _depth = DepthGuard::enter(&self.depth);
        method(self, args)
    }

    fn is_compiled_context(&self) -> bool {
        *self.mode.read() == CompileMode::Forced || self.depth.load(Ordering::SeqCst) > 0
    }

    fn resolve(&self, signature: &CallSignature) -> Result<Method> {
        let methods = self.methods.read();
        methods
            .get(&signature.routine)
            .and_then(|entries| {
                entries
                    .iter()
                    .filter_map(|e| e.specificity(&signature.arg_types).map(|s| (s, e)))
                    .max_by_key(|(s, _)| *s)
                    .map(|(_, e)| e.method.clone())
            })
            .ok_or_else(|| PrecacheError::NoMatchingMethod {
                routine: signature.routine.clone(),
                arg_types: signature.arg_types.clone(),
            })
    }

    fn publish(&self, signature: &CallSignature) {
        let listener = self.listener.read().clone();
        if let Some(listener) = listener {
            tracing::trace!("Dispatch resolved: {}", signature);
            listener.on_dispatch(signature);
        }
    }
}

impl Default for RuntimeHost {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchBus for RuntimeHost {
    fn install_hook(&self, listener: Arc<dyn DispatchListener>) {
        *self.listener.write() = Some(listener);
    }

    fn remove_hook(&self) {
        *self.listener.write() = None;
    }

    fn ownership(&self) -> &HookOwnership {
        &self.ownership
    }
}

impl ExecutionEngine for RuntimeHost {
    fn compile_mode(&self) -> CompileMode {
        *self.mode.read()
    }

    fn set_compile_mode(&self, mode: CompileMode) {
        *self.mode.write() = mode;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<String>>);

    impl DispatchListener for Collect {
        fn on_dispatch(&self, signature: &CallSignature) {
            self.0.lock().push(signature.to_string());
        }
    }

    fn host_with_math() -> RuntimeHost {
        let host = RuntimeHost::new();
        host.register("double", ["Int64"], |_, args| {
            Ok(Value::Int(args[0].as_int().unwrap_or(0) * 2))
        });
        host.register("double", [ANY_TYPE], |_, _| Ok(Value::Null));
        host.register("quad", ["Int64"], |host, args| {
            let once = host.invoke("double", args)?;
            host.invoke("double", &[once])
        });
        host
    }

    #[test]
    fn test_most_specific_method_wins() {
        let host = host_with_math();

        assert_eq!(host.invoke("double", &[Value::Int(4)]).unwrap(), Value::Int(8));
        let text = Value::String("x".to_string());
        assert_eq!(host.invoke("double", &[text]).unwrap(), Value::Null);
    }

    #[test]
    fn test_no_matching_method() {
        let host = host_with_math();
        let err = host.invoke("quad", &[Value::Float(1.0)]).unwrap_err();
        assert_eq!(err.to_string(), "No method matching quad(Float64)");
    }

    #[test]
    fn test_adaptive_mode_publishes_only_inside_methods() {
        let host = host_with_math();
        let collect = Arc::new(Collect::default());
        host.install_hook(collect.clone());

        assert_eq!(host.invoke("quad", &[Value::Int(1)]).unwrap(), Value::Int(4));

        assert_eq!(*collect.0.lock(), ["double(Int64)", "double(Int64)"]);
    }

    #[test]
    fn test_forced_mode_publishes_top_level() {
        let host = host_with_math();
        let collect = Arc::new(Collect::default());
        host.install_hook(collect.clone());
        host.set_compile_mode(CompileMode::Forced);

        host.invoke("quad", &[Value::Int(1)]).unwrap();
        host.invoke_static("double", &[Value::Int(1)]).unwrap();

        assert_eq!(
            *collect.0.lock(),
            ["quad(Int64)", "double(Int64)", "double(Int64)"]
        );
    }

    #[test]
    fn test_nothing_published_without_hook() {
        let host = host_with_math();
        let collect = Arc::new(Collect::default());
        host.install_hook(collect.clone());
        host.remove_hook();
        host.set_compile_mode(CompileMode::Forced);

        host.invoke("quad", &[Value::Int(1)]).unwrap();

        assert!(collect.0.lock().is_empty());
    }
}
