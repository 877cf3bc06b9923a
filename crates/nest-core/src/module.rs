//! SandboxModule - the process-wide factory for sandbox runtimes.

use crate::binding::ModuleObject;
use crate::config::RuntimeOptions;
use crate::error::Result;
use crate::runtime::SandboxRuntime;
use crate::value::HostObject;
use std::sync::{Arc, OnceLock};

static MODULE: OnceLock<SandboxModule> = OnceLock::new();

/// Process-wide entry point. Stateless beyond its existence.
#[derive(Debug)]
pub struct SandboxModule {
    _private: (),
}

impl SandboxModule {
    /// The module instance, created on first use.
    pub fn global() -> &'static SandboxModule {
        MODULE.get_or_init(|| {
            tracing::debug!("Initialized sandbox module");
            SandboxModule { _private: () }
        })
    }

    /// Create a runtime with its own engine instance.
    pub fn create_runtime(&self, options: RuntimeOptions) -> Result<SandboxRuntime> {
        SandboxRuntime::create(options)
    }

    /// Whether sandboxes can be created. Always true once the module exists.
    pub fn is_available(&self) -> bool {
        true
    }

    /// The module as a dynamic host object exposing `createRuntime` and
    /// `isAvailable`, ready to be bound into a host global scope.
    pub fn host_object(&'static self) -> Arc<dyn HostObject> {
        Arc::new(ModuleObject::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_is_singleton() {
        assert!(std::ptr::eq(SandboxModule::global(), SandboxModule::global()));
    }

    #[test]
    fn test_is_available() {
        assert!(SandboxModule::global().is_available());
    }

    #[test]
    fn test_create_runtime_uses_options() {
        let options = RuntimeOptions::builder().timeout_ms(10).build().unwrap();
        let runtime = SandboxModule::global().create_runtime(options).unwrap();
        assert_eq!(runtime.timeout().as_millis(), 10);
        assert!(!runtime.is_disposed());
    }
}
