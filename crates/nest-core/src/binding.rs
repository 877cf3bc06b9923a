//! Dynamic host-object surface.
//!
//! Presents the module, its runtimes and their contexts as [`HostObject`]s
//! with camelCase members, the shape a host engine binds into its global
//! scope. Argument checking happens here; the typed API does the work.

use crate::config::RuntimeOptions;
use crate::context::SandboxContext;
use crate::error::{Result, SandboxError};
use crate::module::SandboxModule;
use crate::runtime::SandboxRuntime;
use crate::value::{HostObject, HostValue};
use std::sync::Arc;
use std::time::Duration;

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|name| name.to_string()).collect()
}

/// Read `{ timeout?: number }` over the defaults.
pub fn runtime_options_from(value: Option<&HostValue>) -> Result<RuntimeOptions> {
    let mut options = RuntimeOptions::default();
    if let Some(value) = value {
        if let HostValue::Number(millis) = value.get("timeout")? {
            if millis.is_finite() && millis >= 0.0 {
                options.timeout = Duration::from_millis(millis as u64);
            }
        }
    }
    Ok(options)
}

// ============================================================================
// Module
// ============================================================================

/// `createRuntime(options?)`, `isAvailable()`.
pub(crate) struct ModuleObject {
    module: &'static SandboxModule,
}

impl ModuleObject {
    pub(crate) fn new(module: &'static SandboxModule) -> Self {
        Self { module }
    }
}

impl HostObject for ModuleObject {
    fn get(&self, name: &str) -> Result<HostValue> {
        let module = self.module;
        Ok(match name {
            "createRuntime" => HostValue::function(move |args| {
                let options = runtime_options_from(args.first())?;
                let runtime = module.create_runtime(options)?;
                Ok(HostValue::HostObject(Arc::new(RuntimeObject::new(runtime))))
            }),
            "isAvailable" => {
                HostValue::function(move |_| Ok(HostValue::Bool(module.is_available())))
            }
            _ => HostValue::Undefined,
        })
    }

    fn property_names(&self) -> Vec<String> {
        names(&["createRuntime", "isAvailable"])
    }
}

// ============================================================================
// Runtime
// ============================================================================

/// `createContext()`, `dispose()`.
pub struct RuntimeObject {
    runtime: SandboxRuntime,
}

impl RuntimeObject {
    pub fn new(runtime: SandboxRuntime) -> Self {
        Self { runtime }
    }

    /// The runtime behind this object.
    pub fn runtime(&self) -> &SandboxRuntime {
        &self.runtime
    }
}

impl HostObject for RuntimeObject {
    fn get(&self, name: &str) -> Result<HostValue> {
        let runtime = self.runtime.clone();
        Ok(match name {
            "createContext" => HostValue::function(move |_| {
                let context = runtime.create_context()?;
                Ok(HostValue::HostObject(Arc::new(ContextObject::new(context))))
            }),
            "dispose" => HostValue::function(move |_| {
                runtime.dispose();
                Ok(HostValue::Undefined)
            }),
            _ => HostValue::Undefined,
        })
    }

    fn property_names(&self) -> Vec<String> {
        names(&["createContext", "dispose"])
    }
}

// ============================================================================
// Context
// ============================================================================

/// `eval(code)`, `setGlobal(name, value)`, `getGlobal(name)`, `dispose()`
/// and the live `isDisposed` attribute.
pub struct ContextObject {
    context: SandboxContext,
}

impl ContextObject {
    pub fn new(context: SandboxContext) -> Self {
        Self { context }
    }

    /// The context behind this object.
    pub fn context(&self) -> &SandboxContext {
        &self.context
    }
}

impl HostObject for ContextObject {
    fn get(&self, name: &str) -> Result<HostValue> {
        let context = self.context.clone();
        Ok(match name {
            "eval" => HostValue::function(move |args| match args.first() {
                Some(HostValue::String(code)) => context.eval(code),
                _ => Err(SandboxError::InvalidArgument(
                    "eval requires a string argument".into(),
                )),
            }),
            "setGlobal" => HostValue::function(move |args| match args {
                [HostValue::String(name), value, ..] => {
                    context.set_global(name, value.clone())?;
                    Ok(HostValue::Undefined)
                }
                _ => Err(SandboxError::InvalidArgument(
                    "setGlobal requires (name: string, value: any)".into(),
                )),
            }),
            "getGlobal" => HostValue::function(move |args| match args.first() {
                Some(HostValue::String(name)) => context.get_global(name),
                _ => Err(SandboxError::InvalidArgument(
                    "getGlobal requires a string argument".into(),
                )),
            }),
            "dispose" => HostValue::function(move |_| {
                context.dispose();
                Ok(HostValue::Undefined)
            }),
            "isDisposed" => HostValue::Bool(context.is_disposed()),
            _ => HostValue::Undefined,
        })
    }

    fn property_names(&self) -> Vec<String> {
        names(&["eval", "setGlobal", "getGlobal", "dispose", "isDisposed"])
    }
}
