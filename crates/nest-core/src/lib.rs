//! # nest-core
//!
//! Nested, isolated QuickJS sandboxes for a host application.
//!
//! This crate provides the bridge between host values and sandbox engines:
//! runtime and context lifecycle, recursive value marshaling, and function
//! proxies that let each side call the other on the same native stack.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     nest-core (host)                     │
//! ├──────────────────────────────────────────────────────────┤
//! │                                                          │
//! │  ┌─────────────────┐                                     │
//! │  │  SandboxModule  │  createRuntime() / isAvailable()    │
//! │  └─────────────────┘                                     │
//! │           │                                              │
//! │           ▼                                              │
//! │  ┌─────────────────┐     ┌──────────────────────────┐   │
//! │  │ SandboxRuntime  │────▶│  Engine (nest-engine)    │   │
//! │  │ - createContext │     │  one QuickJS runtime     │   │
//! │  │ - drain / gc    │     └──────────────────────────┘   │
//! │  └─────────────────┘                 ▲                   │
//! │           │                          │ enter             │
//! │           ▼                          │                   │
//! │  ┌─────────────────┐     ┌──────────────────────────┐   │
//! │  │ SandboxContext  │────▶│  Marshaler               │   │
//! │  │ - eval()        │     │  HostValue ⇄ JS value    │   │
//! │  │ - setGlobal()   │     └──────────────────────────┘   │
//! │  │ - getGlobal()   │                 │                   │
//! │  └─────────────────┘                 ▼                   │
//! │                          ┌──────────────────────────┐   │
//! │                          │  Proxies                 │   │
//! │                          │  callback registry (in)  │   │
//! │                          │  export table (out)      │   │
//! │                          └──────────────────────────┘   │
//! │                                                          │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use nest_core::{HostValue, RuntimeOptions, SandboxModule};
//!
//! # fn example() -> nest_core::Result<()> {
//! let runtime = SandboxModule::global().create_runtime(RuntimeOptions::default())?;
//! let ctx = runtime.create_context()?;
//!
//! // Host function callable from the sandbox
//! ctx.set_global(
//!     "double",
//!     HostValue::function(|args| {
//!         let x = args.first().and_then(HostValue::as_f64).unwrap_or(0.0);
//!         Ok(HostValue::Number(x * 2.0))
//!     }),
//! )?;
//! assert_eq!(ctx.eval("double(21)")?, HostValue::Number(42.0));
//!
//! // Sandbox function callable from the host
//! ctx.eval("function add(a, b) { return a + b; }")?;
//! let add = ctx.get_global("add")?;
//! let sum = add.as_function().unwrap().call(&[HostValue::from(1), HostValue::from(2)])?;
//! assert_eq!(sum, HostValue::Number(3.0));
//!
//! // Cleanup
//! runtime.dispose();
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Isolation**: Each runtime owns a separate heap; contexts have separate globals
//! - **Marshaling**: Primitives, arrays and objects copied; functions proxied
//! - **Reentrancy**: Host callbacks may call back into any context of the runtime
//! - **Disposal**: Idempotent, ordered teardown with inert proxies afterwards
//! - **Host Surface**: Dynamic `HostObject` view for binding into a host engine

mod binding;
mod config;
mod console;
mod context;
mod error;
mod marshal;
mod module;
mod proxy;
mod runtime;
mod value;

pub use binding::{runtime_options_from, ContextObject, RuntimeObject};
pub use config::{RuntimeOptions, RuntimeOptionsBuilder, DEFAULT_TIMEOUT};
pub use console::{tracing_sink, ConsoleSink, PRINT_PRIMITIVE};
pub use context::{ContextId, SandboxContext};
pub use error::{DisposedKind, Result, SandboxError};
pub use marshal::MAX_DEPTH;
pub use module::SandboxModule;
pub use runtime::{RuntimeId, SandboxRuntime};
pub use value::{ExportRef, HostFunction, HostObject, HostValue};

pub use nest_engine::{DrainReport, EngineConfig, HeapInfo};
