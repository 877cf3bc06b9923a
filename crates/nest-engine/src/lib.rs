//! # nest-engine
//!
//! QuickJS engine layer for nest sandboxes.
//! Provides a thin, thread-aware abstraction over rquickjs.
//!
//! ## Quick Start
//!
//! ```no_run
//! use nest_engine::EngineBuilder;
//!
//! # fn example() -> nest_engine::Result<()> {
//! let engine = EngineBuilder::new()
//!     .memory_limit(64 * 1024 * 1024)
//!     .build()?;
//!
//! let context = engine.create_context()?;
//! engine.enter(&context, |ctx| {
//!     let _ = ctx.eval::<(), _>("Promise.resolve(1).then(v => v + 1)");
//! })?;
//!
//! // Promise reactions only run on an explicit drain
//! let report = engine.drain_pending_jobs()?;
//! assert_eq!(report.executed, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Limits**: Memory ceiling, native stack ceiling and GC threshold per engine
//! - **Entry Gate**: Single-thread affinity with same-thread reentrancy
//! - **Deferred Release**: Handles dropped inside a callback are freed on exit
//! - **Job Draining**: Explicit, capped execution of queued promise jobs
//! - **Builder Pattern**: Ergonomic configuration with `EngineBuilder`

mod builder;
mod config;
mod engine;
mod error;
mod heap;

pub use builder::EngineBuilder;
pub use config::{EngineConfig, DEFAULT_DRAIN_LIMIT, DEFAULT_MAX_STACK_SIZE, DEFAULT_MEMORY_LIMIT};
pub use engine::{Engine, EngineContext};
pub use error::{EngineError, Result};
pub use heap::{DrainReport, HeapInfo};

pub use rquickjs;
