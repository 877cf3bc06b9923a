//! Engine type - one QuickJS runtime and the gate that serializes entry to it.

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::heap::{DrainReport, HeapInfo};
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use rquickjs::{Context, Ctx, Runtime};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// A single QuickJS runtime: its own heap, stack ceiling and garbage collector.
///
/// The engine is single-threaded by contract. Every entry goes through a
/// reentrant gate so that a host callback running inside the engine can call
/// back into any context of the same engine on the same thread, while other
/// threads block until the outermost entry returns.
pub struct Engine {
    /// Unique identifier for this engine
    id: Uuid,
    /// Entry gate; declared before `runtime` so deferred resources drop first
    gate: ReentrantMutex<Gate>,
    /// Underlying QuickJS runtime
    runtime: Runtime,
    /// Configuration the runtime was created with
    config: EngineConfig,
}

/// Per-engine entry bookkeeping, only touched while the gate is held.
struct Gate {
    /// Nesting depth of the current owner thread
    depth: Cell<usize>,
    /// Engine handles released while the engine was executing
    retired: RefCell<Vec<Box<dyn Any + Send>>>,
    /// Work postponed until the outermost entry exits
    deferred: RefCell<Vec<Box<dyn FnOnce() + Send>>>,
}

/// Increments the gate depth for its lifetime.
struct Entry<'a> {
    gate: &'a Gate,
}

impl<'a> Entry<'a> {
    fn new(gate: &'a Gate) -> Self {
        gate.depth.set(gate.depth.get() + 1);
        Self { gate }
    }
}

impl Drop for Entry<'_> {
    fn drop(&mut self) {
        self.gate.depth.set(self.gate.depth.get() - 1);
    }
}

/// An execution context allocated by an [`Engine`].
///
/// Cloning is cheap and yields another handle to the same QuickJS context.
/// The context is freed when the last handle is dropped.
#[derive(Clone)]
pub struct EngineContext {
    engine: Uuid,
    /// Shared rather than cloned: every rquickjs `Context` value frees the
    /// JSContext once on drop
    inner: Arc<Context>,
}

impl EngineContext {
    /// Identifier of the engine that allocated this context.
    pub fn engine_id(&self) -> Uuid {
        self.engine
    }
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create a new engine with the given configuration.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or QuickJS fails to
    /// allocate the runtime.
    pub fn create(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let id = Uuid::new_v4();
        tracing::debug!(
            engine_id = %id,
            memory_limit = config.memory_limit,
            max_stack_size = config.max_stack_size,
            "Creating QuickJS engine"
        );

        let runtime = Runtime::new().map_err(|e| EngineError::Create(e.to_string()))?;
        runtime.set_memory_limit(config.memory_limit);
        runtime.set_max_stack_size(config.max_stack_size);
        if let Some(threshold) = config.gc_threshold {
            runtime.set_gc_threshold(threshold);
        }

        Ok(Self {
            id,
            gate: ReentrantMutex::new(Gate {
                depth: Cell::new(0),
                retired: RefCell::new(Vec::new()),
                deferred: RefCell::new(Vec::new()),
            }),
            runtime,
            config,
        })
    }

    /// Get the engine's unique identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Get the engine's configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Whether the calling thread is currently executing inside this engine.
    pub fn is_entered(&self) -> bool {
        let gate = self.gate.lock();
        gate.depth.get() > 0
    }

    /// Allocate a new context with the full set of standard intrinsics.
    ///
    /// # Errors
    /// Returns [`EngineError::Busy`] from inside a callback, or
    /// [`EngineError::Context`] if QuickJS cannot allocate the context.
    pub fn create_context(&self) -> Result<EngineContext> {
        let gate = self.exclusive("create a context")?;
        let _entry = Entry::new(&gate);

        let inner = Context::full(&self.runtime).map_err(|e| EngineError::Context(e.to_string()))?;
        tracing::trace!(engine_id = %self.id, "Allocated QuickJS context");

        Ok(EngineContext {
            engine: self.id,
            inner: Arc::new(inner),
        })
    }

    /// Run `f` inside `context`.
    ///
    /// The outermost entry on a thread takes the runtime lock. Nested entries
    /// from within a running callback reuse it. Resources retired while the
    /// engine was executing are released once the outermost entry returns.
    ///
    /// # Errors
    /// Returns [`EngineError::ForeignContext`] if `context` was allocated by
    /// another engine.
    pub fn enter<F, R>(&self, context: &EngineContext, f: F) -> Result<R>
    where
        F: for<'js> FnOnce(Ctx<'js>) -> R + Send,
        R: Send,
    {
        if context.engine != self.id {
            return Err(EngineError::ForeignContext {
                engine: self.id,
                context_engine: context.engine,
            });
        }

        let gate = self.gate.lock();
        let nested = gate.depth.get() > 0;

        let result = {
            let _entry = Entry::new(&gate);
            if nested {
                // SAFETY: this thread already holds the runtime lock through
                // the outer `Context::with` further up the stack, and `context`
                // keeps the JSContext alive for the duration of the call.
                let ctx = unsafe { Ctx::from_raw(context.inner.as_raw()) };
                f(ctx)
            } else {
                context.inner.with(f)
            }
        };

        if !nested {
            Self::settle(&gate);
        }
        Ok(result)
    }

    /// Hand a resource holding engine handles to the engine for release.
    ///
    /// Outside any entry the resource is dropped immediately. From inside a
    /// callback it is kept until the outermost entry exits, since freeing a
    /// context needs the runtime lock the caller is already holding.
    pub fn retire<T: Any + Send>(&self, resource: T) {
        let gate = self.gate.lock();
        gate.retired.borrow_mut().push(Box::new(resource));
        if gate.depth.get() == 0 {
            Self::flush_retired(&gate);
        } else {
            tracing::trace!(engine_id = %self.id, "Deferred release until engine exit");
        }
    }

    /// Run `task` once the engine is idle.
    ///
    /// Outside any entry the task runs immediately. From inside a callback it
    /// runs after the outermost entry exits, where exclusive operations such
    /// as [`drain_pending_jobs`](Self::drain_pending_jobs) are allowed again.
    pub fn defer(&self, task: impl FnOnce() + Send + 'static) {
        let gate = self.gate.lock();
        if gate.depth.get() == 0 {
            drop(gate);
            task();
            return;
        }
        gate.deferred.borrow_mut().push(Box::new(task));
        tracing::trace!(engine_id = %self.id, "Deferred task until engine exit");
    }

    /// Execute queued pending jobs until none remain or the drain cap is hit.
    ///
    /// Exceptions thrown by individual jobs are logged and discarded; the
    /// drain itself never fails once started.
    ///
    /// # Errors
    /// Returns [`EngineError::Busy`] from inside a callback.
    pub fn drain_pending_jobs(&self) -> Result<DrainReport> {
        let gate = self.exclusive("drain pending jobs")?;
        let start = Instant::now();
        let mut report = DrainReport::default();

        {
            let _entry = Entry::new(&gate);
            while report.total() < self.config.drain_limit {
                match self.runtime.execute_pending_job() {
                    Ok(true) => report.executed += 1,
                    Ok(false) => break,
                    Err(_) => {
                        report.failed += 1;
                        tracing::warn!(engine_id = %self.id, "Pending job threw, discarding");
                    }
                }
            }
            report.exhausted = self.runtime.is_job_pending();
        }
        Self::settle(&gate);

        if report.exhausted {
            tracing::warn!(
                engine_id = %self.id,
                drain_limit = self.config.drain_limit,
                "Drain cap reached with jobs still pending"
            );
        }
        tracing::debug!(
            engine_id = %self.id,
            executed = report.executed,
            failed = report.failed,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Drained pending jobs"
        );

        Ok(report)
    }

    /// Whether the engine has queued jobs waiting for a drain.
    pub fn is_job_pending(&self) -> bool {
        let _gate = self.gate.lock();
        self.runtime.is_job_pending()
    }

    /// Read the runtime's current memory usage.
    ///
    /// # Errors
    /// Returns [`EngineError::Busy`] from inside a callback.
    pub fn heap_info(&self) -> Result<HeapInfo> {
        let _gate = self.exclusive("read heap statistics")?;
        let usage = self.runtime.memory_usage();
        Ok(HeapInfo::from(&usage))
    }

    /// Force a full garbage collection cycle.
    ///
    /// # Errors
    /// Returns [`EngineError::Busy`] from inside a callback.
    pub fn run_gc(&self) -> Result<()> {
        let gate = self.exclusive("collect garbage")?;
        {
            let _entry = Entry::new(&gate);
            self.runtime.run_gc();
        }
        Self::settle(&gate);
        tracing::debug!(engine_id = %self.id, "Ran garbage collection");
        Ok(())
    }

    /// Lock the gate, refusing if this thread is already inside the engine.
    fn exclusive(&self, operation: &'static str) -> Result<ReentrantMutexGuard<'_, Gate>> {
        let gate = self.gate.lock();
        if gate.depth.get() > 0 {
            return Err(EngineError::Busy(operation));
        }
        Ok(gate)
    }

    /// Run deferred tasks, then release retired resources. Called with the
    /// gate held once the depth is back to zero.
    fn settle(gate: &Gate) {
        loop {
            let tasks = std::mem::take(&mut *gate.deferred.borrow_mut());
            if tasks.is_empty() {
                break;
            }
            for task in tasks {
                task();
            }
        }
        Self::flush_retired(gate);
    }

    /// Drop retired resources. Anything retired while a batch is being
    /// dropped (finalizers releasing further handles) is queued and picked
    /// up by the next iteration.
    fn flush_retired(gate: &Gate) {
        loop {
            let batch = std::mem::take(&mut *gate.retired.borrow_mut());
            if batch.is_empty() {
                break;
            }
            let _entry = Entry::new(gate);
            drop(batch);
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let gate = self.gate.lock();
        Self::flush_retired(&gate);
        tracing::debug!(engine_id = %self.id, "Freeing QuickJS engine");
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("id", &self.id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
