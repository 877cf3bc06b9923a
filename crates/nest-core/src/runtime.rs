//! SandboxRuntime type - one engine instance and the contexts it owns.

use crate::config::RuntimeOptions;
use crate::console::{self, ConsoleSink};
use crate::context::SandboxContext;
use crate::error::{Result, SandboxError};
use chrono::{DateTime, Utc};
use nest_engine::{DrainReport, Engine, HeapInfo};
use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Unique identifier for a sandbox runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuntimeId(Uuid);

impl RuntimeId {
    /// Create a new random runtime ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RuntimeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RuntimeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RuntimeId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Owns one engine instance (its own heap, stack and GC) and is the factory
/// for contexts sharing it.
///
/// Pending jobs queued by sandbox code are never run implicitly; they wait
/// for [`drain_pending_jobs`](Self::drain_pending_jobs) or disposal.
#[derive(Clone)]
pub struct SandboxRuntime {
    inner: Arc<RuntimeInner>,
}

struct RuntimeInner {
    id: RuntimeId,
    created_at: DateTime<Utc>,
    options: RuntimeOptions,
    sink: ConsoleSink,
    /// Reentrant so a callback may create or dispose on this runtime.
    /// Borrows of the state are never held across engine calls.
    state: ReentrantMutex<RefCell<RuntimeState>>,
}

struct RuntimeState {
    engine: Option<Arc<Engine>>,
    contexts: Vec<SandboxContext>,
    disposed: bool,
}

impl SandboxRuntime {
    /// Create a runtime with its own engine instance.
    ///
    /// # Errors
    /// [`SandboxError::InvalidArgument`] for invalid limits,
    /// [`SandboxError::EngineConstruction`] if the engine cannot be allocated.
    pub fn create(options: RuntimeOptions) -> Result<Self> {
        options.validate()?;

        let id = RuntimeId::new();
        let start = Instant::now();
        let engine = Engine::create(options.engine.clone())
            .map_err(|e| SandboxError::EngineConstruction(e.to_string()))?;
        let sink = options.console.clone().unwrap_or_else(console::tracing_sink);

        tracing::info!(
            runtime_id = %id,
            engine_id = %engine.id(),
            timeout_ms = options.timeout.as_millis() as u64,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Created sandbox runtime"
        );

        Ok(Self {
            inner: Arc::new(RuntimeInner {
                id,
                created_at: Utc::now(),
                options,
                sink,
                state: ReentrantMutex::new(RefCell::new(RuntimeState {
                    engine: Some(Arc::new(engine)),
                    contexts: Vec::new(),
                    disposed: false,
                })),
            }),
        })
    }

    /// Get the runtime's unique identifier.
    pub fn id(&self) -> RuntimeId {
        self.inner.id
    }

    /// Get the runtime creation time.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    /// Get the options the runtime was created with.
    pub fn options(&self) -> &RuntimeOptions {
        &self.inner.options
    }

    /// The configured timeout. Accepted but not enforced.
    pub fn timeout(&self) -> Duration {
        self.inner.options.timeout
    }

    /// Whether the runtime has been disposed.
    pub fn is_disposed(&self) -> bool {
        let state = self.inner.state.lock();
        let disposed = state.borrow().disposed;
        disposed
    }

    /// Number of live contexts owned by this runtime.
    pub fn context_count(&self) -> usize {
        let state = self.inner.state.lock();
        let count = state
            .borrow()
            .contexts
            .iter()
            .filter(|c| !c.is_disposed())
            .count();
        count
    }

    /// Create a new context sharing this runtime's engine.
    ///
    /// # Errors
    /// [`SandboxError::Disposed`] after disposal, [`SandboxError::Busy`] from
    /// inside a sandbox callback.
    pub fn create_context(&self) -> Result<SandboxContext> {
        // The state lock is not held while the engine allocates; a dispose
        // racing with creation is caught by the re-check below.
        let engine = self.inner.engine()?;
        let context = SandboxContext::create(engine, Arc::clone(&self.inner.sink))?;

        let state = self.inner.state.lock();
        let mut owned = state.borrow_mut();
        if owned.disposed {
            drop(owned);
            drop(state);
            context.dispose();
            return Err(SandboxError::runtime_disposed());
        }
        let before = owned.contexts.len();
        owned.contexts.retain(|c| !c.is_disposed());
        let pruned = before - owned.contexts.len();
        owned.contexts.push(context.clone());

        tracing::debug!(
            runtime_id = %self.inner.id,
            context_id = %context.id(),
            contexts = owned.contexts.len(),
            pruned,
            "Registered context"
        );
        Ok(context)
    }

    /// Run queued pending jobs (promise reactions) until none remain or the
    /// engine's drain cap is reached. Job exceptions are swallowed.
    pub fn drain_pending_jobs(&self) -> Result<DrainReport> {
        let engine = self.inner.engine()?;
        Ok(engine.drain_pending_jobs()?)
    }

    /// Current memory usage of the runtime's engine.
    pub fn heap_info(&self) -> Result<HeapInfo> {
        let engine = self.inner.engine()?;
        Ok(engine.heap_info()?)
    }

    /// Force a full garbage collection cycle.
    pub fn collect_garbage(&self) -> Result<()> {
        let engine = self.inner.engine()?;
        Ok(engine.run_gc()?)
    }

    /// Dispose the runtime. Idempotent.
    ///
    /// Drains pending jobs (errors swallowed), disposes every owned context,
    /// then releases the engine instance. Called from inside a sandbox
    /// callback, the runtime is marked disposed at once and the teardown runs
    /// when the outermost engine call returns.
    pub fn dispose(&self) {
        self.inner.dispose();
    }
}

impl RuntimeInner {
    /// Engine of a live runtime.
    fn engine(&self) -> Result<Arc<Engine>> {
        let guard = self.state.lock();
        let state = guard.borrow();
        if state.disposed {
            return Err(SandboxError::runtime_disposed());
        }
        let engine = state.engine.clone();
        engine.ok_or_else(SandboxError::runtime_disposed)
    }

    fn dispose(&self) {
        let (engine, contexts) = {
            let state = self.state.lock();
            let mut state = state.borrow_mut();
            if state.disposed {
                return;
            }
            state.disposed = true;
            let engine = state.engine.take();
            let contexts = std::mem::take(&mut state.contexts);
            (engine, contexts)
        };

        match engine {
            Some(engine) if engine.is_entered() => {
                let id = self.id;
                let owner = Arc::clone(&engine);
                tracing::debug!(runtime_id = %id, "Deferring runtime teardown until the engine is idle");
                owner.defer(move || teardown(id, Some(engine), contexts));
            }
            engine => teardown(self.id, engine, contexts),
        }
    }
}

/// Drain pending jobs, dispose the contexts, release the engine.
fn teardown(id: RuntimeId, engine: Option<Arc<Engine>>, contexts: Vec<SandboxContext>) {
    let start = Instant::now();
    if let Some(engine) = &engine {
        match engine.drain_pending_jobs() {
            Ok(report) => tracing::debug!(
                runtime_id = %id,
                executed = report.executed,
                failed = report.failed,
                "Drained pending jobs before teardown"
            ),
            Err(e) => tracing::warn!(
                runtime_id = %id,
                error = %e,
                "Skipping pending-job drain during teardown"
            ),
        }
    }

    let context_count = contexts.len();
    for context in &contexts {
        context.dispose();
    }
    drop(contexts);
    drop(engine);

    tracing::info!(
        runtime_id = %id,
        contexts = context_count,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Disposed sandbox runtime"
    );
}

impl Drop for RuntimeInner {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for SandboxRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxRuntime")
            .field("id", &self.inner.id)
            .field("disposed", &self.is_disposed())
            .field("timeout", &self.inner.options.timeout)
            .finish()
    }
}
