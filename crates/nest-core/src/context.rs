//! SandboxContext type - one isolated global scope inside a runtime's engine.

use crate::console::{self, ConsoleSink};
use crate::error::{Result, SandboxError};
use crate::marshal;
use crate::proxy::{self, caught, CallbackRegistry, ExportTable};
use crate::value::{HostFunction, HostValue};
use chrono::{DateTime, Utc};
use nest_engine::{Engine, EngineContext};
use parking_lot::{Mutex, ReentrantMutex};
use rquickjs::context::EvalOptions;
use rquickjs::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier for a sandbox context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(Uuid);

impl ContextId {
    /// Create a new random context ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ContextId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Top-level script, sloppy mode, global scope.
pub(crate) fn script_options() -> EvalOptions {
    let mut options = EvalOptions::default();
    options.global = true;
    options.strict = false;
    options
}

/// An isolated global scope sharing its runtime's engine.
///
/// Handles are cheap to clone; all clones refer to the same context. The
/// context is disposed explicitly with [`dispose`](Self::dispose), when its
/// runtime is disposed, or when the last handle is dropped.
#[derive(Clone)]
pub struct SandboxContext {
    inner: Arc<ContextInner>,
}

/// Shared state behind every handle and proxy of one context.
pub(crate) struct ContextInner {
    pub(crate) id: ContextId,
    created_at: DateTime<Utc>,
    /// Serializes public operations; reentrant so callbacks can call back in
    lock: ReentrantMutex<()>,
    /// Engine scope, `None` once disposed
    handle: Mutex<Option<EngineHandle>>,
    pub(crate) callbacks: Arc<CallbackRegistry>,
    pub(crate) exports: ExportTable,
    disposed: AtomicBool,
}

#[derive(Clone)]
struct EngineHandle {
    engine: Arc<Engine>,
    context: EngineContext,
}

impl SandboxContext {
    /// Allocate a context on `engine` and seed its console.
    pub(crate) fn create(engine: Arc<Engine>, sink: ConsoleSink) -> Result<Self> {
        let context = engine.create_context()?;
        let id = ContextId::new();

        engine.enter(&context, |ctx| console::install(&ctx, id, sink))??;

        tracing::info!(context_id = %id, engine_id = %engine.id(), "Created sandbox context");
        Ok(Self {
            inner: Arc::new(ContextInner {
                id,
                created_at: Utc::now(),
                lock: ReentrantMutex::new(()),
                handle: Mutex::new(Some(EngineHandle { engine, context })),
                callbacks: Arc::new(CallbackRegistry::default()),
                exports: ExportTable::default(),
                disposed: AtomicBool::new(false),
            }),
        })
    }

    /// Get the context's unique identifier.
    pub fn id(&self) -> ContextId {
        self.inner.id
    }

    /// Get the context creation time.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    /// Whether the context has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Run `code` as a top-level script and return its completion value.
    ///
    /// # Errors
    /// [`SandboxError::Evaluation`] carries the exception's message when the
    /// script fails to compile or throws.
    pub fn eval(&self, code: &str) -> Result<HostValue> {
        let inner = &self.inner;
        let _guard = inner.lock.lock();
        let handle = inner.live()?;
        tracing::debug!(context_id = %inner.id, code_len = code.len(), "Evaluating script");

        handle.engine.enter(&handle.context, |ctx| {
            let value: Value = ctx
                .eval_with_options(code, script_options())
                .map_err(|e| caught(&ctx, e))?;
            marshal::to_host(&ctx, value, inner, 0)
        })?
    }

    /// Assign `value` to the global property `name`.
    pub fn set_global(&self, name: &str, value: impl Into<HostValue>) -> Result<()> {
        let value = value.into();
        let inner = &self.inner;
        let _guard = inner.lock.lock();
        let handle = inner.live()?;
        tracing::debug!(context_id = %inner.id, name, kind = value.type_name(), "Setting global");

        handle.engine.enter(&handle.context, |ctx| {
            let value = marshal::to_sandbox(&ctx, &value, inner, 0)?;
            ctx.globals().set(name, value).map_err(|e| caught(&ctx, e))
        })?
    }

    /// Read the global property `name`.
    pub fn get_global(&self, name: &str) -> Result<HostValue> {
        let inner = &self.inner;
        let _guard = inner.lock.lock();
        let handle = inner.live()?;
        tracing::debug!(context_id = %inner.id, name, "Getting global");

        handle.engine.enter(&handle.context, |ctx| {
            let value: Value = ctx.globals().get(name).map_err(|e| caught(&ctx, e))?;
            marshal::to_host(&ctx, value, inner, 0)
        })?
    }

    /// Dispose the context. Idempotent.
    ///
    /// Outstanding host-function proxies become inert and exported sandbox
    /// functions are released. Sibling contexts are unaffected.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Remove one exported sandbox function from this context's export table.
    ///
    /// Returns `false` if `function` is not an export of this context or was
    /// already released. Calling the proxy afterwards fails.
    pub fn release_function(&self, function: &HostFunction) -> bool {
        let Some(origin) = function.origin().filter(|o| o.context == self.inner.id) else {
            return false;
        };

        let _guard = self.inner.lock.lock();
        let Some(rooted) = self.inner.exports.remove(origin.key) else {
            return false;
        };
        let handle = self.inner.handle.lock().clone();
        match handle {
            Some(handle) => handle.engine.retire(rooted),
            None => drop(rooted),
        }
        tracing::trace!(context_id = %self.inner.id, export_key = origin.key, "Released export");
        true
    }

    /// Number of live host-function registry entries.
    pub fn host_callback_count(&self) -> usize {
        self.inner.callbacks.len()
    }

    /// Number of rooted sandbox functions.
    pub fn export_count(&self) -> usize {
        self.inner.exports.len()
    }
}

impl ContextInner {
    /// Engine handle of a live context.
    fn live(&self) -> Result<EngineHandle> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(SandboxError::context_disposed());
        }
        self.handle
            .lock()
            .clone()
            .ok_or_else(SandboxError::context_disposed)
    }

    /// Call an exported sandbox function on behalf of its host proxy.
    pub(crate) fn call_export(
        scope: &Arc<Self>,
        key: u64,
        args: &[HostValue],
    ) -> Result<HostValue> {
        let _guard = scope.lock.lock();
        let handle = scope.live()?;
        tracing::debug!(context_id = %scope.id, export_key = key, argc = args.len(), "Calling sandbox function");

        handle.engine.enter(&handle.context, |ctx| {
            let function = proxy::restore_export(&ctx, scope, key)?
                .ok_or_else(|| SandboxError::Internal("Sandbox function not found".into()))?;
            proxy::invoke(&ctx, scope, function, args)
        })?
    }

    fn dispose(&self) {
        let _guard = self.lock.lock();
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        let callbacks = self.callbacks.clear();
        let exports = self.exports.take_all();
        let export_count = exports.len();
        let handle = self.handle.lock().take();
        if let Some(EngineHandle { engine, context }) = handle {
            engine.retire((exports, context));
        }

        tracing::info!(
            context_id = %self.id,
            callbacks,
            exports = export_count,
            "Disposed sandbox context"
        );
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for SandboxContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxContext")
            .field("id", &self.inner.id)
            .field("disposed", &self.is_disposed())
            .field("created_at", &self.inner.created_at)
            .finish()
    }
}
