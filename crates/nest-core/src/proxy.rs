//! Function proxies in both directions.
//!
//! Host functions enter the sandbox through a trampoline that looks the
//! function up by id in the owning context's [`CallbackRegistry`]. Sandbox
//! functions leave it as a [`HostFunction`] keyed into the context's
//! [`ExportTable`], which keeps the sandbox value rooted.

use crate::context::ContextInner;
use crate::error::{Result, SandboxError};
use crate::marshal;
use crate::value::{ExportRef, HostFunction, HostValue};
use parking_lot::Mutex;
use rquickjs::function::Rest;
use rquickjs::convert::Coerced;
use rquickjs::{Ctx, Exception, Function, Persistent, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

// ============================================================================
// Host-function registry
// ============================================================================

/// Id-keyed entries that stop accepting inserts once closed.
struct Slots<T> {
    entries: HashMap<u64, T>,
    closed: bool,
}

impl<T> Default for Slots<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            closed: false,
        }
    }
}

/// Callback id → retained host function, for one context.
#[derive(Default)]
pub(crate) struct CallbackRegistry {
    next_id: AtomicU64,
    slots: Mutex<Slots<HostFunction>>,
}

impl CallbackRegistry {
    /// Retain `function` under a fresh id. Ids are never reused.
    ///
    /// Returns `None` once the registry has been cleared by disposal.
    pub(crate) fn register(&self, function: HostFunction) -> Option<u64> {
        let mut slots = self.slots.lock();
        if slots.closed {
            return None;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        slots.entries.insert(id, function);
        Some(id)
    }

    pub(crate) fn get(&self, id: u64) -> Option<HostFunction> {
        self.slots.lock().entries.get(&id).cloned()
    }

    pub(crate) fn remove(&self, id: u64) -> bool {
        // Dropped outside the lock: releasing a host function can release
        // whatever it captured.
        let removed = self.slots.lock().entries.remove(&id);
        removed.is_some()
    }

    /// Drop every entry and refuse new ones, returning how many there were.
    pub(crate) fn clear(&self) -> usize {
        let entries = {
            let mut slots = self.slots.lock();
            slots.closed = true;
            std::mem::take(&mut slots.entries)
        };
        entries.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.lock().entries.len()
    }
}

/// Owned by the trampoline closure; QuickJS dropping the closure when it
/// collects the function removes the registry entry.
struct CallbackGuard {
    registry: Weak<CallbackRegistry>,
    id: u64,
}

impl Drop for CallbackGuard {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            if registry.remove(self.id) {
                tracing::trace!(callback_id = self.id, "Host callback finalized");
            }
        }
    }
}

/// Build the sandbox-side callable for a host function.
pub(crate) fn host_trampoline<'js>(
    ctx: &Ctx<'js>,
    scope: &Arc<ContextInner>,
    function: HostFunction,
) -> Result<Function<'js>> {
    let id = scope
        .callbacks
        .register(function)
        .ok_or_else(SandboxError::context_disposed)?;
    let guard = CallbackGuard {
        registry: Arc::downgrade(&scope.callbacks),
        id,
    };
    let owner = Arc::downgrade(scope);
    tracing::trace!(context_id = %scope.id, callback_id = id, "Registered host callback");

    Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<Value<'js>> {
            let _guard = &guard;
            let scope = owner
                .upgrade()
                .ok_or_else(|| throw(&ctx, &SandboxError::context_disposed()))?;
            let function = scope.callbacks.get(id).ok_or_else(|| {
                throw(
                    &ctx,
                    &SandboxError::Internal("Invalid host function data".into()),
                )
            })?;

            let mut host_args = Vec::with_capacity(args.len());
            for arg in args.0 {
                host_args.push(marshal::to_host(&ctx, arg, &scope, 0).map_err(|e| throw(&ctx, &e))?);
            }

            let result = function.call(&host_args).map_err(|e| throw(&ctx, &e))?;
            marshal::to_sandbox(&ctx, &result, &scope, 0).map_err(|e| throw(&ctx, &e))
        },
    )
    .map_err(|e| caught(ctx, e))
}

/// Raise a host error inside the sandbox as an `InternalError`.
fn throw(ctx: &Ctx<'_>, err: &SandboxError) -> rquickjs::Error {
    Exception::throw_internal(ctx, &err.to_string())
}

/// Convert an engine error, taking the pending exception if there is one.
pub(crate) fn caught(ctx: &Ctx<'_>, err: rquickjs::Error) -> SandboxError {
    if !err.is_exception() {
        return SandboxError::Internal(err.to_string());
    }
    let exception = ctx.catch();
    match exception.get::<Coerced<String>>() {
        Ok(Coerced(message)) => SandboxError::Evaluation(message),
        Err(_) => {
            // toString itself threw; discard that exception too.
            let _ = ctx.catch();
            SandboxError::Evaluation("Unknown error".into())
        }
    }
}

// ============================================================================
// Sandbox-function exports
// ============================================================================

/// A sandbox function kept alive between engine entries.
#[derive(Clone)]
pub(crate) struct Rooted(Persistent<Function<'static>>);

// SAFETY: a `Rooted` is created, cloned and restored only inside
// `Engine::enter`, and dropped either there or from the engine's retired
// queue. Both run under the engine gate, which serializes every use of the
// runtime the handle points into.
unsafe impl Send for Rooted {}
unsafe impl Sync for Rooted {}

/// Export key → rooted sandbox function, for one context.
#[derive(Default)]
pub(crate) struct ExportTable {
    next_key: AtomicU64,
    slots: Mutex<Slots<Rooted>>,
}

impl ExportTable {
    /// Returns the function back when the table has been closed by disposal.
    fn insert(&self, function: Rooted) -> std::result::Result<u64, Rooted> {
        let mut slots = self.slots.lock();
        if slots.closed {
            return Err(function);
        }
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        slots.entries.insert(key, function);
        Ok(key)
    }

    pub(crate) fn get(&self, key: u64) -> Option<Rooted> {
        self.slots.lock().entries.get(&key).cloned()
    }

    /// Take one entry out. The caller releases it through the engine.
    pub(crate) fn remove(&self, key: u64) -> Option<Rooted> {
        self.slots.lock().entries.remove(&key)
    }

    /// Take every entry out and refuse new ones. The caller releases them
    /// through the engine.
    pub(crate) fn take_all(&self) -> Vec<Rooted> {
        let mut slots = self.slots.lock();
        slots.closed = true;
        slots.entries.drain().map(|(_, f)| f).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.lock().entries.len()
    }
}

/// Root a sandbox function and hand the host a callable proxy for it.
///
/// Fails with `Disposed` when the context was disposed while this value was
/// in flight; the function is released on the spot.
pub(crate) fn export_function<'js>(
    ctx: &Ctx<'js>,
    scope: &Arc<ContextInner>,
    function: Function<'js>,
) -> Result<HostFunction> {
    let key = scope
        .exports
        .insert(Rooted(Persistent::save(ctx, function)))
        .map_err(|_| SandboxError::context_disposed())?;
    let origin = ExportRef {
        context: scope.id,
        key,
    };
    let owner = Arc::downgrade(scope);
    tracing::trace!(context_id = %scope.id, export_key = key, "Exported sandbox function");

    Ok(HostFunction::exported(origin, move |args| {
        let scope = owner.upgrade().ok_or_else(SandboxError::context_disposed)?;
        ContextInner::call_export(&scope, key, args)
    }))
}

/// Look up an export of `scope` by key, restored into `ctx`.
pub(crate) fn restore_export<'js>(
    ctx: &Ctx<'js>,
    scope: &ContextInner,
    key: u64,
) -> Result<Option<Function<'js>>> {
    match scope.exports.get(key) {
        Some(Rooted(rooted)) => rooted.restore(ctx).map(Some).map_err(|e| caught(ctx, e)),
        None => Ok(None),
    }
}

/// Invoke a restored sandbox function with host arguments.
pub(crate) fn invoke<'js>(
    ctx: &Ctx<'js>,
    scope: &Arc<ContextInner>,
    function: Function<'js>,
    args: &[HostValue],
) -> Result<HostValue> {
    let mut sandbox_args = Vec::with_capacity(args.len());
    for arg in args {
        sandbox_args.push(marshal::to_sandbox(ctx, arg, scope, 0)?);
    }
    let result: Value<'js> = function
        .call((Rest(sandbox_args),))
        .map_err(|e| caught(ctx, e))?;
    marshal::to_host(ctx, result, scope, 0)
}
