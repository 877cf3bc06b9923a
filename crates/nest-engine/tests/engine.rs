//! Integration tests for nest-engine.
//!
//! These run against the QuickJS build bundled with rquickjs.
//!
//! Run with: `cargo test -p nest-engine`

use nest_engine::rquickjs::{Function, Object};
use nest_engine::{Engine, EngineBuilder, EngineError};
use std::sync::Arc;

fn engine() -> Arc<Engine> {
    Arc::new(EngineBuilder::new().build().expect("Failed to create engine"))
}

/// A callback running inside one context can enter a sibling context.
#[test]
fn test_nested_entry_reuses_engine() {
    let engine = engine();
    let outer = engine.create_context().unwrap();
    let inner = engine.create_context().unwrap();

    engine
        .enter(&inner, |ctx| ctx.eval::<(), _>("var base = 40;").unwrap())
        .unwrap();

    let callback_engine = Arc::clone(&engine);
    let callback_context = inner.clone();
    engine
        .enter(&outer, move |ctx| {
            let nested = Function::new(ctx.clone(), move || -> i32 {
                callback_engine
                    .enter(&callback_context, |ctx| ctx.eval::<i32, _>("base").unwrap())
                    .unwrap()
                    + 2
            })
            .unwrap();
            ctx.globals().set("nested", nested).unwrap();
        })
        .unwrap();

    let value = engine
        .enter(&outer, |ctx| ctx.eval::<i32, _>("nested()").unwrap())
        .unwrap();
    assert_eq!(value, 42);
    assert!(!engine.is_entered());
}

/// Exclusive operations refuse to run from inside a callback.
#[test]
fn test_exclusive_operations_busy_inside_callback() {
    let engine = engine();
    let context = engine.create_context().unwrap();

    let callback_engine = Arc::clone(&engine);
    engine
        .enter(&context, move |ctx| {
            let probe = Function::new(ctx.clone(), move || -> bool {
                let create = callback_engine.create_context();
                let drain = callback_engine.drain_pending_jobs();
                let heap = callback_engine.heap_info();
                let gc = callback_engine.run_gc();
                matches!(create, Err(EngineError::Busy(_)))
                    && matches!(drain, Err(EngineError::Busy(_)))
                    && matches!(heap, Err(EngineError::Busy(_)))
                    && matches!(gc, Err(EngineError::Busy(_)))
            })
            .unwrap();
            ctx.globals().set("probe", probe).unwrap();
        })
        .unwrap();

    let all_busy = engine
        .enter(&context, |ctx| ctx.eval::<bool, _>("probe()").unwrap())
        .unwrap();
    assert!(all_busy);

    // Back at rest, the same operations succeed.
    assert!(engine.create_context().is_ok());
    assert!(engine.heap_info().is_ok());
}

/// A context released from inside a callback is freed after the call returns.
#[test]
fn test_release_inside_callback_is_deferred() {
    let engine = engine();
    let context = engine.create_context().unwrap();
    let doomed = engine.create_context().unwrap();

    let callback_engine = Arc::clone(&engine);
    let slot = Arc::new(parking_lot::Mutex::new(Some(doomed)));
    let callback_slot = Arc::clone(&slot);
    engine
        .enter(&context, move |ctx| {
            let release = Function::new(ctx.clone(), move || {
                if let Some(doomed) = callback_slot.lock().take() {
                    callback_engine.retire(doomed);
                }
            })
            .unwrap();
            ctx.globals().set("release", release).unwrap();
        })
        .unwrap();

    engine
        .enter(&context, |ctx| ctx.eval::<(), _>("release();").unwrap())
        .unwrap();

    assert!(slot.lock().is_none());
    engine.run_gc().unwrap();
}

/// Memory ceiling is enforced by the engine itself.
#[test]
fn test_memory_limit_enforced() {
    let engine = EngineBuilder::new()
        .memory_limit(4 * 1024 * 1024)
        .build()
        .unwrap();
    let context = engine.create_context().unwrap();

    let failed = engine
        .enter(&context, |ctx| {
            ctx.eval::<(), _>("let a = []; for (;;) a.push(new Array(1024).fill(1));")
                .is_err()
        })
        .unwrap();
    assert!(failed);
}

/// Unbounded recursion is caught by the stack ceiling instead of crashing.
#[test]
fn test_stack_limit_enforced() {
    let engine = engine();
    let context = engine.create_context().unwrap();

    let failed = engine
        .enter(&context, |ctx| {
            ctx.eval::<(), _>("function f() { return f() + 1; } f();")
                .is_err()
        })
        .unwrap();
    assert!(failed);
}

/// Each engine has an isolated heap.
#[test]
fn test_engines_are_isolated() {
    let a = engine();
    let b = engine();
    let ca = a.create_context().unwrap();
    let cb = b.create_context().unwrap();

    a.enter(&ca, |ctx| {
        let marker = Object::new(ctx.clone()).unwrap();
        ctx.globals().set("marker", marker).unwrap();
    })
    .unwrap();

    let seen = b
        .enter(&cb, |ctx| ctx.eval::<String, _>("typeof marker").unwrap())
        .unwrap();
    assert_eq!(seen, "undefined");
    assert_ne!(a.id(), b.id());
}
