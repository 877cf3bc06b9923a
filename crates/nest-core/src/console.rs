//! The `console` object seeded into every context.
//!
//! The object is defined by a script run inside the sandbox; every method
//! funnels through one native primitive, `__qjs_print`, whose output goes
//! to the runtime's [`ConsoleSink`].

use crate::context::ContextId;
use crate::proxy::caught;
use crate::Result;
use rquickjs::convert::Coerced;
use rquickjs::function::Rest;
use rquickjs::{Ctx, Function};
use std::sync::Arc;

/// Receives every line printed by sandbox code.
pub type ConsoleSink = Arc<dyn Fn(ContextId, &str) + Send + Sync>;

/// Name of the native print primitive in the sandbox global scope.
pub const PRINT_PRIMITIVE: &str = "__qjs_print";

const BOOTSTRAP: &str = r#"
        var console = {
            log: function() {
                var args = Array.prototype.slice.call(arguments);
                __qjs_print(args.map(function(a) {
                    if (typeof a === 'object') return JSON.stringify(a);
                    return String(a);
                }).join(' '));
            },
            warn: function() { console.log('[WARN]', ...arguments); },
            error: function() { console.log('[ERROR]', ...arguments); },
            info: function() { console.log('[INFO]', ...arguments); },
            debug: function() { console.log('[DEBUG]', ...arguments); },
            assert: function(cond) { if (!cond) console.log('[ASSERT]', ...Array.prototype.slice.call(arguments, 1)); },
            trace: function() {},
            time: function() {},
            timeEnd: function() {},
            group: function() {},
            groupEnd: function() {}
        };
    "#;

/// Default sink: one `tracing` event per line.
pub fn tracing_sink() -> ConsoleSink {
    Arc::new(|context_id, line| {
        tracing::info!(target: "nest::console", %context_id, "{}", line);
    })
}

/// Install the print primitive and run the console bootstrap.
pub(crate) fn install(ctx: &Ctx<'_>, context_id: ContextId, sink: ConsoleSink) -> Result<()> {
    let print = Function::new(ctx.clone(), move |lines: Rest<Coerced<String>>| {
        for Coerced(line) in lines.0 {
            sink(context_id, &line);
        }
    })
    .map_err(|e| caught(ctx, e))?;

    ctx.globals()
        .set(PRINT_PRIMITIVE, print)
        .map_err(|e| caught(ctx, e))?;
    ctx.eval_with_options::<(), _>(BOOTSTRAP, crate::context::script_options())
        .map_err(|e| caught(ctx, e))
}
