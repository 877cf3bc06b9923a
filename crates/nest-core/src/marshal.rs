//! Value marshaling between host and sandbox representations.
//!
//! Conversion is recursive and dispatched on the value kind:
//!
//! | Source kind | Target |
//! |-------------|--------|
//! | undefined, null, boolean, number, string | same primitive |
//! | symbol | a string: the description toward the host, `Symbol(description)` toward the sandbox |
//! | array | new array, converted index by index |
//! | object | new object from own enumerable string keys |
//! | function | proxied, never copied |
//! | promise | rejected with [`SandboxError::Unsupported`] |
//! | anything else (BigInt, module) | undefined |
//!
//! Composite values carry a nesting depth; graphs deeper than
//! [`MAX_DEPTH`] (in practice, cycles) fail with [`SandboxError::TooDeep`].

use crate::context::ContextInner;
use crate::error::{Result, SandboxError};
use crate::proxy::{self, caught};
use crate::value::HostValue;
use indexmap::IndexMap;
use rquickjs::object::Filter;
use rquickjs::{Array, Ctx, Object, Type, Value};
use std::sync::Arc;

/// Deepest nesting either direction will follow.
pub const MAX_DEPTH: usize = 256;

/// Convert a sandbox value to its host representation.
pub(crate) fn to_host<'js>(
    ctx: &Ctx<'js>,
    value: Value<'js>,
    scope: &Arc<ContextInner>,
    depth: usize,
) -> Result<HostValue> {
    if depth > MAX_DEPTH {
        return Err(SandboxError::TooDeep(MAX_DEPTH));
    }

    match value.type_of() {
        Type::Undefined | Type::Uninitialized => Ok(HostValue::Undefined),
        Type::Null => Ok(HostValue::Null),
        Type::Bool => Ok(HostValue::Bool(value.as_bool().unwrap_or_default())),
        Type::Int | Type::Float => Ok(HostValue::Number(value.as_number().unwrap_or(f64::NAN))),
        Type::String => match value.as_string() {
            Some(s) => s.to_string().map(HostValue::String).map_err(|e| caught(ctx, e)),
            None => Ok(HostValue::Undefined),
        },
        Type::Symbol => symbol_description(ctx, &value).map(HostValue::String),
        Type::Array => match value.into_array() {
            Some(array) => array_to_host(ctx, &array, scope, depth),
            None => Ok(HostValue::Undefined),
        },
        Type::Function | Type::Constructor => match value.into_function() {
            Some(function) => {
                proxy::export_function(ctx, scope, function).map(HostValue::Function)
            }
            None => Ok(HostValue::Undefined),
        },
        Type::Promise => Err(SandboxError::Unsupported("a promise")),
        Type::Object | Type::Exception => match value.into_object() {
            Some(object) => object_to_host(ctx, &object, scope, depth),
            None => Ok(HostValue::Undefined),
        },
        _ => Ok(HostValue::Undefined),
    }
}

fn symbol_description<'js>(ctx: &Ctx<'js>, value: &Value<'js>) -> Result<String> {
    let Some(symbol) = value.as_symbol() else {
        return Ok(String::new());
    };
    let description = symbol.description().map_err(|e| caught(ctx, e))?;
    match description.as_string() {
        Some(s) => s.to_string().map_err(|e| caught(ctx, e)),
        None => Ok(String::new()),
    }
}

fn array_to_host<'js>(
    ctx: &Ctx<'js>,
    array: &Array<'js>,
    scope: &Arc<ContextInner>,
    depth: usize,
) -> Result<HostValue> {
    let mut items = Vec::with_capacity(array.len());
    for index in 0..array.len() {
        let item: Value<'js> = array.get(index).map_err(|e| caught(ctx, e))?;
        items.push(to_host(ctx, item, scope, depth + 1)?);
    }
    Ok(HostValue::Array(items))
}

fn object_to_host<'js>(
    ctx: &Ctx<'js>,
    object: &Object<'js>,
    scope: &Arc<ContextInner>,
    depth: usize,
) -> Result<HostValue> {
    let mut map = IndexMap::new();
    for key in object.own_keys::<String>(Filter::new().string().enum_only()) {
        let key = key.map_err(|e| caught(ctx, e))?;
        let item: Value<'js> = object.get(key.as_str()).map_err(|e| caught(ctx, e))?;
        let item = to_host(ctx, item, scope, depth + 1)?;
        map.insert(key, item);
    }
    Ok(HostValue::Object(map))
}

/// Convert a host value to its sandbox representation.
pub(crate) fn to_sandbox<'js>(
    ctx: &Ctx<'js>,
    value: &HostValue,
    scope: &Arc<ContextInner>,
    depth: usize,
) -> Result<Value<'js>> {
    if depth > MAX_DEPTH {
        return Err(SandboxError::TooDeep(MAX_DEPTH));
    }

    match value {
        HostValue::Undefined => Ok(Value::new_undefined(ctx.clone())),
        HostValue::Null => Ok(Value::new_null(ctx.clone())),
        HostValue::Bool(b) => Ok(Value::new_bool(ctx.clone(), *b)),
        // The engine's int fast path would turn -0 into +0.
        HostValue::Number(n) if *n == 0.0 && n.is_sign_negative() => {
            Ok(Value::new_float(ctx.clone(), *n))
        }
        HostValue::Number(n) => Ok(Value::new_number(ctx.clone(), *n)),
        HostValue::String(s) => string_value(ctx, s),
        HostValue::Symbol(description) => {
            let text = format!("Symbol({})", description.as_deref().unwrap_or_default());
            string_value(ctx, &text)
        }
        HostValue::Array(items) => {
            let array = Array::new(ctx.clone()).map_err(|e| caught(ctx, e))?;
            for (index, item) in items.iter().enumerate() {
                let item = to_sandbox(ctx, item, scope, depth + 1)?;
                array.set(index, item).map_err(|e| caught(ctx, e))?;
            }
            Ok(array.into_value())
        }
        HostValue::Object(map) => {
            let object = Object::new(ctx.clone()).map_err(|e| caught(ctx, e))?;
            for (key, item) in map {
                let item = to_sandbox(ctx, item, scope, depth + 1)?;
                object.set(key.as_str(), item).map_err(|e| caught(ctx, e))?;
            }
            Ok(object.into_value())
        }
        HostValue::HostObject(host) => {
            let object = Object::new(ctx.clone()).map_err(|e| caught(ctx, e))?;
            for name in host.property_names() {
                let item = host.get(&name)?;
                let item = to_sandbox(ctx, &item, scope, depth + 1)?;
                object.set(name.as_str(), item).map_err(|e| caught(ctx, e))?;
            }
            Ok(object.into_value())
        }
        HostValue::Function(function) => {
            // A proxy of one of this context's own functions goes back as the
            // original rather than wrapping it twice.
            if let Some(origin) = function.origin().filter(|o| o.context == scope.id) {
                if let Some(original) = proxy::restore_export(ctx, scope, origin.key)? {
                    return Ok(original.into_value());
                }
            }
            let trampoline = proxy::host_trampoline(ctx, scope, function.clone())?;
            Ok(trampoline.into_value())
        }
    }
}

fn string_value<'js>(ctx: &Ctx<'js>, s: &str) -> Result<Value<'js>> {
    rquickjs::String::from_str(ctx.clone(), s)
        .map(|s| s.into_value())
        .map_err(|e| caught(ctx, e))
}
