//! Host-side value model.
//!
//! Everything that crosses the sandbox boundary is converted to or from a
//! [`HostValue`]. Data is copied; functions are proxied.

use crate::context::ContextId;
use crate::error::Result;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

type HostFn = dyn Fn(&[HostValue]) -> Result<HostValue> + Send + Sync;

/// A value on the host side of the boundary.
#[derive(Clone, Default)]
pub enum HostValue {
    /// `undefined`
    #[default]
    Undefined,
    /// `null`
    Null,
    /// A boolean
    Bool(bool),
    /// A number (integers and floats alike)
    Number(f64),
    /// A string
    String(String),
    /// A symbol, carried by its description only
    Symbol(Option<String>),
    /// An array, converted index by index
    Array(Vec<HostValue>),
    /// A plain object, keys in enumeration order
    Object(IndexMap<String, HostValue>),
    /// A callable
    Function(HostFunction),
    /// An object whose properties are computed by the host
    HostObject(Arc<dyn HostObject>),
}

/// An object implemented by the host: properties are resolved on access.
///
/// Marshaled into a sandbox it is enumerated like a plain object, with the
/// names from [`property_names`](HostObject::property_names) and values from
/// [`get`](HostObject::get).
pub trait HostObject: Send + Sync {
    /// Read a property. Unknown names should yield [`HostValue::Undefined`].
    fn get(&self, name: &str) -> Result<HostValue>;

    /// Write a property. Read-only objects ignore writes.
    fn set(&self, _name: &str, _value: HostValue) -> Result<()> {
        Ok(())
    }

    /// Names reported when the object is enumerated.
    fn property_names(&self) -> Vec<String>;
}

/// Identifies the sandbox function behind a proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExportRef {
    /// Context whose export table roots the function
    pub context: ContextId,
    /// Key in that table
    pub key: u64,
}

/// A cloneable, thread-safe host callable.
#[derive(Clone)]
pub struct HostFunction {
    inner: Arc<HostFn>,
    origin: Option<ExportRef>,
}

impl HostFunction {
    /// Wrap a closure.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[HostValue]) -> Result<HostValue> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(f),
            origin: None,
        }
    }

    /// Wrap a closure that proxies an exported sandbox function.
    pub(crate) fn exported<F>(origin: ExportRef, f: F) -> Self
    where
        F: Fn(&[HostValue]) -> Result<HostValue> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(f),
            origin: Some(origin),
        }
    }

    /// Invoke the function.
    pub fn call(&self, args: &[HostValue]) -> Result<HostValue> {
        (self.inner)(args)
    }

    /// The sandbox function this proxies, if any.
    pub fn origin(&self) -> Option<ExportRef> {
        self.origin
    }

    /// Whether both handles refer to the same callable.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.inner), Arc::as_ptr(&other.inner))
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.origin {
            Some(origin) => write!(f, "HostFunction(export {} of {})", origin.key, origin.context),
            None => write!(f, "HostFunction"),
        }
    }
}

impl HostValue {
    /// Wrap a closure as a function value.
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&[HostValue]) -> Result<HostValue> + Send + Sync + 'static,
    {
        Self::Function(HostFunction::new(f))
    }

    /// Name of the value's kind, as `typeof`-like text.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Symbol(_) => "symbol",
            Self::Array(_) => "array",
            Self::Object(_) | Self::HostObject(_) => "object",
            Self::Function(_) => "function",
        }
    }

    /// Check if the value is `undefined`.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Get the boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get the number, if this is one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get the string contents, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the callable, if this is a function.
    pub fn as_function(&self) -> Option<&HostFunction> {
        match self {
            Self::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Read a property of an object or host object.
    ///
    /// Returns `Undefined` for anything else or a missing key.
    pub fn get(&self, key: &str) -> Result<HostValue> {
        match self {
            Self::Object(map) => Ok(map.get(key).cloned().unwrap_or_default()),
            Self::HostObject(object) => object.get(key),
            _ => Ok(Self::Undefined),
        }
    }

    /// Convert to JSON following `JSON.stringify` rules: `undefined` and
    /// functions are dropped from objects and become `null` elsewhere,
    /// non-finite numbers become `null`, symbols become their description.
    pub fn to_json(&self) -> serde_json::Value {
        self.json_or_skip().unwrap_or(serde_json::Value::Null)
    }

    fn json_or_skip(&self) -> Option<serde_json::Value> {
        use serde_json::Value;
        match self {
            Self::Undefined | Self::Function(_) => None,
            Self::Null => Some(Value::Null),
            Self::Bool(b) => Some(Value::Bool(*b)),
            Self::Number(n) => Some(number_to_json(*n)),
            Self::String(s) => Some(Value::String(s.clone())),
            Self::Symbol(description) => {
                Some(Value::String(description.clone().unwrap_or_default()))
            }
            Self::Array(items) => Some(Value::Array(items.iter().map(Self::to_json).collect())),
            Self::Object(map) => Some(Value::Object(
                map.iter()
                    .filter_map(|(k, v)| v.json_or_skip().map(|v| (k.clone(), v)))
                    .collect(),
            )),
            Self::HostObject(object) => Some(Value::Object(
                object
                    .property_names()
                    .into_iter()
                    .filter_map(|name| {
                        let value = object.get(&name).ok()?.json_or_skip()?;
                        Some((name, value))
                    })
                    .collect(),
            )),
        }
    }
}

impl serde::Serialize for HostValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serde::Serialize::serialize(&self.to_json(), serializer)
    }
}

/// Largest integer an f64 represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

fn number_to_json(n: f64) -> serde_json::Value {
    if !n.is_finite() {
        return serde_json::Value::Null;
    }
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return serde_json::Value::from(n as i64);
    }
    serde_json::Number::from_f64(n)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Symbol(a), Self::Symbol(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            (Self::Function(a), Self::Function(b)) => a.ptr_eq(b),
            (Self::HostObject(a), Self::HostObject(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            _ => false,
        }
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "Undefined"),
            Self::Null => write!(f, "Null"),
            Self::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Self::Number(n) => f.debug_tuple("Number").field(n).finish(),
            Self::String(s) => f.debug_tuple("String").field(s).finish(),
            Self::Symbol(d) => f.debug_tuple("Symbol").field(d).finish(),
            Self::Array(items) => f.debug_tuple("Array").field(items).finish(),
            Self::Object(map) => f.debug_tuple("Object").field(map).finish(),
            Self::Function(func) => func.fmt(f),
            Self::HostObject(object) => f
                .debug_tuple("HostObject")
                .field(&object.property_names())
                .finish(),
        }
    }
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for HostValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for HostValue {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vec<HostValue>> for HostValue {
    fn from(items: Vec<HostValue>) -> Self {
        Self::Array(items)
    }
}

impl From<IndexMap<String, HostValue>> for HostValue {
    fn from(map: IndexMap<String, HostValue>) -> Self {
        Self::Object(map)
    }
}

impl From<HostFunction> for HostValue {
    fn from(f: HostFunction) -> Self {
        Self::Function(f)
    }
}

impl From<serde_json::Value> for HostValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_structural_equality() {
        let a = HostValue::from(vec![1.into(), "two".into(), HostValue::Null]);
        let b = HostValue::from(vec![1.into(), "two".into(), HostValue::Null]);
        assert_eq!(a, b);
        assert_ne!(HostValue::Undefined, HostValue::Null);
    }

    #[test]
    fn test_function_identity() {
        let f = HostFunction::new(|_| Ok(HostValue::Undefined));
        let g = HostFunction::new(|_| Ok(HostValue::Undefined));
        assert_eq!(HostValue::Function(f.clone()), HostValue::Function(f.clone()));
        assert_ne!(HostValue::Function(f), HostValue::Function(g));
    }

    #[test]
    fn test_function_call() {
        let double = HostValue::function(|args| {
            let x = args.first().and_then(HostValue::as_f64).unwrap_or(0.0);
            Ok(HostValue::Number(x * 2.0))
        });
        let result = double.as_function().unwrap().call(&[21.into()]).unwrap();
        assert_eq!(result, HostValue::Number(42.0));
    }

    #[test]
    fn test_from_json_preserves_shape() {
        let value = HostValue::from(json!({"a": [1, true, null], "b": "x"}));
        assert_eq!(value.get("b").unwrap(), HostValue::from("x"));
        assert_eq!(
            value.get("a").unwrap(),
            HostValue::from(vec![1.into(), true.into(), HostValue::Null])
        );
        assert!(value.get("missing").unwrap().is_undefined());
    }

    #[test]
    fn test_to_json_follows_stringify_rules() {
        let mut map = IndexMap::new();
        map.insert("keep".to_string(), HostValue::Number(3.0));
        map.insert("skip".to_string(), HostValue::Undefined);
        map.insert("fn".to_string(), HostValue::function(|_| Ok(HostValue::Null)));
        map.insert(
            "list".to_string(),
            HostValue::Array(vec![HostValue::Undefined, HostValue::Number(f64::NAN)]),
        );
        map.insert("sym".to_string(), HostValue::Symbol(Some("tag".into())));

        let json = HostValue::Object(map).to_json();
        assert_eq!(json, json!({"keep": 3, "list": [null, null], "sym": "tag"}));
        assert_eq!(json.to_string(), r#"{"keep":3,"list":[null,null],"sym":"tag"}"#);
    }

    #[test]
    fn test_to_json_fractional_number() {
        assert_eq!(HostValue::Number(2.5).to_json(), json!(2.5));
        assert_eq!(HostValue::Undefined.to_json(), serde_json::Value::Null);
    }

    #[test]
    fn test_serialize_matches_to_json() {
        let value = HostValue::from(vec![HostValue::Bool(true), HostValue::Undefined]);
        assert_eq!(serde_json::to_string(&value).unwrap(), "[true,null]");
    }

    #[test]
    fn test_type_names() {
        assert_eq!(HostValue::Undefined.type_name(), "undefined");
        assert_eq!(HostValue::Array(vec![]).type_name(), "array");
        assert_eq!(HostValue::function(|_| Ok(HostValue::Null)).type_name(), "function");
    }
}
