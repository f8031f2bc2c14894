//! # Dynamic Values
//!
//! Every argument, result and thrown failure that crosses an endpoint is a `Value`.
//!
//! ## Philosophy
//!
//! - **Superset of JSON**: every JSON document maps onto a `Value`, but not the reverse.
//!   `Undefined` and `Opaque` exist so that an in-memory serializer can carry values
//!   that no text encoding can represent.
//! - **Handles Compare by Reference**: two `Opaque` values are equal only if they
//!   point at the same allocation.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Number;

/// A dynamically typed value exchanged between endpoints.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    /// The absence of a value. Void results are `Undefined`.
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
    /// An in-memory handle (callback, resource, channel) with no portable form.
    Opaque(Opaque),
}

/// A shared, type-erased handle.
#[derive(Clone)]
pub struct Opaque(Arc<dyn Any + Send + Sync>);

impl Opaque {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn from_arc(inner: Arc<dyn Any + Send + Sync>) -> Self {
        Self(inner)
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Returns true if both handles point at the same allocation.
    pub fn ptr_eq(&self, other: &Opaque) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Opaque {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Opaque({:p})", Arc::as_ptr(&self.0))
    }
}

impl Value {
    /// Builds an object from key/value pairs.
    pub fn object<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Self::Object(entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// A short name for the shape of this value, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Opaque(_) => "opaque",
        }
    }

    /// Primitives cannot carry metadata; structured and opaque values can.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Self::Undefined | Self::Null | Self::Bool(_) | Self::Number(_) | Self::String(_)
        )
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Number(n) => n.as_u64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Object(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_opaque(&self) -> Option<&Opaque> {
        match self {
            Self::Opaque(handle) => Some(handle),
            _ => None,
        }
    }

    /// Looks up a field of an object. Anything else has no fields.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|fields| fields.get(key))
    }

    /// Converts to JSON the way a text encoder sees the value.
    ///
    /// Returns `None` when the value itself has no JSON form (`Undefined`, `Opaque`).
    /// Nested values without a JSON form are omitted from objects and become
    /// `null` inside arrays.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        match self {
            Self::Undefined | Self::Opaque(_) => None,
            Self::Null => Some(serde_json::Value::Null),
            Self::Bool(b) => Some(serde_json::Value::Bool(*b)),
            Self::Number(n) => Some(serde_json::Value::Number(n.clone())),
            Self::String(s) => Some(serde_json::Value::String(s.clone())),
            Self::Array(items) => Some(serde_json::Value::Array(
                items
                    .iter()
                    .map(|item| item.to_json().unwrap_or(serde_json::Value::Null))
                    .collect(),
            )),
            Self::Object(fields) => Some(serde_json::Value::Object(
                fields
                    .iter()
                    .filter_map(|(k, v)| v.to_json().map(|json| (k.clone(), json)))
                    .collect(),
            )),
        }
    }

    /// Lossless conversion from JSON.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(fields) => Self::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "undefined"),
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", n),
            Self::String(s) => write!(f, "{}", serde_json::Value::String(s.clone())),
            Self::Opaque(_) => write!(f, "[opaque]"),
            Self::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Self::Object(fields) => {
                write!(f, "{{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}:{}", serde_json::Value::String(k.clone()), v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

// ============================================================================
//  CONVERSIONS INTO VALUE
// ============================================================================

macro_rules! from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::Number(Number::from(v))
                }
            }
        )*
    };
}

from_integer!(i8, i16, i32, i64, u8, u16, u32, u64, usize);

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Number::from_f64(v).map_or(Self::Null, Self::Number)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::from(f64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Self::Undefined
    }
}

impl From<Opaque> for Value {
    fn from(v: Opaque) -> Self {
        Self::Opaque(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Self::Array(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Self::Object(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Self::from_json(v)
    }
}

// ============================================================================
//  CONVERSIONS OUT OF VALUE
// ============================================================================

/// Typed extraction of a `Value`, used by typed remote stubs.
///
/// Returns `None` when the value has the wrong shape.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Option<Self>;
}

impl FromValue for Value {
    fn from_value(value: Value) -> Option<Self> {
        Some(value)
    }
}

impl FromValue for () {
    fn from_value(value: Value) -> Option<Self> {
        value.is_nullish().then_some(())
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Option<Self> {
        value.as_bool()
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Option<Self> {
        value.as_i64()
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> Option<Self> {
        value.as_i64().and_then(|v| i32::try_from(v).ok())
    }
}

impl FromValue for u64 {
    fn from_value(value: Value) -> Option<Self> {
        value.as_u64()
    }
}

impl FromValue for u32 {
    fn from_value(value: Value) -> Option<Self> {
        value.as_u64().and_then(|v| u32::try_from(v).ok())
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Option<Self> {
        value.as_f64()
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl FromValue for Opaque {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Opaque(handle) => Some(handle),
            _ => None,
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Option<Self> {
        if value.is_nullish() {
            return Some(None);
        }
        T::from_value(value).map(Some)
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Array(items) => items.into_iter().map(T::from_value).collect(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_json_drops_undefined_fields() {
        let value = Value::object([
            ("kept", Value::from(1)),
            ("gone", Value::Undefined),
            ("handle", Value::Opaque(Opaque::new(7u8))),
        ]);

        let json = value.to_json().expect("objects have a json form");
        assert_eq!(json, serde_json::json!({ "kept": 1 }));
    }

    #[test]
    fn test_to_json_nulls_array_holes() {
        let value = Value::Array(vec![Value::Undefined, Value::from("x")]);
        assert_eq!(value.to_json(), Some(serde_json::json!([null, "x"])));
    }

    #[test]
    fn test_root_without_json_form() {
        assert!(Value::Undefined.to_json().is_none());
        assert!(Value::Opaque(Opaque::new(())).to_json().is_none());
    }

    #[test]
    fn test_non_finite_float_becomes_null() {
        assert_eq!(Value::from(f64::NAN), Value::Null);
        assert_eq!(Value::from(1.5), Value::Number(Number::from_f64(1.5).unwrap()));
    }

    #[test]
    fn test_opaque_reference_equality() {
        let a = Opaque::new(String::from("handle"));
        let b = Opaque::new(String::from("handle"));
        assert_eq!(Value::Opaque(a.clone()), Value::Opaque(a.clone()));
        assert_ne!(Value::Opaque(a.clone()), Value::Opaque(b));
        assert_eq!(a.downcast_ref::<String>().map(String::as_str), Some("handle"));
    }

    #[test]
    fn test_from_value_shapes() {
        assert_eq!(i64::from_value(Value::from(5)), Some(5));
        assert_eq!(String::from_value(Value::from(5)), None);
        assert_eq!(<()>::from_value(Value::Undefined), Some(()));
        assert_eq!(Option::<i64>::from_value(Value::Null), Some(None));
        assert_eq!(
            Vec::<i64>::from_value(Value::from(vec![1, 2, 3])),
            Some(vec![1, 2, 3])
        );
        let mixed = Value::from(vec![Value::from(1), Value::from("no")]);
        assert_eq!(Vec::<i64>::from_value(mixed), None);
    }

    #[test]
    fn test_display_is_compact_json() {
        let value = Value::object([("a", Value::from(vec![1, 2])), ("b", Value::from("q"))]);
        assert_eq!(value.to_string(), r#"{"a":[1,2],"b":"q"}"#);
        assert_eq!(Value::Undefined.to_string(), "undefined");
    }
}
