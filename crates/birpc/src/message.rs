//! # Wire Messages
//!
//! Requests and responses, and their mapping onto a `Value` the serializer can carry.
//!
//! ```text
//! Request  { method, args, callId, metadata? }
//! Response { method, callId, return? | error?, metadata? }
//! ```
//!
//! A response with neither `return` nor `error` is a void success.

use std::collections::BTreeMap;

use crate::registry::CallId;
use crate::value::Value;

const METHOD: &str = "method";
const ARGS: &str = "args";
const CALL_ID: &str = "callId";
const METADATA: &str = "metadata";
const RETURN: &str = "return";
const ERROR: &str = "error";

#[derive(Debug, Clone)]
pub enum Error {
    /// The message was not an object.
    NotAnObject(&'static str),
    /// A required field was absent.
    MissingField(&'static str),
    /// A field had the wrong shape.
    InvalidField {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnObject(kind) => write!(f, "Expected message object, found {}", kind),
            Self::MissingField(field) => write!(f, "Missing field '{}'", field),
            Self::InvalidField { field, expected, found } => {
                write!(f, "Field '{}' should be {}, found {}", field, expected, found)
            }
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    pub method: String,
    pub args: Vec<Value>,
    pub call_id: CallId,
    /// Per-argument annotation slots, aligned by index. `Null` marks an empty slot.
    pub metadata: Option<Vec<Value>>,
}

/// How a call ended.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Return(Value),
    /// The wire form of a failure, see `Failure::to_wire`.
    Error(Value),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    pub method: String,
    pub call_id: CallId,
    pub outcome: Outcome,
    /// Annotation for the returned value or the error.
    pub metadata: Option<Value>,
}

impl Request {
    pub fn into_value(self) -> Value {
        let mut fields = BTreeMap::new();
        fields.insert(METHOD.to_string(), Value::String(self.method));
        fields.insert(ARGS.to_string(), Value::Array(self.args));
        fields.insert(CALL_ID.to_string(), Value::String(self.call_id.as_str().to_string()));
        if let Some(slots) = self.metadata {
            fields.insert(METADATA.to_string(), Value::Array(slots));
        }
        Value::Object(fields)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let mut fields = into_fields(value)?;
        let method = take_string(&mut fields, METHOD)?;
        let call_id = CallId::from(take_string(&mut fields, CALL_ID)?);

        let args = match fields.remove(ARGS) {
            Some(Value::Array(args)) => args,
            Some(other) => return Err(invalid(ARGS, "array", &other)),
            None => return Err(Error::MissingField(ARGS)),
        };

        let metadata = match fields.remove(METADATA) {
            None | Some(Value::Undefined) | Some(Value::Null) => None,
            Some(Value::Array(slots)) => Some(slots),
            Some(other) => return Err(invalid(METADATA, "array", &other)),
        };

        Ok(Self { method, args, call_id, metadata })
    }
}

impl Response {
    pub fn into_value(self) -> Value {
        let mut fields = BTreeMap::new();
        fields.insert(METHOD.to_string(), Value::String(self.method));
        fields.insert(CALL_ID.to_string(), Value::String(self.call_id.as_str().to_string()));
        match self.outcome {
            Outcome::Return(Value::Undefined) => {}
            Outcome::Return(value) => {
                fields.insert(RETURN.to_string(), value);
            }
            Outcome::Error(error) => {
                fields.insert(ERROR.to_string(), error);
            }
        }
        if let Some(slot) = self.metadata {
            fields.insert(METADATA.to_string(), slot);
        }
        Value::Object(fields)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let mut fields = into_fields(value)?;
        let call_id = CallId::from(take_string(&mut fields, CALL_ID)?);
        // The method name is informational; a response is correlated by id alone.
        let method = match fields.remove(METHOD) {
            Some(Value::String(method)) => method,
            _ => String::new(),
        };

        let outcome = match fields.remove(ERROR) {
            Some(error) if !error.is_nullish() => Outcome::Error(error),
            _ => Outcome::Return(fields.remove(RETURN).unwrap_or_default()),
        };

        let metadata = fields.remove(METADATA).filter(|slot| !slot.is_nullish());

        Ok(Self { method, call_id, outcome, metadata })
    }
}

fn into_fields(value: Value) -> Result<BTreeMap<String, Value>> {
    match value {
        Value::Object(fields) => Ok(fields),
        other => Err(Error::NotAnObject(other.kind())),
    }
}

fn take_string(fields: &mut BTreeMap<String, Value>, field: &'static str) -> Result<String> {
    match fields.remove(field) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(invalid(field, "string", &other)),
        None => Err(Error::MissingField(field)),
    }
}

fn invalid(field: &'static str, expected: &'static str, found: &Value) -> Error {
    Error::InvalidField { field, expected, found: found.kind() }
}
