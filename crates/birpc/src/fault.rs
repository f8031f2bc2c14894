//! # Faults
//!
//! Failures raised by an implementation, and their reconstruction on the calling side.
//!
//! On the wire a failure is either error-like, an object with `message` and `stack`,
//! or any other value carried as-is.

use std::fmt;

use crate::metadata::Metadata;
use crate::value::Value;

const MESSAGE: &str = "message";
const STACK: &str = "stack";

/// The shape of a failure.
#[derive(Clone, Debug, PartialEq)]
pub enum Failure {
    /// An error-like failure.
    Error { message: String, stack: Option<String> },
    /// Any other thrown value.
    Thrown(Value),
}

impl Failure {
    /// A human-readable description. Thrown strings are returned verbatim.
    pub fn message(&self) -> String {
        match self {
            Self::Error { message, .. } => message.clone(),
            Self::Thrown(Value::String(s)) => s.clone(),
            Self::Thrown(value) => value.to_string(),
        }
    }

    pub(crate) fn to_wire(&self) -> Value {
        match self {
            Self::Error { message, stack } => {
                let mut fields = std::collections::BTreeMap::new();
                fields.insert(MESSAGE.to_string(), Value::from(message.as_str()));
                if let Some(stack) = stack {
                    fields.insert(STACK.to_string(), Value::from(stack.as_str()));
                }
                Value::Object(fields)
            }
            // A nullish `error` field reads as success, so these travel error-like.
            Self::Thrown(value) if value.is_nullish() => {
                Value::object([(MESSAGE, value.kind())])
            }
            Self::Thrown(value) => value.clone(),
        }
    }

    /// Any object with a string `message` is error-like; everything else was thrown raw.
    pub(crate) fn from_wire(value: Value) -> Self {
        if let Some(message) = value.get(MESSAGE).and_then(Value::as_str) {
            let stack = value.get(STACK).and_then(Value::as_str).map(str::to_string);
            return Self::Error { message: message.to_string(), stack };
        }
        Self::Thrown(value)
    }
}

/// A failure returned by a local implementation.
///
/// Any `std::error::Error` converts into a `Fault`, so implementations can use `?`.
#[derive(Clone, Debug, PartialEq)]
pub struct Fault {
    failure: Failure,
    metadata: Option<Metadata>,
}

impl Fault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            failure: Failure::Error { message: message.into(), stack: None },
            metadata: None,
        }
    }

    /// A failure that is not error-like.
    pub fn thrown(value: impl Into<Value>) -> Self {
        Self { failure: Failure::Thrown(value.into()), metadata: None }
    }

    pub fn with_stack(mut self, trace: impl Into<String>) -> Self {
        if let Failure::Error { stack, .. } = &mut self.failure {
            *stack = Some(trace.into());
        }
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn failure(&self) -> &Failure {
        &self.failure
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    pub fn message(&self) -> String {
        self.failure.message()
    }

    pub(crate) fn into_parts(self) -> (Failure, Option<Metadata>) {
        (self.failure, self.metadata)
    }
}

impl<E: std::error::Error> From<E> for Fault {
    fn from(e: E) -> Self {
        let mut stack = format!("{}", e);
        let mut source = e.source();
        while let Some(cause) = source {
            stack.push_str(&format!("\n  caused by: {}", cause));
            source = cause.source();
        }
        Self::new(e.to_string()).with_stack(stack)
    }
}

/// A failure reported by the remote side.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteError {
    failure: Failure,
    metadata: Option<Metadata>,
}

impl RemoteError {
    pub(crate) fn new(failure: Failure, metadata: Option<Metadata>) -> Self {
        Self { failure, metadata }
    }

    pub fn message(&self) -> String {
        self.failure.message()
    }

    pub fn stack(&self) -> Option<&str> {
        match &self.failure {
            Failure::Error { stack, .. } => stack.as_deref(),
            Failure::Thrown(_) => None,
        }
    }

    /// The raw value, if the remote failure was not error-like.
    pub fn thrown(&self) -> Option<&Value> {
        match &self.failure {
            Failure::Thrown(value) => Some(value),
            Failure::Error { .. } => None,
        }
    }

    pub fn failure(&self) -> &Failure {
        &self.failure
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.failure.message())
    }
}

impl std::error::Error for RemoteError {}
