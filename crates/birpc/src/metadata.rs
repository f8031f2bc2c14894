//! # Metadata Side Channel
//!
//! Annotations that must survive the trip even when the serializer would lose them.
//!
//! Metadata is captured from the raw value before serialization and reapplied to the
//! raw value after deserialization. It never travels inside the value itself: requests
//! carry one slot per argument, responses carry one slot for the result or the error.
//! Each slot is encoded by a pluggable `MetadataCodec`.
//!
//! ## Invariants
//!
//! - Primitives carry no metadata. Annotations on primitives are dropped at capture.
//! - A request carries the metadata field only if at least one argument is annotated.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::value::Value;

#[derive(Debug, Clone)]
pub enum Error {
    /// The codec could not turn an annotation into a value.
    Encode(String),
    /// A received slot could not be turned back into an annotation.
    Decode(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Encode(msg) => write!(f, "Metadata encode error: {}", msg),
            Self::Decode(msg) => write!(f, "Metadata decode error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// An application-defined annotation attached to a value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Metadata(BTreeMap<String, Value>);

impl Metadata {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.0
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A value together with its optional annotation.
///
/// Arguments and results are exchanged as `Annotated` so that an annotation can ride
/// along with the value it describes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Annotated {
    pub value: Value,
    pub metadata: Option<Metadata>,
}

impl Annotated {
    pub fn new(value: impl Into<Value>) -> Self {
        Self { value: value.into(), metadata: None }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    pub fn into_value(self) -> Value {
        self.value
    }
}

impl From<Value> for Annotated {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

/// Converts annotations to and from their on-the-wire representation.
pub trait MetadataCodec: Send + Sync + 'static {
    fn encode(&self, metadata: &Metadata) -> Result<Value>;
    fn decode(&self, value: Value) -> Result<Metadata>;
}

/// Default codec: an annotation travels as a plain object.
#[derive(Clone, Copy, Debug, Default)]
pub struct ObjectCodec;

impl MetadataCodec for ObjectCodec {
    fn encode(&self, metadata: &Metadata) -> Result<Value> {
        Ok(Value::Object(metadata.0.clone()))
    }

    fn decode(&self, value: Value) -> Result<Metadata> {
        match value {
            Value::Object(fields) => Ok(Metadata(fields)),
            other => Err(Error::Decode(format!("expected object, found {}", other.kind()))),
        }
    }
}

/// Captures annotations on the way out and reapplies them on the way in.
#[derive(Clone)]
pub(crate) struct Propagator {
    codec: Arc<dyn MetadataCodec>,
}

impl Propagator {
    pub(crate) fn new(codec: Arc<dyn MetadataCodec>) -> Self {
        Self { codec }
    }

    /// Encodes the annotation of a single value, if it can carry one.
    pub(crate) fn capture(
        &self,
        value: &Value,
        metadata: Option<&Metadata>,
    ) -> Result<Option<Value>> {
        match metadata {
            Some(metadata) if !value.is_primitive() => self.codec.encode(metadata).map(Some),
            _ => Ok(None),
        }
    }

    /// Encodes the per-argument slots of a call.
    ///
    /// Returns `None` when no argument carries an annotation.
    pub(crate) fn capture_args(&self, args: &[Annotated]) -> Result<Option<Vec<Value>>> {
        let mut any = false;
        let mut slots = Vec::with_capacity(args.len());
        for arg in args {
            match self.capture(&arg.value, arg.metadata())? {
                Some(slot) => {
                    any = true;
                    slots.push(slot);
                }
                None => slots.push(Value::Null),
            }
        }
        Ok(any.then_some(slots))
    }

    /// Decodes a detached slot, as carried by error responses.
    pub(crate) fn decode_slot(&self, slot: Option<Value>) -> Result<Option<Metadata>> {
        match slot {
            Some(slot) if !slot.is_nullish() => self.codec.decode(slot).map(Some),
            _ => Ok(None),
        }
    }

    /// Reattaches a slot to the value it was captured from.
    pub(crate) fn restore(&self, value: Value, slot: Option<Value>) -> Result<Annotated> {
        let metadata = match value.is_primitive() {
            true => None,
            false => self.decode_slot(slot)?,
        };
        Ok(Annotated { value, metadata })
    }

    /// Reattaches per-argument slots, aligned by index.
    pub(crate) fn restore_args(
        &self,
        args: Vec<Value>,
        slots: Option<Vec<Value>>,
    ) -> Result<Vec<Annotated>> {
        let mut slots = slots.unwrap_or_default().into_iter();
        args.into_iter()
            .map(|value| self.restore(value, slots.next()))
            .collect()
    }
}
