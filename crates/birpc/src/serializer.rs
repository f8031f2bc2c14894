//! # Serializers
//!
//! Pluggable strategies that turn a `Value` into something a transport can carry.
//!
//! ## Strategies
//!
//! - **Identity**: passes the value through untouched. Round-trips anything, including
//!   opaque handles, but only makes sense when both sides share memory.
//! - **Json**: encodes to JSON text, with optional replacer and reviver hooks. Only
//!   JSON-representable values round-trip exactly. Undefined and opaque values are
//!   omitted from objects and become `null` inside arrays. This loss is the documented
//!   behavior of a text encoding.

use std::sync::Arc;

use crate::value::Value;

#[derive(Debug, Clone)]
pub enum Error {
    /// The root value has no representation in this encoding.
    Unrepresentable(&'static str),
    /// The encoder failed.
    Encode(String),
    /// The payload could not be decoded.
    Decode(String),
    /// The payload was produced by a different strategy.
    UnexpectedPayload {
        expected: &'static str,
        found: &'static str,
    },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unrepresentable(kind) => {
                write!(f, "Cannot serialize a root value of kind {}", kind)
            }
            Self::Encode(msg) => write!(f, "Encode error: {}", msg),
            Self::Decode(msg) => write!(f, "Decode error: {}", msg),
            Self::UnexpectedPayload { expected, found } => {
                write!(f, "Unexpected payload: expected {}, found {}", expected, found)
            }
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// What actually travels over a transport.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// An in-memory value, as produced by the identity serializer.
    Value(Value),
    /// Encoded text.
    Text(String),
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Value(_) => "value",
            Self::Text(_) => "text",
        }
    }
}

/// Converts values to and from transport payloads.
///
/// Both directions may suspend, so implementations are free to offload work or
/// consult external state.
#[async_trait::async_trait]
pub trait Serializer: Send + Sync + 'static {
    async fn serialize(&self, value: Value) -> Result<Payload>;
    async fn deserialize(&self, payload: Payload) -> Result<Value>;
}

/// Passes values through unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct Identity;

#[async_trait::async_trait]
impl Serializer for Identity {
    async fn serialize(&self, value: Value) -> Result<Payload> {
        Ok(Payload::Value(value))
    }

    async fn deserialize(&self, payload: Payload) -> Result<Value> {
        match payload {
            Payload::Value(value) => Ok(value),
            other => Err(Error::UnexpectedPayload { expected: "value", found: other.kind() }),
        }
    }
}

/// A `(key, value) -> value` hook applied while encoding or decoding.
///
/// The root is visited with key `""`; array elements are keyed by their index.
/// Returning `Value::Undefined` drops the entry.
pub type Hook = Arc<dyn Fn(&str, Value) -> Value + Send + Sync>;

/// JSON text encoding.
#[derive(Clone, Default)]
pub struct Json {
    replacer: Option<Hook>,
    reviver: Option<Hook>,
}

impl Json {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a hook visited top-down before encoding.
    pub fn with_replacer(
        mut self,
        hook: impl Fn(&str, Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.replacer = Some(Arc::new(hook));
        self
    }

    /// Installs a hook visited bottom-up after decoding.
    pub fn with_reviver(
        mut self,
        hook: impl Fn(&str, Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.reviver = Some(Arc::new(hook));
        self
    }

    /// Synchronous core of `serialize`.
    pub fn encode(&self, value: Value) -> Result<String> {
        let value = match &self.replacer {
            Some(hook) => replace(hook, "", value),
            None => value,
        };
        let json = value.to_json().ok_or(Error::Unrepresentable(value.kind()))?;
        serde_json::to_string(&json).map_err(|e| Error::Encode(e.to_string()))
    }

    /// Synchronous core of `deserialize`.
    pub fn decode(&self, text: &str) -> Result<Value> {
        let json: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| Error::Decode(e.to_string()))?;
        let value = Value::from_json(json);
        Ok(match &self.reviver {
            Some(hook) => revive(hook, "", value),
            None => value,
        })
    }
}

impl std::fmt::Debug for Json {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Json")
            .field("replacer", &self.replacer.is_some())
            .field("reviver", &self.reviver.is_some())
            .finish()
    }
}

#[async_trait::async_trait]
impl Serializer for Json {
    async fn serialize(&self, value: Value) -> Result<Payload> {
        self.encode(value).map(Payload::Text)
    }

    async fn deserialize(&self, payload: Payload) -> Result<Value> {
        match payload {
            Payload::Text(text) => self.decode(&text),
            other => Err(Error::UnexpectedPayload { expected: "text", found: other.kind() }),
        }
    }
}

/// Top-down: the hook sees a container before its children, and the children
/// visited are those of the value the hook returned.
fn replace(hook: &Hook, key: &str, value: Value) -> Value {
    match hook(key, value) {
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .enumerate()
                .map(|(i, item)| replace(hook, &i.to_string(), item))
                .collect(),
        ),
        Value::Object(fields) => Value::Object(
            fields
                .into_iter()
                .map(|(k, v)| {
                    let v = replace(hook, &k, v);
                    (k, v)
                })
                .filter(|(_, v)| !v.is_undefined())
                .collect(),
        ),
        other => other,
    }
}

/// Bottom-up: children are revived before their container.
fn revive(hook: &Hook, key: &str, value: Value) -> Value {
    let value = match value {
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .enumerate()
                .map(|(i, item)| revive(hook, &i.to_string(), item))
                .collect(),
        ),
        Value::Object(fields) => Value::Object(
            fields
                .into_iter()
                .map(|(k, v)| {
                    let v = revive(hook, &k, v);
                    (k, v)
                })
                .filter(|(_, v)| !v.is_undefined())
                .collect(),
        ),
        other => other,
    };
    hook(key, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Opaque;

    fn sample() -> Value {
        Value::object([
            ("name", Value::from("ada")),
            ("tags", Value::from(vec!["a", "b"])),
            ("nested", Value::object([("n", Value::from(1.25)), ("ok", Value::from(true))])),
            ("none", Value::Null),
        ])
    }

    #[tokio::test]
    async fn test_identity_round_trip_keeps_handles() {
        let handle = Opaque::new(vec![1u8, 2, 3]);
        let value = Value::Array(vec![Value::Opaque(handle.clone()), Value::Undefined]);

        let payload = Identity.serialize(value.clone()).await.unwrap();
        let back = Identity.deserialize(payload).await.unwrap();

        assert_eq!(back, value);
        let Value::Array(items) = back else { panic!("expected array") };
        assert!(items[0].as_opaque().unwrap().ptr_eq(&handle));
    }

    #[tokio::test]
    async fn test_json_round_trip_representable() {
        let json = Json::new();
        let payload = json.serialize(sample()).await.unwrap();
        assert!(matches!(payload, Payload::Text(_)));
        assert_eq!(json.deserialize(payload).await.unwrap(), sample());
    }

    #[tokio::test]
    async fn test_json_loses_undefined_fields() {
        let json = Json::new();
        let value = Value::object([
            ("kept", Value::from(1)),
            ("lost", Value::Undefined),
            ("callback", Value::Opaque(Opaque::new(()))),
        ]);

        let back = json.deserialize(json.serialize(value).await.unwrap()).await.unwrap();
        assert_eq!(back, Value::object([("kept", 1)]));
    }

    #[tokio::test]
    async fn test_json_rejects_unrepresentable_root() {
        let err = Json::new().serialize(Value::Undefined).await.unwrap_err();
        assert!(matches!(err, Error::Unrepresentable("undefined")));
    }

    #[tokio::test]
    async fn test_json_rejects_foreign_payload() {
        let err = Json::new().deserialize(Payload::Value(Value::Null)).await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedPayload { expected: "text", found: "value" }));

        let err = Json::new().deserialize(Payload::Text("{oops".into())).await.unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[tokio::test]
    async fn test_identity_rejects_text_payload() {
        let err = Identity.deserialize(Payload::Text("{}".into())).await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedPayload { expected: "value", found: "text" }));
    }

    #[test]
    fn test_replacer_runs_top_down_and_drops_undefined() {
        let json = Json::new().with_replacer(|key, value| match key {
            "secret" => Value::Undefined,
            "n" => Value::from(value.as_i64().unwrap_or(0) * 10),
            _ => value,
        });

        let text = json
            .encode(Value::object([
                ("secret", Value::from("hunter2")),
                ("n", Value::from(4)),
                ("list", Value::from(vec![1, 2])),
            ]))
            .unwrap();
        assert_eq!(text, r#"{"list":[1,2],"n":40}"#);
    }

    #[test]
    fn test_reviver_runs_bottom_up() {
        let json = Json::new().with_reviver(|key, value| match (key, &value) {
            ("", Value::Object(fields)) => Value::from(fields.len()),
            ("drop", _) => Value::Undefined,
            _ => value,
        });

        let value = json.decode(r#"{"a":1,"b":2,"drop":3}"#).unwrap();
        assert_eq!(value, Value::from(2));
    }
}
