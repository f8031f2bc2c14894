//! # Remote Surface
//!
//! Calls the peer's implementations by name, without any fixed list of methods.
//!
//! `Remote::invoke` is the single primitive; `call` and `call_as` are conveniences
//! over it, and `remote_interface!` generates typed stubs that forward to `call_as`.
//!
//! ## Invariants
//!
//! - An invalid target is rejected before anything touches the serializer or transport.
//! - A serialization failure rejects the call without registering or sending it.
//! - A registered call is settled only by the response dispatcher, at most once.

use std::fmt;
use std::sync::Arc;

use futures::future;

use crate::endpoint::Shared;
use crate::fault::RemoteError;
use crate::message::Request;
use crate::metadata;
use crate::metadata::Annotated;
use crate::serializer;
use crate::transport;
use crate::value::FromValue;
use crate::value::Value;

/// Every way an outgoing call can fail.
#[derive(Debug, Clone)]
pub enum CallError {
    /// The method name cannot be called.
    InvalidTarget(String),
    /// The request could not be serialized, or the response could not be read.
    Serializer(serializer::Error),
    /// An annotation could not be encoded or decoded.
    Metadata(metadata::Error),
    /// The transport refused the request.
    Transport(transport::Error),
    /// The peer's implementation failed.
    Remote(RemoteError),
    /// The result did not have the shape a typed stub expected.
    UnexpectedReturn {
        method: String,
        expected: &'static str,
        found: &'static str,
    },
}

impl CallError {
    /// The remote failure, if the peer reported one.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            Self::Remote(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTarget(method) => write!(f, "Invalid call target: {:?}", method),
            Self::Serializer(e) => write!(f, "Serializer failure: {}", e),
            Self::Metadata(e) => write!(f, "Metadata failure: {}", e),
            Self::Transport(e) => write!(f, "Transport failure: {}", e),
            Self::Remote(e) => write!(f, "{}", e),
            Self::UnexpectedReturn { method, expected, found } => {
                write!(f, "'{}' returned {}, expected {}", method, found, expected)
            }
        }
    }
}

impl std::error::Error for CallError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Serializer(e) => Some(e),
            Self::Metadata(e) => Some(e),
            Self::Transport(e) => Some(e),
            Self::Remote(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serializer::Error> for CallError {
    fn from(e: serializer::Error) -> Self { Self::Serializer(e) }
}

impl From<metadata::Error> for CallError {
    fn from(e: metadata::Error) -> Self { Self::Metadata(e) }
}

impl From<transport::Error> for CallError {
    fn from(e: transport::Error) -> Self { Self::Transport(e) }
}

impl From<RemoteError> for CallError {
    fn from(e: RemoteError) -> Self { Self::Remote(e) }
}

pub type Result<T> = std::result::Result<T, CallError>;

/// Handle for calling the peer. Cheap to clone.
#[derive(Clone)]
pub struct Remote {
    shared: Arc<Shared>,
}

impl Remote {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Calls `method` on the peer with annotated arguments.
    ///
    /// Resolves with the peer's result and its annotation, or rejects with the
    /// peer's failure. There is no timeout: if the peer never answers, neither
    /// does this future. Dropping it does not withdraw the call.
    pub async fn invoke(&self, method: &str, args: Vec<Annotated>) -> Result<Annotated> {
        validate_target(method)?;
        let shared = &self.shared;

        let call_id = shared.registry.next_id();
        let metadata = shared.propagator.capture_args(&args)?;
        let request = Request {
            method: method.to_string(),
            args: args.into_iter().map(Annotated::into_value).collect(),
            call_id: call_id.clone(),
            metadata,
        };

        if shared.config.logging {
            tracing::debug!(
                key = %shared.config.key,
                method,
                call_id = %call_id,
                args = ?request.args,
                "sending call"
            );
        }

        let payload = shared.serializer.serialize(request.into_value()).await?;

        // Registered before publishing: the response may be dispatched on another
        // worker before `publish` returns.
        let rx = shared.registry.register(call_id.clone());
        if let Err(e) = shared.transport.publish(&shared.channels.call, payload).await {
            shared.registry.forget(&call_id);
            return Err(e.into());
        }

        match rx.await {
            Ok(completion) => completion,
            // Only `settle` removes a published call's entry, and it always sends.
            Err(_) => future::pending().await,
        }
    }

    /// Calls `method` with plain arguments and returns the plain result.
    pub async fn call<I>(&self, method: &str, args: I) -> Result<Value>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let args = args.into_iter().map(|arg| Annotated::new(arg.into())).collect();
        self.invoke(method, args).await.map(Annotated::into_value)
    }

    /// Calls `method` and extracts a typed result.
    pub async fn call_as<T, I>(&self, method: &str, args: I) -> Result<T>
    where
        T: FromValue,
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let value = self.call(method, args).await?;
        let found = value.kind();
        T::from_value(value).ok_or_else(|| CallError::UnexpectedReturn {
            method: method.to_string(),
            expected: std::any::type_name::<T>(),
            found,
        })
    }

    /// The namespace this surface calls into.
    pub fn key(&self) -> &str {
        &self.shared.config.key
    }
}

impl fmt::Debug for Remote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Remote").field("key", &self.shared.config.key).finish()
    }
}

/// A method name must be non-empty and free of whitespace and control characters.
fn validate_target(method: &str) -> Result<()> {
    let valid = !method.is_empty()
        && !method.chars().any(|c| c.is_whitespace() || c.is_control());
    if valid {
        Ok(())
    } else {
        Err(CallError::InvalidTarget(method.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_target() {
        assert!(validate_target("add").is_ok());
        assert!(validate_target("getUser").is_ok());
        assert!(validate_target("ns.method").is_ok());
        assert!(matches!(validate_target(""), Err(CallError::InvalidTarget(_))));
        assert!(matches!(validate_target("two words"), Err(CallError::InvalidTarget(_))));
        assert!(matches!(validate_target("nul\0"), Err(CallError::InvalidTarget(_))));
    }
}
