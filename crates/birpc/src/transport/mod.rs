//! # Transport Abstraction
//!
//! A minimal publish/subscribe interface for moving payloads between two contexts.
//!
//! ## Philosophy
//!
//! - **Payload-Oriented**: The Transport knows nothing about requests, responses or
//!   call identifiers. It moves opaque payloads on named events.
//! - **Point-to-Point**: A payload published on one side reaches the subscribers of
//!   the other side, never its own.
//! - **At-Most-Once**: No acknowledgment, no ordering, no retries. Everything built on
//!   top must tolerate lost, duplicated or reordered payloads.

pub mod memory;

use std::fmt;
use std::sync::Arc;

use crate::serializer::Payload;

pub use memory::MemoryTransport;

/// Errors that occur at the channel layer.
#[derive(Debug, Clone)]
pub enum Error {
    /// The peer is unreachable or the channel was closed.
    ConnectionLost(String),
    /// Generic I/O error or internal transport failure.
    Io(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Receives every payload the peer publishes on a subscribed event.
///
/// Handlers must not block; the endpoint's handlers only spawn a task.
pub type Handler = Arc<dyn Fn(Payload) + Send + Sync>;

/// Builds a transport when the endpoint is built.
pub type TransportFactory = Box<dyn FnOnce() -> Result<Arc<dyn Transport>> + Send>;

/// A publish/subscribe channel to exactly one peer.
///
/// This trait is designed to be object-safe (`Arc<dyn Transport>`).
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Registers a handler for payloads the peer publishes on `event`.
    ///
    /// # invariants
    /// - Multiple handlers may subscribe to the same event; each receives every payload.
    fn subscribe(&self, event: &str, handler: Handler);

    /// Sends a payload to the peer's subscribers of `event`.
    ///
    /// # invariants
    /// - Fire-and-forget: `Ok` means the payload left, not that it arrived.
    /// - Must return `Err` only for local failures (e.g. a closed channel).
    async fn publish(&self, event: &str, payload: Payload) -> Result<()>;
}
