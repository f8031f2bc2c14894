//! # birpc
//!
//! Bidirectional RPC over an at-most-once publish/subscribe channel.
//!
//! Each side builds an `Endpoint` that serves a table of named async functions and
//! hands out a `Remote` for calling the other side's table. Calls are correlated with
//! responses by an opaque call id, so any number may be in flight and responses may
//! arrive in any order.
//!
//! ## Architecture
//!
//! - `serializer`: turns messages into transport payloads (identity or JSON).
//! - `metadata`: annotations carried beside, not inside, serialized values.
//! - `registry`: call ids and the calls still waiting for an answer.
//! - `dispatch`: consumers of the call and return channels.
//! - `remote`: the outgoing call surface; `remote_interface!` adds typed stubs.
//! - `transport`: the publish/subscribe seam, plus an in-memory implementation.

mod dispatch;
mod macros;

pub mod endpoint;
pub mod fault;
pub mod implementation;
pub mod message;
pub mod metadata;
pub mod registry;
pub mod remote;
pub mod serializer;
pub mod transport;
pub mod value;

pub use endpoint::Channels;
pub use endpoint::Config;
pub use endpoint::Endpoint;
pub use endpoint::EndpointBuilder;
pub use endpoint::NotImplementedPolicy;
pub use fault::Failure;
pub use fault::Fault;
pub use fault::RemoteError;
pub use implementation::Implementations;
pub use implementation::Invocation;
pub use metadata::Annotated;
pub use metadata::Metadata;
pub use metadata::MetadataCodec;
pub use registry::CallId;
pub use remote::CallError;
pub use remote::Remote;
pub use serializer::Identity;
pub use serializer::Json;
pub use serializer::Payload;
pub use serializer::Serializer;
pub use transport::MemoryTransport;
pub use transport::Transport;
pub use value::FromValue;
pub use value::Opaque;
pub use value::Value;
