//! # Endpoint Builder
//!
//! Provides a fluent API for composing one side of a bidirectional RPC channel:
//! the namespace, the serializer, the local implementations and the transport.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use birpc::{Endpoint, Implementations, Invocation, MemoryTransport, Value};
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (left, right) = MemoryTransport::pair();
//!
//! let _server = Endpoint::builder()
//!     .implementations(Implementations::new().register("add", |inv: Invocation| async move {
//!         let sum = inv.arg_as::<i64>(0)? + inv.arg_as::<i64>(1)?;
//!         Ok::<_, birpc::Fault>(Value::from(sum))
//!     }))
//!     .transport(Arc::new(right))
//!     .build()?;
//!
//! let client = Endpoint::builder().transport(Arc::new(left)).build()?;
//! let sum = client.remote().call("add", [2, 3]).await?;
//! assert_eq!(sum, Value::from(5));
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::runtime::Handle;

use crate::dispatch;
use crate::implementation::Implementations;
use crate::metadata::MetadataCodec;
use crate::metadata::ObjectCodec;
use crate::metadata::Propagator;
use crate::registry::CallRegistry;
use crate::remote::Remote;
use crate::serializer::Identity;
use crate::serializer::Serializer;
use crate::transport;
use crate::transport::Transport;
use crate::transport::TransportFactory;

pub const DEFAULT_KEY: &str = "default";

#[derive(Debug)]
pub enum Error {
    /// The namespace key is empty.
    InvalidKey(String),
    /// Neither a transport nor a transport factory was supplied.
    MissingTransport,
    /// The transport factory failed.
    Transport(transport::Error),
    /// `build` was called outside a tokio runtime.
    NoRuntime,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidKey(key) => write!(f, "Invalid endpoint key: {:?}", key),
            Self::MissingTransport => write!(f, "No transport configured"),
            Self::Transport(e) => write!(f, "Transport error: {}", e),
            Self::NoRuntime => write!(f, "Endpoints must be built inside a tokio runtime"),
        }
    }
}

impl std::error::Error for Error {}

impl From<transport::Error> for Error {
    fn from(e: transport::Error) -> Self {
        Self::Transport(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// What happens when the peer calls a method this side does not implement.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NotImplementedPolicy {
    /// Drop the call. The caller's future never settles.
    #[default]
    Lenient,
    /// Answer with an error naming the method.
    Strict,
}

/// Plain options of an endpoint.
#[derive(Clone, Debug)]
pub struct Config {
    /// Namespace separating endpoints that share one transport.
    pub key: String,
    pub not_implemented: NotImplementedPolicy,
    /// Emit `tracing` events for calls and their outcomes.
    pub logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            key: DEFAULT_KEY.to_string(),
            not_implemented: NotImplementedPolicy::default(),
            logging: true,
        }
    }
}

/// The two event names an endpoint uses on its transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Channels {
    pub call: String,
    pub ret: String,
}

impl Channels {
    pub fn for_key(key: &str) -> Self {
        Self {
            call: format!("{}-call", key),
            ret: format!("{}-return", key),
        }
    }
}

/// State shared by the remote surface and both dispatchers.
pub(crate) struct Shared {
    pub(crate) config: Config,
    pub(crate) channels: Channels,
    pub(crate) serializer: Arc<dyn Serializer>,
    pub(crate) propagator: Propagator,
    pub(crate) registry: CallRegistry,
    pub(crate) implementations: Implementations,
    pub(crate) transport: Arc<dyn Transport>,
}

enum TransportSource {
    Ready(Arc<dyn Transport>),
    Factory(TransportFactory),
}

/// Fluent builder for an `Endpoint`.
pub struct EndpointBuilder {
    config: Config,
    serializer: Arc<dyn Serializer>,
    codec: Arc<dyn MetadataCodec>,
    implementations: Implementations,
    transport: Option<TransportSource>,
}

impl EndpointBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            serializer: Arc::new(Identity),
            codec: Arc::new(ObjectCodec),
            implementations: Implementations::new(),
            transport: None,
        }
    }

    /// Replaces every plain option at once.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.config.key = key.into();
        self
    }

    pub fn not_implemented(mut self, policy: NotImplementedPolicy) -> Self {
        self.config.not_implemented = policy;
        self
    }

    pub fn logging(mut self, enabled: bool) -> Self {
        self.config.logging = enabled;
        self
    }

    pub fn serializer(mut self, serializer: impl Serializer) -> Self {
        self.serializer = Arc::new(serializer);
        self
    }

    pub fn metadata_codec(mut self, codec: impl MetadataCodec) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    pub fn implementations(mut self, implementations: Implementations) -> Self {
        self.implementations = implementations;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(TransportSource::Ready(transport));
        self
    }

    /// Defers transport construction to `build`.
    pub fn transport_factory(
        mut self,
        factory: impl FnOnce() -> transport::Result<Arc<dyn Transport>> + Send + 'static,
    ) -> Self {
        self.transport = Some(TransportSource::Factory(Box::new(factory)));
        self
    }

    /// Validates the options, subscribes both dispatchers and returns the endpoint.
    ///
    /// Must be called from within a tokio runtime; incoming payloads are dispatched
    /// on tasks spawned onto it.
    pub fn build(self) -> Result<Endpoint> {
        if self.config.key.is_empty() {
            return Err(Error::InvalidKey(self.config.key));
        }
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;

        let transport = match self.transport {
            Some(TransportSource::Ready(transport)) => transport,
            Some(TransportSource::Factory(factory)) => factory()?,
            None => return Err(Error::MissingTransport),
        };

        let shared = Arc::new(Shared {
            channels: Channels::for_key(&self.config.key),
            config: self.config,
            serializer: self.serializer,
            propagator: Propagator::new(self.codec),
            registry: CallRegistry::new(),
            implementations: self.implementations,
            transport,
        });

        subscribe(&shared, runtime);

        if shared.config.logging {
            tracing::debug!(
                key = %shared.config.key,
                methods = shared.implementations.len(),
                "endpoint ready"
            );
        }

        Ok(Endpoint { shared })
    }
}

impl Default for EndpointBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Wires both dispatchers onto the transport.
///
/// Handlers hold a weak reference, so a dropped endpoint stops dispatching even if
/// the transport outlives it.
fn subscribe(shared: &Arc<Shared>, runtime: Handle) {
    let weak = Arc::downgrade(shared);
    let rt = runtime.clone();
    shared.transport.subscribe(
        &shared.channels.call,
        Arc::new(move |payload| {
            let Some(shared) = weak.upgrade() else { return };
            rt.spawn(async move {
                dispatch::handle_call(&shared, payload).await;
            });
        }),
    );

    let weak = Arc::downgrade(shared);
    shared.transport.subscribe(
        &shared.channels.ret,
        Arc::new(move |payload| {
            let Some(shared) = weak.upgrade() else { return };
            runtime.spawn(async move {
                dispatch::handle_return(&shared, payload).await;
            });
        }),
    );
}

/// One side of a bidirectional RPC channel.
///
/// Serves its `Implementations` to the peer and hands out `Remote` surfaces for
/// calling the peer back.
pub struct Endpoint {
    shared: Arc<Shared>,
}

impl Endpoint {
    pub fn builder() -> EndpointBuilder {
        EndpointBuilder::new()
    }

    /// A cheap, cloneable handle for calling the peer.
    pub fn remote(&self) -> Remote {
        Remote::new(self.shared.clone())
    }

    pub fn key(&self) -> &str {
        &self.shared.config.key
    }

    pub fn channels(&self) -> &Channels {
        &self.shared.channels
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Number of calls sent by this endpoint that have not been answered.
    pub fn pending_calls(&self) -> usize {
        self.shared.registry.len()
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("config", &self.shared.config)
            .field("implementations", &self.shared.implementations)
            .field("pending", &self.shared.registry.len())
            .finish()
    }
}
