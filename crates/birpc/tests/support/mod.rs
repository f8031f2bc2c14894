//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use birpc::Endpoint;
use birpc::EndpointBuilder;
use birpc::Fault;
use birpc::Implementations;
use birpc::Invocation;
use birpc::MemoryTransport;
use birpc::Payload;
use birpc::Transport;
use birpc::Value;
use birpc::transport;
use birpc::transport::Handler;
use tracing_subscriber::EnvFilter;

/// Installs a `RUST_LOG`-driven subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// How long a test waits before concluding a call will never settle.
pub const NEVER: Duration = Duration::from_millis(200);

/// add, echo, fail, and a slow echo that sleeps for its second argument in ms.
pub fn calculator() -> Implementations {
    Implementations::new()
        .register("add", |inv: Invocation| async move {
            let a: i64 = inv.arg_as(0)?;
            let b: i64 = inv.arg_as(1)?;
            Ok::<_, Fault>(Value::from(a + b))
        })
        .register("echo", |inv: Invocation| async move {
            Ok::<_, Fault>(inv.arg(0).clone())
        })
        .register("fail", |_inv: Invocation| async move {
            Err::<Value, _>(Fault::new("boom"))
        })
        .register("slowEcho", |inv: Invocation| async move {
            let delay: u64 = inv.arg_as(1)?;
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok::<_, Fault>(inv.arg(0).clone())
        })
}

pub struct Pair {
    pub client: Endpoint,
    pub server: Endpoint,
}

/// Connects two builders over a fresh in-memory pair.
pub fn connect(client: EndpointBuilder, server: EndpointBuilder) -> Pair {
    let (left, right) = MemoryTransport::pair();
    let client = client.transport(Arc::new(left)).build().expect("client endpoint");
    let server = server.transport(Arc::new(right)).build().expect("server endpoint");
    Pair { client, server }
}

/// Holds payloads published on return channels and releases each full batch in
/// reverse order.
pub struct Reversing {
    inner: MemoryTransport,
    batch: usize,
    held: Mutex<Vec<(String, Payload)>>,
}

impl Reversing {
    pub fn new(inner: MemoryTransport, batch: usize) -> Self {
        Self { inner, batch, held: Mutex::new(Vec::new()) }
    }
}

#[async_trait::async_trait]
impl Transport for Reversing {
    fn subscribe(&self, event: &str, handler: Handler) {
        self.inner.subscribe(event, handler);
    }

    async fn publish(&self, event: &str, payload: Payload) -> transport::Result<()> {
        if !event.ends_with("-return") {
            return self.inner.publish(event, payload).await;
        }

        let released = {
            let mut held = self.held.lock().unwrap();
            held.push((event.to_string(), payload));
            if held.len() < self.batch {
                return Ok(());
            }
            std::mem::take(&mut *held)
        };

        for (event, payload) in released.into_iter().rev() {
            self.inner.publish(&event, payload).await?;
        }
        Ok(())
    }
}
