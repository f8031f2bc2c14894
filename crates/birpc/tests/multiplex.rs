//! Several namespaces sharing one transport, and typed stubs over them.

mod support;

use std::sync::Arc;

use anyhow::Result;
use birpc::CallError;
use birpc::Endpoint;
use birpc::Fault;
use birpc::Implementations;
use birpc::Invocation;
use birpc::MemoryTransport;
use birpc::NotImplementedPolicy;
use birpc::Value;
use support::calculator;
use support::init_tracing;

birpc::remote_interface! {
    /// The calculator served under the "calc" key.
    pub struct Calculator {
        fn add(a: i64, b: i64) -> i64;
        fn echo(text: String) -> String;
        fn fail() -> ();
    }
}

birpc::remote_interface! {
    struct Greeter {
        fn greet(name: &str) -> String as "sayHello";
        fn shout(name: &str) -> i64 as "sayHello";
    }
}

fn greeter() -> Implementations {
    Implementations::new().register("sayHello", |inv: Invocation| async move {
        let name: String = inv.arg_as(0)?;
        Ok::<_, Fault>(Value::from(format!("hello, {}", name)))
    })
}

#[tokio::test]
async fn test_keys_share_a_transport_without_crosstalk() -> Result<()> {
    init_tracing();
    let (left, right) = MemoryTransport::pair();
    let (left, right) = (Arc::new(left), Arc::new(right));

    let calc_client = Endpoint::builder().key("calc").transport(left.clone()).build()?;
    let greet_client = Endpoint::builder().key("greet").transport(left.clone()).build()?;
    let _calc_server = Endpoint::builder()
        .key("calc")
        .not_implemented(NotImplementedPolicy::Strict)
        .implementations(calculator())
        .transport(right.clone())
        .build()?;
    let _greet_server = Endpoint::builder()
        .key("greet")
        .not_implemented(NotImplementedPolicy::Strict)
        .implementations(greeter())
        .transport(right.clone())
        .build()?;

    assert_eq!(calc_client.channels().call, "calc-call");
    assert_eq!(greet_client.channels().ret, "greet-return");
    assert_eq!(right.subscriber_count("calc-call"), 1);
    assert_eq!(right.subscriber_count("greet-call"), 1);

    let sum = calc_client.remote().call("add", [4, 5]).await?;
    assert_eq!(sum, Value::from(9));

    let hello = greet_client.remote().call("sayHello", ["bob"]).await?;
    assert_eq!(hello, Value::from("hello, bob"));

    // Each namespace only sees its own table.
    let err = greet_client.remote().call("add", [1, 2]).await.unwrap_err();
    assert!(err.remote().is_some_and(|e| e.message().contains("not implemented")));

    assert_eq!(calc_client.pending_calls(), 0);
    assert_eq!(greet_client.pending_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn test_typed_stubs_forward_to_remote() -> Result<()> {
    init_tracing();
    let (left, right) = MemoryTransport::pair();
    let client = Endpoint::builder().key("calc").transport(Arc::new(left)).build()?;
    let _server = Endpoint::builder()
        .key("calc")
        .implementations(calculator())
        .transport(Arc::new(right))
        .build()?;

    let calc = Calculator::new(client.remote());
    assert_eq!(calc.remote().key(), "calc");
    assert_eq!(calc.add(40, 2).await?, 42);
    assert_eq!(calc.echo("ping".to_string()).await?, "ping");

    let err = calc.fail().await.unwrap_err();
    assert_eq!(err.remote().map(|e| e.message()), Some("boom".to_string()));
    Ok(())
}

#[tokio::test]
async fn test_typed_stub_rejects_unexpected_shape() -> Result<()> {
    init_tracing();
    let (left, right) = MemoryTransport::pair();
    let client = Endpoint::builder().transport(Arc::new(left)).build()?;
    let _server = Endpoint::builder()
        .implementations(greeter())
        .transport(Arc::new(right))
        .build()?;

    let greeter = Greeter::new(client.remote());
    assert_eq!(greeter.greet("eve").await?, "hello, eve");

    let err = greeter.shout("eve").await.unwrap_err();
    match err {
        CallError::UnexpectedReturn { method, found, .. } => {
            assert_eq!(method, "sayHello");
            assert_eq!(found, "string");
        }
        other => panic!("expected a shape mismatch, got {other}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_closed_transport_fails_fast() -> Result<()> {
    init_tracing();
    let (left, _right) = MemoryTransport::pair();
    let left = Arc::new(left);
    let client = Endpoint::builder().transport(left.clone()).build()?;

    left.close();
    let err = Calculator::new(client.remote()).add(1, 2).await.unwrap_err();
    assert!(matches!(err, CallError::Transport(_)));
    assert_eq!(client.pending_calls(), 0);
    Ok(())
}
