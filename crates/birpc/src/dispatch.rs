//! # Dispatchers
//!
//! The two consumers an endpoint subscribes to its transport.
//!
//! - **Calls** (`{key}-call`): deserialize, look up the implementation, invoke it,
//!   answer on `{key}-return`.
//! - **Returns** (`{key}-return`): deserialize, find the pending call, settle it.
//!
//! Nothing here propagates a failure: a malformed payload, an unknown call id or a
//! misbehaving implementation ends in a dropped payload or an error response.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use futures::future;

use crate::endpoint::NotImplementedPolicy;
use crate::endpoint::Shared;
use crate::fault::Failure;
use crate::fault::Fault;
use crate::fault::RemoteError;
use crate::implementation::Invocation;
use crate::message::Outcome;
use crate::message::Request;
use crate::message::Response;
use crate::metadata::Annotated;
use crate::registry::CallId;
use crate::registry::Completion;
use crate::serializer::Payload;

/// Handles one payload from the peer's call channel.
pub(crate) async fn handle_call(shared: &Shared, payload: Payload) {
    let value = match shared.serializer.deserialize(payload).await {
        Ok(value) => value,
        Err(e) => {
            if shared.config.logging {
                tracing::warn!(key = %shared.config.key, error = %e, "dropping undecodable call");
            }
            return;
        }
    };

    let request = match Request::from_value(value) {
        Ok(request) => request,
        Err(e) => {
            if shared.config.logging {
                tracing::warn!(key = %shared.config.key, error = %e, "dropping malformed call");
            }
            return;
        }
    };

    let Request { method, args, call_id, metadata } = request;

    let Some(implementation) = shared.implementations.get(&method) else {
        match shared.config.not_implemented {
            NotImplementedPolicy::Lenient => {
                if shared.config.logging {
                    tracing::debug!(
                        key = %shared.config.key,
                        method = %method,
                        call_id = %call_id,
                        "ignoring call to unimplemented method"
                    );
                }
            }
            NotImplementedPolicy::Strict => {
                let fault = Fault::new(format!("method '{}' is not implemented", method));
                respond(shared, method, call_id, Err(fault)).await;
            }
        }
        return;
    };

    let args = match shared.propagator.restore_args(args, metadata) {
        Ok(args) => args,
        Err(e) => {
            let fault = Fault::new(format!("invalid argument metadata for '{}': {}", method, e));
            respond(shared, method, call_id, Err(fault)).await;
            return;
        }
    };

    if shared.config.logging {
        tracing::debug!(
            key = %shared.config.key,
            method = %method,
            call_id = %call_id,
            args = ?args.iter().map(Annotated::value).collect::<Vec<_>>(),
            "dispatching call"
        );
    }

    let invocation = Invocation::new(method.clone(), args);
    // Lazy, so a panic while building the future is caught along with one while polling it.
    let call = future::lazy(move |_| implementation(invocation)).flatten();
    let outcome = AssertUnwindSafe(call)
        .catch_unwind()
        .await
        .unwrap_or_else(|_| Err(Fault::new(format!("implementation of '{}' panicked", method))));

    if shared.config.logging {
        match &outcome {
            Ok(result) => tracing::debug!(
                key = %shared.config.key,
                method = %method,
                call_id = %call_id,
                result = ?result.value,
                "call succeeded"
            ),
            Err(fault) => tracing::debug!(
                key = %shared.config.key,
                method = %method,
                call_id = %call_id,
                error = %fault.message(),
                "call failed"
            ),
        }
    }

    respond(shared, method, call_id, outcome).await;
}

/// Builds, serializes and publishes the response for one call.
///
/// If the response cannot be built or serialized, a plain error response is sent in
/// its place so the caller is not left waiting.
async fn respond(
    shared: &Shared,
    method: String,
    call_id: CallId,
    outcome: Result<Annotated, Fault>,
) {
    let response = match build_response(shared, method.clone(), call_id.clone(), outcome) {
        Ok(response) => response,
        Err(fault) => fallback(method.clone(), call_id.clone(), fault),
    };

    let payload = match shared.serializer.serialize(response.into_value()).await {
        Ok(payload) => payload,
        Err(e) => {
            let fault = Fault::new(format!("failed to serialize result of '{}': {}", method, e));
            let response = fallback(method.clone(), call_id.clone(), fault);
            match shared.serializer.serialize(response.into_value()).await {
                Ok(payload) => payload,
                Err(e) => {
                    if shared.config.logging {
                        tracing::warn!(
                            key = %shared.config.key,
                            method = %method,
                            call_id = %call_id,
                            error = %e,
                            "dropping unserializable response"
                        );
                    }
                    return;
                }
            }
        }
    };

    if let Err(e) = shared.transport.publish(&shared.channels.ret, payload).await {
        if shared.config.logging {
            tracing::warn!(
                key = %shared.config.key,
                method = %method,
                call_id = %call_id,
                error = %e,
                "failed to publish response"
            );
        }
    }
}

fn build_response(
    shared: &Shared,
    method: String,
    call_id: CallId,
    outcome: Result<Annotated, Fault>,
) -> Result<Response, Fault> {
    let (outcome, metadata) = match outcome {
        Ok(Annotated { value, metadata }) => {
            let slot = shared
                .propagator
                .capture(&value, metadata.as_ref())
                .map_err(|e| {
                    Fault::new(format!("invalid result metadata for '{}': {}", method, e))
                })?;
            (Outcome::Return(value), slot)
        }
        Err(fault) => {
            let (failure, metadata) = fault.into_parts();
            let wire = failure.to_wire();
            let slot = shared
                .propagator
                .capture(&wire, metadata.as_ref())
                .map_err(|e| {
                    Fault::new(format!("invalid error metadata for '{}': {}", method, e))
                })?;
            (Outcome::Error(wire), slot)
        }
    };

    Ok(Response { method, call_id, outcome, metadata })
}

fn fallback(method: String, call_id: CallId, fault: Fault) -> Response {
    let (failure, _) = fault.into_parts();
    Response { method, call_id, outcome: Outcome::Error(failure.to_wire()), metadata: None }
}

/// Handles one payload from the peer's return channel.
pub(crate) async fn handle_return(shared: &Shared, payload: Payload) {
    let value = match shared.serializer.deserialize(payload).await {
        Ok(value) => value,
        Err(e) => {
            if shared.config.logging {
                tracing::warn!(
                    key = %shared.config.key,
                    error = %e,
                    "dropping undecodable response"
                );
            }
            return;
        }
    };

    let response = match Response::from_value(value) {
        Ok(response) => response,
        Err(e) => {
            if shared.config.logging {
                tracing::warn!(key = %shared.config.key, error = %e, "dropping malformed response");
            }
            return;
        }
    };

    // Unknown ids are expected: late duplicates, or another endpoint's traffic.
    if !shared.registry.contains(&response.call_id) {
        if shared.config.logging {
            tracing::trace!(
                key = %shared.config.key,
                call_id = %response.call_id,
                "ignoring response for unknown call"
            );
        }
        return;
    }

    let Response { method, call_id, outcome, metadata } = response;
    let completion: Completion = match outcome {
        Outcome::Return(value) => shared
            .propagator
            .restore(value, metadata)
            .map_err(Into::into),
        Outcome::Error(wire) => match shared.propagator.decode_slot(metadata) {
            Ok(metadata) => Err(RemoteError::new(Failure::from_wire(wire), metadata).into()),
            Err(e) => Err(e.into()),
        },
    };

    if shared.config.logging {
        tracing::debug!(
            key = %shared.config.key,
            method = %method,
            call_id = %call_id,
            ok = completion.is_ok(),
            "settling call"
        );
    }

    shared.registry.settle(&call_id, completion);
}
