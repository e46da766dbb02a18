//! Call dispatcher: turns one `call` message into exactly one reply.
//!
//! Every failure attributable to a call, including an unknown function, a
//! handler error, a handler panic, or a result that cannot be encoded, becomes an
//! `error` reply carrying the call's `id`. Nothing escapes as a process fault.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use bytes::Bytes;
use tokio::task::JoinHandle;

use super::registry::{FunctionRegistry, Handler, HandlerResult};
use crate::error::PluginError;
use crate::protocol::{encode_with_limit, Message, MAX_BODY_SIZE};
use crate::writer::WriterHandle;

/// Dispatches `call` messages against a shared, read-only registry.
#[derive(Clone)]
pub struct CallDispatcher {
    registry: Arc<FunctionRegistry>,
}

impl CallDispatcher {
    pub fn new(registry: Arc<FunctionRegistry>) -> Self {
        Self { registry }
    }

    /// Shared registry.
    pub fn registry(&self) -> &Arc<FunctionRegistry> {
        &self.registry
    }

    /// Run one call to completion and build its reply.
    pub async fn dispatch(&self, call: Message) -> Message {
        let id = call.id;
        let name = call.function.unwrap_or_default();

        let Some(handler) = self.registry.lookup(&name).cloned() else {
            tracing::debug!("Call {} for unknown function {}", id, name);
            return Message::error(id, PluginError::FunctionNotFound(name).to_string());
        };

        let params = call.params.unwrap_or_default();
        let outcome = match handler {
            Handler::Sync(f) => invoke_guarded(&name, || f(params)),
            Handler::Async(f) => match catch_unwind(AssertUnwindSafe(|| f(params))) {
                Ok(fut) => match tokio::spawn(fut).await {
                    Ok(result) => result,
                    Err(e) if e.is_panic() => Err(panicked(&name, e.into_panic())),
                    Err(e) => Err(PluginError::Dispatch(format!(
                        "function {} did not complete: {}",
                        name, e
                    ))),
                },
                Err(panic) => Err(panicked(&name, panic)),
            },
        };

        match outcome {
            Ok(value) => Message::result(id, value),
            Err(e) => {
                tracing::debug!("Function {} failed for call {}: {}", name, id, e);
                Message::error(id, e.to_string())
            }
        }
    }

    /// Dispatch a call on its own task and queue the reply.
    ///
    /// Calls never wait on each other. A closed writer means the connection
    /// is gone; the reply is dropped quietly.
    pub fn spawn(&self, call: Message, writer: WriterHandle) -> JoinHandle<()> {
        let dispatcher = self.clone();

        tokio::spawn(async move {
            let reply = dispatcher.dispatch(call).await;
            let Some(frame) = encode_reply(&reply, MAX_BODY_SIZE) else {
                return;
            };

            if let Err(e) = writer.send(frame).await {
                tracing::debug!("Reply for call {} not sent: {}", reply.id, e);
            }
        })
    }
}

fn invoke_guarded(name: &str, f: impl FnOnce() -> HandlerResult) -> HandlerResult {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|panic| Err(panicked(name, panic)))
}

fn panicked(name: &str, panic: Box<dyn Any + Send>) -> PluginError {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    tracing::error!("Function {} panicked: {}", name, detail);
    PluginError::Dispatch(format!("function {} panicked: {}", name, detail))
}

/// Encode a reply, falling back to an `error` reply describing the failure.
fn encode_reply(reply: &Message, max_body: usize) -> Option<Bytes> {
    match encode_with_limit(reply, max_body) {
        Ok(frame) => Some(frame),
        Err(e) => {
            tracing::warn!("Cannot encode reply for call {}: {}", reply.id, e);
            match encode_with_limit(&Message::error(reply.id.clone(), e.to_string()), max_body) {
                Ok(frame) => Some(frame),
                Err(e) => {
                    tracing::error!("Cannot encode error reply for call {}: {}", reply.id, e);
                    None
                }
            }
        }
    }
}
