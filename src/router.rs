//! Message router: classifies inbound frames by `type`.
//!
//! | Inbound    | Action                                     |
//! |------------|--------------------------------------------|
//! | `call`     | spawn dispatch, keep reading               |
//! | `ping`     | reply `pong` with the same id              |
//! | `stop`     | stop the lifecycle, no reply               |
//! | other      | ignored                                    |
//!
//! Malformed frames are dropped; the connection stays up.

use crate::handler::CallDispatcher;
use crate::lifecycle::Lifecycle;
use crate::protocol::{decode, Message, MessageType};
use crate::writer::WriterHandle;

pub(crate) struct Router {
    dispatcher: CallDispatcher,
    writer: WriterHandle,
    lifecycle: Lifecycle,
}

impl Router {
    pub(crate) fn new(dispatcher: CallDispatcher, writer: WriterHandle, lifecycle: Lifecycle) -> Self {
        Self {
            dispatcher,
            writer,
            lifecycle,
        }
    }

    /// Decode and route one frame body.
    pub(crate) async fn route(&self, body: &[u8]) {
        let msg = match decode(body) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!("Dropping frame of {} bytes: {}", body.len(), e);
                return;
            }
        };

        match msg.kind {
            MessageType::Call => {
                self.dispatcher.spawn(msg, self.writer.clone());
            }
            MessageType::Ping => {
                if let Err(e) = self.writer.send_message(&Message::pong(msg.id)).await {
                    tracing::debug!("Pong not sent: {}", e);
                }
            }
            MessageType::Stop => {
                tracing::info!("Host requested stop");
                self.lifecycle.stop();
            }
            other => {
                tracing::debug!("Ignoring unexpected {} message", other);
            }
        }
    }
}
