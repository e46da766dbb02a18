//! Frame codec: one [`Message`] to and from its wire representation.
//!
//! Pure functions, no state and no I/O.
//!
//! # Example
//!
//! ```
//! use goproc_plugin::protocol::{decode, encode, Message, LENGTH_PREFIX_SIZE};
//!
//! let msg = Message::ping("abc");
//! let frame = encode(&msg).unwrap();
//!
//! let body = &frame[LENGTH_PREFIX_SIZE..];
//! assert_eq!(decode(body).unwrap(), msg);
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::message::Message;
use super::wire_format::{encode_length_prefix, LENGTH_PREFIX_SIZE};
use crate::error::{PluginError, Result};

/// Largest body a frame can carry.
pub const MAX_BODY_SIZE: usize = u32::MAX as usize;

/// Encode a message as `[length BE u32][JSON body]`.
///
/// # Errors
///
/// Returns `Serialization` if the message cannot be rendered as JSON or the
/// body does not fit a 32-bit length.
pub fn encode(msg: &Message) -> Result<Bytes> {
    encode_with_limit(msg, MAX_BODY_SIZE)
}

/// Encode a message, rejecting bodies longer than `max_body` bytes.
pub fn encode_with_limit(msg: &Message, max_body: usize) -> Result<Bytes> {
    let body = serde_json::to_vec(msg).map_err(|e| PluginError::Serialization(e.to_string()))?;
    if body.len() > max_body {
        return Err(PluginError::Serialization(format!(
            "body of {} bytes exceeds frame limit of {} bytes",
            body.len(),
            max_body
        )));
    }
    build_frame(&body)
}

/// Decode a frame body into a message.
///
/// # Errors
///
/// Returns `MalformedMessage` if the body is not a JSON object with a `type`.
pub fn decode(body: &[u8]) -> Result<Message> {
    serde_json::from_slice(body).map_err(|e| PluginError::MalformedMessage(e.to_string()))
}

/// Prefix an already-encoded body with its length.
pub fn build_frame(body: &[u8]) -> Result<Bytes> {
    let len = u32::try_from(body.len()).map_err(|_| {
        PluginError::Serialization(format!("body of {} bytes exceeds frame limit", body.len()))
    })?;

    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + body.len());
    buf.put_slice(&encode_length_prefix(len));
    buf.put_slice(body);
    Ok(buf.freeze())
}
