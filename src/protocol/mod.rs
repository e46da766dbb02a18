//! Protocol module - wire format, framing, and message types.
//!
//! This module implements the data plane protocol:
//! - 4-byte big-endian length prefix
//! - Frame buffer for accumulating partial reads
//! - JSON message model and frame codec

mod frame;
mod frame_buffer;
mod message;
mod wire_format;

pub use frame::{build_frame, decode, encode, encode_with_limit, MAX_BODY_SIZE};
pub use frame_buffer::FrameBuffer;
pub use message::{Message, MessageType, Params};
pub use wire_format::{
    decode_length_prefix, encode_length_prefix, DEFAULT_MAX_FRAME_SIZE, LENGTH_PREFIX_SIZE,
};
