//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a state machine for handling fragmented frames:
//! - `WaitingForHeader`: Need all 4 length-prefix bytes
//! - `WaitingForBody`: Length known, need N body bytes
//!
//! # Example
//!
//! ```
//! use goproc_plugin::protocol::{encode, FrameBuffer, Message};
//!
//! let frame = encode(&Message::ping("1")).unwrap();
//! let mut buffer = FrameBuffer::new();
//!
//! // Data arrives in arbitrary chunks from the socket
//! assert!(buffer.push(&frame[..3]).unwrap().is_empty());
//! let bodies = buffer.push(&frame[3..]).unwrap();
//! assert_eq!(bodies.len(), 1);
//! ```

use bytes::{Bytes, BytesMut};

use super::wire_format::{decode_length_prefix, DEFAULT_MAX_FRAME_SIZE, LENGTH_PREFIX_SIZE};
use crate::error::{PluginError, Result};

/// Initial buffer capacity.
const DEFAULT_CAPACITY: usize = 64 * 1024;

/// State machine for frame parsing.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Fewer than 4 prefix bytes seen for the current frame.
    WaitingForHeader,
    /// Prefix consumed, waiting for `len` body bytes.
    WaitingForBody { len: usize },
}

/// Buffer for accumulating incoming bytes and extracting complete frame bodies.
///
/// Holds only bytes that have not yet been resolved into a frame.
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Maximum allowed body size.
    max_frame_size: u32,
}

impl FrameBuffer {
    /// Create a new frame buffer with default settings.
    ///
    /// Default capacity: 64KB, max body: 1GB.
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a new frame buffer with a custom max body size.
    pub fn with_max_frame_size(max_frame_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(DEFAULT_CAPACITY),
            state: State::WaitingForHeader,
            max_frame_size,
        }
    }

    /// Push data into the buffer and extract all complete frame bodies.
    ///
    /// Partial data is kept for the next push. A zero-length body is
    /// yielded as an empty `Bytes`.
    ///
    /// # Errors
    ///
    /// Returns `Protocol` if a length prefix exceeds the max frame size.
    /// The stream cannot be resynchronised after that.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>> {
        self.buffer.extend_from_slice(data);

        let mut bodies = Vec::new();
        while let Some(body) = self.try_extract_one()? {
            bodies.push(body);
        }

        Ok(bodies)
    }

    /// Try to extract a single body.
    ///
    /// Returns:
    /// - `Ok(Some(body))` if a complete frame was extracted
    /// - `Ok(None)` if more data is needed
    /// - `Err(...)` on an oversized length prefix
    fn try_extract_one(&mut self) -> Result<Option<Bytes>> {
        loop {
            match self.state {
                State::WaitingForHeader => {
                    let Some(len) = decode_length_prefix(&self.buffer) else {
                        return Ok(None);
                    };

                    if len > self.max_frame_size {
                        return Err(PluginError::Protocol(format!(
                            "frame size {} exceeds maximum {}",
                            len, self.max_frame_size
                        )));
                    }

                    let _ = self.buffer.split_to(LENGTH_PREFIX_SIZE);
                    self.state = State::WaitingForBody { len: len as usize };
                }

                State::WaitingForBody { len } => {
                    if self.buffer.len() < len {
                        return Ok(None);
                    }

                    let body = self.buffer.split_to(len).freeze();
                    self.state = State::WaitingForHeader;
                    return Ok(Some(body));
                }
            }
        }
    }

    /// Get the number of buffered (unconsumed) bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Body length of the frame in progress, if its prefix has fully arrived.
    pub fn expected_len(&self) -> Option<usize> {
        match self.state {
            State::WaitingForHeader => None,
            State::WaitingForBody { len } => Some(len),
        }
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHeader;
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
