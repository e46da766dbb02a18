//! Wire format encoding and decoding.
//!
//! Every frame is a 4-byte length prefix followed by the JSON body:
//! ```text
//! ┌──────────┬──────────────────────────┐
//! │ Length   │ Body                     │
//! │ 4 bytes  │ Length bytes, UTF-8 JSON │
//! │ uint32 BE│                          │
//! └──────────┴──────────────────────────┘
//! ```
//!
//! The length counts body bytes only. No padding, no trailer.

/// Length prefix size in bytes (fixed, exactly 4).
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default maximum body size accepted from the host (1 GB).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 1_073_741_824;

/// Encode a body length as a big-endian prefix.
///
/// # Example
///
/// ```
/// use goproc_plugin::protocol::encode_length_prefix;
///
/// assert_eq!(encode_length_prefix(258), [0, 0, 1, 2]);
/// ```
#[inline]
pub fn encode_length_prefix(len: u32) -> [u8; LENGTH_PREFIX_SIZE] {
    len.to_be_bytes()
}

/// Decode a big-endian length prefix.
///
/// Returns `None` if fewer than 4 bytes are available.
#[inline]
pub fn decode_length_prefix(buf: &[u8]) -> Option<u32> {
    if buf.len() < LENGTH_PREFIX_SIZE {
        return None;
    }
    Some(u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]))
}
