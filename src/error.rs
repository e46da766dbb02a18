//! Error types for goproc-plugin.

use thiserror::Error;

/// Main error type for all plugin operations.
#[derive(Debug, Error)]
pub enum PluginError {
    /// No transport address in config, environment, or arguments.
    #[error("no transport address: set {0} or pass it as the first argument")]
    AddressMissing(&'static str),

    /// I/O error during listen/accept/read/write.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol violation on the byte stream (e.g. oversized frame).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Frame body is not valid JSON or has no `type`.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// Message could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// No function registered under the name.
    #[error("function {0} does not exist")]
    FunctionNotFound(String),

    /// A registered function reported a failure.
    #[error("{0}")]
    Handler(String),

    /// Fault in the dispatch machinery itself (e.g. a handler panicked).
    #[error("dispatch fault: {0}")]
    Dispatch(String),

    /// Connection closed (writer gone or stop already requested).
    #[error("connection closed")]
    ConnectionClosed,

    /// Operation not valid in the current lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
}

impl PluginError {
    /// Shorthand for a handler failure with the given message.
    pub fn handler(message: impl Into<String>) -> Self {
        PluginError::Handler(message.into())
    }
}

/// Result type alias using PluginError.
pub type Result<T> = std::result::Result<T, PluginError>;
