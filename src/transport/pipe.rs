//! Platform-specific pipe/socket implementation.
//!
//! - Unix: Unix Domain Socket
//! - Windows: Named Pipe
//!
//! The transport kind is picked from the address string itself: anything
//! containing `pipe` (e.g. `\\.\pipe\goproc_plugin_42`) is a named pipe,
//! everything else a filesystem socket path. Hosts rely on this rule, so it
//! must not be made smarter.
//!
//! # Example
//!
//! ```ignore
//! use goproc_plugin::transport::PipeListener;
//!
//! let listener = PipeListener::bind("/tmp/goproc_plugin_42.sock").await?;
//! let stream = listener.accept().await?;
//! ```

use tokio::io::{AsyncRead, AsyncWrite};

#[cfg(windows)]
use crate::error::PluginError;
use crate::error::Result;

/// Transport selected by the address heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Filesystem Unix domain socket. Stale socket files are removed on bind.
    UnixSocket,
    /// Named pipe (`\\.\pipe\...`).
    NamedPipe,
}

impl TransportKind {
    /// Classify an address.
    ///
    /// # Example
    ///
    /// ```
    /// use goproc_plugin::transport::TransportKind;
    ///
    /// assert_eq!(TransportKind::detect(r"\\.\pipe\goproc_plugin_7"), TransportKind::NamedPipe);
    /// assert_eq!(TransportKind::detect("/tmp/goproc_plugin_7.sock"), TransportKind::UnixSocket);
    /// ```
    pub fn detect(address: &str) -> Self {
        if address.contains("pipe") {
            TransportKind::NamedPipe
        } else {
            TransportKind::UnixSocket
        }
    }
}

// ============================================================================
// Unix Implementation
// ============================================================================

#[cfg(unix)]
mod unix_impl {
    use super::*;
    use std::path::Path;
    use tokio::net::{UnixListener, UnixStream};

    /// Unix Domain Socket listener.
    ///
    /// Accepts exactly one connection; `accept` consumes the listener.
    pub struct PipeListener {
        listener: UnixListener,
        path: String,
        kind: TransportKind,
    }

    /// Unix Domain Socket stream (connected).
    pub struct PipeStream {
        stream: UnixStream,
    }

    /// Cleanup guard that removes the socket file on drop.
    pub struct PipeCleanup {
        path: Option<String>,
    }

    impl Drop for PipeCleanup {
        fn drop(&mut self) {
            if let Some(path) = &self.path {
                let _ = std::fs::remove_file(path);
            }
        }
    }

    impl PipeListener {
        /// Bind to the given address.
        ///
        /// For socket paths, removes any existing socket file and creates
        /// the parent directory before binding. Pipe-style names are bound
        /// as-is (a domain socket named like a pipe).
        pub async fn bind(address: &str) -> Result<Self> {
            let kind = TransportKind::detect(address);

            if kind == TransportKind::UnixSocket {
                let path = Path::new(address);
                // The link itself, so a dangling symlink is cleared too.
                if std::fs::symlink_metadata(path).is_ok() {
                    std::fs::remove_file(path)?;
                }
                if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                    std::fs::create_dir_all(dir)?;
                }
            }

            let listener = UnixListener::bind(address)?;

            Ok(Self {
                listener,
                path: address.to_string(),
                kind,
            })
        }

        /// Accept the single host connection.
        pub async fn accept(self) -> Result<PipeStream> {
            let (stream, _addr) = self.listener.accept().await?;
            Ok(PipeStream { stream })
        }

        /// Get the socket path.
        pub fn path(&self) -> &str {
            &self.path
        }

        pub fn kind(&self) -> TransportKind {
            self.kind
        }

        /// Create a cleanup guard that removes the socket file on drop.
        pub fn cleanup_guard(&self) -> PipeCleanup {
            PipeCleanup {
                path: (self.kind == TransportKind::UnixSocket).then(|| self.path.clone()),
            }
        }
    }

    impl PipeStream {
        /// Split into owned read and write halves.
        pub fn into_split(
            self,
        ) -> (
            impl AsyncRead + Send + Unpin + 'static,
            impl AsyncWrite + Send + Unpin + 'static,
        ) {
            self.stream.into_split()
        }
    }
}

// ============================================================================
// Windows Implementation
// ============================================================================

#[cfg(windows)]
mod windows_impl {
    use super::*;
    use tokio::net::windows::named_pipe::{NamedPipeServer, ServerOptions};

    /// Windows Named Pipe listener holding the single server instance.
    pub struct PipeListener {
        server: NamedPipeServer,
        path: String,
        kind: TransportKind,
    }

    /// Windows Named Pipe stream (connected).
    pub struct PipeStream {
        pipe: NamedPipeServer,
    }

    /// Cleanup guard (no-op on Windows, pipes are auto-cleaned).
    pub struct PipeCleanup {
        _path: String,
    }

    impl PipeListener {
        /// Create the Named Pipe server instance.
        pub async fn bind(address: &str) -> Result<Self> {
            let kind = TransportKind::detect(address);
            if kind != TransportKind::NamedPipe {
                return Err(PluginError::Io(std::io::Error::new(
                    std::io::ErrorKind::Unsupported,
                    format!("{} is not a named pipe address", address),
                )));
            }

            let server = ServerOptions::new()
                .first_pipe_instance(true)
                .create(address)?;

            Ok(Self {
                server,
                path: address.to_string(),
                kind,
            })
        }

        /// Wait for the single host connection.
        pub async fn accept(self) -> Result<PipeStream> {
            self.server.connect().await?;
            Ok(PipeStream { pipe: self.server })
        }

        /// Get the pipe path.
        pub fn path(&self) -> &str {
            &self.path
        }

        pub fn kind(&self) -> TransportKind {
            self.kind
        }

        /// Create a cleanup guard (no-op on Windows).
        pub fn cleanup_guard(&self) -> PipeCleanup {
            PipeCleanup {
                _path: self.path.clone(),
            }
        }
    }

    impl PipeStream {
        /// Split into read and write halves.
        pub fn into_split(
            self,
        ) -> (
            impl AsyncRead + Send + Unpin + 'static,
            impl AsyncWrite + Send + Unpin + 'static,
        ) {
            tokio::io::split(self.pipe)
        }
    }
}

// ============================================================================
// Platform-independent re-exports
// ============================================================================

#[cfg(unix)]
pub use unix_impl::{PipeCleanup, PipeListener, PipeStream};

#[cfg(windows)]
pub use windows_impl::{PipeCleanup, PipeListener, PipeStream};
