//! # goproc-plugin
//!
//! Plugin-side runtime for the goproc process-plugin protocol.
//!
//! A host process spawns a plugin and passes it a transport address (Unix
//! domain socket path or named pipe) through the `GOPROC_PLUGIN_ADDRESS`
//! environment variable or the first process argument. The plugin listens on
//! that address, accepts the host's single connection, announces its
//! functions and then serves `call` requests until told to stop.
//!
//! ## Wire format
//!
//! Every message is a 4-byte big-endian length followed by that many bytes of
//! UTF-8 JSON:
//!
//! ```text
//! ┌──────────────┬────────────────────────────────────────────┐
//! │ length (u32) │ {"type":"call","id":"1","function":"add"…} │
//! └──────────────┴────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use goproc_plugin::{serve, Plugin};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct AddParams {
//!     a: i64,
//!     b: i64,
//! }
//!
//! #[tokio::main]
//! async fn main() -> std::process::ExitCode {
//!     let builder = Plugin::builder()
//!         .function("add", |p: AddParams| Ok::<_, String>(p.a + p.b));
//!
//!     serve(builder).await
//! }
//! ```

pub mod config;
pub mod error;
pub mod handler;
pub mod lifecycle;
pub mod protocol;
pub mod transport;
pub mod writer;

mod plugin;
mod router;
mod signal;

pub use config::PluginConfig;
pub use error::{PluginError, Result};
pub use handler::{FunctionRegistry, Handler};
pub use lifecycle::LifecycleState;
pub use plugin::{serve, serve_with_shutdown, Plugin, PluginBuilder};
pub use protocol::{Message, MessageType};
pub use signal::shutdown_signal;
