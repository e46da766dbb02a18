//! Handler module - function registry and call dispatch.
//!
//! Provides:
//! - [`FunctionRegistry`] - maps function names to handlers
//! - [`Handler`] - sync or async function value
//! - [`CallDispatcher`] - runs a `call` and produces its single reply
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use goproc_plugin::handler::{CallDispatcher, FunctionRegistry};
//!
//! let mut registry = FunctionRegistry::new();
//! registry.register_sync("echo", |params: serde_json::Value| Ok::<_, String>(params));
//!
//! let dispatcher = CallDispatcher::new(Arc::new(registry));
//! assert!(dispatcher.registry().contains("echo"));
//! ```

mod dispatcher;
mod registry;

pub use dispatcher::CallDispatcher;
pub use registry::{AsyncFn, BoxFuture, FunctionRegistry, Handler, HandlerResult, SyncFn};
