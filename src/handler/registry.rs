//! Function registry mapping names to handlers.
//!
//! A handler is one of two explicit variants:
//! - [`Handler::Sync`] completes immediately with a value or failure
//! - [`Handler::Async`] returns a future that resolves later
//!
//! The typed constructors deserialize `params` into the handler's input type
//! and serialize its output into the `result` JSON value.
//!
//! # Example
//!
//! ```
//! use goproc_plugin::handler::FunctionRegistry;
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct AddParams {
//!     a: i64,
//!     b: i64,
//! }
//!
//! let mut registry = FunctionRegistry::new();
//! registry.register_sync("add", |p: AddParams| Ok::<_, String>(p.a + p.b));
//! registry.register_async("sleep", |_: serde_json::Value| async { Ok::<_, String>("done") });
//!
//! assert_eq!(registry.function_names(), vec!["add", "sleep"]);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{PluginError, Result};
use crate::protocol::Params;

/// Outcome of one handler invocation: the `result` value or a failure.
pub type HandlerResult = Result<Value>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Handler that completes immediately.
pub type SyncFn = dyn Fn(Params) -> HandlerResult + Send + Sync;

/// Handler that completes via a future.
pub type AsyncFn = dyn Fn(Params) -> BoxFuture<'static, HandlerResult> + Send + Sync;

/// A registered function.
#[derive(Clone)]
pub enum Handler {
    Sync(Arc<SyncFn>),
    Async(Arc<AsyncFn>),
}

impl Handler {
    /// Wrap a synchronous function taking typed params.
    pub fn sync<F, T, R, E>(handler: F) -> Self
    where
        F: Fn(T) -> std::result::Result<R, E> + Send + Sync + 'static,
        T: DeserializeOwned + 'static,
        R: Serialize + 'static,
        E: fmt::Display + 'static,
    {
        Handler::Sync(Arc::new(move |params: Params| -> HandlerResult {
            let input = parse_params(params)?;
            let output = handler(input).map_err(|e| PluginError::Handler(e.to_string()))?;
            to_result_value(&output)
        }))
    }

    /// Wrap an asynchronous function taking typed params.
    pub fn from_async<F, T, Fut, R, E>(handler: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + 'static,
        Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
        R: Serialize + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        Handler::Async(Arc::new(move |params: Params| -> BoxFuture<'static, HandlerResult> {
            let input = match parse_params(params) {
                Ok(v) => v,
                Err(e) => return Box::pin(async move { Err(e) }),
            };

            let fut = handler(input);
            Box::pin(async move {
                let output = fut.await.map_err(|e| PluginError::Handler(e.to_string()))?;
                to_result_value(&output)
            })
        }))
    }

    /// Whether this handler completes via a future.
    #[inline]
    pub fn is_async(&self) -> bool {
        matches!(self, Handler::Async(_))
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Sync(_) => f.write_str("Handler::Sync"),
            Handler::Async(_) => f.write_str("Handler::Async"),
        }
    }
}

fn parse_params<T: DeserializeOwned>(params: Params) -> Result<T> {
    serde_json::from_value(Value::Object(params))
        .map_err(|e| PluginError::Handler(format!("invalid params: {}", e)))
}

fn to_result_value<R: Serialize>(output: &R) -> HandlerResult {
    serde_json::to_value(output)
        .map_err(|e| PluginError::Serialization(format!("cannot encode result: {}", e)))
}

/// Registry mapping function names to handlers.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Handler>,
}

impl FunctionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `name`.
    ///
    /// An existing entry with the same name is replaced (last write wins);
    /// the replacement is logged so collisions stay visible.
    pub fn register(&mut self, name: &str, handler: Handler) {
        if self.functions.insert(name.to_string(), handler).is_some() {
            tracing::warn!("Function {} registered twice, keeping the latest handler", name);
        }
    }

    /// Register a synchronous function.
    pub fn register_sync<F, T, R, E>(&mut self, name: &str, handler: F)
    where
        F: Fn(T) -> std::result::Result<R, E> + Send + Sync + 'static,
        T: DeserializeOwned + 'static,
        R: Serialize + 'static,
        E: fmt::Display + 'static,
    {
        self.register(name, Handler::sync(handler));
    }

    /// Register an asynchronous function.
    pub fn register_async<F, T, Fut, R, E>(&mut self, name: &str, handler: F)
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + 'static,
        Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
        R: Serialize + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        self.register(name, Handler::from_async(handler));
    }

    /// Look up a handler by name.
    pub fn lookup(&self, name: &str) -> Option<&Handler> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// All registered names, sorted. Advertised in the `register` handshake.
    pub fn function_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
