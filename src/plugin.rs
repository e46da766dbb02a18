//! Plugin builder and runtime loop.
//!
//! The [`PluginBuilder`] collects functions and configuration. The
//! [`Plugin`] manages the connection lifecycle:
//! 1. Resolve the address and bind the listener
//! 2. Accept the host connection
//! 3. Send `register` with every function name
//! 4. Read frames and route them until stopped
//!
//! # Example
//!
//! ```no_run
//! use goproc_plugin::Plugin;
//! use serde_json::Value;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), goproc_plugin::PluginError> {
//!     let plugin = Plugin::builder()
//!         .function("echo", |params: Value| Ok::<_, String>(params))
//!         .async_function("later", |_: Value| async { Ok::<_, String>("done") })
//!         .start()
//!         .await?;
//!
//!     plugin.wait_for_shutdown().await
//! }
//! ```

use std::future::Future;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinHandle;

use crate::config::PluginConfig;
use crate::error::{PluginError, Result};
use crate::handler::{CallDispatcher, FunctionRegistry, Handler};
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::protocol::{encode, FrameBuffer, Message};
use crate::router::Router;
use crate::signal::shutdown_signal;
use crate::transport::{PipeCleanup, PipeListener};
use crate::writer::spawn_writer_task;

/// Builder for configuring and creating a plugin.
pub struct PluginBuilder {
    registry: FunctionRegistry,
    config: PluginConfig,
}

impl PluginBuilder {
    pub fn new() -> Self {
        Self {
            registry: FunctionRegistry::new(),
            config: PluginConfig::default(),
        }
    }

    /// Register a synchronous function.
    pub fn function<F, T, R, E>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(T) -> std::result::Result<R, E> + Send + Sync + 'static,
        T: DeserializeOwned + 'static,
        R: Serialize + 'static,
        E: std::fmt::Display + 'static,
    {
        self.registry.register_sync(name, handler);
        self
    }

    /// Register an asynchronous function.
    pub fn async_function<F, T, Fut, R, E>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + 'static,
        Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
        R: Serialize + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        self.registry.register_async(name, handler);
        self
    }

    /// Register a prebuilt handler.
    pub fn handler(mut self, name: &str, handler: Handler) -> Self {
        self.registry.register(name, handler);
        self
    }

    /// Use this address instead of the environment or process arguments.
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.config.address = Some(address.into());
        self
    }

    /// Set the socket read buffer size.
    ///
    /// Default: 64 KB
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Set the largest frame body accepted from the host.
    ///
    /// Default: 1 GiB
    pub fn max_frame_size(mut self, size: u32) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Set the outbound frame queue capacity.
    ///
    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Fail startup if the host has not connected within `timeout`.
    pub fn accept_timeout(mut self, timeout: Duration) -> Self {
        self.config.accept_timeout = Some(timeout);
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: PluginConfig) -> Self {
        self.config = config;
        self
    }

    /// Build an unstarted plugin.
    pub fn build(self) -> Plugin {
        Plugin {
            registry: Some(self.registry),
            config: self.config,
            lifecycle: Lifecycle::new(),
            session: None,
        }
    }

    /// Build and start the plugin.
    pub async fn start(self) -> Result<Plugin> {
        let mut plugin = self.build();
        plugin.start().await?;
        Ok(plugin)
    }
}

impl Default for PluginBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A live connection with its background tasks.
struct Session {
    address: String,
    read_task: JoinHandle<Result<()>>,
    writer_task: JoinHandle<Result<()>>,
    _cleanup: PipeCleanup,
}

/// A plugin process serving one host connection.
///
/// Dropping a running plugin stops it.
pub struct Plugin {
    /// Taken when the plugin starts; immutable from then on.
    registry: Option<FunctionRegistry>,
    config: PluginConfig,
    lifecycle: Lifecycle,
    session: Option<Session>,
}

impl Plugin {
    pub fn builder() -> PluginBuilder {
        PluginBuilder::new()
    }

    /// Register a function before the plugin starts.
    ///
    /// # Errors
    ///
    /// `InvalidState` once the plugin has started.
    pub fn register(&mut self, name: &str, handler: Handler) -> Result<()> {
        let registry = self
            .registry
            .as_mut()
            .ok_or(PluginError::InvalidState("functions cannot be added after start"))?;
        registry.register(name, handler);
        Ok(())
    }

    /// Listen, accept the host, announce functions and start serving.
    ///
    /// Any failure leaves the plugin `Stopped`.
    pub async fn start(&mut self) -> Result<()> {
        if self.lifecycle.state() != LifecycleState::Unstarted {
            return Err(PluginError::InvalidState("plugin already started"));
        }

        match self.open().await {
            Ok(session) => {
                tracing::info!("Plugin running on {}", session.address);
                self.session = Some(session);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Plugin startup failed: {}", e);
                self.lifecycle.stop();
                Err(e)
            }
        }
    }

    async fn open(&mut self) -> Result<Session> {
        let registry = self
            .registry
            .take()
            .ok_or(PluginError::InvalidState("plugin already started"))?;

        // 1. Bind the listener
        let address = self.config.resolve_address()?;
        let listener = PipeListener::bind(&address).await?;
        let cleanup = listener.cleanup_guard();
        self.advance(LifecycleState::Listening)?;
        tracing::debug!("Listening on {} ({:?})", address, listener.kind());

        // 2. Accept the single host connection; the listener is consumed
        let stream = match self.config.accept_timeout {
            Some(limit) => tokio::time::timeout(limit, listener.accept())
                .await
                .map_err(|_| {
                    PluginError::Io(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        format!("host did not connect within {:?}", limit),
                    ))
                })??,
            None => listener.accept().await?,
        };
        self.advance(LifecycleState::Connected)?;

        // 3. Announce functions before anything else goes out
        let (reader, mut write_half) = stream.into_split();
        let names = registry.function_names();
        let frame = encode(&Message::register(names.iter().map(String::as_str)))?;
        write_half.write_all(&frame).await?;
        write_half.flush().await?;
        self.advance(LifecycleState::Registered)?;
        tracing::debug!("Registered {} functions", names.len());

        // 4. Writer task owns the write half from here on
        let (writer, writer_task) = spawn_writer_task(
            write_half,
            self.config.channel_capacity,
            self.lifecycle.clone(),
        );
        let dispatcher = CallDispatcher::new(Arc::new(registry));
        let router = Router::new(dispatcher, writer, self.lifecycle.clone());

        // 5. Serve
        self.advance(LifecycleState::Running)?;
        let read_task = tokio::spawn(read_loop(
            reader,
            router,
            self.lifecycle.clone(),
            self.config.read_buffer_size,
            self.config.max_frame_size,
        ));

        Ok(Session {
            address,
            read_task,
            writer_task,
            _cleanup: cleanup,
        })
    }

    fn advance(&self, next: LifecycleState) -> Result<()> {
        if self.lifecycle.advance(next) {
            Ok(())
        } else {
            Err(PluginError::ConnectionClosed)
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Address the plugin is serving on, once started.
    pub fn address(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.address.as_str())
    }

    /// Stop serving and close the connection. Idempotent.
    ///
    /// In-flight handlers keep running; their replies are discarded.
    pub fn stop(&self) {
        if self.lifecycle.stop() {
            tracing::info!("Plugin stopping");
        }
    }

    /// Wait until the plugin is stopped, by any cause.
    pub async fn wait(&self) {
        self.lifecycle.stopped().await;
    }

    /// Wait until stopped, then for the connection tasks to finish.
    ///
    /// Returns the error that ended the connection, if any.
    pub async fn wait_for_shutdown(mut self) -> Result<()> {
        let Some(session) = self.session.take() else {
            return match self.state() {
                LifecycleState::Stopped => Ok(()),
                _ => Err(PluginError::InvalidState("plugin not started")),
            };
        };

        self.wait().await;

        let read = join(session.read_task).await;
        let write = join(session.writer_task).await;
        tracing::debug!("Plugin on {} shut down", session.address);
        read.and(write)
    }
}

impl Drop for Plugin {
    fn drop(&mut self) {
        self.lifecycle.stop();
    }
}

async fn join(task: JoinHandle<Result<()>>) -> Result<()> {
    match task.await {
        Ok(result) => result,
        Err(e) => Err(PluginError::Io(std::io::Error::other(e))),
    }
}

/// Read frames and route them until the lifecycle stops or the host goes away.
async fn read_loop<R>(
    mut reader: R,
    router: Router,
    lifecycle: Lifecycle,
    read_buffer_size: usize,
    max_frame_size: u32,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut frames = FrameBuffer::with_max_frame_size(max_frame_size);
    let mut buf = vec![0u8; read_buffer_size.max(1)];
    let mut state = lifecycle.subscribe();

    let result = loop {
        let n = tokio::select! {
            biased;
            _ = state.wait_for(|s| *s == LifecycleState::Stopped) => break Ok(()),
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    tracing::info!("Host closed the connection");
                    break Ok(());
                }
                Ok(n) => n,
                Err(e) => break Err(PluginError::Io(e)),
            },
        };

        let bodies = match frames.push(&buf[..n]) {
            Ok(bodies) => bodies,
            Err(e) => break Err(e),
        };

        for body in bodies {
            router.route(&body).await;
            // Frames after a `stop` in the same read are not processed.
            if lifecycle.is_stopped() {
                break;
            }
        }
    };

    if let Err(e) = &result {
        tracing::error!("Read loop error: {}", e);
    }
    lifecycle.stop();
    result
}

/// Run a plugin until the host stops it or a termination signal arrives.
///
/// Returns `ExitCode::FAILURE` if startup fails, `ExitCode::SUCCESS` otherwise.
pub async fn serve(builder: PluginBuilder) -> ExitCode {
    serve_with_shutdown(builder, shutdown_signal()).await
}

/// Like [`serve`], with `shutdown` in place of the termination signals.
///
/// `shutdown` is armed before the listener is bound. If it fires while the
/// plugin is still waiting for the host, startup is abandoned, the socket
/// file is removed and the plugin exits successfully.
pub async fn serve_with_shutdown<F>(builder: PluginBuilder, shutdown: F) -> ExitCode
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    let plugin = tokio::select! {
        biased;
        () = &mut shutdown => {
            tracing::info!("Shutdown requested before the host connected");
            return ExitCode::SUCCESS;
        }
        started = builder.start() => match started {
            Ok(plugin) => plugin,
            Err(_) => return ExitCode::FAILURE,
        },
    };

    tokio::select! {
        () = plugin.wait() => {}
        () = &mut shutdown => plugin.stop(),
    }

    if let Err(e) = plugin.wait_for_shutdown().await {
        tracing::warn!("Connection ended with error: {}", e);
    }
    ExitCode::SUCCESS
}
