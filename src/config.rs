//! Plugin configuration.
//!
//! The transport address is looked up in order:
//! 1. [`PluginConfig::address`] (explicit override)
//! 2. the `GOPROC_PLUGIN_ADDRESS` environment variable
//! 3. the first process argument
//!
//! Empty values are treated as absent.

use std::time::Duration;

use crate::error::{PluginError, Result};
use crate::protocol::DEFAULT_MAX_FRAME_SIZE;
use crate::writer::DEFAULT_CHANNEL_CAPACITY;

/// Environment variable the host uses to pass the transport address.
pub const ADDRESS_ENV_VAR: &str = "GOPROC_PLUGIN_ADDRESS";

/// Default socket read buffer size (64 KB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Runtime configuration for a plugin.
#[derive(Debug, Clone)]
pub struct PluginConfig {
    /// Explicit transport address; overrides env and argv.
    pub address: Option<String>,
    /// Size of the socket read buffer.
    pub read_buffer_size: usize,
    /// Largest frame body accepted from the host.
    pub max_frame_size: u32,
    /// Outbound frame queue capacity.
    pub channel_capacity: usize,
    /// Give up if the host has not connected within this time.
    pub accept_timeout: Option<Duration>,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            address: None,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            accept_timeout: None,
        }
    }
}

impl PluginConfig {
    /// Resolve the transport address from config, environment, then argv.
    ///
    /// # Errors
    ///
    /// Returns `AddressMissing` if no source provides a non-empty address.
    pub fn resolve_address(&self) -> Result<String> {
        resolve_address_from(
            self.address.as_deref(),
            std::env::var(ADDRESS_ENV_VAR).ok().as_deref(),
            std::env::args().nth(1).as_deref(),
        )
    }
}

fn resolve_address_from(
    configured: Option<&str>,
    env: Option<&str>,
    arg: Option<&str>,
) -> Result<String> {
    [configured, env, arg]
        .into_iter()
        .flatten()
        .find(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or(PluginError::AddressMissing(ADDRESS_ENV_VAR))
}
