//! Minimal plugin exposing one sync and one async function.
//!
//! ```text
//! GOPROC_PLUGIN_ADDRESS=/tmp/echo.sock cargo run --example echo_plugin
//! ```

use std::process::ExitCode;
use std::time::Duration;

use goproc_plugin::{serve, Plugin};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[derive(Deserialize)]
struct DelayParams {
    text: String,
    #[serde(default)]
    delay_ms: u64,
}

#[derive(Serialize)]
struct Delayed {
    text: String,
    waited_ms: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    // stdout belongs to the host; logs go to stderr.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let builder = Plugin::builder()
        .function("echo", |params: Value| Ok::<_, String>(params))
        .async_function("delayed_echo", |p: DelayParams| async move {
            tokio::time::sleep(Duration::from_millis(p.delay_ms)).await;
            Ok::<_, String>(Delayed {
                text: p.text,
                waited_ms: p.delay_ms,
            })
        });

    serve(builder).await
}
