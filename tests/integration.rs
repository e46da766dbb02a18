//! Integration tests for goproc-plugin.
//!
//! Each test plays the host: it connects to a real Unix socket, reads the
//! `register` handshake and exchanges frames with a running plugin.

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use goproc_plugin::protocol::{decode, encode, FrameBuffer, Params};
use goproc_plugin::{
    serve_with_shutdown, LifecycleState, Message, MessageType, Plugin, PluginBuilder, PluginError,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::oneshot;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Deserialize)]
struct AddParams {
    a: i64,
    b: i64,
}

#[derive(Deserialize)]
struct SleepParams {
    ms: u64,
}

fn builder() -> PluginBuilder {
    Plugin::builder()
        .function("add", |p: AddParams| Ok::<_, String>(p.a + p.b))
        .function("fail", |_: Value| Err::<(), _>("always fails"))
        .async_function("sleep", |p: SleepParams| async move {
            tokio::time::sleep(Duration::from_millis(p.ms)).await;
            Ok::<_, String>(format!("slept {}", p.ms))
        })
}

fn params(value: Value) -> Params {
    match value {
        Value::Object(map) => map,
        _ => panic!("params must be an object"),
    }
}

/// Host side of the connection.
struct Host {
    stream: UnixStream,
    frames: FrameBuffer,
    pending: Vec<Message>,
}

impl Host {
    async fn connect(address: &Path) -> Self {
        for _ in 0..200 {
            if let Ok(stream) = UnixStream::connect(address).await {
                return Self {
                    stream,
                    frames: FrameBuffer::new(),
                    pending: Vec::new(),
                };
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("plugin never started listening on {}", address.display());
    }

    async fn send(&mut self, msg: &Message) {
        let frame = encode(msg).unwrap();
        self.stream.write_all(&frame).await.unwrap();
    }

    async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    /// Next message, or `None` once the plugin closes the connection.
    async fn recv(&mut self) -> Option<Message> {
        let mut buf = vec![0u8; 4096];
        while self.pending.is_empty() {
            let n = tokio::time::timeout(RECV_TIMEOUT, self.stream.read(&mut buf))
                .await
                .expect("plugin should answer")
                .unwrap();
            if n == 0 {
                return None;
            }
            for body in self.frames.push(&buf[..n]).unwrap() {
                self.pending.push(decode(&body).unwrap());
            }
        }
        Some(self.pending.remove(0))
    }

    async fn expect(&mut self) -> Message {
        self.recv().await.expect("connection closed early")
    }
}

struct Fixture {
    plugin: Plugin,
    host: Host,
    address: PathBuf,
    _dir: TempDir,
}

async fn launch(builder: PluginBuilder) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let address = dir.path().join("plugin.sock");

    let start = tokio::spawn(builder.address(address.to_str().unwrap()).start());
    let host = Host::connect(&address).await;
    let plugin = start.await.unwrap().unwrap();

    Fixture {
        plugin,
        host,
        address,
        _dir: dir,
    }
}

/// Launch and consume the `register` handshake.
async fn launch_registered() -> Fixture {
    let mut fx = launch(builder()).await;
    let register = fx.host.expect().await;
    assert_eq!(register.kind, MessageType::Register);
    fx
}

#[tokio::test]
async fn test_handshake_lists_functions() {
    let mut fx = launch(builder()).await;

    let register = fx.host.expect().await;
    assert_eq!(register.kind, MessageType::Register);
    assert_eq!(register.registered_functions(), vec!["add", "fail", "sleep"]);

    assert_eq!(fx.plugin.state(), LifecycleState::Running);
    assert_eq!(fx.plugin.address(), fx.address.to_str());
}

#[tokio::test]
async fn test_handshake_without_functions() {
    let mut fx = launch(Plugin::builder()).await;

    let register = fx.host.expect().await;
    assert_eq!(register.kind, MessageType::Register);
    assert!(register.registered_functions().is_empty());
}

#[tokio::test]
async fn test_ping_pong() {
    let mut fx = launch_registered().await;

    fx.host.send(&Message::ping("abc")).await;
    assert_eq!(fx.host.expect().await, Message::pong("abc"));
}

#[tokio::test]
async fn test_unknown_function() {
    let mut fx = launch_registered().await;

    fx.host
        .send(&Message::call("x1", "nope", params(json!({}))))
        .await;

    assert_eq!(
        fx.host.expect().await,
        Message::error("x1", "function nope does not exist")
    );
}

#[tokio::test]
async fn test_sync_and_async_results() {
    let mut fx = launch_registered().await;

    fx.host
        .send(&Message::call("a", "add", params(json!({ "a": 2, "b": 3 }))))
        .await;
    assert_eq!(fx.host.expect().await, Message::result("a", json!(5)));

    fx.host
        .send(&Message::call("s", "sleep", params(json!({ "ms": 1 }))))
        .await;
    assert_eq!(fx.host.expect().await, Message::result("s", json!("slept 1")));

    fx.host
        .send(&Message::call("f", "fail", params(json!({}))))
        .await;
    assert_eq!(fx.host.expect().await, Message::error("f", "always fails"));
}

#[tokio::test]
async fn test_bad_params_become_error_reply() {
    let mut fx = launch_registered().await;

    fx.host
        .send(&Message::call("p", "add", params(json!({ "a": "two" }))))
        .await;

    let reply = fx.host.expect().await;
    assert_eq!(reply.kind, MessageType::Error);
    assert_eq!(reply.id, "p");
    assert!(reply.error.unwrap().contains("invalid params"));
}

#[tokio::test]
async fn test_replies_out_of_order() {
    let mut fx = launch_registered().await;

    fx.host
        .send(&Message::call("1", "sleep", params(json!({ "ms": 200 }))))
        .await;
    fx.host
        .send(&Message::call("2", "add", params(json!({ "a": 1, "b": 1 }))))
        .await;

    assert_eq!(fx.host.expect().await, Message::result("2", json!(2)));
    assert_eq!(fx.host.expect().await, Message::result("1", json!("slept 200")));
}

#[tokio::test]
async fn test_frame_split_across_writes() {
    let mut fx = launch_registered().await;

    let frame = encode(&Message::call("c", "add", params(json!({ "a": 40, "b": 2 })))).unwrap();
    for chunk in [&frame[..2], &frame[2..7], &frame[7..]] {
        fx.host.send_raw(chunk).await;
        fx.host.stream.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(fx.host.expect().await, Message::result("c", json!(42)));
}

#[tokio::test]
async fn test_malformed_frame_keeps_connection() {
    let mut fx = launch_registered().await;

    let garbage = b"{not json";
    let mut bytes = (garbage.len() as u32).to_be_bytes().to_vec();
    bytes.extend_from_slice(garbage);
    fx.host.send_raw(&bytes).await;
    fx.host.send_raw(&[0, 0, 0, 0]).await;

    fx.host.send(&Message::ping("after-garbage")).await;
    assert_eq!(fx.host.expect().await, Message::pong("after-garbage"));
    assert_eq!(fx.plugin.state(), LifecycleState::Running);
}

#[tokio::test]
async fn test_host_stop_closes_connection() {
    let mut fx = launch_registered().await;

    fx.host
        .send(&Message::call("late", "sleep", params(json!({ "ms": 100 }))))
        .await;
    fx.host.send(&Message::stop()).await;

    // No reply for the in-flight call, just the close.
    assert!(fx.host.recv().await.is_none());
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(fx.plugin.state(), LifecycleState::Stopped);
    fx.plugin.wait_for_shutdown().await.unwrap();
    assert!(!fx.address.exists());
}

#[tokio::test]
async fn test_local_stop_closes_connection() {
    let mut fx = launch_registered().await;

    fx.plugin.stop();
    fx.plugin.stop();

    assert!(fx.host.recv().await.is_none());
    fx.plugin.wait_for_shutdown().await.unwrap();
}

#[tokio::test]
async fn test_host_disconnect_stops_plugin() {
    let fx = launch_registered().await;
    drop(fx.host);

    tokio::time::timeout(RECV_TIMEOUT, fx.plugin.wait())
        .await
        .expect("plugin should stop after host disconnect");
    assert_eq!(fx.plugin.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn test_register_after_start_rejected() {
    let mut fx = launch_registered().await;

    let err = fx
        .plugin
        .register("late", goproc_plugin::Handler::sync(|_: Value| Ok::<_, String>(())))
        .unwrap_err();
    assert!(matches!(err, PluginError::InvalidState(_)));

    let err = fx.plugin.start().await.unwrap_err();
    assert!(matches!(err, PluginError::InvalidState(_)));
}

#[tokio::test]
async fn test_stale_socket_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let address = dir.path().join("plugin.sock");
    std::fs::write(&address, b"left over").unwrap();

    let start = tokio::spawn(builder().address(address.to_str().unwrap()).start());
    let mut host = Host::connect(&address).await;
    let plugin = start.await.unwrap().unwrap();

    assert_eq!(host.expect().await.kind, MessageType::Register);
    plugin.stop();
}

#[tokio::test]
async fn test_null_id_call_still_answered() {
    let mut fx = launch_registered().await;

    let body = br#"{"type":"call","id":null,"function":"nope","params":{}}"#;
    let mut bytes = (body.len() as u32).to_be_bytes().to_vec();
    bytes.extend_from_slice(body);
    fx.host.send_raw(&bytes).await;

    let reply = fx.host.expect().await;
    assert_eq!(reply.kind, MessageType::Error);
    assert_eq!(reply.id, "");
    assert_eq!(reply.error.as_deref(), Some("function nope does not exist"));
}

#[tokio::test]
async fn test_slow_calls_do_not_hold_back_fast_ones() {
    let mut fx = launch_registered().await;

    for id in 0..8 {
        fx.host
            .send(&Message::call(
                format!("slow-{}", id),
                "sleep",
                params(json!({ "ms": 1000 })),
            ))
            .await;
    }
    fx.host
        .send(&Message::call("fast", "add", params(json!({ "a": 1, "b": 2 }))))
        .await;

    let reply = tokio::time::timeout(Duration::from_millis(500), fx.host.expect())
        .await
        .expect("fast call answered while slow calls run");
    assert_eq!(reply, Message::result("fast", json!(3)));
}

fn is_success(code: ExitCode) -> bool {
    format!("{:?}", code) == format!("{:?}", ExitCode::SUCCESS)
}

#[tokio::test]
async fn test_shutdown_while_waiting_for_host() {
    let dir = tempfile::tempdir().unwrap();
    let address = dir.path().join("plugin.sock");
    let (trigger, fired) = oneshot::channel::<()>();

    let serving = tokio::spawn(serve_with_shutdown(
        builder().address(address.to_str().unwrap()),
        async move {
            let _ = fired.await;
        },
    ));

    for _ in 0..200 {
        if address.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(address.exists(), "plugin never bound its socket");

    trigger.send(()).unwrap();
    let code = tokio::time::timeout(RECV_TIMEOUT, serving)
        .await
        .expect("serve should return")
        .unwrap();

    assert!(is_success(code));
    assert!(!address.exists());
}

#[tokio::test]
async fn test_shutdown_while_running() {
    let dir = tempfile::tempdir().unwrap();
    let address = dir.path().join("plugin.sock");
    let (trigger, fired) = oneshot::channel::<()>();

    let serving = tokio::spawn(serve_with_shutdown(
        builder().address(address.to_str().unwrap()),
        async move {
            let _ = fired.await;
        },
    ));

    let mut host = Host::connect(&address).await;
    assert_eq!(host.expect().await.kind, MessageType::Register);

    trigger.send(()).unwrap();
    assert!(host.recv().await.is_none());

    let code = tokio::time::timeout(RECV_TIMEOUT, serving)
        .await
        .expect("serve should return")
        .unwrap();
    assert!(is_success(code));
    assert!(!address.exists());
}

#[tokio::test]
async fn test_serve_startup_failure() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("file");
    std::fs::write(&blocker, b"").unwrap();
    let address = blocker.join("plugin.sock");

    let code = serve_with_shutdown(
        builder().address(address.to_str().unwrap()),
        std::future::pending(),
    )
    .await;

    assert!(!is_success(code));
}
