//! End-to-end bridge tests: a real host listener talking to the real
//! renderer client over a loopback WebSocket.
//!
//! Each test binds an ephemeral port, so tests can run in parallel.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use serde_json::{json, Value};

use appshell_host::application::registry::Bridge;
use appshell_host::infrastructure::ws_transport::BridgeListener;
use appshell_renderer::infrastructure::connection::{RendererBridge, RendererConfig};

// ── Harness ───────────────────────────────────────────────────────────────────

struct Harness {
    bridge: Bridge,
    renderer: Arc<RendererBridge>,
    running: Arc<AtomicBool>,
    host_addr: std::net::SocketAddr,
}

/// Brings up a listener on an ephemeral port and connects a renderer client
/// to it. Returns once the running pieces are spawned; callers await the
/// actual handshake via [`wait_until`].
async fn start_harness() -> Harness {
    let bridge = Bridge::new(Duration::from_secs(5));
    let running = Arc::new(AtomicBool::new(true));

    let listener = BridgeListener::bind("127.0.0.1:0".parse().unwrap())
        .await
        .expect("bind listener");
    let host_addr = listener.local_addr();
    tokio::spawn(listener.run(bridge.clone(), Arc::clone(&running)));

    let renderer = Arc::new(RendererBridge::new(RendererConfig {
        host_addr,
        reconnect_interval: Duration::from_millis(100),
    }));
    let _events = Arc::clone(&renderer).start(Arc::clone(&running)).await;

    Harness {
        bridge,
        renderer,
        running,
        host_addr,
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

/// Polls `cond` until it holds or the deadline passes.
async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for: {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_bootstrap_captures_renderer_reference() {
    // Arrange / Act
    let harness = start_harness().await;

    // Assert – the client's bootstrap frame alone must capture the reference
    wait_until("renderer reference captured", || {
        harness.bridge.has_renderer()
    })
    .await;
}

#[tokio::test]
async fn test_host_send_reaches_renderer_callback() {
    // Arrange
    let harness = start_harness().await;
    let seen: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    harness
        .renderer
        .on("greeter", "hello", move |args| {
            sink.lock().unwrap().extend_from_slice(args);
        })
        .expect("subscribe");
    wait_until("renderer reference captured", || {
        harness.bridge.has_renderer()
    })
    .await;

    // Act
    let module = harness.bridge.register("greeter").expect("register");
    module.send("hello", vec![json!("hi")]).expect("send");

    // Assert
    wait_until("renderer callback fired", || {
        !seen.lock().unwrap().is_empty()
    })
    .await;
    assert_eq!(*seen.lock().unwrap(), vec![json!("hi")]);
}

#[tokio::test]
async fn test_renderer_send_reaches_host_subscriber() {
    // Arrange
    let harness = start_harness().await;
    let module = harness.bridge.register("telemetry").expect("register");
    let seen: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    module
        .on("report", move |args| {
            sink.lock().unwrap().extend_from_slice(args);
        })
        .expect("subscribe");
    wait_until("renderer reference captured", || {
        harness.bridge.has_renderer()
    })
    .await;

    // Act
    harness
        .renderer
        .send("telemetry", "report", vec![json!({"cpu": 12})])
        .expect("send");

    // Assert
    wait_until("host subscriber fired", || !seen.lock().unwrap().is_empty()).await;
    assert_eq!(*seen.lock().unwrap(), vec![json!({"cpu": 12})]);
}

#[tokio::test]
async fn test_host_call_is_answered_by_renderer_respond() {
    // Arrange – the renderer answers fetchState through the derived
    // response name, with no shared registry involved
    let harness = start_harness().await;
    let responder = Arc::clone(&harness.renderer);
    harness
        .renderer
        .on("svc", "fetchState", move |_args| {
            responder
                .respond("svc", "fetchState", vec![json!(42)])
                .expect("respond");
        })
        .expect("subscribe");
    wait_until("renderer reference captured", || {
        harness.bridge.has_renderer()
    })
    .await;

    // Act
    let module = harness.bridge.register("svc").expect("register");
    let result = module
        .call_with_timeout("fetchState", Duration::from_secs(5), vec![])
        .await
        .expect("call");

    // Assert
    assert_eq!(result, vec![json!(42)]);
}

#[tokio::test]
async fn test_fresh_connection_supersedes_previous_renderer() {
    // Arrange – first client up and captured
    let harness = start_harness().await;
    wait_until("first renderer captured", || harness.bridge.has_renderer()).await;

    // A second client connects to the same listener (reload scenario).
    let second = Arc::new(RendererBridge::new(RendererConfig {
        host_addr: harness.host_addr,
        reconnect_interval: Duration::from_millis(100),
    }));
    let seen: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    second
        .on("greeter", "hello", move |args| {
            sink.lock().unwrap().extend_from_slice(args);
        })
        .expect("subscribe");
    let _events = Arc::clone(&second).start(Arc::clone(&harness.running)).await;

    // Act – give the second bootstrap time to replace the reference, then
    // send; only the second client has the subscription.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let module = harness.bridge.register("greeter").expect("register");
    module.send("hello", vec![json!("again")]).expect("send");

    // Assert
    wait_until("second renderer received the send", || {
        !seen.lock().unwrap().is_empty()
    })
    .await;
    assert_eq!(*seen.lock().unwrap(), vec![json!("again")]);
}
