use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::mpsc;
use uuid::Uuid;

use agentlens_server::hub::{CloseReason, SessionHub};
use agentlens_server::protocol::{LifecycleEvent, StopReason};
use agentlens_server::resolver::DirectoryResolver;
use agentlens_server::traits::WatchProvider;
use agentlens_watch::{WatchHandle, WatchOptions, WatcherRegistry};

/// Wraps the real registry so tests can count watcher lifecycle calls.
struct CountingWatchProvider {
    inner: WatcherRegistry,
    watch_calls: Mutex<Vec<String>>,
    stop_calls: Mutex<Vec<String>>,
}

impl CountingWatchProvider {
    fn new() -> Self {
        Self {
            inner: WatcherRegistry::new(),
            watch_calls: Mutex::new(Vec::new()),
            stop_calls: Mutex::new(Vec::new()),
        }
    }

    fn watch_calls(&self) -> Vec<String> {
        self.watch_calls.lock().clone()
    }

    fn stop_calls(&self) -> Vec<String> {
        self.stop_calls.lock().clone()
    }
}

impl WatchProvider for CountingWatchProvider {
    fn watch_session(&self, options: WatchOptions) -> agentlens_watch::Result<WatchHandle> {
        self.watch_calls.lock().push(options.session_id.clone());
        self.inner.watch_session(options)
    }

    fn stop_watching(&self, handle: &WatchHandle) {
        self.stop_calls.lock().push(handle.session_id().to_string());
        self.inner.stop_watching(handle);
    }
}

struct TestWorld {
    _dir: TempDir,
    root: PathBuf,
    provider: Arc<CountingWatchProvider>,
    hub: Arc<SessionHub>,
}

fn world() -> TestWorld {
    let dir = TempDir::new().unwrap();
    let root = dir.path().to_path_buf();
    let provider = Arc::new(CountingWatchProvider::new());
    let resolver = Arc::new(DirectoryResolver::new(vec![root.clone()]));
    let hub = SessionHub::with_timing(
        provider.clone(),
        resolver,
        Duration::from_millis(100),
        Duration::from_millis(300),
    );

    TestWorld {
        _dir: dir,
        root,
        provider,
        hub,
    }
}

impl TestWorld {
    /// Create an empty transcript and return its session id.
    fn create_session(&self) -> String {
        let session_id = Uuid::new_v4().to_string();
        std::fs::write(self.root.join(format!("{session_id}.jsonl")), "").unwrap();
        session_id
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.root.join(format!("{session_id}.jsonl"))
    }
}

fn connect(hub: &SessionHub) -> (Uuid, mpsc::Receiver<String>, CloseReason) {
    let (tx, rx) = mpsc::channel(64);
    let close_reason: CloseReason = Arc::new(Mutex::new(None));
    let client_id = hub.register_client(tx, close_reason.clone());
    (client_id, rx, close_reason)
}

async fn send_subscribe(hub: &SessionHub, client_id: Uuid, session_id: &str) {
    let frame = format!(r#"{{"type":"subscribe","sessionId":"{session_id}"}}"#);
    hub.handle_frame(client_id, &frame).await;
}

async fn recv_frame(rx: &mut mpsc::Receiver<String>) -> String {
    tokio::time::timeout(Duration::from_secs(3), rx.recv())
        .await
        .expect("timed out waiting for a frame")
        .expect("outbound channel closed")
}

fn append(path: &Path, text: &str) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file.flush().unwrap();
}

fn prompt_line(text: &str) -> String {
    format!(
        "{{\"type\":\"user\",\"uuid\":\"u-1\",\"parentUuid\":null,\"sessionId\":\"s-1\",\
         \"timestamp\":\"2026-01-01T00:00:00Z\",\"message\":{{\"role\":\"user\",\"content\":\"{text}\"}}}}\n"
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_session_yields_error_frame_and_no_watcher() {
    let world = world();
    let (client_id, mut rx, _close) = connect(&world.hub);

    let unknown = Uuid::new_v4().to_string();
    send_subscribe(&world.hub, client_id, &unknown).await;

    let frame: serde_json::Value = serde_json::from_str(&recv_frame(&mut rx).await).unwrap();
    assert_eq!(frame["type"], "error");
    assert_eq!(frame["code"], "UNKNOWN_SESSION");

    assert!(world.provider.watch_calls().is_empty());
    // The connection stays open.
    assert_eq!(world.hub.client_count(), 1);
    assert!(world.hub.client_session(client_id).is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_frames_yield_invalid_message() {
    let world = world();
    let (client_id, mut rx, _close) = connect(&world.hub);

    for bad in [
        "not json at all",
        r#"{"type":"launch-missiles"}"#,
        // Syntactically a UUID, but version 1.
        r#"{"type":"subscribe","sessionId":"00000000-0000-1000-8000-000000000000"}"#,
    ] {
        world.hub.handle_frame(client_id, bad).await;
        let frame: serde_json::Value = serde_json::from_str(&recv_frame(&mut rx).await).unwrap();
        assert_eq!(frame["type"], "error");
        assert_eq!(frame["code"], "INVALID_MESSAGE");
    }

    assert_eq!(world.hub.client_count(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn subscribers_share_one_watcher_and_receive_identical_frames() {
    let world = world();
    let session_id = world.create_session();

    let (c1, mut rx1, _close1) = connect(&world.hub);
    let (c2, mut rx2, _close2) = connect(&world.hub);

    send_subscribe(&world.hub, c1, &session_id).await;
    send_subscribe(&world.hub, c2, &session_id).await;

    assert_eq!(world.provider.watch_calls(), vec![session_id.clone()]);
    assert_eq!(world.hub.session_count(), 1);

    append(&world.session_path(&session_id), &prompt_line("Hello"));

    let frame1 = recv_frame(&mut rx1).await;
    let frame2 = recv_frame(&mut rx2).await;
    assert_eq!(frame1, frame2, "relay must send the identical serialized frame");

    let value: serde_json::Value = serde_json::from_str(&frame1).unwrap();
    assert_eq!(value["type"], "messages");
    assert_eq!(value["sessionId"], session_id.as_str());
    assert_eq!(value["messages"][0]["kind"], "user-prompt");

    // First leaver does not stop the shared watcher; the last one does.
    world.hub.disconnect(c1);
    assert!(world.provider.stop_calls().is_empty());

    world.hub.disconnect(c2);
    assert_eq!(world.provider.stop_calls(), vec![session_id]);
    assert_eq!(world.hub.session_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn resubscribe_swaps_watchers_atomically() {
    let world = world();
    let s1 = world.create_session();
    let s2 = world.create_session();

    let (client_id, mut rx, _close) = connect(&world.hub);

    send_subscribe(&world.hub, client_id, &s1).await;
    send_subscribe(&world.hub, client_id, &s2).await;

    assert_eq!(world.provider.watch_calls(), vec![s1.clone(), s2.clone()]);
    assert_eq!(world.provider.stop_calls(), vec![s1.clone()]);
    assert_eq!(world.hub.client_session(client_id), Some(s2.clone()));

    // Batches on the new session reach the client.
    append(&world.session_path(&s2), &prompt_line("on the new session"));
    let value: serde_json::Value = serde_json::from_str(&recv_frame(&mut rx).await).unwrap();
    assert_eq!(value["sessionId"], s2.as_str());

    // A failed re-subscribe leaves the current subscription untouched.
    let unknown = Uuid::new_v4().to_string();
    send_subscribe(&world.hub, client_id, &unknown).await;
    let value: serde_json::Value = serde_json::from_str(&recv_frame(&mut rx).await).unwrap();
    assert_eq!(value["code"], "UNKNOWN_SESSION");
    assert_eq!(world.hub.client_session(client_id), Some(s2.clone()));
    assert_eq!(world.provider.stop_calls(), vec![s1]);
}

#[tokio::test(flavor = "multi_thread")]
async fn subscribing_to_the_current_session_is_a_no_op() {
    let world = world();
    let session_id = world.create_session();
    let (client_id, _rx, _close) = connect(&world.hub);

    send_subscribe(&world.hub, client_id, &session_id).await;
    send_subscribe(&world.hub, client_id, &session_id).await;

    assert_eq!(world.provider.watch_calls(), vec![session_id.clone()]);
    assert!(world.provider.stop_calls().is_empty());
    assert_eq!(world.hub.client_session(client_id), Some(session_id));
}

#[tokio::test(flavor = "multi_thread")]
async fn unsubscribe_stops_the_watcher_but_keeps_the_connection() {
    let world = world();
    let session_id = world.create_session();
    let (client_id, _rx, _close) = connect(&world.hub);

    send_subscribe(&world.hub, client_id, &session_id).await;
    world
        .hub
        .handle_frame(client_id, r#"{"type":"unsubscribe"}"#)
        .await;

    assert_eq!(world.provider.stop_calls(), vec![session_id]);
    assert_eq!(world.hub.session_count(), 0);
    assert_eq!(world.hub.client_count(), 1);
    assert!(world.hub.client_session(client_id).is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn lifecycle_events_broadcast_to_every_client() {
    let world = world();
    let session_id = world.create_session();

    let (c1, mut rx1, _close1) = connect(&world.hub);
    let (_c2, mut rx2, _close2) = connect(&world.hub);

    send_subscribe(&world.hub, c1, &session_id).await;

    world
        .hub
        .broadcast_lifecycle_event(&LifecycleEvent::SessionStopped {
            session_id: session_id.clone(),
            reason: StopReason::Completed,
            stopped_at: chrono::Utc::now(),
        });

    let f1: serde_json::Value = serde_json::from_str(&recv_frame(&mut rx1).await).unwrap();
    let f2: serde_json::Value = serde_json::from_str(&recv_frame(&mut rx2).await).unwrap();
    assert_eq!(f1["type"], "session:stopped");
    assert_eq!(f2, f1);
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_stops_watchers_and_closes_every_client() {
    let world = world();
    let session_id = world.create_session();

    let (c1, mut rx1, close1) = connect(&world.hub);
    let (_c2, mut rx2, close2) = connect(&world.hub);

    send_subscribe(&world.hub, c1, &session_id).await;

    world.hub.shutdown();

    assert_eq!(world.hub.client_count(), 0);
    assert_eq!(world.hub.session_count(), 0);
    assert_eq!(world.provider.stop_calls(), vec![session_id]);

    assert_eq!(*close1.lock(), Some((1001, "Server shutting down")));
    assert_eq!(*close2.lock(), Some((1001, "Server shutting down")));

    // The hub dropped its senders; the writer side sees the channels end.
    assert!(rx1.recv().await.is_none());
    assert!(rx2.recv().await.is_none());
}
