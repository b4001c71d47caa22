//! Connection and subscription registry.
//!
//! Two indices under one lock: `clients` (clientId → connection) and
//! `sessions` (sessionId → subscriber set + watcher handle). They are only
//! ever mutated together, which is what keeps them consistent. The lock is
//! never held across a send, a resolver await, or `stop_watching`, because
//! the watcher's final flush re-enters the relay path.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use agentlens_types::SessionBatch;
use agentlens_watch::{
    BatchCallback, DEFAULT_DEBOUNCE, DEFAULT_MAX_WAIT, ErrorCallback, WatchError, WatchHandle,
    WatchOptions,
};

use crate::protocol::{self, ClientMessage, ErrorCode, LifecycleEvent};
use crate::traits::{SessionPathResolver, WatchProvider};

/// Outbound frames queued per client. A client that falls this far behind
/// is disconnected rather than allowed to stall the relay.
pub const OUTBOUND_BUFFER: usize = 256;

/// Close code and reason the writer task sends once the hub drops its
/// sender. `None` means a plain 1000 close.
pub type CloseReason = Arc<Mutex<Option<(u16, &'static str)>>>;

struct ConnectedClient {
    session_id: Option<String>,
    connected_at: DateTime<Utc>,
    sender: mpsc::Sender<String>,
    close_reason: CloseReason,
}

struct SessionEntry {
    subscribers: HashSet<Uuid>,
    handle: WatchHandle,
}

#[derive(Default)]
struct HubState {
    clients: HashMap<Uuid, ConnectedClient>,
    sessions: HashMap<String, SessionEntry>,
}

pub struct SessionHub {
    state: Mutex<HubState>,
    watch: Arc<dyn WatchProvider>,
    resolver: Arc<dyn SessionPathResolver>,
    debounce: Duration,
    max_wait: Duration,
    weak_self: Weak<SessionHub>,
}

impl SessionHub {
    pub fn new(
        watch: Arc<dyn WatchProvider>,
        resolver: Arc<dyn SessionPathResolver>,
    ) -> Arc<Self> {
        Self::with_timing(watch, resolver, DEFAULT_DEBOUNCE, DEFAULT_MAX_WAIT)
    }

    pub fn with_timing(
        watch: Arc<dyn WatchProvider>,
        resolver: Arc<dyn SessionPathResolver>,
        debounce: Duration,
        max_wait: Duration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            state: Mutex::new(HubState::default()),
            watch,
            resolver,
            debounce,
            max_wait,
            weak_self: weak_self.clone(),
        })
    }

    /// Admit a connection: assign a fresh client id with no subscription.
    pub fn register_client(&self, sender: mpsc::Sender<String>, close_reason: CloseReason) -> Uuid {
        let client_id = Uuid::new_v4();
        let mut state = self.state.lock();
        state.clients.insert(
            client_id,
            ConnectedClient {
                session_id: None,
                connected_at: Utc::now(),
                sender,
                close_reason,
            },
        );
        tracing::info!(client_id = %client_id, clients = state.clients.len(), "client connected");
        client_id
    }

    /// Process one inbound text frame. Every input error answers with an
    /// `error` frame and leaves the connection open.
    pub async fn handle_frame(&self, client_id: Uuid, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::Subscribe { session_id }) => {
                self.subscribe(client_id, session_id).await;
            }
            Ok(ClientMessage::Unsubscribe) => self.unsubscribe(client_id),
            Err(err) => {
                tracing::debug!(client_id = %client_id, error = %err, "rejecting inbound frame");
                self.send_error(
                    client_id,
                    ErrorCode::InvalidMessage,
                    &format!("unrecognized frame: {}", err),
                );
            }
        }
    }

    async fn subscribe(&self, client_id: Uuid, session_id: String) {
        let valid_v4 = Uuid::parse_str(&session_id)
            .map(|uuid| uuid.get_version_num() == 4)
            .unwrap_or(false);
        if !valid_v4 {
            self.send_error(
                client_id,
                ErrorCode::InvalidMessage,
                "sessionId must be a UUID v4",
            );
            return;
        }

        // Resolve before touching subscription state: a failed re-subscribe
        // must leave the current subscription in place.
        let Some(file_path) = self.resolver.resolve_session_path(&session_id).await else {
            self.send_error(
                client_id,
                ErrorCode::UnknownSession,
                &format!("unknown session {}", session_id),
            );
            return;
        };

        let stopped = {
            let mut state = self.state.lock();

            // The connection may have closed while the resolver ran.
            let Some(client) = state.clients.get(&client_id) else {
                return;
            };
            if client.session_id.as_deref() == Some(session_id.as_str()) {
                return;
            }

            if !state.sessions.contains_key(&session_id) {
                match self.start_watcher(&session_id, &file_path) {
                    Ok(handle) => {
                        state.sessions.insert(
                            session_id.clone(),
                            SessionEntry {
                                subscribers: HashSet::new(),
                                handle,
                            },
                        );
                    }
                    Err(err) => {
                        drop(state);
                        tracing::warn!(session_id = %session_id, error = %err, "failed to start watcher");
                        self.send_error(
                            client_id,
                            ErrorCode::UnknownSession,
                            &format!("session {} is not watchable", session_id),
                        );
                        return;
                    }
                }
            }

            let stopped = self.detach_locked(&mut state, client_id);
            if let Some(client) = state.clients.get_mut(&client_id) {
                client.session_id = Some(session_id.clone());
            }
            if let Some(entry) = state.sessions.get_mut(&session_id) {
                entry.subscribers.insert(client_id);
            }
            stopped
        };

        if let Some(handle) = stopped {
            self.watch.stop_watching(&handle);
        }
        tracing::info!(client_id = %client_id, session_id = %session_id, "client subscribed");
    }

    fn unsubscribe(&self, client_id: Uuid) {
        let stopped = {
            let mut state = self.state.lock();
            self.detach_locked(&mut state, client_id)
        };
        if let Some(handle) = stopped {
            self.watch.stop_watching(&handle);
        }
    }

    /// Remove the client from its current session under the lock. Returns
    /// the watcher handle to stop (outside the lock) when the last
    /// subscriber left.
    fn detach_locked(&self, state: &mut HubState, client_id: Uuid) -> Option<WatchHandle> {
        let client = state.clients.get_mut(&client_id)?;
        let session_id = client.session_id.take()?;

        let entry = state.sessions.get_mut(&session_id)?;
        entry.subscribers.remove(&client_id);
        if entry.subscribers.is_empty() {
            tracing::info!(session_id = %session_id, "last subscriber left; stopping watcher");
            return state.sessions.remove(&session_id).map(|entry| entry.handle);
        }
        None
    }

    fn start_watcher(
        &self,
        session_id: &str,
        file_path: &Path,
    ) -> agentlens_watch::Result<WatchHandle> {
        let hub = self.weak_self.clone();
        let on_messages: BatchCallback = Arc::new(move |batch: SessionBatch| {
            if let Some(hub) = hub.upgrade() {
                hub.relay_batch(batch);
            }
        });

        let hub = self.weak_self.clone();
        let on_error: ErrorCallback = Arc::new(move |error: WatchError| {
            if let Some(hub) = hub.upgrade() {
                hub.handle_watch_error(error);
            }
        });

        let mut options = WatchOptions::new(session_id, file_path, on_messages, on_error);
        options.debounce = self.debounce;
        options.max_wait = self.max_wait;
        self.watch.watch_session(options)
    }

    /// Serialize the batch once and send the identical string to every
    /// current subscriber of its session.
    fn relay_batch(&self, batch: SessionBatch) {
        let frame = protocol::messages_frame(&batch);

        let recipients: Vec<(Uuid, mpsc::Sender<String>, CloseReason)> = {
            let state = self.state.lock();
            let Some(entry) = state.sessions.get(&batch.session_id) else {
                return;
            };
            entry
                .subscribers
                .iter()
                .filter_map(|id| {
                    state
                        .clients
                        .get(id)
                        .map(|client| (*id, client.sender.clone(), client.close_reason.clone()))
                })
                .collect()
        };

        let mut overflowed = Vec::new();
        for (client_id, sender, close_reason) in recipients {
            if let Err(mpsc::error::TrySendError::Full(_)) = sender.try_send(frame.clone()) {
                *close_reason.lock() = Some((1011, "outbound buffer overflow"));
                overflowed.push(client_id);
            }
        }

        for client_id in overflowed {
            tracing::warn!(client_id = %client_id, "disconnecting slow client");
            self.disconnect(client_id);
        }
    }

    /// Watcher faults are logged and the hub carries on; clients only ever
    /// see `messages`, `error` and `session:*` frames.
    fn handle_watch_error(&self, error: WatchError) {
        tracing::warn!(
            session_id = %error.session_id,
            code = ?error.code,
            cause = ?error.cause,
            "{}", error.message
        );
    }

    /// Serialize the event once and send it to every connected client,
    /// subscribed or not.
    pub fn broadcast_lifecycle_event(&self, event: &LifecycleEvent) {
        let Ok(frame) = serde_json::to_string(event) else {
            return;
        };

        let senders: Vec<mpsc::Sender<String>> = {
            let state = self.state.lock();
            state
                .clients
                .values()
                .map(|client| client.sender.clone())
                .collect()
        };

        for sender in senders {
            let _ = sender.try_send(frame.clone());
        }
    }

    fn send_error(&self, client_id: Uuid, code: ErrorCode, message: &str) {
        let frame = protocol::error_frame(code, message);
        let sender = {
            let state = self.state.lock();
            state
                .clients
                .get(&client_id)
                .map(|client| client.sender.clone())
        };
        if let Some(sender) = sender {
            let _ = sender.try_send(frame);
        }
    }

    /// Connection-close rules. Idempotent for ids that are already gone.
    pub fn disconnect(&self, client_id: Uuid) {
        let stopped = {
            let mut state = self.state.lock();
            if !state.clients.contains_key(&client_id) {
                return;
            }
            let stopped = self.detach_locked(&mut state, client_id);
            state.clients.remove(&client_id);
            stopped
        };

        if let Some(handle) = stopped {
            self.watch.stop_watching(&handle);
        }
        tracing::info!(client_id = %client_id, "client disconnected");
    }

    /// Stop every watcher once, mark every connection for a 1001 close and
    /// drop the senders so each writer task runs its close handshake.
    pub fn shutdown(&self) {
        let (handles, clients) = {
            let mut state = self.state.lock();
            let handles: Vec<WatchHandle> =
                state.sessions.drain().map(|(_, entry)| entry.handle).collect();
            let clients: Vec<ConnectedClient> =
                state.clients.drain().map(|(_, client)| client).collect();
            (handles, clients)
        };

        for handle in &handles {
            self.watch.stop_watching(handle);
        }

        for client in clients {
            *client.close_reason.lock() = Some((1001, "Server shutting down"));
            drop(client.sender);
        }

        tracing::info!(watchers = handles.len(), "hub shut down");
    }

    pub fn client_count(&self) -> usize {
        self.state.lock().clients.len()
    }

    pub fn session_count(&self) -> usize {
        self.state.lock().sessions.len()
    }

    /// The session a client is currently subscribed to, if any.
    pub fn client_session(&self, client_id: Uuid) -> Option<String> {
        self.state
            .lock()
            .clients
            .get(&client_id)
            .and_then(|client| client.session_id.clone())
    }

    /// When the client connected; `None` for unknown ids.
    pub fn connected_at(&self, client_id: Uuid) -> Option<DateTime<Utc>> {
        self.state
            .lock()
            .clients
            .get(&client_id)
            .map(|client| client.connected_at)
    }
}
