//! Injection seams for the transport's external collaborators.

use std::path::PathBuf;

use async_trait::async_trait;

use agentlens_watch::{WatchHandle, WatchOptions, WatcherRegistry};

/// The watcher surface the hub depends on. Production wires in
/// [`WatcherRegistry`]; tests substitute instrumented fakes.
pub trait WatchProvider: Send + Sync {
    fn watch_session(&self, options: WatchOptions) -> agentlens_watch::Result<WatchHandle>;
    fn stop_watching(&self, handle: &WatchHandle);
}

impl WatchProvider for WatcherRegistry {
    fn watch_session(&self, options: WatchOptions) -> agentlens_watch::Result<WatchHandle> {
        WatcherRegistry::watch_session(self, options)
    }

    fn stop_watching(&self, handle: &WatchHandle) {
        WatcherRegistry::stop_watching(self, handle);
    }
}

/// Maps a session id to its transcript path. Returning `None` means the id
/// is unknown; the subscribing client gets an `UNKNOWN_SESSION` error. The
/// real indexer lives outside this crate.
#[async_trait]
pub trait SessionPathResolver: Send + Sync {
    async fn resolve_session_path(&self, session_id: &str) -> Option<PathBuf>;
}
