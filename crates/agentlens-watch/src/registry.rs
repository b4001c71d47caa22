use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::tailer::{RegistryMap, Tailer, WatchHandle, WatchOptions};
use crate::Result;

/// Per-session watcher registry.
///
/// One tailer per session id, shared by every subscriber. The transport
/// layer fans batches out to its own clients; this registry only guarantees
/// that concurrent `watch_session` calls for one session see exactly one
/// underlying tailer.
pub struct WatcherRegistry {
    inner: Arc<RegistryMap>,
}

impl Default for WatcherRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WatcherRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start tailing a session, or return the existing handle if one is
    /// already registered. The duplicate path does NOT wire the new
    /// callbacks; the first subscriber's callbacks stay in place.
    pub fn watch_session(&self, options: WatchOptions) -> Result<WatchHandle> {
        let mut map = self.inner.lock();

        if let Some(existing) = map.get(&options.session_id) {
            return Ok(existing.clone());
        }

        let handle = Tailer::spawn(options, Arc::downgrade(&self.inner))?;
        map.insert(handle.session_id().to_string(), handle.clone());
        Ok(handle)
    }

    /// Stop one watcher. Idempotent: a second call (or a call racing an
    /// auto-stop) is a no-op. Any pending batch is flushed synchronously
    /// before this returns.
    pub fn stop_watching(&self, handle: &WatchHandle) {
        {
            let mut map = self.inner.lock();
            if map
                .get(handle.session_id())
                .is_some_and(|registered| WatchHandle::ptr_eq(registered, handle))
            {
                map.remove(handle.session_id());
            }
        }

        // Outside the lock: the final flush invokes the batch callback.
        handle.stop();
    }

    /// Stop every registered watcher, flushing each once.
    pub fn stop_all(&self) {
        let handles: Vec<WatchHandle> = {
            let mut map = self.inner.lock();
            map.drain().map(|(_, handle)| handle).collect()
        };

        for handle in handles {
            handle.stop();
        }
    }

    pub fn watcher_count(&self) -> usize {
        self.inner.lock().len()
    }
}
