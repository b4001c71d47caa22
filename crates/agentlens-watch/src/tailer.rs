use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use notify::{PollWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;

use agentlens_parser::parse_line;
use agentlens_types::{ByteRange, SessionBatch};

use crate::error::{ErrorCode, WatchError};
use crate::{Error, Result};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_millis(500);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub type BatchCallback = Arc<dyn Fn(SessionBatch) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(WatchError) + Send + Sync>;

pub struct WatchOptions {
    pub session_id: String,
    pub file_path: PathBuf,
    pub on_messages: BatchCallback,
    pub on_error: ErrorCallback,
    pub debounce: Duration,
    pub max_wait: Duration,
}

impl WatchOptions {
    pub fn new(
        session_id: impl Into<String>,
        file_path: impl Into<PathBuf>,
        on_messages: BatchCallback,
        on_error: ErrorCallback,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            file_path: file_path.into(),
            on_messages,
            on_error,
            debounce: DEFAULT_DEBOUNCE,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}

pub(crate) type RegistryMap = Mutex<HashMap<String, WatchHandle>>;

enum Signal {
    Change,
    Fault(notify::Error),
    Stop,
}

struct TailState {
    /// Next byte to read from the transcript.
    byte_offset: u64,
    /// Next line number to assign.
    line_index: usize,
    /// Bytes of an incomplete trailing line.
    line_buffer: Vec<u8>,
    pending: Vec<agentlens_types::ParsedMessage>,
    /// Offset of the first byte consumed since the last flush. Covers reads
    /// that produced no message yet (blank or partial lines), so emitted
    /// ranges tile the file with no gaps.
    batch_start: Option<u64>,
    /// Trailing debounce: re-armed by every event that produced messages.
    trailing_deadline: Option<Instant>,
    /// Max-wait ceiling: armed once per batch, never pushed back. This is
    /// what bounds latency under sustained writes.
    max_wait_deadline: Option<Instant>,
    stopped: bool,
}

pub(crate) struct Tailer {
    session_id: String,
    file_path: PathBuf,
    debounce: Duration,
    max_wait: Duration,
    on_messages: BatchCallback,
    on_error: ErrorCallback,
    state: Mutex<TailState>,
    signal_tx: Sender<Signal>,
    registry: Weak<RegistryMap>,
}

/// Shared view of one live tailer. Cloning is cheap; all clones observe the
/// same state.
#[derive(Clone)]
pub struct WatchHandle {
    pub(crate) inner: Arc<Tailer>,
}

impl WatchHandle {
    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn file_path(&self) -> &Path {
        &self.inner.file_path
    }

    pub fn byte_offset(&self) -> u64 {
        self.inner.state.lock().byte_offset
    }

    pub fn line_index(&self) -> usize {
        self.inner.state.lock().line_index
    }

    pub fn stopped(&self) -> bool {
        self.inner.state.lock().stopped
    }

    /// True when both handles refer to the same underlying tailer.
    pub fn ptr_eq(a: &WatchHandle, b: &WatchHandle) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    pub(crate) fn stop(&self) {
        self.inner.stop();
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("session_id", &self.inner.session_id)
            .field("file_path", &self.inner.file_path)
            .finish()
    }
}

impl Tailer {
    /// Start tailing from the file's current end; nothing is replayed.
    pub(crate) fn spawn(options: WatchOptions, registry: Weak<RegistryMap>) -> Result<WatchHandle> {
        let size = std::fs::metadata(&options.file_path)?.len();
        let (signal_tx, signal_rx) = channel();

        let tailer = Arc::new(Tailer {
            session_id: options.session_id,
            file_path: options.file_path,
            debounce: options.debounce,
            max_wait: options.max_wait,
            on_messages: options.on_messages,
            on_error: options.on_error,
            state: Mutex::new(TailState {
                byte_offset: size,
                line_index: 0,
                line_buffer: Vec::new(),
                pending: Vec::new(),
                batch_start: None,
                trailing_deadline: None,
                max_wait_deadline: None,
                stopped: false,
            }),
            signal_tx: signal_tx.clone(),
            registry,
        });

        let event_tx = signal_tx;
        let mut watcher = PollWatcher::new(
            move |res: std::result::Result<notify::Event, notify::Error>| {
                let signal = match res {
                    Ok(_) => Signal::Change,
                    Err(err) => Signal::Fault(err),
                };
                let _ = event_tx.send(signal);
            },
            notify::Config::default().with_poll_interval(POLL_INTERVAL),
        )?;
        watcher.watch(&tailer.file_path, RecursiveMode::NonRecursive)?;

        let worker = Arc::clone(&tailer);
        std::thread::Builder::new()
            .name(format!("tail-{}", worker.session_id))
            .spawn(move || {
                // The subscription lives exactly as long as the worker; it is
                // released on every exit path when this binding drops.
                let _watcher = watcher;
                worker.run(signal_rx);
            })
            .map_err(Error::Io)?;

        Ok(WatchHandle { inner: tailer })
    }

    fn run(&self, signal_rx: Receiver<Signal>) {
        loop {
            let signal = match self.next_flush_timeout() {
                Some(timeout) => match signal_rx.recv_timeout(timeout) {
                    Ok(signal) => Some(signal),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => match signal_rx.recv() {
                    Ok(signal) => Some(signal),
                    Err(_) => break,
                },
            };

            match signal {
                Some(Signal::Change) => self.handle_change(),
                Some(Signal::Fault(err)) => {
                    self.fail(err);
                    break;
                }
                Some(Signal::Stop) => break,
                None => {}
            }

            self.flush_if_due();

            if self.state.lock().stopped {
                break;
            }
        }
    }

    /// Time until the nearest armed flush deadline, or `None` when idle.
    fn next_flush_timeout(&self) -> Option<Duration> {
        let state = self.state.lock();
        let deadline = match (state.trailing_deadline, state.max_wait_deadline) {
            (Some(trailing), Some(max_wait)) => trailing.min(max_wait),
            (Some(trailing), None) => trailing,
            (None, Some(max_wait)) => max_wait,
            (None, None) => return None,
        };
        Some(deadline.saturating_duration_since(Instant::now()))
    }

    fn handle_change(&self) {
        let error = {
            let mut state = self.state.lock();
            if state.stopped {
                return;
            }
            self.read_new_bytes(&mut state).err()
        };

        if let Some(err) = error {
            (self.on_error)(WatchError {
                session_id: self.session_id.clone(),
                code: ErrorCode::ReadError,
                message: "failed to read transcript".to_string(),
                cause: Some(err.to_string()),
            });
        }
    }

    /// Pull `[byte_offset, size)` and segment it into lines. On error the
    /// offset is left untouched so the next change event retries the range.
    fn read_new_bytes(&self, state: &mut TailState) -> std::io::Result<()> {
        let size = std::fs::metadata(&self.file_path)?.len();

        if size < state.byte_offset {
            // Truncation: the writer rewrote the file. Restart from zero.
            state.byte_offset = 0;
            state.line_index = 0;
            state.line_buffer.clear();
            state.batch_start = None;
        }

        if size == state.byte_offset {
            return Ok(());
        }

        let mut file = File::open(&self.file_path)?;
        file.seek(SeekFrom::Start(state.byte_offset))?;
        let mut new_bytes = Vec::with_capacity((size - state.byte_offset) as usize);
        file.take(size - state.byte_offset).read_to_end(&mut new_bytes)?;

        if new_bytes.is_empty() {
            return Ok(());
        }

        if state.batch_start.is_none() {
            state.batch_start = Some(state.byte_offset);
        }
        state.byte_offset += new_bytes.len() as u64;

        self.consume(state, &new_bytes);
        Ok(())
    }

    fn consume(&self, state: &mut TailState, new_bytes: &[u8]) {
        let mut data = std::mem::take(&mut state.line_buffer);
        data.extend_from_slice(new_bytes);

        let mut produced = false;
        let mut start = 0usize;
        while let Some(pos) = data[start..].iter().position(|&b| b == b'\n') {
            let line = String::from_utf8_lossy(&data[start..start + pos]);
            if let Some(message) = parse_line(&line, state.line_index) {
                state.line_index += 1;
                state.pending.push(message);
                produced = true;
            }
            start += pos + 1;
        }
        state.line_buffer = data[start..].to_vec();

        if produced {
            let now = Instant::now();
            state.trailing_deadline = Some(now + self.debounce);
            if state.max_wait_deadline.is_none() {
                state.max_wait_deadline = Some(now + self.max_wait);
            }
        }
    }

    fn flush_if_due(&self) {
        let batch = {
            let mut state = self.state.lock();
            if state.stopped || state.pending.is_empty() {
                return;
            }
            let now = Instant::now();
            let due = state.trailing_deadline.is_some_and(|d| now >= d)
                || state.max_wait_deadline.is_some_and(|d| now >= d);
            if !due {
                return;
            }
            self.take_batch(&mut state)
        };

        if let Some(batch) = batch {
            (self.on_messages)(batch);
        }
    }

    fn take_batch(&self, state: &mut TailState) -> Option<SessionBatch> {
        if state.pending.is_empty() {
            return None;
        }
        let messages = std::mem::take(&mut state.pending);
        let start = state.batch_start.take().unwrap_or(state.byte_offset);
        state.trailing_deadline = None;
        state.max_wait_deadline = None;

        Some(SessionBatch {
            session_id: self.session_id.clone(),
            messages,
            byte_range: ByteRange {
                start,
                end: state.byte_offset,
            },
        })
    }

    /// Idempotent stop: cancel deadlines, flush anything pending once, wake
    /// the worker so the subscription closes.
    pub(crate) fn stop(&self) {
        let batch = {
            let mut state = self.state.lock();
            if state.stopped {
                return;
            }
            state.stopped = true;
            self.take_batch(&mut state)
        };

        if let Some(batch) = batch {
            (self.on_messages)(batch);
        }

        let _ = self.signal_tx.send(Signal::Stop);
    }

    /// Fatal subscription failure: report it, then auto-stop without a final
    /// flush. No further callbacks fire.
    fn fail(&self, err: notify::Error) {
        {
            let mut state = self.state.lock();
            if state.stopped {
                return;
            }
            state.stopped = true;
            state.pending.clear();
            state.batch_start = None;
            state.trailing_deadline = None;
            state.max_wait_deadline = None;
        }

        (self.on_error)(WatchError {
            session_id: self.session_id.clone(),
            code: ErrorCode::WatchError,
            message: "file watch failed".to_string(),
            cause: Some(err.to_string()),
        });

        self.unregister();
    }

    /// Remove this tailer from the registry, but only if the registered
    /// handle still points at this instance.
    fn unregister(&self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut map = registry.lock();
            if map
                .get(&self.session_id)
                .is_some_and(|handle| std::ptr::eq(Arc::as_ptr(&handle.inner), self))
            {
                map.remove(&self.session_id);
            }
        }
    }
}
