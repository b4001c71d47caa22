mod error;
mod registry;
mod tailer;

pub use error::{Error, ErrorCode, Result, WatchError};
pub use registry::WatcherRegistry;
pub use tailer::{
    BatchCallback, DEFAULT_DEBOUNCE, DEFAULT_MAX_WAIT, ErrorCallback, WatchHandle, WatchOptions,
};
