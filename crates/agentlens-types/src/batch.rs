use serde::{Deserialize, Serialize};

use crate::message::ParsedMessage;

/// Half-open byte interval `[start, end)` of the transcript file covered by
/// one delivered batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

/// The unit of delivery from watcher to transport: a non-empty ordered run
/// of parsed messages plus the byte range that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionBatch {
    pub session_id: String,
    pub messages: Vec<ParsedMessage>,
    pub byte_range: ByteRange,
}
