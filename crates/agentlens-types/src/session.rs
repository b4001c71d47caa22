use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::message::{ContentBlock, ParsedMessage, TokenUsage, ToolResultItem};

/// One conversational round: a real (non-meta) user prompt plus everything
/// the assistant did until the next real prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub turn_index: usize,
    pub prompt_text: String,
    pub prompt_uuid: String,
    pub duration_ms: Option<u64>,
    pub response_count: usize,
    pub tool_use_count: usize,
    pub is_meta: bool,
}

/// A single API generation, reassembled from the per-block lines that share
/// a `messageId`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconstitutedResponse {
    pub message_id: String,
    pub model: String,
    pub blocks: Vec<ContentBlock>,
    /// Usage from the last block of the group; blocks repeat the running
    /// totals, so summing them would double-count.
    pub usage: TokenUsage,
    pub is_synthetic: bool,
    pub turn_index: Option<usize>,
    pub line_index_start: usize,
    pub line_index_end: usize,
}

/// A `tool_use` block paired with its `tool_result`, if one arrived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairedToolCall {
    pub tool_use_id: String,
    pub tool_name: String,
    pub input: Map<String, Value>,
    pub tool_use_block: ContentBlock,
    pub tool_result_block: Option<ToolResultItem>,
    pub turn_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTotals {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_input_tokens: u64,
    pub cache_read_input_tokens: u64,
    /// Input plus output. Cache tokens are tracked but not folded in.
    pub total_tokens: u64,
    pub estimated_cost_usd: f64,
    pub tool_use_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolErrorSample {
    pub tool_use_id: String,
    pub error_text: String,
    pub turn_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolStat {
    pub tool_name: String,
    pub call_count: usize,
    pub error_count: usize,
    pub error_samples: Vec<ToolErrorSample>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubagentStats {
    pub total_duration_ms: u64,
    pub total_tokens: u64,
    pub total_tool_use_count: u64,
}

/// A subagent spawned during the session. `stats` stays `None` until the
/// parent's tool result reports the completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubagentRef {
    pub agent_id: String,
    pub prompt: String,
    #[serde(rename = "parentToolUseID")]
    pub parent_tool_use_id: String,
    pub stats: Option<SubagentStats>,
}

/// Cumulative token usage after one non-synthetic response; plots
/// context-window growth over the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnapshot {
    pub message_id: String,
    pub turn_index: Option<usize>,
    pub cumulative_input_tokens: u64,
    pub cumulative_output_tokens: u64,
}

/// Everything derivable from one pass over a session's messages. The source
/// file stays authoritative; this is recomputed, never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedSession {
    pub messages: Vec<ParsedMessage>,
    pub turns: Vec<Turn>,
    pub responses: Vec<ReconstitutedResponse>,
    pub tool_calls: Vec<PairedToolCall>,
    pub totals: TokenTotals,
    pub tool_stats: Vec<ToolStat>,
    pub subagents: Vec<SubagentRef>,
    pub context_snapshots: Vec<ContextSnapshot>,
}
