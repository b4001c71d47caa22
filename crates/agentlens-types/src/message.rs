use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One parsed transcript line.
///
/// Closed tagged sum over everything a Claude Code session log can contain.
/// Decoding failures degrade to [`Malformed`] rather than erroring, so a
/// transcript always round-trips into a sequence of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
#[serde(rename_all = "kebab-case")]
pub enum ParsedMessage {
    FileHistorySnapshot(FileHistorySnapshot),
    UserPrompt(UserPrompt),
    UserToolResult(UserToolResult),
    AssistantBlock(AssistantBlock),
    SystemTurnDuration(SystemTurnDuration),
    SystemApiError(SystemApiError),
    SystemLocalCommand(SystemLocalCommand),
    ProgressAgent(ProgressAgent),
    ProgressBash(ProgressBash),
    ProgressHook(ProgressHook),
    QueueOperation(QueueOperation),
    Malformed(Malformed),
}

impl ParsedMessage {
    /// The `kind` discriminator as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            ParsedMessage::FileHistorySnapshot(_) => "file-history-snapshot",
            ParsedMessage::UserPrompt(_) => "user-prompt",
            ParsedMessage::UserToolResult(_) => "user-tool-result",
            ParsedMessage::AssistantBlock(_) => "assistant-block",
            ParsedMessage::SystemTurnDuration(_) => "system-turn-duration",
            ParsedMessage::SystemApiError(_) => "system-api-error",
            ParsedMessage::SystemLocalCommand(_) => "system-local-command",
            ParsedMessage::ProgressAgent(_) => "progress-agent",
            ParsedMessage::ProgressBash(_) => "progress-bash",
            ParsedMessage::ProgressHook(_) => "progress-hook",
            ParsedMessage::QueueOperation(_) => "queue-operation",
            ParsedMessage::Malformed(_) => "malformed",
        }
    }

    /// 0-based index of the non-blank line this message was parsed from.
    pub fn line_index(&self) -> usize {
        match self {
            ParsedMessage::FileHistorySnapshot(m) => m.line_index,
            ParsedMessage::UserPrompt(m) => m.line_index,
            ParsedMessage::UserToolResult(m) => m.line_index,
            ParsedMessage::AssistantBlock(m) => m.line_index,
            ParsedMessage::SystemTurnDuration(m) => m.line_index,
            ParsedMessage::SystemApiError(m) => m.line_index,
            ParsedMessage::SystemLocalCommand(m) => m.line_index,
            ParsedMessage::ProgressAgent(m) => m.line_index,
            ParsedMessage::ProgressBash(m) => m.line_index,
            ParsedMessage::ProgressHook(m) => m.line_index,
            ParsedMessage::QueueOperation(m) => m.line_index,
            ParsedMessage::Malformed(m) => m.line_index,
        }
    }
}

/// A single block of assistant output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
        signature: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Map<String, Value>,
    },
}

/// Token accounting as reported on an assistant record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: Option<u64>,
    #[serde(default)]
    pub cache_read_input_tokens: Option<u64>,
    #[serde(default)]
    pub service_tier: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileHistorySnapshot {
    pub message_id: String,
    pub snapshot: SnapshotData,
    #[serde(default)]
    pub is_snapshot_update: bool,
    pub line_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotData {
    pub message_id: String,
    #[serde(default)]
    pub tracked_file_backups: Map<String, Value>,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPrompt {
    pub uuid: String,
    pub parent_uuid: Option<String>,
    pub session_id: String,
    /// ISO-8601 string, deliberately not parsed.
    pub timestamp: String,
    pub text: String,
    #[serde(default)]
    pub is_meta: bool,
    pub line_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserToolResult {
    pub uuid: String,
    pub parent_uuid: Option<String>,
    pub session_id: String,
    pub timestamp: String,
    pub results: Vec<ToolResultItem>,
    #[serde(default)]
    pub tool_use_result: Option<ToolUseResultMeta>,
    pub line_index: usize,
}

/// One `tool_result` item from a user record's content array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultItem {
    pub tool_use_id: String,
    pub content: Value,
    #[serde(default)]
    pub is_error: bool,
}

/// Sidecar metadata some tool results carry (subagent completion stats,
/// pasted prompts, ...). Anything may be missing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolUseResultMeta {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub total_duration_ms: Option<u64>,
    #[serde(default)]
    pub total_tokens: Option<u64>,
    #[serde(default)]
    pub total_tool_use_count: Option<u64>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantBlock {
    pub uuid: String,
    pub parent_uuid: Option<String>,
    pub session_id: String,
    pub timestamp: String,
    /// API message id; blocks sharing one belong to the same response.
    pub message_id: String,
    pub model: String,
    pub content_block: ContentBlock,
    pub usage: TokenUsage,
    /// True when the source record was flagged as an API error placeholder.
    #[serde(default)]
    pub is_synthetic: bool,
    pub line_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemTurnDuration {
    pub parent_uuid: Option<String>,
    pub duration_ms: u64,
    pub line_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemApiError {
    pub error: String,
    pub retry_in_ms: u64,
    pub retry_attempt: u32,
    pub max_retries: u32,
    pub line_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemLocalCommand {
    pub content: String,
    pub line_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressAgent {
    pub agent_id: String,
    pub prompt: String,
    #[serde(rename = "parentToolUseID")]
    pub parent_tool_use_id: String,
    pub line_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressBash {
    pub output: String,
    pub elapsed_time_seconds: f64,
    pub line_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressHook {
    pub hook_event: String,
    pub hook_name: String,
    #[serde(default)]
    pub command: Option<String>,
    pub line_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueOperation {
    pub operation: String,
    #[serde(default)]
    pub content: Option<String>,
    pub line_index: usize,
}

/// A line that could not be decoded. Carries the original text so UIs can
/// surface diagnostics without losing data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Malformed {
    pub raw: String,
    pub error: String,
    pub line_index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tag_round_trips() {
        let msg = ParsedMessage::UserPrompt(UserPrompt {
            uuid: "u-1".to_string(),
            parent_uuid: None,
            session_id: "s-1".to_string(),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            text: "Hello".to_string(),
            is_meta: false,
            line_index: 0,
        });

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["kind"], "user-prompt");
        assert_eq!(json["lineIndex"], 0);

        let back: ParsedMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
        assert_eq!(back.kind(), "user-prompt");
    }

    #[test]
    fn content_block_uses_snake_case_type_tag() {
        let block = ContentBlock::ToolUse {
            id: "toolu_1".to_string(),
            name: "Bash".to_string(),
            input: Map::new(),
        };
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "tool_use");
    }

    #[test]
    fn progress_agent_preserves_parent_tool_use_id_casing() {
        let msg = ProgressAgent {
            agent_id: "ab12cd34".to_string(),
            prompt: "scan the repo".to_string(),
            parent_tool_use_id: "toolu_9".to_string(),
            line_index: 3,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("parentToolUseID").is_some());
    }
}
