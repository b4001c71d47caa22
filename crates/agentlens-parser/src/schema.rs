//! Raw on-disk record shapes, one struct per recognized `type`.
//!
//! These mirror the transcript JSON as written by the agent; the parser
//! discriminates first and then deserializes into the matching struct so a
//! shape failure names the field that broke.

use serde::Deserialize;
use serde_json::{Map, Value};

use agentlens_types::TokenUsage;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawFileHistorySnapshot {
    pub message_id: String,
    pub snapshot: RawSnapshotData,
    #[serde(default)]
    pub is_snapshot_update: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawSnapshotData {
    pub message_id: String,
    #[serde(default)]
    pub tracked_file_backups: Map<String, Value>,
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawUserRecord {
    pub uuid: String,
    #[serde(default)]
    pub parent_uuid: Option<String>,
    pub session_id: String,
    pub timestamp: String,
    pub message: RawUserMessage,
    #[serde(default)]
    pub is_meta: bool,
    #[serde(default)]
    pub tool_use_result: Option<RawToolUseResult>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawUserMessage {
    pub content: RawUserContent,
}

/// User content is either a plain prompt string or an array of blocks.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawUserContent {
    Text(String),
    Blocks(Vec<RawUserContentBlock>),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub(crate) enum RawUserContentBlock {
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Value,
        #[serde(default)]
        is_error: bool,
    },
    #[serde(other)]
    Unknown,
}

/// Tool-result sidecar metadata. The writer puts wildly different shapes
/// here (objects, bare strings, sometimes arrays), so this deserializes from
/// anything and keeps only the keys we understand.
#[derive(Debug, Default)]
pub(crate) struct RawToolUseResult {
    pub status: Option<String>,
    pub prompt: Option<String>,
    pub agent_id: Option<String>,
    pub total_duration_ms: Option<u64>,
    pub total_tokens: Option<u64>,
    pub total_tool_use_count: Option<u64>,
    pub usage: Option<TokenUsage>,
}

impl RawToolUseResult {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.prompt.is_none()
            && self.agent_id.is_none()
            && self.total_duration_ms.is_none()
            && self.total_tokens.is_none()
            && self.total_tool_use_count.is_none()
            && self.usage.is_none()
    }
}

impl<'de> serde::Deserialize<'de> for RawToolUseResult {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{MapAccess, SeqAccess, Visitor};
        use std::fmt;

        struct RawToolUseResultVisitor;

        impl<'de> Visitor<'de> for RawToolUseResultVisitor {
            type Value = RawToolUseResult;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map or any value for RawToolUseResult")
            }

            fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
            where
                M: MapAccess<'de>,
            {
                let mut result = RawToolUseResult::default();
                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "status" => result.status = as_string(map.next_value()?),
                        "prompt" => result.prompt = as_string(map.next_value()?),
                        "agentId" => result.agent_id = as_string(map.next_value()?),
                        "totalDurationMs" => {
                            result.total_duration_ms = map.next_value::<Value>()?.as_u64()
                        }
                        "totalTokens" => result.total_tokens = map.next_value::<Value>()?.as_u64(),
                        "totalToolUseCount" => {
                            result.total_tool_use_count = map.next_value::<Value>()?.as_u64()
                        }
                        "usage" => {
                            result.usage = serde_json::from_value(map.next_value()?).ok();
                        }
                        _ => {
                            let _ = map.next_value::<serde::de::IgnoredAny>()?;
                        }
                    }
                }
                Ok(result)
            }

            // String-shaped results (e.g. plain error messages) carry no metadata.
            fn visit_str<E>(self, _: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(RawToolUseResult::default())
            }

            fn visit_string<E>(self, _: String) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(RawToolUseResult::default())
            }

            // Array-shaped results (content block lists) likewise.
            fn visit_seq<S>(self, mut seq: S) -> Result<Self::Value, S::Error>
            where
                S: SeqAccess<'de>,
            {
                while seq.next_element::<serde::de::IgnoredAny>()?.is_some() {}
                Ok(RawToolUseResult::default())
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(RawToolUseResult::default())
            }
        }

        deserializer.deserialize_any(RawToolUseResultVisitor)
    }
}

fn as_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawAssistantRecord {
    pub uuid: String,
    #[serde(default)]
    pub parent_uuid: Option<String>,
    pub session_id: String,
    pub timestamp: String,
    pub message: RawAssistantMessage,
    #[serde(default)]
    pub is_api_error_message: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawAssistantMessage {
    pub id: String,
    pub model: String,
    pub content: Vec<RawAssistantContent>,
    pub usage: TokenUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub(crate) enum RawAssistantContent {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
        #[serde(default)]
        signature: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Map<String, Value>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawTurnDuration {
    #[serde(default)]
    pub parent_uuid: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawApiError {
    pub error: String,
    pub retry_in_ms: u64,
    pub retry_attempt: u32,
    pub max_retries: u32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawLocalCommand {
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawAgentProgress {
    pub agent_id: String,
    pub prompt: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawBashProgress {
    pub output: String,
    pub elapsed_time_seconds: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawHookProgress {
    pub hook_event: String,
    pub hook_name: String,
    #[serde(default)]
    pub command: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawQueueOperation {
    pub operation: String,
    #[serde(default)]
    pub content: Option<String>,
}
