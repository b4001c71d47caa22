use serde_json::Value;

use agentlens_types::{
    AssistantBlock, ContentBlock, FileHistorySnapshot, Malformed, ParsedMessage, ProgressAgent,
    ProgressBash, ProgressHook, QueueOperation, SnapshotData, SystemApiError, SystemLocalCommand,
    SystemTurnDuration, ToolResultItem, ToolUseResultMeta, UserPrompt, UserToolResult,
};

use crate::schema::*;

/// Decode one transcript line into a [`ParsedMessage`].
///
/// Returns `None` only for blank input. Every other input yields a message;
/// a decoding failure yields `malformed` carrying the original line and a
/// human-readable error. This function never panics.
pub fn parse_line(raw_line: &str, line_index: usize) -> Option<ParsedMessage> {
    let line = raw_line.trim();
    if line.is_empty() {
        return None;
    }

    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(err) => {
            return Some(malformed(line, format!("Invalid JSON: {}", err), line_index));
        }
    };

    let Some(record_type) = value.get("type").and_then(Value::as_str) else {
        return Some(malformed(
            line,
            "missing or non-string top-level `type` field".to_string(),
            line_index,
        ));
    };

    let decoded = match record_type {
        "file-history-snapshot" => decode_file_history_snapshot(&value, line_index),
        "user" => decode_user(&value, line_index),
        "assistant" => decode_assistant(&value, line_index),
        "system" => decode_system(&value, line_index),
        "progress" => decode_progress(&value, line_index),
        "queue-operation" => decode_queue_operation(&value, line_index),
        other => Err(format!("unknown record type `{}`", other)),
    };

    Some(match decoded {
        Ok(message) => message,
        Err(error) => malformed(line, error, line_index),
    })
}

fn malformed(line: &str, error: String, line_index: usize) -> ParsedMessage {
    ParsedMessage::Malformed(Malformed {
        raw: line.to_string(),
        error,
        line_index,
    })
}

fn decode_file_history_snapshot(value: &Value, line_index: usize) -> Result<ParsedMessage, String> {
    let record: RawFileHistorySnapshot =
        serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;

    Ok(ParsedMessage::FileHistorySnapshot(FileHistorySnapshot {
        message_id: record.message_id,
        snapshot: SnapshotData {
            message_id: record.snapshot.message_id,
            tracked_file_backups: record.snapshot.tracked_file_backups,
            timestamp: record.snapshot.timestamp,
        },
        is_snapshot_update: record.is_snapshot_update,
        line_index,
    }))
}

fn decode_user(value: &Value, line_index: usize) -> Result<ParsedMessage, String> {
    let record: RawUserRecord = serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;

    match record.message.content {
        RawUserContent::Text(text) => Ok(ParsedMessage::UserPrompt(UserPrompt {
            uuid: record.uuid,
            parent_uuid: record.parent_uuid,
            session_id: record.session_id,
            timestamp: record.timestamp,
            text,
            is_meta: record.is_meta,
            line_index,
        })),
        RawUserContent::Blocks(blocks) => {
            let results = blocks
                .into_iter()
                .filter_map(|block| match block {
                    RawUserContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        is_error,
                    } => Some(ToolResultItem {
                        tool_use_id,
                        content,
                        is_error,
                    }),
                    RawUserContentBlock::Unknown => None,
                })
                .collect();

            Ok(ParsedMessage::UserToolResult(UserToolResult {
                uuid: record.uuid,
                parent_uuid: record.parent_uuid,
                session_id: record.session_id,
                timestamp: record.timestamp,
                results,
                tool_use_result: record.tool_use_result.and_then(convert_tool_use_result),
                line_index,
            }))
        }
    }
}

fn convert_tool_use_result(raw: RawToolUseResult) -> Option<ToolUseResultMeta> {
    if raw.is_empty() {
        return None;
    }
    Some(ToolUseResultMeta {
        status: raw.status,
        prompt: raw.prompt,
        agent_id: raw.agent_id,
        total_duration_ms: raw.total_duration_ms,
        total_tokens: raw.total_tokens,
        total_tool_use_count: raw.total_tool_use_count,
        usage: raw.usage,
    })
}

fn decode_assistant(value: &Value, line_index: usize) -> Result<ParsedMessage, String> {
    let record: RawAssistantRecord =
        serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;

    let mut content = record.message.content;
    if content.len() != 1 {
        return Err(format!(
            "expected exactly 1 content block on assistant record, found {}",
            content.len()
        ));
    }

    let content_block = match content.remove(0) {
        RawAssistantContent::Text { text } => ContentBlock::Text { text },
        RawAssistantContent::Thinking {
            thinking,
            signature,
        } => ContentBlock::Thinking {
            thinking,
            signature,
        },
        RawAssistantContent::ToolUse { id, name, input } => {
            ContentBlock::ToolUse { id, name, input }
        }
    };

    Ok(ParsedMessage::AssistantBlock(AssistantBlock {
        uuid: record.uuid,
        parent_uuid: record.parent_uuid,
        session_id: record.session_id,
        timestamp: record.timestamp,
        message_id: record.message.id,
        model: record.message.model,
        content_block,
        usage: record.message.usage,
        is_synthetic: record.is_api_error_message,
        line_index,
    }))
}

fn decode_system(value: &Value, line_index: usize) -> Result<ParsedMessage, String> {
    let Some(subtype) = value.get("subtype").and_then(Value::as_str) else {
        return Err("missing or non-string `subtype` on system record".to_string());
    };

    match subtype {
        "turn_duration" => {
            let record: RawTurnDuration =
                serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
            Ok(ParsedMessage::SystemTurnDuration(SystemTurnDuration {
                parent_uuid: record.parent_uuid,
                duration_ms: record.duration_ms,
                line_index,
            }))
        }
        "api_error" => {
            let record: RawApiError =
                serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
            Ok(ParsedMessage::SystemApiError(SystemApiError {
                error: record.error,
                retry_in_ms: record.retry_in_ms,
                retry_attempt: record.retry_attempt,
                max_retries: record.max_retries,
                line_index,
            }))
        }
        "local_command" => {
            let record: RawLocalCommand =
                serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
            Ok(ParsedMessage::SystemLocalCommand(SystemLocalCommand {
                content: record.content,
                line_index,
            }))
        }
        other => Err(format!("unknown system subtype `{}`", other)),
    }
}

fn decode_progress(value: &Value, line_index: usize) -> Result<ParsedMessage, String> {
    let Some(data) = value.get("data") else {
        return Err("missing `data` on progress record".to_string());
    };
    let Some(data_type) = data.get("type").and_then(Value::as_str) else {
        return Err("missing or non-string `data.type` on progress record".to_string());
    };

    match data_type {
        "agent_progress" => {
            let record: RawAgentProgress =
                serde_json::from_value(data.clone()).map_err(|e| e.to_string())?;
            let Some(parent_tool_use_id) = value.get("parentToolUseID").and_then(Value::as_str)
            else {
                return Err("missing `parentToolUseID` on agent progress record".to_string());
            };
            Ok(ParsedMessage::ProgressAgent(ProgressAgent {
                agent_id: record.agent_id,
                prompt: record.prompt,
                parent_tool_use_id: parent_tool_use_id.to_string(),
                line_index,
            }))
        }
        "bash_progress" => {
            let record: RawBashProgress =
                serde_json::from_value(data.clone()).map_err(|e| e.to_string())?;
            Ok(ParsedMessage::ProgressBash(ProgressBash {
                output: record.output,
                elapsed_time_seconds: record.elapsed_time_seconds,
                line_index,
            }))
        }
        "hook_progress" => {
            let record: RawHookProgress =
                serde_json::from_value(data.clone()).map_err(|e| e.to_string())?;
            Ok(ParsedMessage::ProgressHook(ProgressHook {
                hook_event: record.hook_event,
                hook_name: record.hook_name,
                command: record.command,
                line_index,
            }))
        }
        other => Err(format!("unknown progress data type `{}`", other)),
    }
}

fn decode_queue_operation(value: &Value, line_index: usize) -> Result<ParsedMessage, String> {
    let record: RawQueueOperation =
        serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
    Ok(ParsedMessage::QueueOperation(QueueOperation {
        operation: record.operation,
        content: record.content,
        line_index,
    }))
}
