use std::collections::HashMap;

use serde_json::Value;

use agentlens_types::{
    ContentBlock, ContextSnapshot, EnrichedSession, PairedToolCall, ParsedMessage,
    ReconstitutedResponse, SubagentRef, SubagentStats, TokenTotals, ToolErrorSample, ToolStat,
    Turn,
};

use crate::pricing;

/// Derive the full enriched view of a session from its ordered messages.
///
/// Pure function: no IO, no caching, deterministic for a given input. The
/// message list passes through untouched; malformed and hidden kinds ride
/// along but never contribute to the derived structures.
pub fn enrich(messages: Vec<ParsedMessage>) -> EnrichedSession {
    let (mut turns, line_to_turn) = build_turns(&messages);
    let responses = reconstitute_responses(&messages, &line_to_turn, &mut turns);
    let tool_calls = pair_tool_calls(&messages, &line_to_turn, &mut turns);
    let totals = compute_totals(&responses, tool_calls.len());
    let tool_stats = compute_tool_stats(&tool_calls);
    let subagents = collect_subagents(&messages);
    let context_snapshots = build_context_snapshots(&responses);

    EnrichedSession {
        messages,
        turns,
        responses,
        tool_calls,
        totals,
        tool_stats,
        subagents,
        context_snapshots,
    }
}

/// Sweep once: real prompts open turns, every line is attributed to the
/// current turn (meta prompts and pre-turn lines fall back to turn 0), and
/// turn durations are matched afterwards by prompt uuid, last write wins.
fn build_turns(messages: &[ParsedMessage]) -> (Vec<Turn>, HashMap<usize, usize>) {
    let mut turns: Vec<Turn> = Vec::new();
    let mut line_to_turn: HashMap<usize, usize> = HashMap::new();
    let mut current_turn_index: i64 = -1;
    let mut durations: Vec<(String, u64)> = Vec::new();

    for message in messages {
        if let ParsedMessage::UserPrompt(prompt) = message
            && !prompt.is_meta
        {
            current_turn_index += 1;
            turns.push(Turn {
                turn_index: current_turn_index as usize,
                prompt_text: prompt.text.clone(),
                prompt_uuid: prompt.uuid.clone(),
                duration_ms: None,
                response_count: 0,
                tool_use_count: 0,
                is_meta: false,
            });
        }

        line_to_turn.insert(message.line_index(), current_turn_index.max(0) as usize);

        if let ParsedMessage::SystemTurnDuration(duration) = message
            && let Some(parent_uuid) = &duration.parent_uuid
        {
            durations.push((parent_uuid.clone(), duration.duration_ms));
        }
    }

    for (parent_uuid, duration_ms) in durations {
        if let Some(turn) = turns.iter_mut().find(|t| t.prompt_uuid == parent_uuid) {
            turn.duration_ms = Some(duration_ms);
        }
    }

    (turns, line_to_turn)
}

/// Group assistant blocks by message id into whole responses. Usage comes
/// from the last block of a group because each block restates the running
/// totals for the generation; summing would double-count.
fn reconstitute_responses(
    messages: &[ParsedMessage],
    line_to_turn: &HashMap<usize, usize>,
    turns: &mut [Turn],
) -> Vec<ReconstitutedResponse> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<&agentlens_types::AssistantBlock>> = HashMap::new();

    for message in messages {
        if let ParsedMessage::AssistantBlock(block) = message {
            if !groups.contains_key(&block.message_id) {
                order.push(block.message_id.clone());
            }
            groups.entry(block.message_id.clone()).or_default().push(block);
        }
    }

    let mut responses = Vec::new();
    for message_id in order {
        let Some(mut blocks) = groups.remove(&message_id) else {
            continue;
        };
        blocks.sort_by_key(|block| block.line_index);

        let Some((first, last)) = blocks.first().zip(blocks.last()) else {
            continue;
        };
        let turn_index = line_to_turn.get(&first.line_index).copied();

        if let Some(index) = turn_index
            && let Some(turn) = turns.get_mut(index)
        {
            turn.response_count += 1;
        }

        responses.push(ReconstitutedResponse {
            message_id,
            model: first.model.clone(),
            blocks: blocks.iter().map(|block| block.content_block.clone()).collect(),
            usage: last.usage.clone(),
            is_synthetic: first.is_synthetic,
            turn_index,
            line_index_start: first.line_index,
            line_index_end: last.line_index,
        });
    }

    responses
}

/// Two sweeps: register every `tool_use` block, then attach results by
/// `tool_use_id`. Results without a matching call are ignored; calls without
/// a result keep `tool_result_block = None` (still running or interrupted).
fn pair_tool_calls(
    messages: &[ParsedMessage],
    line_to_turn: &HashMap<usize, usize>,
    turns: &mut [Turn],
) -> Vec<PairedToolCall> {
    let mut calls: Vec<PairedToolCall> = Vec::new();
    let mut by_tool_use_id: HashMap<String, usize> = HashMap::new();

    for message in messages {
        if let ParsedMessage::AssistantBlock(block) = message
            && let ContentBlock::ToolUse { id, name, input } = &block.content_block
        {
            let turn_index = line_to_turn.get(&block.line_index).copied();

            if let Some(index) = turn_index
                && let Some(turn) = turns.get_mut(index)
            {
                turn.tool_use_count += 1;
            }

            by_tool_use_id.insert(id.clone(), calls.len());
            calls.push(PairedToolCall {
                tool_use_id: id.clone(),
                tool_name: name.clone(),
                input: input.clone(),
                tool_use_block: block.content_block.clone(),
                tool_result_block: None,
                turn_index,
            });
        }
    }

    for message in messages {
        if let ParsedMessage::UserToolResult(result) = message {
            for item in &result.results {
                if let Some(&index) = by_tool_use_id.get(&item.tool_use_id) {
                    calls[index].tool_result_block = Some(item.clone());
                }
            }
        }
    }

    calls
}

/// Totals over already-deduplicated responses. Cache tokens are tracked but
/// not folded into `total_tokens`.
fn compute_totals(responses: &[ReconstitutedResponse], tool_use_count: usize) -> TokenTotals {
    let mut totals = TokenTotals::default();

    for response in responses {
        let usage = &response.usage;
        let cache_creation = usage.cache_creation_input_tokens.unwrap_or(0);
        let cache_read = usage.cache_read_input_tokens.unwrap_or(0);

        totals.input_tokens += usage.input_tokens;
        totals.output_tokens += usage.output_tokens;
        totals.cache_creation_input_tokens += cache_creation;
        totals.cache_read_input_tokens += cache_read;
        totals.estimated_cost_usd += pricing::compute_cost(
            usage.input_tokens,
            usage.output_tokens,
            cache_creation,
            cache_read,
            &response.model,
        );
    }

    totals.total_tokens = totals.input_tokens + totals.output_tokens;
    totals.tool_use_count = tool_use_count;
    totals
}

fn compute_tool_stats(calls: &[PairedToolCall]) -> Vec<ToolStat> {
    let mut stats: Vec<ToolStat> = Vec::new();
    let mut by_name: HashMap<String, usize> = HashMap::new();

    for call in calls {
        let index = *by_name.entry(call.tool_name.clone()).or_insert_with(|| {
            stats.push(ToolStat {
                tool_name: call.tool_name.clone(),
                call_count: 0,
                error_count: 0,
                error_samples: Vec::new(),
            });
            stats.len() - 1
        });

        stats[index].call_count += 1;

        if let Some(result) = &call.tool_result_block
            && result.is_error
        {
            stats[index].error_count += 1;
            stats[index].error_samples.push(ToolErrorSample {
                tool_use_id: call.tool_use_id.clone(),
                error_text: error_text(&result.content),
                turn_index: call.turn_index,
            });
        }
    }

    stats
}

fn error_text(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// First progress message per agent id creates the ref; the parent's tool
/// result upgrades it with stats once all three counters are present.
fn collect_subagents(messages: &[ParsedMessage]) -> Vec<SubagentRef> {
    let mut refs: Vec<SubagentRef> = Vec::new();
    let mut by_agent_id: HashMap<String, usize> = HashMap::new();

    for message in messages {
        if let ParsedMessage::ProgressAgent(progress) = message
            && !by_agent_id.contains_key(&progress.agent_id)
        {
            by_agent_id.insert(progress.agent_id.clone(), refs.len());
            refs.push(SubagentRef {
                agent_id: progress.agent_id.clone(),
                prompt: progress.prompt.clone(),
                parent_tool_use_id: progress.parent_tool_use_id.clone(),
                stats: None,
            });
        }
    }

    for message in messages {
        if let ParsedMessage::UserToolResult(result) = message
            && let Some(meta) = &result.tool_use_result
            && let Some(agent_id) = &meta.agent_id
            && let Some(&index) = by_agent_id.get(agent_id)
            && let (Some(duration), Some(tokens), Some(tool_uses)) = (
                meta.total_duration_ms,
                meta.total_tokens,
                meta.total_tool_use_count,
            )
        {
            refs[index].stats = Some(SubagentStats {
                total_duration_ms: duration,
                total_tokens: tokens,
                total_tool_use_count: tool_uses,
            });
        }
    }

    refs
}

/// One snapshot per non-synthetic response. Unlike the totals, the running
/// input here folds cache tokens in, since cached tokens still occupy the
/// context window.
fn build_context_snapshots(responses: &[ReconstitutedResponse]) -> Vec<ContextSnapshot> {
    let mut snapshots = Vec::new();
    let mut cumulative_input = 0u64;
    let mut cumulative_output = 0u64;

    for response in responses {
        if response.is_synthetic {
            continue;
        }

        let usage = &response.usage;
        cumulative_input += usage.input_tokens
            + usage.cache_read_input_tokens.unwrap_or(0)
            + usage.cache_creation_input_tokens.unwrap_or(0);
        cumulative_output += usage.output_tokens;

        snapshots.push(ContextSnapshot {
            message_id: response.message_id.clone(),
            turn_index: response.turn_index,
            cumulative_input_tokens: cumulative_input,
            cumulative_output_tokens: cumulative_output,
        });
    }

    snapshots
}
