use msgbridge_protocol::messages::response::{
    AssistantRole, ContentBlock, Message, MessageType, StopReason, Usage,
};
use msgbridge_protocol::responses::response::{
    IncompleteReason, OutputContent, OutputContentKnown, OutputItem, OutputItemKnown, Response,
    ResponseStatus, ResponseUsage, SummaryPart, SummaryPartKnown,
};
use serde_json::{json, Value as JsonValue};

use crate::ids::{mint_message_id, mint_tool_use_id, ToolIdMap};

/// Translate a terminal upstream response into a complete Messages-dialect
/// message. `tool_ids` is the map the request translator built; calls the
/// map does not know get freshly minted client-side IDs.
pub fn translate_response(response: &Response, tool_ids: &ToolIdMap, model_alias: &str) -> Message {
    let mut content = Vec::new();

    for item in &response.output {
        let OutputItem::Known(item) = item else {
            continue;
        };
        match item {
            OutputItemKnown::Reasoning { summary, .. } => {
                let thinking = summary_text(summary);
                if !thinking.is_empty() {
                    content.push(ContentBlock::Thinking { thinking });
                }
            }
            OutputItemKnown::Message {
                content: parts, ..
            } => {
                for part in parts {
                    if let OutputContent::Known(OutputContentKnown::OutputText { text }) = part {
                        content.push(ContentBlock::Text { text: text.clone() });
                    }
                }
            }
            OutputItemKnown::FunctionCall {
                call_id,
                name,
                arguments,
                ..
            } => {
                let id = tool_ids
                    .client_id_for(call_id)
                    .map(|id| id.to_string())
                    .unwrap_or_else(mint_tool_use_id);
                content.push(ContentBlock::ToolUse {
                    id,
                    name: name.clone(),
                    input: parse_arguments(arguments),
                });
            }
        }
    }

    Message {
        id: mint_message_id(),
        r#type: MessageType::Message,
        role: AssistantRole::Assistant,
        model: model_alias.to_string(),
        content,
        stop_reason: Some(derive_stop_reason(response)),
        stop_sequence: None,
        usage: usage_from_response(response.usage.as_ref()),
    }
}

/// `end_turn` unless the upstream ran out of output tokens; a function call
/// anywhere in the output wins over both.
pub fn derive_stop_reason(response: &Response) -> StopReason {
    let has_function_call = response.output.iter().any(|item| {
        matches!(
            item,
            OutputItem::Known(OutputItemKnown::FunctionCall { .. })
        )
    });
    if has_function_call {
        return StopReason::ToolUse;
    }
    if response.status == Some(ResponseStatus::Incomplete)
        && response
            .incomplete_details
            .as_ref()
            .map(|details| details.reason == IncompleteReason::MaxOutputTokens)
            .unwrap_or(false)
    {
        return StopReason::MaxTokens;
    }
    StopReason::EndTurn
}

/// Net input excludes cached reads; the upstream never reports cache
/// creation separately, so it stays zero.
pub fn usage_from_response(usage: Option<&ResponseUsage>) -> Usage {
    let Some(usage) = usage else {
        return Usage::default();
    };
    let cached = usage.input_tokens_details.cached_tokens;
    Usage {
        input_tokens: usage.input_tokens.saturating_sub(cached),
        output_tokens: usage.output_tokens,
        cache_creation_input_tokens: 0,
        cache_read_input_tokens: cached,
    }
}

fn summary_text(summary: &[SummaryPart]) -> String {
    let mut text = String::new();
    for part in summary {
        if let SummaryPart::Known(SummaryPartKnown::SummaryText { text: piece }) = part {
            text.push_str(piece);
        }
    }
    text
}

fn parse_arguments(arguments: &str) -> JsonValue {
    serde_json::from_str(arguments).unwrap_or_else(|_| json!({ "raw": arguments }))
}
