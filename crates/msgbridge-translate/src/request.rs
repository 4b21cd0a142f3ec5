use msgbridge_protocol::messages::request::{
    ContentBlockParam, ContentBlockParamKnown, MessageContent, MessageParam, MessageRole,
    MessagesRequestBody, SystemParam, ThinkingConfig, ToolChoice, ToolChoiceMode, ToolDefinition,
    ToolResultContent,
};
use msgbridge_protocol::responses::request::{
    AssistantItemRole, AssistantMessageItem, FunctionCallItem, FunctionCallOutputItem,
    FunctionCallOutputType, FunctionCallType, FunctionTool, FunctionToolType, InputItem,
    MessageItemType, OutputTextPart, Reasoning, ReasoningEffort, ReasoningSummary,
    ResponsesRequestBody, ResponsesToolChoice, ToolChoiceFunction, ToolChoiceFunctionType,
    ToolChoiceMode as ResponsesToolChoiceMode, UserInputItem, UserRole,
};
use serde_json::Value as JsonValue;

use crate::ids::{mint_call_id, ToolIdMap};
use crate::model::parse_model_effort;

/// System-array text parts with these prefixes are transport plumbing, not
/// instructions; they never reach the upstream.
const FILTERED_SYSTEM_PREFIXES: &[&str] = &["x-anthropic-billing-header", "<system-reminder>"];

/// Thinking budgets at or under this map to `medium` effort; larger budgets
/// map to `high`.
const MEDIUM_EFFORT_BUDGET_CEILING: u32 = 20_000;

#[derive(Debug, Clone)]
pub struct TranslatedRequest {
    pub body: ResponsesRequestBody,
    pub tool_ids: ToolIdMap,
    pub model: String,
}

/// Translate a Messages-dialect request into a Responses-dialect request,
/// allocating the tool-call ID map as assistant turns are walked.
pub fn translate_request(request: &MessagesRequestBody) -> TranslatedRequest {
    let (model, effort_from_name) = parse_model_effort(&request.model);
    let effort = effort_from_name
        .or_else(|| effort_from_thinking(request.thinking.as_ref()))
        .unwrap_or(ReasoningEffort::Medium);

    let instructions = extract_instructions(request.system.as_ref());

    let mut tool_ids = ToolIdMap::new();
    let input = linearize_messages(&request.messages, &mut tool_ids);

    let tools = map_tools(request.tools.as_deref());
    let tool_choice = map_tool_choice(request.tool_choice.as_ref());

    let body = ResponsesRequestBody {
        model: model.to_string(),
        input,
        instructions,
        max_output_tokens: request.max_tokens,
        stream: request.stream,
        tools,
        tool_choice,
        reasoning: Some(Reasoning {
            effort,
            summary: ReasoningSummary::Auto,
        }),
        store: None,
    };

    TranslatedRequest {
        body,
        tool_ids,
        model: model.to_string(),
    }
}

fn effort_from_thinking(thinking: Option<&ThinkingConfig>) -> Option<ReasoningEffort> {
    match thinking {
        Some(ThinkingConfig::Enabled {
            budget_tokens: Some(budget),
        }) => {
            if *budget <= MEDIUM_EFFORT_BUDGET_CEILING {
                Some(ReasoningEffort::Medium)
            } else {
                Some(ReasoningEffort::High)
            }
        }
        _ => None,
    }
}

fn extract_instructions(system: Option<&SystemParam>) -> Option<String> {
    let text = match system {
        Some(SystemParam::Text(text)) => text.clone(),
        Some(SystemParam::Parts(parts)) => {
            let kept: Vec<&str> = parts
                .iter()
                .filter(|part| part.kind == "text")
                .filter(|part| {
                    !FILTERED_SYSTEM_PREFIXES
                        .iter()
                        .any(|prefix| part.text.starts_with(prefix))
                })
                .map(|part| part.text.as_str())
                .collect();
            kept.join("\n\n")
        }
        None => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn linearize_messages(messages: &[MessageParam], tool_ids: &mut ToolIdMap) -> Vec<InputItem> {
    let mut items = Vec::new();
    for message in messages {
        match message.role {
            MessageRole::User => linearize_user_turn(&message.content, tool_ids, &mut items),
            MessageRole::Assistant => {
                linearize_assistant_turn(&message.content, tool_ids, &mut items)
            }
        }
    }
    items
}

fn linearize_user_turn(
    content: &MessageContent,
    tool_ids: &ToolIdMap,
    items: &mut Vec<InputItem>,
) {
    match content {
        MessageContent::Text(text) => items.push(user_text_item(text.clone())),
        MessageContent::Blocks(blocks) => {
            for block in blocks {
                let ContentBlockParam::Known(block) = block else {
                    continue;
                };
                match block {
                    ContentBlockParamKnown::Text { text } => {
                        items.push(user_text_item(text.clone()));
                    }
                    ContentBlockParamKnown::ToolResult {
                        tool_use_id,
                        content,
                        ..
                    } => {
                        let call_id = tool_ids
                            .call_id_for(tool_use_id)
                            .unwrap_or(tool_use_id.as_str())
                            .to_string();
                        items.push(InputItem::FunctionCallOutput(FunctionCallOutputItem {
                            r#type: FunctionCallOutputType::FunctionCallOutput,
                            call_id,
                            output: tool_result_text(content.as_ref()),
                        }));
                    }
                    _ => {}
                }
            }
        }
    }
}

fn linearize_assistant_turn(
    content: &MessageContent,
    tool_ids: &mut ToolIdMap,
    items: &mut Vec<InputItem>,
) {
    match content {
        MessageContent::Text(text) => items.push(assistant_text_item(text.clone())),
        MessageContent::Blocks(blocks) => {
            for block in blocks {
                let ContentBlockParam::Known(block) = block else {
                    continue;
                };
                match block {
                    ContentBlockParamKnown::Text { text } => {
                        items.push(assistant_text_item(text.clone()));
                    }
                    // Thinking never round-trips upstream.
                    ContentBlockParamKnown::Thinking { .. } => {}
                    ContentBlockParamKnown::ToolUse { id, name, input } => {
                        let call_id = mint_call_id();
                        tool_ids.insert(id.clone(), call_id.clone());
                        items.push(InputItem::FunctionCall(FunctionCallItem {
                            r#type: FunctionCallType::FunctionCall,
                            call_id,
                            name: name.clone(),
                            arguments: arguments_string(input),
                        }));
                    }
                    ContentBlockParamKnown::ToolResult { .. } => {}
                }
            }
        }
    }
}

fn user_text_item(text: String) -> InputItem {
    InputItem::User(UserInputItem {
        role: UserRole::User,
        content: text,
    })
}

fn assistant_text_item(text: String) -> InputItem {
    InputItem::AssistantMessage(AssistantMessageItem {
        r#type: MessageItemType::Message,
        role: AssistantItemRole::Assistant,
        content: vec![OutputTextPart::new(text)],
    })
}

fn tool_result_text(content: Option<&ToolResultContent>) -> String {
    match content {
        Some(ToolResultContent::Text(text)) => text.clone(),
        Some(ToolResultContent::Parts(parts)) => {
            let texts: Vec<&str> = parts
                .iter()
                .filter(|part| part.kind == "text")
                .map(|part| part.text.as_str())
                .collect();
            texts.join("\n")
        }
        None => String::new(),
    }
}

fn arguments_string(input: &JsonValue) -> String {
    match input {
        JsonValue::String(text) => text.clone(),
        other => serde_json::to_string(other).unwrap_or_else(|_| "{}".to_string()),
    }
}

fn map_tools(tools: Option<&[ToolDefinition]>) -> Option<Vec<FunctionTool>> {
    let tools = tools?;
    if tools.is_empty() {
        return None;
    }
    Some(
        tools
            .iter()
            .map(|tool| FunctionTool {
                r#type: FunctionToolType::Function,
                name: tool.name.clone(),
                description: tool.description.clone().unwrap_or_default(),
                parameters: tool
                    .input_schema
                    .clone()
                    .unwrap_or_else(|| JsonValue::Object(Default::default())),
            })
            .collect(),
    )
}

fn map_tool_choice(choice: Option<&ToolChoice>) -> Option<ResponsesToolChoice> {
    match choice? {
        ToolChoice::Mode(mode) => Some(ResponsesToolChoice::Mode(match mode {
            ToolChoiceMode::Auto => ResponsesToolChoiceMode::Auto,
            ToolChoiceMode::Any => ResponsesToolChoiceMode::Required,
            ToolChoiceMode::None => ResponsesToolChoiceMode::None,
        })),
        ToolChoice::Typed(typed) => match typed.kind.as_str() {
            "auto" => Some(ResponsesToolChoice::Mode(ResponsesToolChoiceMode::Auto)),
            "any" => Some(ResponsesToolChoice::Mode(ResponsesToolChoiceMode::Required)),
            "tool" => typed.name.as_ref().map(|name| {
                ResponsesToolChoice::Function(ToolChoiceFunction {
                    r#type: ToolChoiceFunctionType::Function,
                    name: name.clone(),
                })
            }),
            _ => None,
        },
    }
}
