use msgbridge_protocol::messages::request::{
    ContentBlockParam, ContentBlockParamKnown, MessageContent, MessageParam, MessageRole,
    MessagesRequestBody, SystemParam, SystemPart, ThinkingConfig, ToolChoice, ToolChoiceMode,
    ToolDefinition, ToolResultContent, TypedToolChoice,
};
use msgbridge_protocol::messages::response::{ContentBlock, StopReason};
use msgbridge_protocol::messages::stream::{ContentBlockDelta, StreamContentBlock, StreamEvent};
use msgbridge_protocol::responses::request::{
    InputItem, ReasoningEffort, ResponsesToolChoice, ToolChoiceMode as ResponsesToolChoiceMode,
};
use msgbridge_protocol::responses::response::{
    Response, ResponseUsage, ResponseUsageInputDetails,
};
use msgbridge_protocol::responses::stream::{ResponseStreamEvent, ResponseStreamEventKnown};
use serde_json::{json, Value as JsonValue};

use crate::adapter::{adapt, AdapterConfig, ApplyWhen, InstructionMode};
use crate::collect::CompletedCollector;
use crate::ids::ToolIdMap;
use crate::model::parse_model_effort;
use crate::request::translate_request;
use crate::response::{translate_response, usage_from_response};
use crate::stream::StreamConverter;
use crate::DEFAULT_MODEL_ALIAS;

// ---- model-name parsing ----

#[test]
fn model_suffix_extraction() {
    assert_eq!(
        parse_model_effort("gpt-5.2-codex-xhigh"),
        ("gpt-5.2-codex", Some(ReasoningEffort::XHigh))
    );
    assert_eq!(parse_model_effort("codex-mini-latest"), ("codex-mini-latest", None));
    assert_eq!(
        parse_model_effort("gpt-5.2-medium"),
        ("gpt-5.2", Some(ReasoningEffort::Medium))
    );
}

#[test]
fn model_suffix_edge_cases() {
    assert_eq!(parse_model_effort("plain"), ("plain", None));
    assert_eq!(parse_model_effort("-high"), ("-high", None));
    assert_eq!(
        parse_model_effort("model-HIGH"),
        ("model", Some(ReasoningEffort::High))
    );
}

#[test]
fn model_suffix_reattaches() {
    let (base, effort) = parse_model_effort("gpt-5.2-codex-low");
    let effort = effort.expect("effort");
    assert_eq!(format!("{base}-{}", effort.as_str()), "gpt-5.2-codex-low");
}

// ---- adapter ----

fn adapter_config(value: JsonValue) -> AdapterConfig {
    AdapterConfig::from_value(&value)
}

#[test]
fn adapter_overwrite_cli_apply_all() {
    // Scenario: CLI client, applyWhen=all. Instructions are replaced but
    // stripping stays scoped to non-CLI clients.
    let config = adapter_config(json!({
        "instructions": { "mode": "overwrite", "text": "SERVER", "applyWhen": "all" },
        "stripFields": { "enabled": true }
    }));
    let body = json!({ "instructions": "CLIENT", "temperature": 1 });

    let outcome = adapt(&body, true, &config, None);

    assert!(outcome.applied);
    assert_eq!(outcome.body["instructions"], "SERVER");
    assert_eq!(outcome.body["temperature"], 1);
    assert!(outcome.changes.stripped_fields.is_empty());
}

#[test]
fn adapter_prepend_is_idempotent() {
    let config = adapter_config(json!({
        "instructions": { "mode": "prepend", "text": "SERVER", "applyWhen": "all" }
    }));
    let body = json!({ "instructions": "CLIENT" });

    let once = adapt(&body, true, &config, None);
    assert_eq!(once.body["instructions"], "SERVER\n\nCLIENT");

    let twice = adapt(&once.body, true, &config, None);
    assert_eq!(twice.body["instructions"], "SERVER\n\nCLIENT");
    let change = twice.changes.instructions.expect("instructions change");
    assert_eq!(change.mode, "prepend");
    assert!(change.already_present);
}

#[test]
fn adapter_prepend_backfills_missing_client_text() {
    let config = adapter_config(json!({
        "instructions": { "mode": "prepend", "text": "SERVER", "applyWhen": "all" }
    }));
    let outcome = adapt(&json!({}), true, &config, None);
    assert_eq!(outcome.body["instructions"], "SERVER");
    assert!(outcome.changes.instructions.expect("change").client_missing);
}

#[test]
fn adapter_none_backfills_blank_instructions_only() {
    let config = adapter_config(json!({
        "instructions": { "mode": "none", "text": "SERVER", "applyWhen": "all" }
    }));

    let blank = adapt(&json!({ "instructions": "  " }), true, &config, None);
    assert_eq!(blank.body["instructions"], "SERVER");
    assert!(blank.changes.instructions.expect("change").fallback);

    let present = adapt(&json!({ "instructions": "CLIENT" }), true, &config, None);
    assert_eq!(present.body["instructions"], "CLIENT");
    assert!(present.changes.instructions.is_none());
    assert!(!present.applied);
}

#[test]
fn adapter_strips_default_fields_for_non_cli_only() {
    let config = AdapterConfig {
        text: Some("SERVER".to_string()),
        ..AdapterConfig::default()
    };
    let body = json!({
        "temperature": 0.5,
        "top_p": 0.9,
        "max_output_tokens": 5,
        "model": "m"
    });

    let web = adapt(&body, false, &config, None);
    assert_eq!(
        web.changes.stripped_fields,
        vec!["temperature", "top_p", "max_output_tokens"]
    );
    assert!(web.body.get("temperature").is_none());
    assert_eq!(web.body["model"], "m");

    // CLI clients keep everything and, with applyWhen=non_codex, see no
    // instruction injection either.
    let cli = adapt(&body, true, &config, None);
    assert!(!cli.applied);
    assert_eq!(cli.body, body);
}

#[test]
fn adapter_never_mutates_input() {
    let config = AdapterConfig {
        text: Some("SERVER".to_string()),
        ..AdapterConfig::default()
    };
    let body = json!({ "temperature": 1, "instructions": "CLIENT" });
    let snapshot = body.clone();
    let outcome = adapt(&body, false, &config, None);
    assert_eq!(body, snapshot);
    assert_ne!(outcome.body, body);
}

#[test]
fn adapter_passthrough_cases() {
    let config = AdapterConfig::default();
    let not_object = json!([1, 2, 3]);
    let outcome = adapt(&not_object, false, &config, None);
    assert!(!outcome.applied);
    assert_eq!(outcome.body, not_object);

    let disabled = adapter_config(json!({ "enabled": false }));
    let body = json!({ "temperature": 1 });
    let outcome = adapt(&body, false, &disabled, Some("SERVER"));
    assert!(!outcome.applied);
    assert_eq!(outcome.body, body);
}

#[test]
fn adapter_uses_default_text_when_config_text_blank() {
    let config = adapter_config(json!({
        "instructions": { "mode": "overwrite", "text": "", "applyWhen": "all" }
    }));
    let outcome = adapt(&json!({}), true, &config, Some("FALLBACK"));
    assert_eq!(outcome.body["instructions"], "FALLBACK");
}

#[test]
fn adapter_config_normalizes_unknown_enums() {
    let config = adapter_config(json!({
        "instructions": { "mode": "mystery", "applyWhen": "sometimes" }
    }));
    assert_eq!(config.mode, InstructionMode::Overwrite);
    assert_eq!(config.apply_when, ApplyWhen::NonCli);
    assert!(config.enabled);
    assert!(config.strip_enabled);
}

// ---- request translation ----

fn basic_request(model: &str) -> MessagesRequestBody {
    MessagesRequestBody {
        model: model.to_string(),
        messages: vec![MessageParam {
            role: MessageRole::User,
            content: MessageContent::Text("hi".to_string()),
        }],
        max_tokens: Some(1024),
        system: None,
        tools: None,
        tool_choice: None,
        thinking: None,
        stream: Some(true),
    }
}

fn known_block(block: ContentBlockParamKnown) -> ContentBlockParam {
    ContentBlockParam::Known(block)
}

#[test]
fn translate_strips_effort_suffix_from_model() {
    let translated = translate_request(&basic_request("gpt-5.2-codex-xhigh"));
    assert_eq!(translated.model, "gpt-5.2-codex");
    assert_eq!(translated.body.model, "gpt-5.2-codex");
    let reasoning = translated.body.reasoning.expect("reasoning");
    assert_eq!(reasoning.effort, ReasoningEffort::XHigh);
}

#[test]
fn thinking_budget_picks_effort() {
    let mut request = basic_request("gpt-5.2");
    request.thinking = Some(ThinkingConfig::Enabled {
        budget_tokens: Some(20_000),
    });
    let translated = translate_request(&request);
    assert_eq!(
        translated.body.reasoning.expect("reasoning").effort,
        ReasoningEffort::Medium
    );

    request.thinking = Some(ThinkingConfig::Enabled {
        budget_tokens: Some(20_001),
    });
    let translated = translate_request(&request);
    assert_eq!(
        translated.body.reasoning.expect("reasoning").effort,
        ReasoningEffort::High
    );

    // An explicit model suffix beats the budget-derived effort.
    request.model = "gpt-5.2-low".to_string();
    let translated = translate_request(&request);
    assert_eq!(
        translated.body.reasoning.expect("reasoning").effort,
        ReasoningEffort::Low
    );
}

#[test]
fn effort_defaults_to_medium() {
    let translated = translate_request(&basic_request("codex-mini-latest"));
    assert_eq!(
        translated.body.reasoning.expect("reasoning").effort,
        ReasoningEffort::Medium
    );
}

#[test]
fn system_array_filters_transport_parts() {
    let mut request = basic_request("gpt-5.2");
    request.system = Some(SystemParam::Parts(vec![
        SystemPart {
            kind: "text".to_string(),
            text: "You are helpful.".to_string(),
        },
        SystemPart {
            kind: "text".to_string(),
            text: "x-anthropic-billing-header: abc".to_string(),
        },
        SystemPart {
            kind: "text".to_string(),
            text: "<system-reminder>ignore</system-reminder>".to_string(),
        },
        SystemPart {
            kind: "cache_control".to_string(),
            text: "nope".to_string(),
        },
        SystemPart {
            kind: "text".to_string(),
            text: "Stay safe.".to_string(),
        },
    ]));
    let translated = translate_request(&request);
    assert_eq!(
        translated.body.instructions.as_deref(),
        Some("You are helpful.\n\nStay safe.")
    );
}

#[test]
fn empty_system_omits_instructions() {
    let mut request = basic_request("gpt-5.2");
    request.system = Some(SystemParam::Parts(Vec::new()));
    assert!(translate_request(&request).body.instructions.is_none());

    request.system = None;
    assert!(translate_request(&request).body.instructions.is_none());
}

#[test]
fn tool_use_and_result_share_a_call_id() {
    let mut request = basic_request("gpt-5.2");
    request.messages = vec![
        MessageParam {
            role: MessageRole::Assistant,
            content: MessageContent::Blocks(vec![
                known_block(ContentBlockParamKnown::Thinking {
                    thinking: "let me run it".to_string(),
                    signature: None,
                }),
                known_block(ContentBlockParamKnown::ToolUse {
                    id: "toolu_prior".to_string(),
                    name: "run".to_string(),
                    input: json!({ "x": 1 }),
                }),
            ]),
        },
        MessageParam {
            role: MessageRole::User,
            content: MessageContent::Blocks(vec![known_block(
                ContentBlockParamKnown::ToolResult {
                    tool_use_id: "toolu_prior".to_string(),
                    content: Some(ToolResultContent::Text("ok".to_string())),
                    is_error: None,
                },
            )]),
        },
    ];

    let translated = translate_request(&request);
    // Thinking blocks are dropped, so exactly two items remain.
    assert_eq!(translated.body.input.len(), 2);

    let InputItem::FunctionCall(call) = &translated.body.input[0] else {
        panic!("expected function_call first");
    };
    assert!(call.call_id.starts_with("call_"));
    assert_eq!(call.call_id.len(), "call_".len() + 24);
    assert_eq!(call.name, "run");
    assert_eq!(
        serde_json::from_str::<JsonValue>(&call.arguments).expect("json args"),
        json!({ "x": 1 })
    );

    let InputItem::FunctionCallOutput(output) = &translated.body.input[1] else {
        panic!("expected function_call_output second");
    };
    assert_eq!(output.call_id, call.call_id);
    assert_eq!(output.output, "ok");

    assert_eq!(
        translated.tool_ids.call_id_for("toolu_prior"),
        Some(call.call_id.as_str())
    );
}

#[test]
fn unmapped_tool_result_keeps_client_id() {
    let mut request = basic_request("gpt-5.2");
    request.messages = vec![MessageParam {
        role: MessageRole::User,
        content: MessageContent::Blocks(vec![known_block(ContentBlockParamKnown::ToolResult {
            tool_use_id: "orphan".to_string(),
            content: None,
            is_error: None,
        })]),
    }];
    let translated = translate_request(&request);
    let InputItem::FunctionCallOutput(output) = &translated.body.input[0] else {
        panic!("expected function_call_output");
    };
    assert_eq!(output.call_id, "orphan");
    assert_eq!(output.output, "");
}

#[test]
fn tool_result_joins_text_parts() {
    let mut request = basic_request("gpt-5.2");
    request.messages = vec![MessageParam {
        role: MessageRole::User,
        content: MessageContent::Blocks(vec![known_block(ContentBlockParamKnown::ToolResult {
            tool_use_id: "t".to_string(),
            content: Some(ToolResultContent::Parts(vec![
                msgbridge_protocol::messages::request::ToolResultPart {
                    kind: "text".to_string(),
                    text: "line one".to_string(),
                },
                msgbridge_protocol::messages::request::ToolResultPart {
                    kind: "text".to_string(),
                    text: "line two".to_string(),
                },
            ])),
            is_error: None,
        })]),
    }];
    let translated = translate_request(&request);
    let InputItem::FunctionCallOutput(output) = &translated.body.input[0] else {
        panic!("expected function_call_output");
    };
    assert_eq!(output.output, "line one\nline two");
}

#[test]
fn string_tool_arguments_pass_through() {
    let mut request = basic_request("gpt-5.2");
    request.messages = vec![MessageParam {
        role: MessageRole::Assistant,
        content: MessageContent::Blocks(vec![known_block(ContentBlockParamKnown::ToolUse {
            id: "t1".to_string(),
            name: "run".to_string(),
            input: json!("{\"already\":\"encoded\"}"),
        })]),
    }];
    let translated = translate_request(&request);
    let InputItem::FunctionCall(call) = &translated.body.input[0] else {
        panic!("expected function_call");
    };
    assert_eq!(call.arguments, "{\"already\":\"encoded\"}");
}

#[test]
fn tools_map_with_defaults() {
    let mut request = basic_request("gpt-5.2");
    request.tools = Some(vec![
        ToolDefinition {
            name: "run".to_string(),
            description: Some("Runs things".to_string()),
            input_schema: Some(json!({ "type": "object" })),
        },
        ToolDefinition {
            name: "bare".to_string(),
            description: None,
            input_schema: None,
        },
    ]);
    let translated = translate_request(&request);
    let tools = translated.body.tools.expect("tools");
    assert_eq!(tools.len(), 2);
    assert_eq!(tools[0].description, "Runs things");
    assert_eq!(tools[1].description, "");
    assert_eq!(tools[1].parameters, json!({}));

    request.tools = Some(Vec::new());
    assert!(translate_request(&request).body.tools.is_none());
}

#[test]
fn tool_choice_mappings() {
    let mut request = basic_request("gpt-5.2");

    request.tool_choice = Some(ToolChoice::Mode(ToolChoiceMode::Any));
    assert_eq!(
        translate_request(&request).body.tool_choice,
        Some(ResponsesToolChoice::Mode(ResponsesToolChoiceMode::Required))
    );

    request.tool_choice = Some(ToolChoice::Mode(ToolChoiceMode::Auto));
    assert_eq!(
        translate_request(&request).body.tool_choice,
        Some(ResponsesToolChoice::Mode(ResponsesToolChoiceMode::Auto))
    );

    request.tool_choice = Some(ToolChoice::Typed(TypedToolChoice {
        kind: "tool".to_string(),
        name: Some("X".to_string()),
    }));
    let choice = translate_request(&request).body.tool_choice;
    let Some(ResponsesToolChoice::Function(function)) = choice else {
        panic!("expected function choice");
    };
    assert_eq!(function.name, "X");

    request.tool_choice = Some(ToolChoice::Typed(TypedToolChoice {
        kind: "mystery".to_string(),
        name: None,
    }));
    assert!(translate_request(&request).body.tool_choice.is_none());
}

#[test]
fn translation_is_deterministic_modulo_minted_ids() {
    let mut request = basic_request("gpt-5.2");
    request.messages.push(MessageParam {
        role: MessageRole::Assistant,
        content: MessageContent::Blocks(vec![known_block(ContentBlockParamKnown::ToolUse {
            id: "t".to_string(),
            name: "run".to_string(),
            input: json!({}),
        })]),
    });
    let a = translate_request(&request);
    let b = translate_request(&request);

    let mut a_value = serde_json::to_value(&a.body).expect("a json");
    let mut b_value = serde_json::to_value(&b.body).expect("b json");
    a_value["input"][1]["call_id"] = json!("");
    b_value["input"][1]["call_id"] = json!("");
    assert_eq!(a_value, b_value);
}

// ---- streaming conversion ----

fn upstream_event(data: JsonValue) -> ResponseStreamEventKnown {
    match serde_json::from_value::<ResponseStreamEvent>(data).expect("parse event") {
        ResponseStreamEvent::Known(event) => event,
        ResponseStreamEvent::Unknown(value) => panic!("unknown event: {value}"),
    }
}

fn completed_payload(output: JsonValue, status: &str, usage: JsonValue) -> JsonValue {
    json!({
        "type": "response.completed",
        "response": {
            "id": "resp_1",
            "status": status,
            "model": "gpt-5.2",
            "output": output,
            "usage": usage
        }
    })
}

#[test]
fn streaming_function_call_scenario() {
    let mut converter = StreamConverter::new(ToolIdMap::new(), DEFAULT_MODEL_ALIAS);
    let mut events = Vec::new();

    events.extend(converter.transform_event(upstream_event(json!({
        "type": "response.created",
        "response": { "id": "resp_1", "model": "gpt-5.2", "output": [] }
    }))));
    events.extend(converter.transform_event(upstream_event(json!({
        "type": "response.output_item.added",
        "output_index": 0,
        "item": { "type": "function_call", "call_id": "call_A", "name": "run", "arguments": "" }
    }))));
    events.extend(converter.transform_event(upstream_event(json!({
        "type": "response.function_call_arguments.delta",
        "item_id": "fc_1", "output_index": 0, "delta": "{\"x\":"
    }))));
    events.extend(converter.transform_event(upstream_event(json!({
        "type": "response.function_call_arguments.delta",
        "item_id": "fc_1", "output_index": 0, "delta": "1}"
    }))));
    events.extend(converter.transform_event(upstream_event(json!({
        "type": "response.output_item.done",
        "output_index": 0,
        "item": { "type": "function_call", "call_id": "call_A", "name": "run", "arguments": "{\"x\":1}" }
    }))));
    events.extend(converter.transform_event(upstream_event(completed_payload(
        json!([{ "type": "function_call", "call_id": "call_A", "name": "run", "arguments": "{\"x\":1}" }]),
        "completed",
        json!({ "input_tokens": 100, "output_tokens": 20, "input_tokens_details": { "cached_tokens": 40 } }),
    ))));

    assert_eq!(events.len(), 7);

    let StreamEvent::MessageStart { message } = &events[0] else {
        panic!("expected message_start");
    };
    assert_eq!(message.model, DEFAULT_MODEL_ALIAS);
    assert_eq!(message.usage.input_tokens, 0);
    assert_eq!(message.usage.output_tokens, 0);

    let StreamEvent::ContentBlockStart {
        index,
        content_block: StreamContentBlock::ToolUse { id, name, input },
    } = &events[1]
    else {
        panic!("expected tool_use block start");
    };
    assert_eq!(*index, 0);
    assert!(id.starts_with("toolu_"));
    assert_eq!(name, "run");
    assert_eq!(*input, json!({}));

    let StreamEvent::ContentBlockDelta {
        index: 0,
        delta: ContentBlockDelta::InputJsonDelta { partial_json },
    } = &events[2]
    else {
        panic!("expected first json delta");
    };
    assert_eq!(partial_json, "{\"x\":");

    let StreamEvent::ContentBlockDelta {
        index: 0,
        delta: ContentBlockDelta::InputJsonDelta { partial_json },
    } = &events[3]
    else {
        panic!("expected second json delta");
    };
    assert_eq!(partial_json, "1}");

    assert_eq!(events[4], StreamEvent::ContentBlockStop { index: 0 });

    let StreamEvent::MessageDelta { delta, usage } = &events[5] else {
        panic!("expected message_delta");
    };
    assert_eq!(delta.stop_reason, Some(StopReason::ToolUse));
    assert_eq!(usage.input_tokens, 60);
    assert_eq!(usage.output_tokens, 20);
    assert_eq!(usage.cache_read_input_tokens, 40);
    assert_eq!(usage.cache_creation_input_tokens, 0);

    assert_eq!(events[6], StreamEvent::MessageStop);
}

#[test]
fn streaming_text_and_reasoning_blocks() {
    let mut converter = StreamConverter::new(ToolIdMap::new(), DEFAULT_MODEL_ALIAS);
    let mut events = Vec::new();

    events.extend(converter.transform_event(upstream_event(json!({
        "type": "response.created",
        "response": { "id": "resp_1", "model": "gpt-5.2", "output": [] }
    }))));
    events.extend(converter.transform_event(upstream_event(json!({
        "type": "response.output_item.added",
        "output_index": 0,
        "item": { "type": "reasoning", "id": "rs_1", "summary": [] }
    }))));
    events.extend(converter.transform_event(upstream_event(json!({
        "type": "response.reasoning_summary_part.added",
        "item_id": "rs_1", "output_index": 0, "summary_index": 0,
        "part": { "type": "summary_text", "text": "" }
    }))));
    events.extend(converter.transform_event(upstream_event(json!({
        "type": "response.reasoning_summary_text.delta",
        "item_id": "rs_1", "output_index": 0, "summary_index": 0, "delta": "pondering"
    }))));
    events.extend(converter.transform_event(upstream_event(json!({
        "type": "response.reasoning_summary_part.done",
        "item_id": "rs_1", "output_index": 0, "summary_index": 0,
        "part": { "type": "summary_text", "text": "pondering" }
    }))));
    events.extend(converter.transform_event(upstream_event(json!({
        "type": "response.output_item.added",
        "output_index": 1,
        "item": { "type": "message", "id": "msg_u", "content": [] }
    }))));
    events.extend(converter.transform_event(upstream_event(json!({
        "type": "response.content_part.added",
        "item_id": "msg_u", "output_index": 1, "content_index": 0,
        "part": { "type": "output_text", "text": "" }
    }))));
    events.extend(converter.transform_event(upstream_event(json!({
        "type": "response.output_text.delta",
        "item_id": "msg_u", "output_index": 1, "content_index": 0, "delta": "hello"
    }))));
    events.extend(converter.transform_event(upstream_event(json!({
        "type": "response.content_part.done",
        "item_id": "msg_u", "output_index": 1, "content_index": 0,
        "part": { "type": "output_text", "text": "hello" }
    }))));
    events.extend(converter.transform_event(upstream_event(completed_payload(
        json!([]),
        "completed",
        json!({ "input_tokens": 10, "output_tokens": 5 }),
    ))));

    let names: Vec<&str> = events.iter().map(|event| event.name()).collect();
    assert_eq!(
        names,
        vec![
            "message_start",
            "content_block_start",
            "content_block_delta",
            "content_block_stop",
            "content_block_start",
            "content_block_delta",
            "content_block_stop",
            "message_delta",
            "message_stop",
        ]
    );

    // Thinking block at index 0, text block at index 1.
    let StreamEvent::ContentBlockStart {
        index: 0,
        content_block: StreamContentBlock::Thinking { .. },
    } = &events[1]
    else {
        panic!("expected thinking start at 0");
    };
    let StreamEvent::ContentBlockStart {
        index: 1,
        content_block: StreamContentBlock::Text { .. },
    } = &events[4]
    else {
        panic!("expected text start at 1");
    };
    let StreamEvent::MessageDelta { delta, .. } = &events[7] else {
        panic!("expected message_delta");
    };
    assert_eq!(delta.stop_reason, Some(StopReason::EndTurn));
}

#[test]
fn streaming_reverse_maps_known_call_ids() {
    let mut tool_ids = ToolIdMap::new();
    tool_ids.insert("toolu_client", "call_A");
    let mut converter = StreamConverter::new(tool_ids, DEFAULT_MODEL_ALIAS);

    let events = converter.transform_event(upstream_event(json!({
        "type": "response.output_item.added",
        "output_index": 0,
        "item": { "type": "function_call", "call_id": "call_A", "name": "run", "arguments": "" }
    })));

    // message_start then the block start.
    let StreamEvent::ContentBlockStart {
        content_block: StreamContentBlock::ToolUse { id, .. },
        ..
    } = &events[1]
    else {
        panic!("expected tool_use start");
    };
    assert_eq!(id, "toolu_client");
}

#[test]
fn streaming_mints_one_id_per_unknown_call() {
    let mut converter = StreamConverter::new(ToolIdMap::new(), DEFAULT_MODEL_ALIAS);
    let first = converter.transform_event(upstream_event(json!({
        "type": "response.output_item.added",
        "output_index": 0,
        "item": { "type": "function_call", "call_id": "call_Z", "name": "a", "arguments": "" }
    })));
    let StreamEvent::ContentBlockStart {
        content_block: StreamContentBlock::ToolUse { id: first_id, .. },
        ..
    } = &first[1]
    else {
        panic!("expected tool_use start");
    };
    assert!(first_id.starts_with("toolu_"));
    assert_eq!(first_id.len(), "toolu_".len() + 24);
}

#[test]
fn streaming_max_tokens_stop_reason() {
    let mut converter = StreamConverter::new(ToolIdMap::new(), DEFAULT_MODEL_ALIAS);
    let events = converter.transform_event(upstream_event(json!({
        "type": "response.completed",
        "response": {
            "id": "resp_1",
            "status": "incomplete",
            "incomplete_details": { "reason": "max_output_tokens" },
            "model": "gpt-5.2",
            "output": [],
            "usage": { "input_tokens": 1, "output_tokens": 2 }
        }
    })));
    let StreamEvent::MessageDelta { delta, .. } = &events[1] else {
        panic!("expected message_delta");
    };
    assert_eq!(delta.stop_reason, Some(StopReason::MaxTokens));
}

#[test]
fn streaming_ignores_unknown_events() {
    let mut converter = StreamConverter::new(ToolIdMap::new(), DEFAULT_MODEL_ALIAS);
    let parsed = serde_json::from_str::<ResponseStreamEvent>(
        r#"{"type":"response.web_search_call.completed","output_index":0,"item_id":"ws_1","sequence_number":3}"#,
    )
    .expect("parse");
    match parsed {
        ResponseStreamEvent::Unknown(_) => {}
        ResponseStreamEvent::Known(event) => {
            assert!(converter.transform_event(event).is_empty());
        }
    }
}

// ---- collection + non-stream translation ----

fn scenario_sse() -> String {
    [
        r#"event: response.created
data: {"type":"response.created","response":{"id":"resp_1","model":"gpt-5.2","output":[]}}"#,
        "",
        r#"event: response.output_item.added
data: {"type":"response.output_item.added","output_index":0,"item":{"type":"function_call","call_id":"call_A","name":"run","arguments":""}}"#,
        "",
        r#"event: response.completed
data: {"type":"response.completed","response":{"id":"resp_1","status":"completed","model":"gpt-5.2","output":[{"type":"function_call","call_id":"call_A","name":"run","arguments":"{\"x\":1}"}],"usage":{"input_tokens":100,"output_tokens":20,"input_tokens_details":{"cached_tokens":40}}}}"#,
        "",
    ]
    .join("\n")
}

#[test]
fn collector_captures_completed_payload() {
    let mut collector = CompletedCollector::new();
    let sse = scenario_sse();
    // Feed in awkward chunk sizes to exercise incremental parsing.
    for chunk in sse.as_bytes().chunks(7) {
        collector.push_chunk(chunk);
    }
    let response = collector.finish().expect("completed response");
    assert_eq!(response.id, "resp_1");
    assert_eq!(response.output.len(), 1);
}

#[test]
fn collector_flushes_unterminated_stream() {
    let mut collector = CompletedCollector::new();
    // No trailing blank line after the final event.
    let sse = scenario_sse();
    let trimmed = sse.trim_end_matches('\n');
    collector.push_chunk(trimmed.as_bytes());
    assert!(collector.finish().is_some());
}

#[test]
fn collector_returns_none_without_completed() {
    let mut collector = CompletedCollector::new();
    collector.push_chunk(
        b"event: response.created\ndata: {\"type\":\"response.created\",\"response\":{\"id\":\"r\",\"model\":\"m\",\"output\":[]}}\n\n",
    );
    assert!(collector.finish().is_none());
}

#[test]
fn non_stream_scenario_matches_streaming_usage() {
    let mut collector = CompletedCollector::new();
    collector.push_chunk(scenario_sse().as_bytes());
    let response = collector.finish().expect("completed");

    let message = translate_response(&response, &ToolIdMap::new(), DEFAULT_MODEL_ALIAS);
    assert!(message.id.starts_with("msg_"));
    assert_eq!(message.id.len(), "msg_".len() + 32);
    assert_eq!(message.model, DEFAULT_MODEL_ALIAS);
    assert_eq!(message.stop_reason, Some(StopReason::ToolUse));
    assert_eq!(message.usage.input_tokens, 60);
    assert_eq!(message.usage.output_tokens, 20);
    assert_eq!(message.usage.cache_read_input_tokens, 40);
    assert_eq!(message.usage.cache_creation_input_tokens, 0);

    assert_eq!(message.content.len(), 1);
    let ContentBlock::ToolUse { id, name, input } = &message.content[0] else {
        panic!("expected tool_use block");
    };
    assert!(id.starts_with("toolu_"));
    assert_eq!(name, "run");
    assert_eq!(*input, json!({ "x": 1 }));
}

#[test]
fn response_translation_reverse_maps_and_orders_blocks() {
    let mut tool_ids = ToolIdMap::new();
    tool_ids.insert("toolu_client", "call_A");

    let response: Response = serde_json::from_value(json!({
        "id": "resp_1",
        "status": "completed",
        "model": "gpt-5.2",
        "output": [
            { "type": "reasoning", "id": "rs_1", "summary": [
                { "type": "summary_text", "text": "first " },
                { "type": "summary_text", "text": "second" }
            ]},
            { "type": "message", "id": "msg_u", "content": [
                { "type": "output_text", "text": "hello" },
                { "type": "output_text", "text": "again" }
            ]},
            { "type": "function_call", "call_id": "call_A", "name": "run", "arguments": "not json" }
        ]
    }))
    .expect("response");

    let message = translate_response(&response, &tool_ids, DEFAULT_MODEL_ALIAS);
    assert_eq!(message.content.len(), 4);
    assert_eq!(
        message.content[0],
        ContentBlock::Thinking {
            thinking: "first second".to_string()
        }
    );
    assert_eq!(
        message.content[1],
        ContentBlock::Text {
            text: "hello".to_string()
        }
    );
    let ContentBlock::ToolUse { id, input, .. } = &message.content[3] else {
        panic!("expected tool_use");
    };
    assert_eq!(id, "toolu_client");
    assert_eq!(*input, json!({ "raw": "not json" }));
}

#[test]
fn usage_accounting_never_goes_negative() {
    let usage = ResponseUsage {
        input_tokens: 5,
        input_tokens_details: ResponseUsageInputDetails { cached_tokens: 9 },
        output_tokens: 1,
        total_tokens: None,
    };
    let mapped = usage_from_response(Some(&usage));
    assert_eq!(mapped.input_tokens, 0);
    assert_eq!(mapped.cache_read_input_tokens, 9);
}

#[test]
fn missing_usage_maps_to_zeros() {
    assert_eq!(
        usage_from_response(None),
        msgbridge_protocol::messages::response::Usage::default()
    );
}

#[test]
fn stop_reason_prefers_tool_use_over_max_tokens() {
    let response: Response = serde_json::from_value(json!({
        "id": "r",
        "status": "incomplete",
        "incomplete_details": { "reason": "max_output_tokens" },
        "model": "m",
        "output": [
            { "type": "function_call", "call_id": "call_A", "name": "run", "arguments": "{}" }
        ]
    }))
    .expect("response");
    let message = translate_response(&response, &ToolIdMap::new(), DEFAULT_MODEL_ALIAS);
    assert_eq!(message.stop_reason, Some(StopReason::ToolUse));
}

// ---- wire-shape checks ----

#[test]
fn input_items_serialize_to_expected_shapes() {
    let mut request = basic_request("gpt-5.2");
    request.messages = vec![
        MessageParam {
            role: MessageRole::User,
            content: MessageContent::Text("hi".to_string()),
        },
        MessageParam {
            role: MessageRole::Assistant,
            content: MessageContent::Text("hello".to_string()),
        },
    ];
    let translated = translate_request(&request);
    let value = serde_json::to_value(&translated.body).expect("json");

    assert_eq!(value["input"][0], json!({ "role": "user", "content": "hi" }));
    assert_eq!(
        value["input"][1],
        json!({
            "type": "message",
            "role": "assistant",
            "content": [{ "type": "output_text", "text": "hello" }]
        })
    );
    assert_eq!(value["reasoning"], json!({ "effort": "medium", "summary": "auto" }));
    assert_eq!(value["max_output_tokens"], 1024);
    assert!(value.get("instructions").is_none());
}

#[test]
fn unknown_content_blocks_are_skipped_not_fatal() {
    let body: MessagesRequestBody = serde_json::from_value(json!({
        "model": "gpt-5.2",
        "messages": [{
            "role": "user",
            "content": [
                { "type": "image", "source": { "type": "base64", "data": "xxx" } },
                { "type": "text", "text": "describe" }
            ]
        }]
    }))
    .expect("parse request");
    let translated = translate_request(&body);
    assert_eq!(translated.body.input.len(), 1);
    let InputItem::User(user) = &translated.body.input[0] else {
        panic!("expected user item");
    };
    assert_eq!(user.content, "describe");
}
