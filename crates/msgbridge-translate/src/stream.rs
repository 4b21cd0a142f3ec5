use msgbridge_protocol::messages::response::{AssistantRole, MessageType, Usage};
use msgbridge_protocol::messages::stream::{
    ContentBlockDelta, MessageDeltaBody, StreamContentBlock, StreamEvent, StreamMessage,
};
use msgbridge_protocol::responses::response::{
    OutputContent, OutputContentKnown, OutputItem, OutputItemKnown,
};
use msgbridge_protocol::responses::stream::{
    OutputItemEvent, ResponseLifecycleEvent, ResponseStreamEventKnown,
};
use serde_json::json;

use crate::ids::{mint_message_id, mint_tool_use_id, ToolIdMap};
use crate::response::{derive_stop_reason, usage_from_response};

/// Stateful upstream-to-client stream converter. One instance per request;
/// feed upstream events in arrival order and forward the returned events to
/// the client in the same order.
///
/// Block indexes are strictly monotonic: a block opens at the current index
/// and the index advances when that block stops.
#[derive(Debug)]
pub struct StreamConverter {
    message_id: String,
    model_alias: String,
    tool_ids: ToolIdMap,
    minted_tool_ids: Vec<(String, String)>,
    block_index: u32,
    current_call: Option<String>,
    text_part_open: bool,
    summary_part_open: bool,
    message_start_sent: bool,
}

impl StreamConverter {
    pub fn new(tool_ids: ToolIdMap, model_alias: impl Into<String>) -> Self {
        Self {
            message_id: mint_message_id(),
            model_alias: model_alias.into(),
            tool_ids,
            minted_tool_ids: Vec::new(),
            block_index: 0,
            current_call: None,
            text_part_open: false,
            summary_part_open: false,
            message_start_sent: false,
        }
    }

    pub fn transform_event(&mut self, event: ResponseStreamEventKnown) -> Vec<StreamEvent> {
        match event {
            ResponseStreamEventKnown::Created(_) | ResponseStreamEventKnown::InProgress(_) => {
                let mut events = Vec::new();
                self.ensure_message_start(&mut events);
                events
            }
            ResponseStreamEventKnown::OutputItemAdded(event) => self.handle_item_added(event),
            ResponseStreamEventKnown::OutputItemDone(event) => self.handle_item_done(event),
            ResponseStreamEventKnown::ContentPartAdded(event) => {
                let mut events = Vec::new();
                self.ensure_message_start(&mut events);
                if matches!(
                    event.part,
                    OutputContent::Known(OutputContentKnown::OutputText { .. })
                ) && !self.text_part_open
                {
                    self.text_part_open = true;
                    events.push(StreamEvent::ContentBlockStart {
                        index: self.block_index,
                        content_block: StreamContentBlock::Text {
                            text: String::new(),
                        },
                    });
                }
                events
            }
            ResponseStreamEventKnown::ContentPartDone(_) => {
                if self.text_part_open {
                    self.text_part_open = false;
                    vec![self.close_block()]
                } else {
                    Vec::new()
                }
            }
            ResponseStreamEventKnown::OutputTextDelta(event) => {
                if self.text_part_open {
                    vec![StreamEvent::ContentBlockDelta {
                        index: self.block_index,
                        delta: ContentBlockDelta::TextDelta { text: event.delta },
                    }]
                } else {
                    Vec::new()
                }
            }
            ResponseStreamEventKnown::ReasoningSummaryPartAdded(_) => {
                let mut events = Vec::new();
                self.ensure_message_start(&mut events);
                if !self.summary_part_open {
                    self.summary_part_open = true;
                    events.push(StreamEvent::ContentBlockStart {
                        index: self.block_index,
                        content_block: StreamContentBlock::Thinking {
                            thinking: String::new(),
                        },
                    });
                }
                events
            }
            ResponseStreamEventKnown::ReasoningSummaryTextDelta(event) => {
                if self.summary_part_open {
                    vec![StreamEvent::ContentBlockDelta {
                        index: self.block_index,
                        delta: ContentBlockDelta::ThinkingDelta {
                            thinking: event.delta,
                        },
                    }]
                } else {
                    Vec::new()
                }
            }
            ResponseStreamEventKnown::ReasoningSummaryPartDone(_) => {
                if self.summary_part_open {
                    self.summary_part_open = false;
                    vec![self.close_block()]
                } else {
                    Vec::new()
                }
            }
            ResponseStreamEventKnown::FunctionCallArgumentsDelta(event) => {
                if self.current_call.is_some() {
                    vec![StreamEvent::ContentBlockDelta {
                        index: self.block_index,
                        delta: ContentBlockDelta::InputJsonDelta {
                            partial_json: event.delta,
                        },
                    }]
                } else {
                    Vec::new()
                }
            }
            ResponseStreamEventKnown::Completed(event)
            | ResponseStreamEventKnown::Failed(event)
            | ResponseStreamEventKnown::Incomplete(event) => self.handle_completed(event),
            // Argument/text "done" recaps and anything else carry nothing
            // the client has not already seen.
            _ => Vec::new(),
        }
    }

    fn handle_item_added(&mut self, event: OutputItemEvent) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        self.ensure_message_start(&mut events);

        if let OutputItem::Known(OutputItemKnown::FunctionCall { call_id, name, .. }) = &event.item
        {
            let id = self.downstream_tool_id(call_id);
            self.current_call = Some(call_id.clone());
            events.push(StreamEvent::ContentBlockStart {
                index: self.block_index,
                content_block: StreamContentBlock::ToolUse {
                    id,
                    name: name.clone(),
                    input: json!({}),
                },
            });
        }

        events
    }

    fn handle_item_done(&mut self, event: OutputItemEvent) -> Vec<StreamEvent> {
        let is_function_call = matches!(
            event.item,
            OutputItem::Known(OutputItemKnown::FunctionCall { .. })
        );
        if is_function_call && self.current_call.take().is_some() {
            vec![self.close_block()]
        } else {
            Vec::new()
        }
    }

    fn handle_completed(&mut self, event: ResponseLifecycleEvent) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        self.ensure_message_start(&mut events);

        events.push(StreamEvent::MessageDelta {
            delta: MessageDeltaBody {
                stop_reason: Some(derive_stop_reason(&event.response)),
                stop_sequence: None,
            },
            usage: usage_from_response(event.response.usage.as_ref()),
        });
        events.push(StreamEvent::MessageStop);
        events
    }

    /// Reverse-map an upstream call_id to the client-side id: the request
    /// map first, then IDs already minted for this stream, then a fresh one.
    fn downstream_tool_id(&mut self, call_id: &str) -> String {
        if let Some(client_id) = self.tool_ids.client_id_for(call_id) {
            return client_id.to_string();
        }
        if let Some((_, minted)) = self
            .minted_tool_ids
            .iter()
            .find(|(call, _)| call == call_id)
        {
            return minted.clone();
        }
        let minted = mint_tool_use_id();
        self.minted_tool_ids
            .push((call_id.to_string(), minted.clone()));
        minted
    }

    fn close_block(&mut self) -> StreamEvent {
        let index = self.block_index;
        self.block_index += 1;
        StreamEvent::ContentBlockStop { index }
    }

    fn ensure_message_start(&mut self, events: &mut Vec<StreamEvent>) {
        if self.message_start_sent {
            return;
        }
        self.message_start_sent = true;
        events.push(StreamEvent::MessageStart {
            message: StreamMessage {
                id: self.message_id.clone(),
                r#type: MessageType::Message,
                role: AssistantRole::Assistant,
                model: self.model_alias.clone(),
                content: Vec::new(),
                stop_reason: None,
                stop_sequence: None,
                usage: Usage::default(),
            },
        });
    }
}
