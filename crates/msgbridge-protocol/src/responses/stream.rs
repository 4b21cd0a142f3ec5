use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::responses::response::{OutputContent, OutputItem, Response, SummaryPart};

/// Upstream stream events the bridge acts on. The upstream emits dozens of
/// event kinds; anything not listed here deserializes into
/// [`ResponseStreamEvent::Unknown`] and is ignored by the converter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResponseStreamEventKnown {
    #[serde(rename = "response.created")]
    Created(ResponseLifecycleEvent),
    #[serde(rename = "response.in_progress")]
    InProgress(ResponseLifecycleEvent),
    #[serde(rename = "response.completed")]
    Completed(ResponseLifecycleEvent),
    #[serde(rename = "response.failed")]
    Failed(ResponseLifecycleEvent),
    #[serde(rename = "response.incomplete")]
    Incomplete(ResponseLifecycleEvent),
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded(OutputItemEvent),
    #[serde(rename = "response.output_item.done")]
    OutputItemDone(OutputItemEvent),
    #[serde(rename = "response.content_part.added")]
    ContentPartAdded(ContentPartEvent),
    #[serde(rename = "response.content_part.done")]
    ContentPartDone(ContentPartEvent),
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta(TextDeltaEvent),
    #[serde(rename = "response.output_text.done")]
    OutputTextDone(TextDoneEvent),
    #[serde(rename = "response.reasoning_summary_part.added")]
    ReasoningSummaryPartAdded(SummaryPartEvent),
    #[serde(rename = "response.reasoning_summary_part.done")]
    ReasoningSummaryPartDone(SummaryPartEvent),
    #[serde(rename = "response.reasoning_summary_text.delta")]
    ReasoningSummaryTextDelta(SummaryTextDeltaEvent),
    #[serde(rename = "response.reasoning_summary_text.done")]
    ReasoningSummaryTextDone(SummaryTextDoneEvent),
    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta(FunctionCallArgumentsDeltaEvent),
    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone(FunctionCallArgumentsDoneEvent),
    #[serde(rename = "error")]
    Error(ResponseErrorEvent),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
#[allow(clippy::large_enum_variant)]
pub enum ResponseStreamEvent {
    Known(ResponseStreamEventKnown),
    Unknown(JsonValue),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseLifecycleEvent {
    pub response: Response,
    #[serde(default)]
    pub sequence_number: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputItemEvent {
    #[serde(default)]
    pub output_index: i64,
    pub item: OutputItem,
    #[serde(default)]
    pub sequence_number: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPartEvent {
    #[serde(default)]
    pub item_id: String,
    #[serde(default)]
    pub output_index: i64,
    #[serde(default)]
    pub content_index: i64,
    pub part: OutputContent,
    #[serde(default)]
    pub sequence_number: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextDeltaEvent {
    #[serde(default)]
    pub item_id: String,
    #[serde(default)]
    pub output_index: i64,
    #[serde(default)]
    pub content_index: i64,
    pub delta: String,
    #[serde(default)]
    pub sequence_number: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextDoneEvent {
    #[serde(default)]
    pub item_id: String,
    #[serde(default)]
    pub output_index: i64,
    #[serde(default)]
    pub content_index: i64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub sequence_number: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryPartEvent {
    #[serde(default)]
    pub item_id: String,
    #[serde(default)]
    pub output_index: i64,
    #[serde(default)]
    pub summary_index: i64,
    pub part: SummaryPart,
    #[serde(default)]
    pub sequence_number: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryTextDeltaEvent {
    #[serde(default)]
    pub item_id: String,
    #[serde(default)]
    pub output_index: i64,
    #[serde(default)]
    pub summary_index: i64,
    pub delta: String,
    #[serde(default)]
    pub sequence_number: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryTextDoneEvent {
    #[serde(default)]
    pub item_id: String,
    #[serde(default)]
    pub output_index: i64,
    #[serde(default)]
    pub summary_index: i64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub sequence_number: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallArgumentsDeltaEvent {
    #[serde(default)]
    pub item_id: String,
    #[serde(default)]
    pub output_index: i64,
    pub delta: String,
    #[serde(default)]
    pub sequence_number: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallArgumentsDoneEvent {
    #[serde(default)]
    pub item_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub output_index: i64,
    #[serde(default)]
    pub arguments: String,
    #[serde(default)]
    pub sequence_number: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseErrorEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
    #[serde(default)]
    pub sequence_number: i64,
}
