//! Wire types for the upstream chat service.

pub mod decoder;
pub mod encoder;

use serde::{Deserialize, Serialize};

use crate::protocol::openai_chat::OpenAiUsage;

/// Request body posted to the upstream chat endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamRequest {
    pub stream: bool,
    pub model: String,
    pub messages: Vec<UpstreamMessage>,
    pub params: serde_json::Map<String, serde_json::Value>,
    pub features: UpstreamFeatures,
    pub background_tasks: UpstreamBackgroundTasks,
    pub chat_id: String,
    pub id: String,
    pub mcp_servers: Vec<String>,
    pub model_item: UpstreamModelItem,
    pub tool_servers: Vec<String>,
    pub variables: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamFeatures {
    pub enable_thinking: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamBackgroundTasks {
    pub title_generation: bool,
    pub tags_generation: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamModelItem {
    pub id: String,
    pub name: String,
    pub owned_by: String,
}

/// One pushed event: `data: {"type":..,"data":{..},"error":..}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamEvent {
    #[serde(default, rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub data: UpstreamEventData,
    #[serde(default)]
    pub error: Option<UpstreamError>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamEventData {
    #[serde(default)]
    pub delta_content: String,
    #[serde(default)]
    pub edit_content: String,
    #[serde(default)]
    pub phase: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub usage: Option<UpstreamUsage>,
    #[serde(default)]
    pub error: Option<UpstreamError>,
    #[serde(default)]
    pub data: Option<UpstreamInnerData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamInnerData {
    #[serde(default)]
    pub error: Option<UpstreamError>,
}

/// In-band error object. `code` is kept loose: the service sends both numbers and strings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UpstreamError {
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub code: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct UpstreamUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl From<UpstreamUsage> for OpenAiUsage {
    fn from(usage: UpstreamUsage) -> Self {
        OpenAiUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}
