use crate::config::UpstreamConfig;
use crate::protocol::openai_chat::OpenAiChatRequest;

use super::{
    UpstreamBackgroundTasks, UpstreamFeatures, UpstreamMessage, UpstreamModelItem,
    UpstreamRequest,
};

/// Conversation and message identifiers synthesized per inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatIds {
    pub chat_id: String,
    pub message_id: String,
}

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Translate an inbound chat request into the upstream request body.
///
/// The client's `model` is ignored: the upstream always receives `upstream.model_id`.
#[must_use]
pub fn encode_upstream_request(
    request: &OpenAiChatRequest,
    ids: &ChatIds,
    upstream: &UpstreamConfig,
    model_name: &str,
) -> UpstreamRequest {
    let now = chrono::Local::now().format(DATETIME_FORMAT).to_string();
    encode_upstream_request_at(request, ids, upstream, model_name, now)
}

fn encode_upstream_request_at(
    request: &OpenAiChatRequest,
    ids: &ChatIds,
    upstream: &UpstreamConfig,
    model_name: &str,
    now: String,
) -> UpstreamRequest {
    let messages = request
        .messages
        .iter()
        .map(|message| UpstreamMessage {
            role: message.role.clone(),
            content: message.text(),
        })
        .collect();

    let mut variables = serde_json::Map::with_capacity(3);
    variables.insert("{{USER_NAME}}".to_string(), "User".into());
    variables.insert("{{USER_LOCATION}}".to_string(), "Unknown".into());
    variables.insert("{{CURRENT_DATETIME}}".to_string(), now.into());

    UpstreamRequest {
        stream: true,
        model: upstream.model_id.clone(),
        messages,
        params: serde_json::Map::new(),
        features: UpstreamFeatures {
            enable_thinking: true,
        },
        background_tasks: UpstreamBackgroundTasks {
            title_generation: false,
            tags_generation: false,
        },
        chat_id: ids.chat_id.clone(),
        id: ids.message_id.clone(),
        mcp_servers: Vec::new(),
        model_item: UpstreamModelItem {
            id: upstream.model_id.clone(),
            name: model_name.to_string(),
            owned_by: "openai".to_string(),
        },
        tool_servers: Vec::new(),
        variables,
    }
}
