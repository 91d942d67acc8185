use super::{OpenAiChatResponse, OpenAiChoice, OpenAiResponseMessage, OpenAiUsage};

/// Wrap accumulated content into a single `chat.completion` response.
#[must_use]
pub fn encode_chat_response(
    id: &str,
    model: &str,
    created: u64,
    content: String,
    usage: OpenAiUsage,
) -> OpenAiChatResponse {
    OpenAiChatResponse {
        id: id.to_string(),
        object: "chat.completion".to_string(),
        created,
        model: model.to_string(),
        choices: vec![OpenAiChoice {
            index: 0,
            message: OpenAiResponseMessage {
                role: "assistant".to_string(),
                content,
            },
            finish_reason: "stop".to_string(),
        }],
        usage,
    }
}

/// Serialize the aggregate response. `serde_json` does not HTML-escape, so markup stays verbatim.
///
/// # Errors
///
/// Returns the serializer error, which only happens on allocation-level failures.
pub fn encode_chat_response_body(response: &OpenAiChatResponse) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(response)
}
