use crate::util::{push_json_string_escaped, push_u64_decimal};

/// Stream terminator frame.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Builds `chat.completion.chunk` SSE frames for one completion id.
///
/// Frames are assembled by hand so the hot path never goes through a `serde_json::Value`.
/// Content is escaped without HTML escaping, so `<think>` reaches the client verbatim.
#[derive(Debug, Clone)]
pub struct ChunkEncoder {
    id: String,
    model: String,
    created: u64,
}

impl ChunkEncoder {
    #[must_use]
    pub fn new(id: impl Into<String>, model: impl Into<String>, created: u64) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            created,
        }
    }

    /// First frame of every stream: announces the assistant role with empty content.
    #[must_use]
    pub fn role_frame(&self) -> String {
        let mut out = self.prefix(96);
        out.push_str(",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"\"},\"finish_reason\":null}]}\n\n");
        out
    }

    #[must_use]
    pub fn content_frame(&self, content: &str) -> String {
        let mut out = self.prefix(content.len() + 80);
        out.push_str(",\"choices\":[{\"index\":0,\"delta\":{\"content\":");
        push_json_string_escaped(&mut out, content);
        out.push_str("},\"finish_reason\":null}]}\n\n");
        out
    }

    #[must_use]
    pub fn finish_frame(&self, finish_reason: &str) -> String {
        let mut out = self.prefix(72);
        out.push_str(",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":");
        push_json_string_escaped(&mut out, finish_reason);
        out.push_str("}]}\n\n");
        out
    }

    fn prefix(&self, extra: usize) -> String {
        let mut out = String::with_capacity(self.id.len() + self.model.len() + 80 + extra);
        out.push_str("data: {\"id\":");
        push_json_string_escaped(&mut out, &self.id);
        out.push_str(",\"object\":\"chat.completion.chunk\",\"created\":");
        push_u64_decimal(&mut out, self.created);
        out.push_str(",\"model\":");
        push_json_string_escaped(&mut out, &self.model);
        out
    }
}

/// Parse one `data: {...}` frame back into a chunk. `None` for the terminator and non-data lines.
#[must_use]
pub fn parse_chunk_frame(frame: &str) -> Option<super::OpenAiStreamChunk> {
    let payload = crate::util::extract_data_payload(frame.trim_end_matches('\n'))?;
    if payload == "[DONE]" {
        return None;
    }
    serde_json::from_str(payload).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoder() -> ChunkEncoder {
        ChunkEncoder::new("chatcmpl-1", "GLM-4.5", 1_700_000_000)
    }

    #[test]
    fn test_role_frame() {
        let frame = encoder().role_frame();
        assert!(frame.starts_with("data: {"));
        assert!(frame.ends_with("}\n\n"));
        let chunk = parse_chunk_frame(&frame).unwrap();
        assert_eq!(chunk.id, "chatcmpl-1");
        assert_eq!(chunk.object, "chat.completion.chunk");
        assert_eq!(chunk.created, 1_700_000_000);
        assert_eq!(chunk.choices[0].delta.role.as_deref(), Some("assistant"));
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some(""));
        assert!(chunk.choices[0].finish_reason.is_none());
    }

    #[test]
    fn test_content_frame_keeps_markup_unescaped() {
        let frame = encoder().content_frame("<think>\n\n\"hi\"");
        assert!(frame.contains("<think>"));
        assert!(!frame.contains("\\u003c"));
        let chunk = parse_chunk_frame(&frame).unwrap();
        assert_eq!(
            chunk.choices[0].delta.content.as_deref(),
            Some("<think>\n\n\"hi\"")
        );
        assert!(chunk.choices[0].delta.role.is_none());
    }

    #[test]
    fn test_finish_frame() {
        let chunk = parse_chunk_frame(&encoder().finish_frame("stop")).unwrap();
        assert_eq!(chunk.choices[0].finish_reason.as_deref(), Some("stop"));
        assert!(chunk.choices[0].delta.content.is_none());
    }

    #[test]
    fn test_done_frame_is_not_a_chunk() {
        assert!(parse_chunk_frame(DONE_FRAME).is_none());
    }
}
