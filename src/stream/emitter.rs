//! Folds decoded upstream events into client-facing output.
//!
//! [`EventPipeline`] owns the per-request transformer and decides, for every upstream line,
//! whether there is content to forward and whether the response is over. [`StreamEmitter`]
//! frames that into `chat.completion.chunk` events; [`ResponseCollector`] accumulates it into
//! one `chat.completion`.

use std::fmt::Display;

use crate::config::RenderingMode;
use crate::observability::{RequestStats, Termination};
use crate::protocol::openai_chat::response_encoder::encode_chat_response;
use crate::protocol::openai_chat::stream::{ChunkEncoder, DONE_FRAME};
use crate::protocol::openai_chat::{OpenAiChatResponse, OpenAiUsage};
use crate::protocol::upstream::decoder::{decode_line, DecodedLine};
use crate::protocol::upstream::UpstreamUsage;
use crate::stream::transformer::ContentTransformer;
use crate::util::preview;

const FINISH_REASON: &str = "stop";

/// Identity of the completion being produced.
#[derive(Debug, Clone)]
pub struct CompletionMeta {
    pub id: String,
    pub model: String,
    pub created: u64,
    /// Upstream conversation id, used to correlate logs.
    pub chat_id: String,
}

/// What one upstream line amounts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Skip,
    Content(String),
    Finished {
        content: Option<String>,
        termination: Termination,
    },
}

/// Decode, transform and account for upstream lines of one request.
///
/// Dropping a pipeline that never concluded logs the request as abandoned by the client.
#[derive(Debug)]
pub struct EventPipeline {
    transformer: ContentTransformer,
    stats: RequestStats,
    usage: Option<UpstreamUsage>,
    chat_id: String,
    stream: bool,
    termination: Option<Termination>,
}

impl EventPipeline {
    #[must_use]
    pub fn new(mode: RenderingMode, chat_id: impl Into<String>, stream: bool) -> Self {
        Self {
            transformer: ContentTransformer::new(mode),
            stats: RequestStats::start(),
            usage: None,
            chat_id: chat_id.into(),
            stream,
            termination: None,
        }
    }

    pub fn on_line(&mut self, line: &str) -> Step {
        if self.termination.is_some() {
            return Step::Skip;
        }
        self.stats.lines += 1;

        let event = match decode_line(line) {
            DecodedLine::Ignored => return Step::Skip,
            DecodedLine::Malformed(err) => {
                tracing::debug!(
                    chat_id = %self.chat_id,
                    error = %err,
                    line = preview(line, 200),
                    "skipping undecodable upstream line"
                );
                return Step::Skip;
            }
            DecodedLine::Event(event) => event,
        };

        if let Some(usage) = event.usage {
            self.usage = Some(usage);
        }

        if let Some(error) = &event.error {
            tracing::warn!(
                chat_id = %self.chat_id,
                detail = %error.detail,
                code = %error.code,
                "upstream reported an in-band error"
            );
            return Step::Finished {
                content: None,
                termination: Termination::UpstreamError,
            };
        }

        let rendered = self.transformer.transform(&event.fragment, event.phase);
        let content = if rendered.is_empty() {
            None
        } else {
            self.stats.record_fragment(&rendered);
            Some(rendered)
        };

        if event.is_final {
            return Step::Finished {
                content,
                termination: Termination::Completed,
            };
        }
        content.map_or(Step::Skip, Step::Content)
    }

    /// Record how the response ended and log it. Later calls are ignored.
    pub fn conclude(&mut self, termination: Termination) {
        if self.termination.is_some() {
            return;
        }
        self.termination = Some(termination);
        self.stats.log_complete(&self.chat_id, self.stream, termination);
    }

    #[must_use]
    pub fn termination(&self) -> Option<Termination> {
        self.termination
    }

    #[must_use]
    pub fn usage(&self) -> OpenAiUsage {
        self.usage.map(OpenAiUsage::from).unwrap_or_default()
    }

    fn on_read_error(&mut self, err: &dyn Display) {
        tracing::warn!(
            chat_id = %self.chat_id,
            error = %err,
            "upstream body read failed"
        );
    }
}

impl Drop for EventPipeline {
    fn drop(&mut self) {
        if self.termination.is_none() {
            self.conclude(Termination::ClientGone);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EmitterState {
    Fresh,
    Streaming,
    Finished,
}

/// Produces the SSE frames of one streaming response.
///
/// Frames always come out as: one role frame, content frames, one finish frame, `[DONE]`.
#[derive(Debug)]
pub struct StreamEmitter {
    pipeline: EventPipeline,
    encoder: ChunkEncoder,
    state: EmitterState,
}

impl StreamEmitter {
    #[must_use]
    pub fn new(meta: CompletionMeta, mode: RenderingMode) -> Self {
        Self {
            pipeline: EventPipeline::new(mode, meta.chat_id, true),
            encoder: ChunkEncoder::new(meta.id, meta.model, meta.created),
            state: EmitterState::Fresh,
        }
    }

    /// Emit the role frame if it has not gone out yet.
    pub fn start(&mut self, out: &mut Vec<String>) {
        if self.state == EmitterState::Fresh {
            out.push(self.encoder.role_frame());
            self.state = EmitterState::Streaming;
        }
    }

    /// Feed one upstream line. Returns `true` once the stream is complete.
    pub fn on_line(&mut self, line: &str, out: &mut Vec<String>) -> bool {
        if self.is_finished() {
            return true;
        }
        self.start(out);
        match self.pipeline.on_line(line) {
            Step::Skip => false,
            Step::Content(content) => {
                out.push(self.encoder.content_frame(&content));
                false
            }
            Step::Finished {
                content,
                termination,
            } => {
                if let Some(content) = content {
                    out.push(self.encoder.content_frame(&content));
                }
                self.finish(termination, out);
                true
            }
        }
    }

    /// The upstream body ended without a completion signal.
    pub fn on_eof(&mut self, out: &mut Vec<String>) {
        self.finish(Termination::Truncated, out);
    }

    /// Reading the upstream body failed; the client still gets a well-formed ending.
    pub fn on_read_error(&mut self, err: &dyn Display, out: &mut Vec<String>) {
        if !self.is_finished() {
            self.pipeline.on_read_error(err);
        }
        self.finish(Termination::Truncated, out);
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state == EmitterState::Finished
    }

    fn finish(&mut self, termination: Termination, out: &mut Vec<String>) {
        if self.is_finished() {
            return;
        }
        self.start(out);
        out.push(self.encoder.finish_frame(FINISH_REASON));
        out.push(DONE_FRAME.to_string());
        self.state = EmitterState::Finished;
        self.pipeline.conclude(termination);
    }
}

/// Accumulates the content of one non-streaming response.
#[derive(Debug)]
pub struct ResponseCollector {
    pipeline: EventPipeline,
    meta: CompletionMeta,
    content: String,
}

impl ResponseCollector {
    #[must_use]
    pub fn new(meta: CompletionMeta, mode: RenderingMode) -> Self {
        Self {
            pipeline: EventPipeline::new(mode, meta.chat_id.clone(), false),
            meta,
            content: String::new(),
        }
    }

    /// Feed one upstream line. Returns `true` once the response is complete.
    pub fn on_line(&mut self, line: &str) -> bool {
        if self.pipeline.termination().is_some() {
            return true;
        }
        match self.pipeline.on_line(line) {
            Step::Skip => false,
            Step::Content(content) => {
                self.content.push_str(&content);
                false
            }
            Step::Finished {
                content,
                termination,
            } => {
                if let Some(content) = content {
                    self.content.push_str(&content);
                }
                self.pipeline.conclude(termination);
                true
            }
        }
    }

    pub fn on_read_error(&mut self, err: &dyn Display) {
        if self.pipeline.termination().is_none() {
            self.pipeline.on_read_error(err);
        }
        self.pipeline.conclude(Termination::Truncated);
    }

    /// Build the aggregate response. A body that ended without completion keeps what arrived.
    #[must_use]
    pub fn finish(mut self) -> OpenAiChatResponse {
        self.pipeline.conclude(Termination::Truncated);
        let usage = self.pipeline.usage();
        let content = std::mem::take(&mut self.content);
        encode_chat_response(
            &self.meta.id,
            &self.meta.model,
            self.meta.created,
            content,
            usage,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::openai_chat::stream::parse_chunk_frame;

    fn meta() -> CompletionMeta {
        CompletionMeta {
            id: "chatcmpl-test".to_string(),
            model: "GLM-4.5".to_string(),
            created: 1_700_000_000,
            chat_id: "chat-test".to_string(),
        }
    }

    const SCENARIO: [&str; 3] = [
        r#"data: {"type":"chat:completion","data":{"delta_content":"<details>\n> hi","phase":"thinking"}}"#,
        r#"data: {"type":"chat:completion","data":{"delta_content":"</details>","phase":"thinking"}}"#,
        r#"data: {"type":"chat:completion","data":{"delta_content":"world","phase":"answer","done":true}}"#,
    ];

    fn stream_frames(lines: &[&str], eof: bool) -> Vec<String> {
        stream_frames_in(RenderingMode::Tagged, lines, eof)
    }

    fn stream_frames_in(mode: RenderingMode, lines: &[&str], eof: bool) -> Vec<String> {
        let mut emitter = StreamEmitter::new(meta(), mode);
        let mut out = Vec::new();
        emitter.start(&mut out);
        for line in lines {
            if emitter.on_line(line, &mut out) {
                break;
            }
        }
        if eof {
            emitter.on_eof(&mut out);
        }
        out
    }

    fn contents(frames: &[String]) -> Vec<String> {
        frames
            .iter()
            .filter_map(|frame| parse_chunk_frame(frame))
            .filter_map(|chunk| chunk.choices[0].delta.content.clone())
            .filter(|content| !content.is_empty())
            .collect()
    }

    fn assert_well_formed(frames: &[String]) {
        let roles = frames
            .iter()
            .filter_map(|frame| parse_chunk_frame(frame))
            .filter(|chunk| chunk.choices[0].delta.role.is_some())
            .count();
        assert_eq!(roles, 1);
        let first = parse_chunk_frame(&frames[0]).unwrap();
        assert_eq!(first.choices[0].delta.role.as_deref(), Some("assistant"));

        let n = frames.len();
        assert_eq!(frames[n - 1], DONE_FRAME);
        let finish = parse_chunk_frame(&frames[n - 2]).unwrap();
        assert_eq!(finish.choices[0].finish_reason.as_deref(), Some("stop"));
        let finishes = frames
            .iter()
            .filter_map(|frame| parse_chunk_frame(frame))
            .filter(|chunk| chunk.choices[0].finish_reason.is_some())
            .count();
        assert_eq!(finishes, 1);
        assert_eq!(frames.iter().filter(|f| f.as_str() == DONE_FRAME).count(), 1);
    }

    #[test]
    fn test_scenario_frames() {
        let frames = stream_frames(&SCENARIO, false);
        assert_well_formed(&frames);
        assert_eq!(
            contents(&frames),
            vec!["<think>\n\nhi", "\n\n</think>", "\n\nworld"]
        );
        assert_eq!(frames.len(), 6);
    }

    #[test]
    fn test_noise_lines_skipped() {
        let lines = [
            ": ping",
            "",
            "data: {broken",
            SCENARIO[0],
            "event: x",
            SCENARIO[1],
            SCENARIO[2],
        ];
        let frames = stream_frames(&lines, false);
        assert_well_formed(&frames);
        assert_eq!(contents(&frames).len(), 3);
    }

    #[test]
    fn test_in_band_error_terminates() {
        let lines = [
            SCENARIO[0],
            r#"data: {"error":{"detail":"rate limited","code":429},"data":{"delta_content":"ignored","phase":"answer"}}"#,
            SCENARIO[2],
        ];
        let frames = stream_frames(&lines, false);
        assert_well_formed(&frames);
        assert_eq!(contents(&frames), vec!["<think>\n\nhi"]);
    }

    #[test]
    fn test_truncated_stream_still_finishes() {
        let frames = stream_frames(&SCENARIO[..2], true);
        assert_well_formed(&frames);
        assert_eq!(contents(&frames), vec!["<think>\n\nhi", "\n\n</think>"]);
    }

    #[test]
    fn test_empty_upstream_still_finishes() {
        let frames = stream_frames(&[], true);
        assert_well_formed(&frames);
        assert_eq!(frames.len(), 3);
    }

    #[test]
    fn test_read_error_finishes_once() {
        let mut emitter = StreamEmitter::new(meta(), RenderingMode::Tagged);
        let mut out = Vec::new();
        emitter.on_line(SCENARIO[0], &mut out);
        emitter.on_read_error(&"connection reset", &mut out);
        emitter.on_eof(&mut out);
        assert!(emitter.is_finished());
        assert_well_formed(&out);
    }

    #[test]
    fn test_lines_after_finish_ignored() {
        let mut emitter = StreamEmitter::new(meta(), RenderingMode::Tagged);
        let mut out = Vec::new();
        for line in SCENARIO {
            emitter.on_line(line, &mut out);
        }
        let len = out.len();
        assert!(emitter.on_line(SCENARIO[0], &mut out));
        assert_eq!(out.len(), len);
    }

    #[test]
    fn test_stream_and_aggregate_content_match() {
        let lines = [
            SCENARIO[0],
            r#"data: {"data":{"delta_content":".","phase":"thinking"}}"#,
            r#"data: {"data":{"delta_content":"","edit_content":"<details duration=\"2\">x</details>\nAnswer","phase":"answer"}}"#,
            r#"data: {"data":{"delta_content":" continues","phase":"answer"}}"#,
            r#"data: {"data":{"phase":"done","done":true,"usage":{"prompt_tokens":1,"completion_tokens":2,"total_tokens":3}}}"#,
        ];
        let expected = [
            (
                RenderingMode::Tagged,
                "<think>\n\nhi.\n\n</think>\n\nAnswer continues",
            ),
            (
                RenderingMode::Annotated,
                "<details type=\"reasoning\">hi.\n\n</details>\n\nAnswer continues",
            ),
            (
                RenderingMode::Verbose,
                "<details type=\"reasoning\" open><div>\n\n> hi.\n\n</div></details>\n\nAnswer continues",
            ),
        ];

        for (mode, want) in expected {
            let frames = stream_frames_in(mode, &lines, false);
            assert_well_formed(&frames);
            let streamed: String = contents(&frames).concat();

            let mut collector = ResponseCollector::new(meta(), mode);
            for line in lines {
                if collector.on_line(line) {
                    break;
                }
            }
            let response = collector.finish();
            assert_eq!(response.choices[0].message.content, streamed, "{mode}");
            assert_eq!(streamed, want, "{mode}");
            assert_eq!(response.usage.total_tokens, 3);
            assert_eq!(response.choices[0].finish_reason, "stop");
        }
    }

    #[test]
    fn test_aggregate_without_completion_keeps_content() {
        let mut collector = ResponseCollector::new(meta(), RenderingMode::Tagged);
        for line in &SCENARIO[..2] {
            assert!(!collector.on_line(line));
        }
        let response = collector.finish();
        assert_eq!(
            response.choices[0].message.content,
            "<think>\n\nhi\n\n</think>"
        );
        assert_eq!(response.usage, OpenAiUsage::default());
    }

    #[test]
    fn test_aggregate_stops_at_error() {
        let mut collector = ResponseCollector::new(meta(), RenderingMode::Tagged);
        assert!(!collector.on_line(SCENARIO[0]));
        assert!(collector.on_line(
            r#"data: {"data":{"data":{"error":{"detail":"inner","code":500}}}}"#
        ));
        assert!(collector.on_line(SCENARIO[2]));
        let response = collector.finish();
        assert_eq!(response.choices[0].message.content, "<think>\n\nhi");
    }

    #[test]
    fn test_pipeline_concludes_once() {
        let mut pipeline = EventPipeline::new(RenderingMode::Tagged, "chat", true);
        pipeline.conclude(Termination::Completed);
        pipeline.conclude(Termination::Truncated);
        assert_eq!(pipeline.termination(), Some(Termination::Completed));
        assert_eq!(pipeline.on_line(SCENARIO[0]), Step::Skip);
    }
}
