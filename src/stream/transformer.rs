//! Rewrites the upstream's reasoning markup into the configured rendering.
//!
//! The upstream interleaves a `<details>`-wrapped, blockquoted reasoning transcript with the
//! answer. [`ContentTransformer`] turns each fragment into the exact text forwarded to the
//! client, remembering the phase of the previous event so it can decide where the reasoning
//! block closes and the answer begins.

use std::sync::LazyLock;

use regex_lite::Regex;

use crate::config::RenderingMode;
use crate::protocol::upstream::decoder::Phase;

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("built-in pattern must compile")
}

static DETAILS_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?s)(<details[^>]*?>).*?</details>"));
static DETAILS_OPEN: LazyLock<Regex> = LazyLock::new(|| compile(r"<details[^>]*>\n?"));
static DETAILS_CLOSE: LazyLock<Regex> = LazyLock::new(|| compile(r"\n?</details>"));
static QUOTE_CONTINUATION: LazyLock<Regex> = LazyLock::new(|| compile(r"\n> ?"));
static SUMMARY_WITH_BREAKS: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?s)\n?<summary>.*?</summary>\n?"));
static SUMMARY_LEADING_BREAK: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?s)\n?<summary>.*?</summary>"));
static SUMMARY: LazyLock<Regex> = LazyLock::new(|| compile(r"(?s)<summary>.*?</summary>"));
static DURATION: LazyLock<Regex> = LazyLock::new(|| compile(r#"duration="(\d+)""#));

const STRIPPED_MARKERS: [&str; 3] = ["</thinking>", "<Full>", "</Full>"];

/// The two phases that carry visible content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentPhase {
    Thinking,
    Answer,
}

impl ContentPhase {
    #[must_use]
    pub fn from_phase(phase: Phase) -> Option<Self> {
        match phase {
            Phase::Thinking => Some(ContentPhase::Thinking),
            Phase::Answer => Some(ContentPhase::Answer),
            Phase::Done | Phase::Other => None,
        }
    }
}

/// Per-request rendering state machine.
#[derive(Debug, Clone)]
pub struct ContentTransformer {
    mode: RenderingMode,
    last_phase: ContentPhase,
}

impl ContentTransformer {
    #[must_use]
    pub fn new(mode: RenderingMode) -> Self {
        Self {
            mode,
            last_phase: ContentPhase::Thinking,
        }
    }

    #[must_use]
    pub fn last_phase(&self) -> ContentPhase {
        self.last_phase
    }

    /// Produce the visible text for one upstream fragment.
    ///
    /// An empty return value means nothing should be forwarded for this event.
    pub fn transform(&mut self, fragment: &str, phase: Phase) -> String {
        let content_phase = ContentPhase::from_phase(phase);
        let rendered = self.render(fragment, content_phase);
        if let Some(content_phase) = content_phase {
            self.last_phase = content_phase;
        }
        if rendered != fragment {
            tracing::debug!(?phase, raw = fragment, rendered = %rendered, "rewrote fragment");
        }
        rendered
    }

    fn render(&self, fragment: &str, phase: Option<ContentPhase>) -> String {
        if fragment.is_empty() {
            return String::new();
        }
        if phase.is_none() && !fragment.contains("summary>") {
            return fragment.to_string();
        }

        let stripped = strip_markup(fragment, phase == Some(ContentPhase::Answer));
        match phase {
            Some(ContentPhase::Thinking) => self.render_thinking(&stripped),
            Some(ContentPhase::Answer) => self.render_answer(stripped),
            None => stripped,
        }
    }

    fn render_thinking(&self, content: &str) -> String {
        match self.mode {
            RenderingMode::Tagged => {
                let content = unquote(content);
                let content = SUMMARY_WITH_BREAKS.replace_all(&content, "");
                let content = DETAILS_OPEN.replace_all(&content, self.open_marker());
                DETAILS_CLOSE
                    .replace_all(&content, "\n\n</think>")
                    .into_owned()
            }
            RenderingMode::Annotated => {
                let content = unquote(content);
                let content = SUMMARY_WITH_BREAKS.replace_all(&content, "");
                let content = DETAILS_OPEN.replace_all(&content, self.open_marker());
                DETAILS_CLOSE
                    .replace_all(&content, "\n\n</details>")
                    .into_owned()
            }
            RenderingMode::Verbose => {
                let content = SUMMARY_LEADING_BREAK.replace_all(content, "");
                let content = DETAILS_OPEN.replace_all(&content, self.open_marker());
                DETAILS_CLOSE
                    .replace_all(&content, "\n\n</div></details>")
                    .into_owned()
            }
        }
    }

    fn render_answer(&self, content: String) -> String {
        let Some(close) = DETAILS_CLOSE.find(&content) else {
            let content = DETAILS_OPEN
                .replace_all(&content, self.open_marker())
                .into_owned();
            return match self.last_phase {
                ContentPhase::Thinking => {
                    format!("\n\n{}", content.trim_start_matches('\n'))
                }
                ContentPhase::Answer => content,
            };
        };

        let before = &content[..close.start()];
        let after = &content[close.end()..];

        if !after.trim().is_empty() {
            return match self.last_phase {
                ContentPhase::Thinking => format!(
                    "{}\n\n{}",
                    self.close_marker(),
                    after.trim_start_matches('\n')
                ),
                ContentPhase::Answer => String::new(),
            };
        }

        match self.mode {
            RenderingMode::Tagged => self.close_marker().to_string(),
            RenderingMode::Annotated => String::new(),
            RenderingMode::Verbose => verbose_thought_footer(before),
        }
    }

    fn open_marker(&self) -> &'static str {
        match self.mode {
            RenderingMode::Tagged => "<think>\n\n",
            RenderingMode::Annotated => r#"<details type="reasoning">"#,
            RenderingMode::Verbose => "<details type=\"reasoning\" open><div>\n\n",
        }
    }

    fn close_marker(&self) -> &'static str {
        match self.mode {
            RenderingMode::Tagged => "\n\n</think>",
            RenderingMode::Annotated => "\n\n</details>",
            RenderingMode::Verbose => "\n\n</div></details>",
        }
    }
}

/// Remove the first complete `<details>` block and the stray markers.
///
/// In the answer phase the block keeps its opening tag and `<summary>` followed by a bare
/// `</details>`, so the close still drives the splice and the summary stays recoverable.
fn strip_markup(fragment: &str, answer: bool) -> String {
    let mut content = match DETAILS_BLOCK.captures(fragment) {
        Some(caps) => {
            let Some(block) = caps.get(0) else {
                return fragment.to_string();
            };
            let mut out = String::with_capacity(fragment.len());
            out.push_str(&fragment[..block.start()]);
            if answer {
                if let Some(open) = caps.get(1) {
                    out.push_str(open.as_str());
                }
                if let Some(summary) = SUMMARY.find(block.as_str()) {
                    out.push_str(summary.as_str());
                }
                out.push_str("</details>");
            }
            out.push_str(&fragment[block.end()..]);
            out
        }
        None => fragment.to_string(),
    };
    for marker in STRIPPED_MARKERS {
        if content.contains(marker) {
            content = content.replace(marker, "");
        }
    }
    content
}

/// Drop the blockquote prefix the upstream puts on every reasoning line.
fn unquote(content: &str) -> String {
    let content = content.strip_prefix("> ").unwrap_or(content);
    QUOTE_CONTINUATION
        .replace_all(content, "\n")
        .trim()
        .to_string()
}

fn verbose_thought_footer(before: &str) -> String {
    if let Some(summary) = SUMMARY.find(before) {
        return format!("\n\n</div>{}</details>\n\n", summary.as_str());
    }
    if let Some(seconds) = DURATION.captures(before).and_then(|caps| caps.get(1)) {
        return format!(
            "\n\n</div><summary>Thought for {} seconds</summary></details>\n\n",
            seconds.as_str()
        );
    }
    "\n\n</div></details>".to_string()
}
