use std::time::Instant;

use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber with the configured log level.
///
/// Maps config log levels to tracing levels:
/// - "DISABLED" -> no subscriber installed
/// - "WARNING" -> WARN
/// - "CRITICAL" -> ERROR
/// - Others map directly (DEBUG, INFO, ERROR)
pub fn init_tracing(log_level: &str) {
    let level = log_level.to_uppercase();

    if level == "DISABLED" {
        return;
    }

    let tracing_level = match level.as_str() {
        "WARNING" => "WARN",
        "CRITICAL" => "ERROR",
        other => other,
    };

    let filter = EnvFilter::try_new(tracing_level).unwrap_or_else(|_| EnvFilter::new("INFO"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// How a translated response ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The upstream sent `done` or a `done` phase.
    Completed,
    /// The upstream pushed an in-band error object.
    UpstreamError,
    /// The upstream body ended (or failed) without a completion signal.
    Truncated,
    /// The downstream client went away before the stream finished.
    ClientGone,
}

impl Termination {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Termination::Completed => "completed",
            Termination::UpstreamError => "upstream_error",
            Termination::Truncated => "truncated",
            Termination::ClientGone => "client_gone",
        }
    }
}

/// Per-request counters logged once the response is finished.
#[derive(Debug)]
pub struct RequestStats {
    started: Instant,
    pub lines: u64,
    pub fragments: u64,
    pub content_bytes: usize,
}

impl RequestStats {
    #[must_use]
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            lines: 0,
            fragments: 0,
            content_bytes: 0,
        }
    }

    pub fn record_fragment(&mut self, fragment: &str) {
        self.fragments += 1;
        self.content_bytes += fragment.len();
    }

    /// Log the outcome of one translated response.
    pub fn log_complete(&self, chat_id: &str, stream: bool, termination: Termination) {
        let elapsed_ms = self.started.elapsed().as_millis();
        match termination {
            Termination::Completed => tracing::info!(
                chat_id,
                stream,
                lines = self.lines,
                fragments = self.fragments,
                content_bytes = self.content_bytes,
                elapsed_ms,
                "chat completion finished"
            ),
            Termination::Truncated => tracing::warn!(
                chat_id,
                stream,
                lines = self.lines,
                fragments = self.fragments,
                content_bytes = self.content_bytes,
                elapsed_ms,
                "upstream stream ended without a completion signal"
            ),
            Termination::UpstreamError | Termination::ClientGone => tracing::warn!(
                chat_id,
                stream,
                termination = termination.as_str(),
                lines = self.lines,
                fragments = self.fragments,
                elapsed_ms,
                "chat completion ended early"
            ),
        }
    }
}
