pub mod emitter;
pub mod lines;
pub mod transformer;

pub use emitter::{CompletionMeta, EventPipeline, ResponseCollector, Step, StreamEmitter};
pub use lines::{line_stream, LineSplitter};
pub use transformer::{ContentPhase, ContentTransformer};
