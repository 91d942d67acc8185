use criterion::{black_box, criterion_group, criterion_main, Criterion};

use glm_relay::auth::{authenticate, build_allowed_key_set};
use glm_relay::config::{AppConfig, ClientAuthConfig, RenderingMode};
use glm_relay::observability::Termination;
use glm_relay::protocol::upstream::decoder::{decode_line, Phase};
use glm_relay::stream::{ContentTransformer, EventPipeline, LineSplitter};

fn build_transcript(thinking_fragments: usize, answer_fragments: usize) -> Vec<String> {
    let mut lines = Vec::with_capacity(thinking_fragments + answer_fragments + 2);
    lines.push(
        r#"data: {"type":"chat:completion","data":{"delta_content":"<details type=\"reasoning\">\n> Let me think","phase":"thinking"}}"#
            .to_string(),
    );
    for idx in 0..thinking_fragments {
        lines.push(format!(
            r#"data: {{"type":"chat:completion","data":{{"delta_content":"\n> step {idx} of the reasoning","phase":"thinking"}}}}"#
        ));
    }
    lines.push(
        r#"data: {"type":"chat:completion","data":{"delta_content":"","edit_content":"<details type=\"reasoning\" done=\"true\" duration=\"3\">\n> ...\n<summary>Thought for 3 seconds</summary></details>\nThe answer","phase":"answer"}}"#
            .to_string(),
    );
    for idx in 0..answer_fragments {
        lines.push(format!(
            r#"data: {{"type":"chat:completion","data":{{"delta_content":" token{idx}","phase":"answer"}}}}"#
        ));
    }
    lines.push(
        r#"data: {"type":"chat:completion","data":{"phase":"done","done":true,"usage":{"prompt_tokens":12,"completion_tokens":80,"total_tokens":92}}}"#
            .to_string(),
    );
    lines
}

fn bench_decode_line(c: &mut Criterion) {
    let lines = build_transcript(16, 64);
    c.bench_function("decode_line_transcript_82", |b| {
        b.iter(|| {
            for line in &lines {
                black_box(decode_line(black_box(line)));
            }
        });
    });
}

fn bench_transformer(c: &mut Criterion) {
    let fragments: Vec<(Phase, String)> = std::iter::once((
        Phase::Thinking,
        "<details type=\"reasoning\">\n> Let me think".to_string(),
    ))
    .chain((0..32).map(|idx| (Phase::Thinking, format!("\n> step {idx}"))))
    .chain(std::iter::once((
        Phase::Answer,
        "<details duration=\"3\">x<summary>Thought for 3 seconds</summary></details>\nHi"
            .to_string(),
    )))
    .chain((0..64).map(|idx| (Phase::Answer, format!(" token{idx}"))))
    .collect();

    for mode in [
        RenderingMode::Tagged,
        RenderingMode::Annotated,
        RenderingMode::Verbose,
    ] {
        c.bench_function(&format!("transform_{mode}"), |b| {
            b.iter(|| {
                let mut transformer = ContentTransformer::new(mode);
                for (phase, fragment) in &fragments {
                    black_box(transformer.transform(black_box(fragment), *phase));
                }
            });
        });
    }
}

fn bench_pipeline(c: &mut Criterion) {
    let lines = build_transcript(16, 64);
    c.bench_function("pipeline_transcript_82", |b| {
        b.iter(|| {
            let mut pipeline = EventPipeline::new(RenderingMode::Tagged, "bench", true);
            for line in &lines {
                black_box(pipeline.on_line(black_box(line)));
            }
            pipeline.conclude(Termination::Completed);
        });
    });
}

fn bench_line_splitter(c: &mut Criterion) {
    let body: String = build_transcript(16, 64)
        .iter()
        .map(|line| format!("{line}\n\n"))
        .collect();
    let chunks: Vec<&[u8]> = body.as_bytes().chunks(61).collect();
    c.bench_function("line_splitter_61b_chunks", |b| {
        b.iter(|| {
            let mut splitter = LineSplitter::new();
            let mut count = 0usize;
            for chunk in &chunks {
                splitter.feed(chunk);
                while let Some(line) = splitter.next_line() {
                    count += black_box(line).len();
                }
            }
            black_box(count)
        });
    });
}

fn bench_authentication(c: &mut Criterion) {
    let config = AppConfig {
        client_authentication: ClientAuthConfig {
            allowed_keys: vec!["client-key".to_string()],
        },
        ..AppConfig::default()
    };
    let keys = build_allowed_key_set(&config);
    let mut headers = http::HeaderMap::new();
    headers.insert("authorization", "Bearer client-key".parse().unwrap());
    c.bench_function("auth_single_bearer", |b| {
        b.iter(|| black_box(authenticate(black_box(&headers), black_box(&keys)).is_ok()));
    });
}

criterion_group!(
    benches,
    bench_decode_line,
    bench_transformer,
    bench_pipeline,
    bench_line_splitter,
    bench_authentication
);
criterion_main!(benches);
