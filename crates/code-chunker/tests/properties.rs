use chunkflow_code_chunker::pipeline::{PostProcessPass, SymbolBalancePass};
use chunkflow_code_chunker::strategy::LineStrategy;
use chunkflow_code_chunker::{
    ChunkType, ChunkingStrategy, ConfigStore, FileInput, ProcessingConfig, ProcessingContext, ProcessingCoordinator,
};
use proptest::prelude::*;
use std::sync::Arc;

const LINES: &[&str] = &[
    "",
    "fn handler(req: Request) -> Response {",
    "}",
    "    let total = items.iter().sum::<u32>();",
    "    if total > 10 {",
    "    }",
    "def compute(values):",
    "    return [v * 2 for v in values]",
    "class Widget:",
    "function render(props) {",
    "  return props.items.map((item) => item.name);",
    "# Heading",
    "plain prose with a few words",
    "{",
    "(",
    "    call(\"unterminated {",
    "/* block comment starts",
    "ends here */",
    "const x = `template",
    "xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx",
];

const LANGUAGES: &[&str] = &["rust", "python", "javascript", "typescript", "text", "markdown", "go"];

fn small_config() -> ProcessingConfig {
    let mut config = ProcessingConfig::default();
    config.chunking.max_chunk_size = 200;
    config.chunking.min_chunk_size = 20;
    config.chunking.overlap_size = 40;
    config.chunking.max_lines_per_chunk = 12;
    config
}

fn coordinator(config: ProcessingConfig) -> ProcessingCoordinator {
    ProcessingCoordinator::new(Arc::new(ConfigStore::new(config).expect("valid config")))
}

fn source() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(LINES), 0..60).prop_map(|lines| lines.join("\n"))
}

fn language() -> impl Strategy<Value = &'static str> {
    prop::sample::select(LANGUAGES)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn every_line_is_covered_or_reported_discarded(content in source(), lang in language()) {
        let result = coordinator(small_config()).process(&FileInput::new(content.clone(), lang));
        let total = content.lines().count();
        let discarded = result
            .metadata
            .pipeline
            .as_ref()
            .map(|r| r.discarded.clone())
            .unwrap_or_default();

        for line in 1..=total {
            let covered = result.chunks.iter().any(|c| c.contains_line(line))
                || discarded.iter().any(|span| span.contains_line(line));
            prop_assert!(covered, "line {} of {} lost", line, total);
        }
    }

    #[test]
    fn chunk_ranges_stay_inside_the_file(content in source(), lang in language()) {
        let result = coordinator(small_config()).process(&FileInput::new(content.clone(), lang));
        let total = content.lines().count().max(1);
        for chunk in &result.chunks {
            prop_assert!(chunk.start_line() >= 1);
            prop_assert!(chunk.start_line() <= chunk.end_line());
            prop_assert!(chunk.end_line() <= total);
        }
    }

    #[test]
    fn merged_chunks_respect_the_size_limit(content in source(), lang in language()) {
        let config = small_config();
        let max = config.chunking.max_chunk_size;
        let result = coordinator(config).process(&FileInput::new(content, lang));
        for chunk in result.chunks.iter().filter(|c| c.chunk_type() == ChunkType::Merged) {
            prop_assert!(chunk.len() <= max, "merged chunk of {} chars", chunk.len());
        }
    }

    #[test]
    fn balancing_twice_changes_nothing(content in source()) {
        let ctx = ProcessingContext::builder()
            .content(content)
            .language("rust")
            .config(Arc::new(small_config()))
            .build()
            .expect("context");
        let chunks = LineStrategy.chunk(&ctx).expect("line chunks");

        let once = SymbolBalancePass.apply(&chunks, &ctx).expect("first pass").chunks;
        let twice = SymbolBalancePass.apply(&once, &ctx).expect("second pass").chunks;
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn processing_never_panics(content in "\\PC{0,400}", lang in prop::sample::select(vec!["", "rust", "python", "javascript", "text", "???"])) {
        let result = coordinator(ProcessingConfig::default()).process(&FileInput::new(content, lang));
        prop_assert_eq!(result.metadata.chunk_count, result.chunks.len());
    }
}
