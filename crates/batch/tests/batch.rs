use chunkflow_batch::{BatchCoordinator, BatchOptions};
use chunkflow_code_chunker::strategy::LineStrategy;
use chunkflow_code_chunker::{
    AuxiliaryCaches, Chunk, ChunkingStrategy, ConfigStore, FileInput, ProcessingConfig, ProcessingContext,
    ProcessingCoordinator, StrategyError, StrategyRegistry, TokenJaccardScorer,
};
use chunkflow_guard::{FixedMemorySampler, ProcessingGuard, SystemClock};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn batch_coordinator(config: ProcessingConfig, registry: Option<StrategyRegistry>) -> BatchCoordinator {
    let store = Arc::new(ConfigStore::new(config).expect("valid config"));
    let coordinator = match registry {
        Some(registry) => {
            ProcessingCoordinator::with_parts(store, registry, AuxiliaryCaches::default(), Arc::new(TokenJaccardScorer))
        }
        None => ProcessingCoordinator::new(store),
    };
    let guard = ProcessingGuard::with_parts(
        Arc::new(coordinator),
        Arc::new(FixedMemorySampler::new(0)),
        Arc::new(SystemClock),
    );
    BatchCoordinator::new(Arc::new(guard))
}

fn mixed_files() -> Vec<FileInput> {
    vec![
        FileInput::new("fn main() {\n    println!(\"hi\");\n}\n", "rust").with_path("src/main.rs"),
        FileInput::new("# Title\n\nSome words.\n", "markdown").with_path("README.md"),
        FileInput::new("[package]\nname = \"demo\"\n", "toml").with_path("Cargo.toml"),
        FileInput::new("def run():\n    return 1\n", "python").with_path("run.py"),
        FileInput::new("body { color: red; }\n", "css").with_path("site.css"),
        FileInput::new("", "text").with_path("empty.txt"),
    ]
}

#[tokio::test]
async fn results_follow_request_order() {
    let files = mixed_files();
    let paths: Vec<Option<String>> = files.iter().map(|f| f.file_path.clone()).collect();

    let result = batch_coordinator(ProcessingConfig::default(), None)
        .process_batch(files, BatchOptions::default())
        .await;

    let returned: Vec<Option<String>> = result.results.iter().map(|r| r.metadata.file_path.clone()).collect();
    assert_eq!(returned, paths);
    assert_eq!(result.success_count, 6);
    assert_eq!(result.failure_count, 0);
    assert_eq!(result.batches.iter().map(|b| b.size).sum::<usize>(), 6);

    let groups: Vec<&str> = result.batches.iter().map(|b| b.group.as_str()).collect();
    assert_eq!(groups, vec!["ast", "markdown", "config", "style", "line"]);
}

#[tokio::test]
async fn explicit_batch_size_caps_batches() {
    let files: Vec<FileInput> = (0..7)
        .map(|n| FileInput::new(format!("fn f{n}() {{}}\n"), "rust").with_path(format!("f{n}.rs")))
        .collect();

    let options = BatchOptions {
        batch_size: Some(2),
        ..BatchOptions::default()
    };
    let result = batch_coordinator(ProcessingConfig::default(), None)
        .process_batch(files, options)
        .await;

    let sizes: Vec<usize> = result.batches.iter().map(|b| b.size).collect();
    assert_eq!(sizes, vec![2, 2, 2, 1]);
    let indices: Vec<usize> = result.batches.iter().map(|b| b.batch_index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3]);
}

#[derive(Default)]
struct Tracking {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ChunkingStrategy for Tracking {
    fn name(&self) -> &str {
        "tracking"
    }

    fn can_handle(&self, _ctx: &ProcessingContext) -> bool {
        true
    }

    fn chunk(&self, ctx: &ProcessingContext) -> Result<Vec<Chunk>, StrategyError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(30));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        LineStrategy.chunk(ctx)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrency_limit_bounds_parallel_files() {
    let tracking = Arc::new(Tracking::default());
    let mut registry = StrategyRegistry::new();
    registry.register(Arc::clone(&tracking) as Arc<dyn ChunkingStrategy>);

    let files: Vec<FileInput> = (0..8)
        .map(|n| FileInput::new(format!("line {n}\nmore text\n"), "text"))
        .collect();
    let options = BatchOptions {
        concurrency_limit: Some(2),
        ..BatchOptions::default()
    };
    let result = batch_coordinator(ProcessingConfig::default(), Some(registry))
        .process_batch(files, options)
        .await;

    assert_eq!(result.success_count, 8);
    let peak = tracking.peak.load(Ordering::SeqCst);
    assert!((1..=2).contains(&peak), "peak {peak}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn batches_do_not_overlap() {
    let tracking = Arc::new(Tracking::default());
    let mut registry = StrategyRegistry::new();
    registry.register(Arc::clone(&tracking) as Arc<dyn ChunkingStrategy>);

    let files: Vec<FileInput> = (0..7)
        .map(|n| FileInput::new(format!("entry {n}\nnotes\n"), "text"))
        .collect();
    let options = BatchOptions {
        concurrency_limit: Some(8),
        batch_size: Some(3),
        ..BatchOptions::default()
    };
    let result = batch_coordinator(ProcessingConfig::default(), Some(registry))
        .process_batch(files, options)
        .await;

    assert_eq!(result.batches.len(), 3);
    let peak = tracking.peak.load(Ordering::SeqCst);
    assert!((1..=3).contains(&peak), "peak {peak}");
}

#[tokio::test]
async fn failed_files_are_reported_not_fatal() {
    let mut config = ProcessingConfig::default();
    config.guard.max_errors = 100;
    let files: Vec<FileInput> = (0..3)
        .map(|n| FileInput::new(format!("word {n}\n"), "text"))
        .collect();

    let result = batch_coordinator(config, Some(StrategyRegistry::new()))
        .process_batch(files, BatchOptions::default())
        .await;

    assert_eq!(result.results.len(), 3);
    assert_eq!(result.failure_count, 3);
    assert_eq!(result.success_count, 0);
    assert!(result.results.iter().all(|r| r.error.is_some()));
    assert!(result.results.iter().all(|r| !r.chunks.is_empty()));
    assert_eq!(result.batches.iter().map(|b| b.failure_count).sum::<usize>(), 3);
}

#[tokio::test]
async fn ungrouped_batches_and_empty_input() {
    let coordinator = batch_coordinator(ProcessingConfig::default(), None);

    let empty = coordinator.process_batch(Vec::new(), BatchOptions::default()).await;
    assert!(empty.results.is_empty());
    assert!(empty.batches.is_empty());

    let options = BatchOptions {
        group_by_strategy: false,
        ..BatchOptions::default()
    };
    let result = coordinator.process_batch(mixed_files(), options).await;
    assert!(result.batches.iter().all(|b| b.group == "all"));
    assert_eq!(result.results.len(), 6);

    let json = serde_json::to_value(&result).expect("serializable");
    assert_eq!(json["results"].as_array().map(Vec::len), Some(6));
}
