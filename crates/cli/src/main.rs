use anyhow::{Context as AnyhowContext, Result};
use chunkflow_batch::{BatchCoordinator, BatchOptions, BatchResult};
use chunkflow_code_chunker::{ConfigStore, ProcessingCoordinator};
use chunkflow_guard::ProcessingGuard;
use clap::Parser;
use config_file::Overrides;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

mod config_file;
mod files;

/// Exit code for a configuration that failed validation
const EXIT_INVALID_CONFIG: i32 = 2;

#[derive(Parser)]
#[command(name = "chunkflow")]
#[command(about = "Split source files into bounded, coherent chunks", long_about = None)]
#[command(version)]
struct Cli {
    /// Files or directories to chunk
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Language for every file (default: detect from extension)
    #[arg(long)]
    language: Option<String>,

    /// Print the full batch result as JSON
    #[arg(long)]
    json: bool,

    /// Config file (JSON or TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Base preset: default, embeddings or speed
    #[arg(long)]
    preset: Option<String>,

    #[arg(long)]
    max_chunk_size: Option<usize>,

    #[arg(long)]
    min_chunk_size: Option<usize>,

    /// Overlap between neighbouring chunks, in characters
    #[arg(long)]
    overlap: Option<usize>,

    /// Files processed in parallel
    #[arg(long)]
    concurrency: Option<usize>,

    #[arg(long)]
    memory_limit_mb: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            max_chunk_size: self.max_chunk_size,
            min_chunk_size: self.min_chunk_size,
            overlap: self.overlap,
            concurrency: self.concurrency,
            memory_limit_mb: self.memory_limit_mb,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let mut config = config_file::load_config(cli.config.as_deref(), cli.preset.as_deref())?;
    config_file::apply_overrides(&mut config, &cli.overrides());
    if let Err(issues) = config.validate() {
        eprintln!("Invalid configuration:\n{}", config_file::render_issues(&issues));
        std::process::exit(EXIT_INVALID_CONFIG);
    }

    let inputs = files::collect_inputs(&cli.paths, cli.language.as_deref())?;
    if inputs.is_empty() {
        log::warn!("No readable files found");
    }

    let store = Arc::new(ConfigStore::new(config).context("Failed to publish configuration")?);
    let guard = Arc::new(ProcessingGuard::new(Arc::new(ProcessingCoordinator::new(store))));
    guard.initialize();

    let batch = BatchCoordinator::new(Arc::clone(&guard))
        .process_batch(inputs, BatchOptions::default())
        .await;
    guard.destroy();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if cli.json {
        serde_json::to_writer_pretty(&mut out, &batch).context("Failed to write JSON output")?;
        writeln!(out)?;
    } else {
        write_summary(&mut out, &batch)?;
    }
    Ok(())
}

fn write_summary(out: &mut impl Write, batch: &BatchResult) -> Result<()> {
    for result in &batch.results {
        let path = result.metadata.file_path.as_deref().unwrap_or("<inline>");
        write!(
            out,
            "{path}: {} chunks via {} ({})",
            result.chunks.len(),
            result.strategy,
            result.language()
        )?;
        if let Some(reason) = result.fallback_reason() {
            write!(out, " [fallback: {reason}]")?;
        }
        if let Some(error) = &result.error {
            write!(out, " [error: {error}]")?;
        }
        writeln!(out)?;
    }
    writeln!(
        out,
        "{} files, {} chunks, {} ok, {} failed, {} degraded in {} ms",
        batch.results.len(),
        batch.chunk_count(),
        batch.success_count,
        batch.failure_count,
        batch.fallback_count(),
        batch.total_duration_ms
    )?;
    Ok(())
}
