use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use tuonella_reduce::actions::ActionRegistry;
use tuonella_reduce::config::{Config, ProcessorConfig};
use tuonella_reduce::{pipeline, utils};

#[derive(Parser)]
#[command(name = "tuonella-reduce")]
#[command(about = "Tuonella Reduce - sorts, deduplicates and aggregates newline-delimited JSON records")]
struct Args {
    #[arg(short, long, help = "Input file with one JSON record per line")]
    input: PathBuf,

    #[arg(short, long, help = "Output file; records go to stdout when omitted")]
    output: Option<PathBuf>,

    #[arg(short, long, default_value = "pipeline.json", help = "Pipeline configuration file path")]
    config: PathBuf,

    #[arg(short, long, help = "Verbose output")]
    verbose: bool,

    #[arg(long, help = "Keep spill files after the run")]
    keep_files: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(&args.config).await?;

    let verbosity = if args.verbose { "verbose" } else { &config.logging.verbosity };
    utils::setup_logging(verbosity)?;

    if !args.input.exists() {
        anyhow::bail!("Input file does not exist: {}", args.input.display());
    }

    if args.keep_files {
        for processor in &mut config.processors {
            if let ProcessorConfig::MapReduce(mr) = processor {
                mr.keep_files = true;
            }
        }
    }

    info!("Starting Tuonella Reduce pipeline '{}'", config.name);
    info!("Input file: {}", args.input.display());
    if let Some(output) = &args.output {
        info!("Output file: {}", output.display());
    }

    let registry = ActionRegistry::new();
    let ctx = tokio::task::spawn_blocking(move || {
        pipeline::run(&config, &registry, &args.input, args.output.as_deref())
    })
    .await
    .context("Pipeline task panicked")??;

    info!(
        "Pipeline finished in {}",
        utils::format_duration(ctx.elapsed())
    );

    Ok(())
}
