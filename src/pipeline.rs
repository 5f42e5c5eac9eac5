use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, error, info};

use crate::actions::ActionRegistry;
use crate::config::{Config, ProcessorConfig};
use crate::constants::{BYTES_PER_KB, PROGRESS_REPORT_INTERVAL_RECORDS, SPILL_READ_BUFFER_SIZE_KB};
use crate::context::PipelineContext;
use crate::error;
use crate::processors::{
    Endpoint, MapReduceProcessor, RepeatProcessor, SortProcessor, TopProcessor, UniqueProcessor,
};
use crate::record::Record;
use crate::sinks::BatchWriter;

/// Builds one processor in front of `next`.
pub fn build_processor(
    config: &ProcessorConfig,
    registry: &ActionRegistry,
    next: Box<dyn Endpoint>,
) -> error::Result<Box<dyn Endpoint>> {
    let processor: Box<dyn Endpoint> = match config {
        ProcessorConfig::Sort(c) => Box::new(SortProcessor::new(c, next)?),
        ProcessorConfig::MapReduce(c) => Box::new(MapReduceProcessor::new(c, registry, next)?),
        ProcessorConfig::Top(c) => Box::new(TopProcessor::new(c, next)?),
        ProcessorConfig::Unique(c) => Box::new(UniqueProcessor::new(c, next)),
        ProcessorConfig::Repeat(c) => Box::new(RepeatProcessor::new(c, next)?),
    };
    Ok(processor)
}

/// Chains the processors in configuration order, ending at `sink`.
/// Returns the head of the chain.
pub fn build_chain(
    processors: &[ProcessorConfig],
    registry: &ActionRegistry,
    sink: Box<dyn Endpoint>,
) -> error::Result<Box<dyn Endpoint>> {
    let mut next = sink;
    for config in processors.iter().rev() {
        next = build_processor(config, registry, next)?;
        debug!(processor = config.id(), kind = config.kind(), "added processor to chain");
    }
    Ok(next)
}

/// Pushes newline-delimited JSON records into `head`. Blank lines are
/// skipped. Does not finish `head`.
pub fn feed<R: BufRead>(reader: R, head: &mut dyn Endpoint, ctx: &mut PipelineContext) -> Result<usize> {
    let mut count = 0;
    for (index, line) in reader.lines().enumerate() {
        let line_number = index + 1;
        let line = line.with_context(|| format!("Failed to read input line {}", line_number))?;
        if line.trim().is_empty() {
            continue;
        }
        let record = Record::from_json_line(&line)
            .with_context(|| format!("Malformed record on input line {}", line_number))?;
        head.add(ctx, record)
            .with_context(|| format!("Failed to process input line {}", line_number))?;
        count += 1;

        if count % PROGRESS_REPORT_INTERVAL_RECORDS == 0 {
            info!(records = count, "reading input");
        }
    }
    ctx.incr("input.records", count as u64);
    Ok(count)
}

pub fn read_ndjson<P: AsRef<Path>>(path: P, head: &mut dyn Endpoint, ctx: &mut PipelineContext) -> Result<usize> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Failed to open input {}", path.display()))?;
    feed(
        BufReader::with_capacity(SPILL_READ_BUFFER_SIZE_KB * BYTES_PER_KB, file),
        head,
        ctx,
    )
    .with_context(|| format!("Failed to read input {}", path.display()))
}

/// Runs a whole configured pipeline from `input` to `output` (stdout when
/// `None`). Blocking; call it off the async runtime.
pub fn run(config: &Config, registry: &ActionRegistry, input: &Path, output: Option<&Path>) -> Result<PipelineContext> {
    let mut ctx = PipelineContext::new(config.name.clone());

    let sink = match output {
        Some(path) => BatchWriter::to_path(path, config.output.write_buffering)
            .with_context(|| format!("Failed to create output {}", path.display()))?,
        None => BatchWriter::to_stdout(config.output.write_buffering)?,
    }
    .with_batch_size(config.output.batch_size)?;

    let mut head = build_chain(&config.processors, registry, Box::new(sink))
        .context("Failed to build processor chain")?;

    info!(
        pipeline = %config.name,
        processors = config.processors.len(),
        input = %input.display(),
        "starting pipeline"
    );

    let result = read_ndjson(input, head.as_mut(), &mut ctx).and_then(|count| {
        head.finish(&mut ctx).context("Failed to finish pipeline")?;
        Ok(count)
    });

    match result {
        Ok(count) => {
            info!(pipeline = %config.name, records = count, "pipeline complete");
            ctx.log_summary();
            Ok(ctx)
        }
        Err(e) => {
            let fatal = e
                .chain()
                .filter_map(|cause| cause.downcast_ref::<error::ReduceError>())
                .any(error::ReduceError::is_fatal);
            error!(pipeline = %config.name, fatal, "pipeline failed: {:#}", e);
            // Partial counts help locate the failure.
            ctx.log_summary();
            Err(e)
        }
    }
}
