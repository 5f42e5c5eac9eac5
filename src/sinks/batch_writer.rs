use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::constants::{
    BYTES_PER_KB, DEFAULT_WRITE_BATCH_SIZE_RECORDS, MAX_WRITE_BATCH_SIZE_RECORDS, OUTPUT_BUFFER_SIZE_KB,
};
use crate::context::PipelineContext;
use crate::error::{ReduceError, Result};
use crate::processors::Endpoint;
use crate::record::Record;
use crate::task_queue::AsyncTaskQueue;
use crate::utils::format_bytes;

#[derive(Debug, Clone, Default)]
pub struct BatchWriteMetrics {
    pub records_written: usize,
    pub bytes_written: usize,
    pub batches_written: usize,
    pub write_time: Duration,
}

/// Newline-delimited JSON output.
///
/// Records are buffered into batches; each batch is serialized on the task
/// queue and written in submission order. `write_buffering` is the number
/// of batches allowed in flight.
pub struct BatchWriter {
    writer: Box<dyn Write + Send>,
    buffer: Vec<Record>,
    batch_size: usize,
    queue: AsyncTaskQueue<(usize, Vec<u8>)>,
    metrics: BatchWriteMetrics,
    finished: bool,
}

impl BatchWriter {
    pub fn new(writer: Box<dyn Write + Send>, batch_size: usize, write_buffering: usize) -> Result<Self> {
        check_batch_size(batch_size)?;
        Ok(Self {
            writer,
            buffer: Vec::with_capacity(batch_size),
            batch_size,
            queue: AsyncTaskQueue::new("write", write_buffering)?,
            metrics: BatchWriteMetrics::default(),
            finished: false,
        })
    }

    pub fn to_path<P: AsRef<Path>>(path: P, write_buffering: usize) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        let writer = BufWriter::with_capacity(OUTPUT_BUFFER_SIZE_KB * BYTES_PER_KB, file);
        Self::new(Box::new(writer), DEFAULT_WRITE_BATCH_SIZE_RECORDS, write_buffering)
    }

    pub fn to_stdout(write_buffering: usize) -> Result<Self> {
        Self::new(
            Box::new(std::io::stdout()),
            DEFAULT_WRITE_BATCH_SIZE_RECORDS,
            write_buffering,
        )
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Result<Self> {
        check_batch_size(batch_size)?;
        self.batch_size = batch_size;
        self.buffer = Vec::with_capacity(batch_size);
        Ok(self)
    }

    pub fn metrics(&self) -> &BatchWriteMetrics {
        &self.metrics
    }

    fn submit_batch(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.batch_size));
        if let Some(serialized) = self.queue.push_and_optional_pop(move || serialize_batch(&batch))? {
            self.write_serialized(serialized)?;
        }
        Ok(())
    }

    fn write_serialized(&mut self, (records, bytes): (usize, Vec<u8>)) -> Result<()> {
        let started = Instant::now();
        self.writer.write_all(&bytes)?;
        self.metrics.write_time += started.elapsed();
        self.metrics.records_written += records;
        self.metrics.bytes_written += bytes.len();
        self.metrics.batches_written += 1;
        debug!(records, bytes = bytes.len(), "wrote batch");
        Ok(())
    }
}

fn check_batch_size(batch_size: usize) -> Result<()> {
    if batch_size == 0 || batch_size > MAX_WRITE_BATCH_SIZE_RECORDS {
        return Err(ReduceError::config(format!(
            "Write batch size must be between 1 and {}, got {}",
            MAX_WRITE_BATCH_SIZE_RECORDS, batch_size
        )));
    }
    Ok(())
}

fn serialize_batch(batch: &[Record]) -> Result<(usize, Vec<u8>)> {
    let mut bytes = Vec::with_capacity(batch.len() * 128);
    for record in batch {
        serde_json::to_writer(&mut bytes, record)?;
        bytes.push(b'\n');
    }
    Ok((batch.len(), bytes))
}

impl Endpoint for BatchWriter {
    fn name(&self) -> &str {
        "ndjson"
    }

    fn add(&mut self, _ctx: &mut PipelineContext, record: Record) -> Result<()> {
        if self.finished {
            return Err(ReduceError::invalid_state("writer received a record after finish"));
        }
        self.buffer.push(record);
        if self.buffer.len() >= self.batch_size {
            self.submit_batch()?;
        }
        Ok(())
    }

    fn finish(&mut self, ctx: &mut PipelineContext) -> Result<()> {
        if self.finished {
            return Err(ReduceError::invalid_state("writer was already finished"));
        }
        self.finished = true;
        self.submit_batch()?;
        for serialized in self.queue.pop_all()? {
            self.write_serialized(serialized)?;
        }
        self.writer.flush()?;

        ctx.incr("output.records", self.metrics.records_written as u64);
        ctx.incr("output.bytes", self.metrics.bytes_written as u64);
        info!(
            records = self.metrics.records_written,
            bytes = %format_bytes(self.metrics.bytes_written),
            batches = self.metrics.batches_written,
            "output written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_batches_keep_record_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.ndjson");
        let file = BufWriter::new(File::create(&path).unwrap());
        let mut writer = BatchWriter::new(Box::new(file), 3, 4).unwrap();
        let mut ctx = PipelineContext::default();

        for i in 0..20 {
            writer.add(&mut ctx, Record::from_iter([("n", i)])).unwrap();
        }
        writer.finish(&mut ctx).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let numbers: Vec<i64> = content
            .lines()
            .map(|line| Record::from_json_line(line).unwrap().get("n").unwrap().as_i64().unwrap())
            .collect();
        assert_eq!(numbers, (0..20).collect::<Vec<_>>());
        assert_eq!(writer.metrics().records_written, 20);
        assert_eq!(writer.metrics().batches_written, 7);
        assert_eq!(writer.metrics().bytes_written, content.len());
        assert_eq!(ctx.counter("output.records"), 20);
    }

    #[tokio::test]
    async fn test_buffered_writes_inside_async_runtime() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("async.ndjson");
        let mut writer = BatchWriter::to_path(&path, 3).unwrap().with_batch_size(2).unwrap();
        let mut ctx = PipelineContext::default();

        for i in 0..9 {
            writer.add(&mut ctx, Record::from_iter([("n", i)])).unwrap();
        }
        writer.finish(&mut ctx).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 9);
        assert_eq!(writer.metrics().batches_written, 5);
    }

    #[test]
    fn test_rejects_bad_batch_size_and_late_records() {
        assert!(BatchWriter::new(Box::new(Vec::new()), 0, 1).is_err());

        let mut writer = BatchWriter::new(Box::new(Vec::new()), 10, 1).unwrap();
        let mut ctx = PipelineContext::default();
        writer.finish(&mut ctx).unwrap();
        assert!(writer.add(&mut ctx, Record::new()).is_err());
        assert!(writer.finish(&mut ctx).is_err());
    }
}
