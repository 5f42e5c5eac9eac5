pub mod file;
pub mod memory;
pub mod reader;
pub mod spill;


pub use file::FilePartitionWriter;
pub use memory::MemoryPartitionWriter;
pub use reader::{sort_records, PartitionReader, PartitionSource};
pub use spill::{SpillFile, SpillGuard, SpillReader};

use std::path::PathBuf;
use std::sync::Arc;

use crate::constants::*;
use crate::error::{ReduceError, Result};
use crate::keys::RecordComparer;
use crate::record::Record;

/// Result of a conditional write; a rejected record is handed back.
#[derive(Debug)]
pub enum WriteOutcome {
    Written,
    Rejected(Record),
}

impl WriteOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, WriteOutcome::Written)
    }
}

/// Routes records into `fan_out` buckets by key hash.
///
/// Each bucket has one writer and, once `reader` has been called for it,
/// exactly one reader. Asking twice for the same bucket is an error.
pub trait PartitionWriter: Send {
    fn fan_out(&self) -> usize;

    fn hasher(&self) -> &Arc<dyn RecordComparer>;

    fn write_to(&mut self, partition: usize, record: Record) -> Result<()>;

    /// Detaches a bucket's contents so they can be read elsewhere.
    fn take_partition(&mut self, partition: usize) -> Result<PartitionSource>;

    fn records_written(&self) -> usize;

    /// Releases every bucket. Failures are logged per bucket and never stop
    /// the others from being released.
    fn close(&mut self);

    fn partition_of(&self, record: &Record) -> Result<usize> {
        Ok(self.hasher().hash(record)?.partition(self.fan_out()))
    }

    fn write(&mut self, record: Record) -> Result<()> {
        let partition = self.partition_of(&record)?;
        self.write_to(partition, record)
    }

    /// Writes only when no key more significant than `max_null_key_index`
    /// is null.
    fn optional_write(&mut self, record: Record, max_null_key_index: i32) -> Result<WriteOutcome> {
        let hash = self.hasher().hash(&record)?;
        if hash.first_null_key_index > max_null_key_index {
            return Ok(WriteOutcome::Rejected(record));
        }
        self.write_to(hash.partition(self.fan_out()), record)?;
        Ok(WriteOutcome::Written)
    }

    fn reader(&mut self, partition: usize, sort: Option<Arc<dyn RecordComparer>>) -> Result<PartitionReader> {
        let source = self.take_partition(partition)?;
        Ok(PartitionReader::new(partition, source, sort))
    }
}

#[derive(Debug, Clone)]
pub struct PartitionSettings {
    pub fan_out: usize,
    pub directory: PathBuf,
    pub processor_id: String,
    pub compress: bool,
    pub keep_files: bool,
    pub in_memory: bool,
    pub buffer_size: usize,
}

impl PartitionSettings {
    pub fn in_memory(fan_out: usize) -> Self {
        Self {
            fan_out,
            directory: std::env::temp_dir().join(TEMP_DIR_NAME),
            processor_id: String::from("memory"),
            compress: false,
            keep_files: false,
            in_memory: true,
            buffer_size: SPILL_WRITE_BUFFER_SIZE_KB * BYTES_PER_KB,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.fan_out == 0 || self.fan_out > MAX_FAN_OUT {
            return Err(ReduceError::config(format!(
                "Fan-out must be between 1 and {}, got {}",
                MAX_FAN_OUT, self.fan_out
            )));
        }
        if !self.in_memory && self.processor_id.trim().is_empty() {
            return Err(ReduceError::config("File partitions need a processor id"));
        }
        Ok(())
    }
}

/// A single bucket never needs spilling, so it always stays in memory.
pub fn create_writer(
    settings: &PartitionSettings,
    hasher: Arc<dyn RecordComparer>,
) -> Result<Box<dyn PartitionWriter>> {
    settings.validate()?;
    if settings.in_memory || settings.fan_out == 1 {
        Ok(Box::new(MemoryPartitionWriter::new(settings.fan_out, hasher)))
    } else {
        Ok(Box::new(FilePartitionWriter::new(settings, hasher)?))
    }
}

fn check_index(partition: usize, fan_out: usize) -> Result<()> {
    if partition >= fan_out {
        return Err(ReduceError::invalid_state(format!(
            "Partition {} out of range 0..{}",
            partition, fan_out
        )));
    }
    Ok(())
}
