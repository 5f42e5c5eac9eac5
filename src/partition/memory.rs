use std::sync::Arc;

use super::{check_index, PartitionSource, PartitionWriter};
use crate::error::{ReduceError, Result};
use crate::keys::RecordComparer;
use crate::record::Record;

/// In-memory buckets; same contract as the file writer without any I/O.
#[derive(Debug)]
pub struct MemoryPartitionWriter {
    hasher: Arc<dyn RecordComparer>,
    partitions: Vec<Option<Vec<Record>>>,
    records_written: usize,
}

impl MemoryPartitionWriter {
    pub fn new(fan_out: usize, hasher: Arc<dyn RecordComparer>) -> Self {
        Self {
            hasher,
            partitions: (0..fan_out.max(1)).map(|_| Some(Vec::new())).collect(),
            records_written: 0,
        }
    }

    pub fn partition_len(&self, partition: usize) -> Option<usize> {
        self.partitions.get(partition)?.as_ref().map(Vec::len)
    }
}

impl PartitionWriter for MemoryPartitionWriter {
    fn fan_out(&self) -> usize {
        self.partitions.len()
    }

    fn hasher(&self) -> &Arc<dyn RecordComparer> {
        &self.hasher
    }

    fn write_to(&mut self, partition: usize, record: Record) -> Result<()> {
        check_index(partition, self.partitions.len())?;
        match &mut self.partitions[partition] {
            Some(records) => {
                records.push(record);
                self.records_written += 1;
                Ok(())
            }
            None => Err(ReduceError::PartitionConsumed { partition }),
        }
    }

    fn take_partition(&mut self, partition: usize) -> Result<PartitionSource> {
        check_index(partition, self.partitions.len())?;
        self.partitions[partition]
            .take()
            .map(PartitionSource::Memory)
            .ok_or(ReduceError::PartitionConsumed { partition })
    }

    fn records_written(&self) -> usize {
        self.records_written
    }

    fn close(&mut self) {
        for slot in &mut self.partitions {
            *slot = None;
        }
    }
}
