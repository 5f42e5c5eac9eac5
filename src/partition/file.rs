use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use super::spill::SpillFile;
use super::{check_index, PartitionSettings, PartitionSource, PartitionWriter};
use crate::constants::*;
use crate::error::{ReduceError, Result};
use crate::keys::RecordComparer;
use crate::record::Record;

#[derive(Debug)]
enum Slot {
    Unopened,
    Open(SpillFile),
    Consumed,
}

/// Buckets backed by spill files under `{directory}/{processor_id}/`.
///
/// Files are created on the first record routed to a bucket, so a bucket
/// that never receives anything costs nothing on disk.
#[derive(Debug)]
pub struct FilePartitionWriter {
    hasher: Arc<dyn RecordComparer>,
    directory: PathBuf,
    processor_id: String,
    compress: bool,
    keep_files: bool,
    buffer_size: usize,
    slots: Vec<Slot>,
    records_written: usize,
}

impl FilePartitionWriter {
    pub fn new(settings: &PartitionSettings, hasher: Arc<dyn RecordComparer>) -> Result<Self> {
        settings.validate()?;
        let directory = settings.directory.join(&settings.processor_id);
        fs::create_dir_all(&directory)?;
        discard_stale_spills(&directory, &settings.processor_id);

        debug!(
            directory = %directory.display(),
            fan_out = settings.fan_out,
            compress = settings.compress,
            "created file partition writer"
        );

        Ok(Self {
            hasher,
            directory,
            processor_id: settings.processor_id.clone(),
            compress: settings.compress,
            keep_files: settings.keep_files,
            buffer_size: settings.buffer_size.max(BYTES_PER_KB),
            slots: (0..settings.fan_out).map(|_| Slot::Unopened).collect(),
            records_written: 0,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn spill_path(&self, partition: usize) -> PathBuf {
        spill_path(&self.directory, &self.processor_id, partition)
    }

    fn read_buffer_size(&self) -> usize {
        SPILL_READ_BUFFER_SIZE_KB * BYTES_PER_KB
    }
}

pub fn spill_path(directory: &Path, processor_id: &str, partition: usize) -> PathBuf {
    directory.join(format!(
        "{}_{}.{}",
        processor_id, partition, SPILL_FILE_EXTENSION
    ))
}

/// Leftovers from an interrupted run are never resumed.
fn discard_stale_spills(directory: &Path, processor_id: &str) {
    let Ok(entries) = fs::read_dir(directory) else {
        return;
    };
    let prefix = format!("{}_", processor_id);
    for entry in entries.flatten() {
        let path = entry.path();
        let is_stale = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|name| name.starts_with(&prefix) && name.ends_with(SPILL_FILE_EXTENSION))
            .unwrap_or(false);
        if is_stale {
            if let Err(e) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "failed to discard stale spill file");
            }
        }
    }
}

impl PartitionWriter for FilePartitionWriter {
    fn fan_out(&self) -> usize {
        self.slots.len()
    }

    fn hasher(&self) -> &Arc<dyn RecordComparer> {
        &self.hasher
    }

    fn write_to(&mut self, partition: usize, record: Record) -> Result<()> {
        check_index(partition, self.slots.len())?;
        if let Slot::Unopened = self.slots[partition] {
            let spill = SpillFile::create(
                self.spill_path(partition),
                self.compress,
                self.keep_files,
                self.buffer_size,
            )?;
            self.slots[partition] = Slot::Open(spill);
        }

        match &mut self.slots[partition] {
            Slot::Open(spill) => {
                spill.write(&record)?;
                self.records_written += 1;
                Ok(())
            }
            _ => Err(ReduceError::PartitionConsumed { partition }),
        }
    }

    fn take_partition(&mut self, partition: usize) -> Result<PartitionSource> {
        check_index(partition, self.slots.len())?;
        match std::mem::replace(&mut self.slots[partition], Slot::Consumed) {
            Slot::Unopened => Ok(PartitionSource::Memory(Vec::new())),
            Slot::Open(spill) => Ok(PartitionSource::Spill(spill.into_reader(self.read_buffer_size())?)),
            Slot::Consumed => Err(ReduceError::PartitionConsumed { partition }),
        }
    }

    fn records_written(&self) -> usize {
        self.records_written
    }

    fn close(&mut self) {
        for slot in &mut self.slots {
            if let Slot::Open(spill) = std::mem::replace(slot, Slot::Consumed) {
                spill.close();
            }
        }
        if !self.keep_files {
            // Only succeeds once the directory is empty.
            let _ = fs::remove_dir(&self.directory);
        }
    }
}

impl Drop for FilePartitionWriter {
    fn drop(&mut self) {
        self.close();
    }
}
