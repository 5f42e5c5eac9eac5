use std::sync::Arc;

use rayon::prelude::*;

use super::spill::SpillReader;
use crate::error::Result;
use crate::keys::RecordComparer;
use crate::record::Record;

/// Everything one partition holds, detached from its writer.
pub enum PartitionSource {
    Memory(Vec<Record>),
    Spill(SpillReader),
}

enum Cursor {
    Memory(std::vec::IntoIter<Record>),
    Spill(SpillReader),
    Closed,
}

/// Forward-only enumerator over one partition.
///
/// With a comparer the whole partition is drained, sorted and replayed on
/// the first read, so a sorted partition must fit in memory.
pub struct PartitionReader {
    partition: usize,
    cursor: Cursor,
    sort: Option<Arc<dyn RecordComparer>>,
    loaded: bool,
}

impl PartitionReader {
    pub fn new(partition: usize, source: PartitionSource, sort: Option<Arc<dyn RecordComparer>>) -> Self {
        let cursor = match source {
            PartitionSource::Memory(records) => Cursor::Memory(records.into_iter()),
            PartitionSource::Spill(reader) => Cursor::Spill(reader),
        };
        Self {
            partition,
            cursor,
            sort,
            loaded: false,
        }
    }

    pub fn index(&self) -> usize {
        self.partition
    }

    pub fn is_sorted(&self) -> bool {
        self.sort.is_some()
    }

    pub fn get_next(&mut self) -> Result<Option<Record>> {
        if self.sort.is_some() && !self.loaded {
            self.load()?;
        }
        match &mut self.cursor {
            Cursor::Memory(records) => Ok(records.next()),
            Cursor::Spill(reader) => reader.next_record(),
            Cursor::Closed => Ok(None),
        }
    }

    pub fn get_all(&mut self) -> Result<Vec<Record>> {
        if !self.loaded {
            self.load()?;
        }
        match std::mem::replace(&mut self.cursor, Cursor::Closed) {
            Cursor::Memory(records) => Ok(records.collect()),
            Cursor::Spill(mut reader) => {
                let mut records = Vec::new();
                while let Some(record) = reader.next_record()? {
                    records.push(record);
                }
                reader.close();
                Ok(records)
            }
            Cursor::Closed => Ok(Vec::new()),
        }
    }

    /// Pulls the rest of the partition into memory, sorting it when a
    /// comparer is set. Spill files are released afterwards.
    pub fn load(&mut self) -> Result<()> {
        if self.loaded {
            return Ok(());
        }
        let mut records = match std::mem::replace(&mut self.cursor, Cursor::Closed) {
            Cursor::Memory(records) => records.collect::<Vec<_>>(),
            Cursor::Spill(mut reader) => {
                let mut records = Vec::new();
                while let Some(record) = reader.next_record()? {
                    records.push(record);
                }
                reader.close();
                records
            }
            Cursor::Closed => Vec::new(),
        };

        if let Some(comparer) = &self.sort {
            records = sort_records(records, comparer.as_ref())?;
        }
        self.cursor = Cursor::Memory(records.into_iter());
        self.loaded = true;
        Ok(())
    }

    /// Idempotent.
    pub fn close(&mut self) {
        if let Cursor::Spill(reader) = std::mem::replace(&mut self.cursor, Cursor::Closed) {
            reader.close();
        }
    }
}

impl Iterator for PartitionReader {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.get_next().transpose()
    }
}

/// Stable sort by materialized keys, so every key is extracted once.
pub fn sort_records(records: Vec<Record>, comparer: &dyn RecordComparer) -> Result<Vec<Record>> {
    let mut keyed = records
        .into_par_iter()
        .map(|record| comparer.get_keys(&record).map(|keys| (keys, record)))
        .collect::<Result<Vec<_>>>()?;
    keyed.par_sort_by(|a, b| comparer.compare_keys(&a.0, &b.0));
    Ok(keyed.into_iter().map(|(_, record)| record).collect())
}
