use std::cmp::Ordering;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{Endpoint, ProcessorState, ReduceStats};
use crate::actions::{apply_actions, build_actions, ActionRegistry, ActionSpec, ReduceAction};
use crate::constants::*;
use crate::context::PipelineContext;
use crate::error::{ReduceError, Result};
use crate::keys::{KeySet, KeyTuple, RecordComparer, TypedKey};
use crate::partition::{create_writer, PartitionSettings, PartitionWriter, WriteOutcome};
use crate::record::Record;
use crate::task_queue::AsyncTaskQueue;
use crate::utils::{available_memory_bytes, format_bytes, partition_memory_budget};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapReduceConfig {
    /// Names the spill directory and the spill files.
    pub id: String,
    pub sort_keys: KeySet,
    /// Partitioning keys. Defaults to the dedup keys, or the sort keys
    /// when there are none; must be a prefix of the dedup keys.
    #[serde(default)]
    pub hash_keys: Option<KeySet>,
    /// Partition by the first `n` sort keys instead of naming hash keys.
    #[serde(default)]
    pub hash_key_count: Option<usize>,
    #[serde(default)]
    pub dedup_keys: Option<KeySet>,
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
    #[serde(default = "default_fan_out")]
    pub fan_out: usize,
    /// Base directory for spill files; the pipeline fills it in when absent.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default)]
    pub compress: bool,
    #[serde(default)]
    pub keep_files: bool,
    #[serde(default)]
    pub in_memory: bool,
    #[serde(default = "default_read_parallelism")]
    pub read_parallelism: usize,
    #[serde(default = "default_max_null_key_index")]
    pub max_null_key_index: i32,
}

fn default_fan_out() -> usize {
    DEFAULT_FAN_OUT
}

fn default_read_parallelism() -> usize {
    DEFAULT_READ_PARALLELISM
}

fn default_max_null_key_index() -> i32 {
    DEFAULT_MAX_NULL_KEY_INDEX
}

impl MapReduceConfig {
    pub fn new(id: &str, sort_keys: KeySet) -> Self {
        Self {
            id: id.to_string(),
            sort_keys,
            hash_keys: None,
            hash_key_count: None,
            dedup_keys: None,
            actions: Vec::new(),
            fan_out: DEFAULT_FAN_OUT,
            directory: None,
            compress: false,
            keep_files: false,
            in_memory: false,
            read_parallelism: DEFAULT_READ_PARALLELISM,
            max_null_key_index: DEFAULT_MAX_NULL_KEY_INDEX,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty()
            || !self
                .id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ReduceError::config(format!(
                "Processor id '{}' must be non-empty and use only letters, digits, '-' and '_'",
                self.id
            )));
        }

        if self.fan_out == 0 || self.fan_out > MAX_FAN_OUT {
            return Err(ReduceError::config(format!(
                "Fan-out must be between 1 and {}, got {}",
                MAX_FAN_OUT, self.fan_out
            )));
        }

        if self.read_parallelism == 0 || self.read_parallelism > MAX_TASK_QUEUE_CAPACITY {
            return Err(ReduceError::config(format!(
                "Read parallelism must be between 1 and {}, got {}",
                MAX_TASK_QUEUE_CAPACITY, self.read_parallelism
            )));
        }

        if self.hash_keys.is_some() && self.hash_key_count.is_some() {
            return Err(ReduceError::config(
                "Set either 'hash_keys' or 'hash_key_count', not both",
            ));
        }

        if let Some(count) = self.hash_key_count {
            if count == 0 || count > self.sort_keys.len() {
                return Err(ReduceError::config(format!(
                    "hash_key_count {} out of range 1..={}",
                    count,
                    self.sort_keys.len()
                )));
            }
        }

        if !self.actions.is_empty() && self.dedup_keys.is_none() {
            return Err(ReduceError::config("Reducer actions need 'dedup_keys'"));
        }

        if let (Some(dedup), Some(hash)) = (&self.dedup_keys, self.explicit_hash_keys()) {
            let splits_groups = hash.len() > dedup.len()
                || !hash.iter().zip(dedup.keys()).all(|(h, d)| same_grouping(h, d));
            if splits_groups {
                return Err(ReduceError::config(
                    "Hash keys must be a prefix of 'dedup_keys' so each group stays in one partition",
                ));
            }
        }

        for action in &self.actions {
            action.validate()?;
        }

        Ok(())
    }

    fn explicit_hash_keys(&self) -> Option<&[TypedKey]> {
        match (&self.hash_keys, self.hash_key_count) {
            (Some(keys), _) => Some(keys.keys()),
            (None, Some(count)) => self.sort_keys.keys().get(..count),
            (None, None) => None,
        }
    }

    /// Without explicit hash keys, records are partitioned by the dedup
    /// keys when set, so a group never spans partitions.
    fn hasher(&self, sort: &Arc<dyn RecordComparer>) -> Result<Arc<dyn RecordComparer>> {
        match (&self.hash_keys, self.hash_key_count, &self.dedup_keys) {
            (Some(keys), _, _) => Ok(keys.comparer()),
            (None, Some(count), _) => sort.clone_prefix(count),
            (None, None, Some(dedup)) if self.sort_keys.keys().starts_with(dedup.keys()) => {
                sort.clone_prefix(dedup.len())
            }
            (None, None, Some(dedup)) => Ok(dedup.comparer()),
            (None, None, None) => Ok(sort.clone()),
        }
    }

    fn partition_settings(&self) -> PartitionSettings {
        PartitionSettings {
            fan_out: self.fan_out,
            directory: self
                .directory
                .clone()
                .unwrap_or_else(|| std::env::temp_dir().join(TEMP_DIR_NAME)),
            processor_id: self.id.clone(),
            compress: self.compress,
            keep_files: self.keep_files,
            in_memory: self.in_memory,
            buffer_size: SPILL_WRITE_BUFFER_SIZE_KB * BYTES_PER_KB,
        }
    }
}

/// Direction does not affect which partition a key hashes to.
fn same_grouping(a: &TypedKey, b: &TypedKey) -> bool {
    a.path == b.path && a.kind == b.kind && a.case_insensitive == b.case_insensitive
}

/// Hash-partitions records while mapping, then sorts, groups and reduces
/// each partition in order.
pub struct MapReduceProcessor {
    id: String,
    state: ProcessorState,
    writer: Option<Box<dyn PartitionWriter>>,
    sort: Arc<dyn RecordComparer>,
    dedup: Option<Arc<dyn RecordComparer>>,
    actions: Vec<Box<dyn ReduceAction>>,
    max_null_key_index: i32,
    read_parallelism: usize,
    estimated_bytes: usize,
    stats: ReduceStats,
    next: Box<dyn Endpoint>,
}

impl MapReduceProcessor {
    pub fn new(config: &MapReduceConfig, registry: &ActionRegistry, next: Box<dyn Endpoint>) -> Result<Self> {
        config.validate()?;

        let sort = config.sort_keys.comparer();
        let hasher = config.hasher(&sort)?;
        let dedup = config.dedup_keys.as_ref().map(KeySet::comparer);
        let actions = build_actions(&config.actions, registry)?;

        if let Some(dedup_keys) = &config.dedup_keys {
            let adjacent = config.sort_keys.keys().starts_with(dedup_keys.keys());
            if !adjacent {
                warn!(
                    processor = %config.id,
                    "dedup keys are not a prefix of the sort keys; equal keys may not be adjacent"
                );
            }
        }

        let writer = create_writer(&config.partition_settings(), hasher)?;

        debug!(
            processor = %config.id,
            fan_out = config.fan_out,
            sort_keys = config.sort_keys.len(),
            dedup = dedup.is_some(),
            actions = actions.len(),
            "created map-reduce processor"
        );

        Ok(Self {
            id: config.id.clone(),
            state: ProcessorState::Idle,
            writer: Some(writer),
            sort,
            dedup,
            actions,
            max_null_key_index: config.max_null_key_index,
            read_parallelism: config.read_parallelism,
            estimated_bytes: 0,
            stats: ReduceStats::default(),
            next,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> ProcessorState {
        self.state
    }

    pub fn stats(&self) -> &ReduceStats {
        &self.stats
    }

    /// Routes one record into its partition, or straight downstream when
    /// its hash keys are too incomplete.
    pub fn map(&mut self, ctx: &mut PipelineContext, record: Record) -> Result<()> {
        self.state.begin_mapping(&self.id)?;
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| ReduceError::invalid_state("partition writer already released"))?;

        self.stats.records_in += 1;
        let size = record.estimated_size();
        match writer.optional_write(record, self.max_null_key_index)? {
            WriteOutcome::Written => {
                self.estimated_bytes += size;
            }
            WriteOutcome::Rejected(record) => {
                self.stats.pass_through += 1;
                self.next.add(ctx, record)?;
            }
        }

        if self.stats.records_in % PROGRESS_REPORT_INTERVAL_RECORDS == 0 {
            debug!(processor = %self.id, records = self.stats.records_in, "mapping");
        }
        Ok(())
    }

    /// Runs the reduce phase, emitting every partition downstream in order.
    /// Can only run once.
    pub fn call_next_post_processor(&mut self, ctx: &mut PipelineContext) -> Result<ReduceStats> {
        self.state.begin_reducing(&self.id)?;
        let started = Instant::now();

        let mut writer = self
            .writer
            .take()
            .ok_or_else(|| ReduceError::invalid_state("partition writer already released"))?;
        let fan_out = writer.fan_out();
        self.warn_if_partitions_too_large(fan_out);

        if self.read_parallelism > 1 {
            let mut queue = AsyncTaskQueue::new(&format!("{}-read", self.id), self.read_parallelism)?;
            for partition in 0..fan_out {
                let mut reader = writer.reader(partition, Some(self.sort.clone()))?;
                let loaded =
                    queue.push_and_optional_pop(move || Ok((reader.index(), reader.get_all()?)))?;
                if let Some((done, records)) = loaded {
                    self.reduce_partition(ctx, done, records)?;
                }
            }
            for (done, records) in queue.pop_all()? {
                self.reduce_partition(ctx, done, records)?;
            }
        } else {
            for partition in 0..fan_out {
                let records = writer.reader(partition, Some(self.sort.clone()))?.get_all()?;
                self.reduce_partition(ctx, partition, records)?;
            }
        }

        writer.close();
        self.stats.elapsed = started.elapsed();
        self.state = ProcessorState::Done;

        ctx.incr(&format!("{}.records_in", self.id), self.stats.records_in as u64);
        ctx.incr(&format!("{}.pass_through", self.id), self.stats.pass_through as u64);
        ctx.incr(&format!("{}.after_sort", self.id), self.stats.after_sort as u64);
        ctx.incr(&format!("{}.after_dedup", self.id), self.stats.after_dedup as u64);

        info!(
            processor = %self.id,
            records_in = self.stats.records_in,
            pass_through = self.stats.pass_through,
            after_sort = self.stats.after_sort,
            after_dedup = self.stats.after_dedup,
            partitions = self.stats.partitions,
            elapsed_ms = self.stats.elapsed.as_millis() as u64,
            "reduce finished"
        );

        Ok(self.stats.clone())
    }

    fn warn_if_partitions_too_large(&self, fan_out: usize) {
        if self.estimated_bytes == 0 {
            return;
        }
        let per_partition = self.estimated_bytes / fan_out.max(1);
        let budget = partition_memory_budget(available_memory_bytes());
        if per_partition > budget {
            warn!(
                processor = %self.id,
                per_partition = %format_bytes(per_partition),
                budget = %format_bytes(budget),
                "partitions may not fit in memory; raise the fan-out"
            );
        }
    }

    fn reduce_partition(&mut self, ctx: &mut PipelineContext, partition: usize, records: Vec<Record>) -> Result<()> {
        self.stats.partitions += 1;
        self.stats.after_sort += records.len();

        let Some(dedup) = self.dedup.clone() else {
            self.stats.after_dedup += records.len();
            for record in records {
                self.next.add(ctx, record)?;
            }
            return self.report_progress(partition);
        };

        let keys = records
            .par_iter()
            .map(|record| dedup.get_keys(record))
            .collect::<Result<Vec<KeyTuple>>>()?;

        let mut group: Vec<Record> = Vec::new();
        let mut group_key: Option<KeyTuple> = None;
        for (record, key) in records.into_iter().zip(keys) {
            let same_group = group_key
                .as_ref()
                .is_some_and(|current| dedup.compare_keys(current, &key) == Ordering::Equal);
            if !same_group {
                self.emit_group(ctx, &mut group)?;
                group_key = Some(key);
            }
            group.push(record);
        }
        self.emit_group(ctx, &mut group)?;

        self.report_progress(partition)
    }

    fn emit_group(&mut self, ctx: &mut PipelineContext, group: &mut Vec<Record>) -> Result<()> {
        if group.is_empty() {
            return Ok(());
        }
        apply_actions(&self.actions, ctx, group)?;
        if let Some(first) = std::mem::take(group).into_iter().next() {
            self.stats.after_dedup += 1;
            self.next.add(ctx, first)?;
        }
        Ok(())
    }

    fn report_progress(&self, partition: usize) -> Result<()> {
        if (partition + 1) % PROGRESS_REPORT_INTERVAL_PARTITIONS == 0 {
            debug!(
                processor = %self.id,
                partition,
                emitted = self.stats.after_dedup,
                "reducing"
            );
        }
        Ok(())
    }
}

impl Endpoint for MapReduceProcessor {
    fn name(&self) -> &str {
        &self.id
    }

    fn add(&mut self, ctx: &mut PipelineContext, record: Record) -> Result<()> {
        self.map(ctx, record)
    }

    fn finish(&mut self, ctx: &mut PipelineContext) -> Result<()> {
        self.call_next_post_processor(ctx)?;
        self.next.finish(ctx)
    }
}
