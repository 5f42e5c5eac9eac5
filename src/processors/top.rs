use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{Endpoint, ProcessorState};
use crate::context::PipelineContext;
use crate::error::{ReduceError, Result};
use crate::keys::{KeySet, KeyTuple, RecordComparer};
use crate::record::Record;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopConfig {
    #[serde(default = "default_id")]
    pub id: String,
    pub keys: KeySet,
    pub count: usize,
}

fn default_id() -> String {
    String::from("top")
}

impl TopConfig {
    pub fn new(keys: KeySet, count: usize) -> Self {
        Self {
            id: default_id(),
            keys,
            count,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.count == 0 {
            return Err(ReduceError::config("Top count must be at least 1"));
        }
        Ok(())
    }
}

/// Heap entry. The greatest entry is the worst kept record; among equal
/// keys the later arrival is worse, so ties keep the earliest records.
struct Ranked {
    keys: KeyTuple,
    seq: u64,
    record: Record,
    comparer: Arc<dyn RecordComparer>,
}

impl Ranked {
    fn rank(&self, other: &Self) -> Ordering {
        self.comparer
            .compare_keys(&self.keys, &other.keys)
            .then(self.seq.cmp(&other.seq))
    }
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.rank(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank(other)
    }
}

/// Keeps the `count` best records by the configured keys and emits them
/// best first at end of stream.
pub struct TopProcessor {
    id: String,
    count: usize,
    comparer: Arc<dyn RecordComparer>,
    heap: BinaryHeap<Ranked>,
    seen: u64,
    state: ProcessorState,
    next: Box<dyn Endpoint>,
}

impl TopProcessor {
    pub fn new(config: &TopConfig, next: Box<dyn Endpoint>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            id: config.id.clone(),
            count: config.count,
            comparer: config.keys.comparer(),
            heap: BinaryHeap::with_capacity(config.count.saturating_add(1).min(1 << 16)),
            seen: 0,
            state: ProcessorState::Idle,
            next,
        })
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn seen(&self) -> u64 {
        self.seen
    }

    fn offer(&mut self, record: Record) -> Result<()> {
        let candidate = Ranked {
            keys: self.comparer.get_keys(&record)?,
            seq: self.seen,
            record,
            comparer: self.comparer.clone(),
        };
        self.seen += 1;

        if self.heap.len() < self.count {
            self.heap.push(candidate);
            return Ok(());
        }
        let outranks_worst = self
            .heap
            .peek()
            .is_some_and(|worst| candidate.cmp(worst) == Ordering::Less);
        if outranks_worst {
            self.heap.pop();
            self.heap.push(candidate);
        }
        Ok(())
    }
}

impl Endpoint for TopProcessor {
    fn name(&self) -> &str {
        &self.id
    }

    fn add(&mut self, _ctx: &mut PipelineContext, record: Record) -> Result<()> {
        self.state.begin_mapping(&self.id)?;
        self.offer(record)
    }

    fn finish(&mut self, ctx: &mut PipelineContext) -> Result<()> {
        self.state.begin_reducing(&self.id)?;
        let kept = std::mem::take(&mut self.heap).into_sorted_vec();
        let emitted = kept.len();
        for ranked in kept {
            self.next.add(ctx, ranked.record)?;
        }
        self.state = ProcessorState::Done;

        ctx.incr(&format!("{}.records_in", self.id), self.seen);
        ctx.incr(&format!("{}.emitted", self.id), emitted as u64);
        info!(processor = %self.id, seen = self.seen, emitted, "top selection finished");

        self.next.finish(ctx)
    }
}
