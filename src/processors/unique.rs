use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{Endpoint, ProcessorState};
use crate::context::PipelineContext;
use crate::error::Result;
use crate::keys::{KeySet, KeyTuple, RecordComparer};
use crate::record::Record;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniqueConfig {
    #[serde(default = "default_id")]
    pub id: String,
    pub keys: KeySet,
}

fn default_id() -> String {
    String::from("unique")
}

impl UniqueConfig {
    pub fn new(keys: KeySet) -> Self {
        Self {
            id: default_id(),
            keys,
        }
    }
}

/// Streaming global dedup: the first record of every key tuple passes
/// through at once, later ones are dropped.
///
/// Key direction does not matter for membership, so the set orders tuples
/// by their natural order.
pub struct UniqueProcessor {
    id: String,
    comparer: Arc<dyn RecordComparer>,
    seen: BTreeSet<KeyTuple>,
    records_in: u64,
    dropped: u64,
    state: ProcessorState,
    next: Box<dyn Endpoint>,
}

impl UniqueProcessor {
    pub fn new(config: &UniqueConfig, next: Box<dyn Endpoint>) -> Self {
        Self {
            id: config.id.clone(),
            comparer: config.keys.comparer(),
            seen: BTreeSet::new(),
            records_in: 0,
            dropped: 0,
            state: ProcessorState::Idle,
            next,
        }
    }

    pub fn distinct(&self) -> usize {
        self.seen.len()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Endpoint for UniqueProcessor {
    fn name(&self) -> &str {
        &self.id
    }

    fn add(&mut self, ctx: &mut PipelineContext, record: Record) -> Result<()> {
        self.state.begin_mapping(&self.id)?;
        self.records_in += 1;
        let keys = self.comparer.get_keys(&record)?;
        if self.seen.insert(keys) {
            self.next.add(ctx, record)
        } else {
            self.dropped += 1;
            Ok(())
        }
    }

    fn finish(&mut self, ctx: &mut PipelineContext) -> Result<()> {
        self.state.begin_reducing(&self.id)?;
        self.state = ProcessorState::Done;

        ctx.incr(&format!("{}.records_in", self.id), self.records_in);
        ctx.incr(&format!("{}.dropped", self.id), self.dropped);
        info!(
            processor = %self.id,
            records_in = self.records_in,
            distinct = self.seen.len(),
            dropped = self.dropped,
            "unique filter finished"
        );

        self.next.finish(ctx)
    }
}
