pub mod batch_writer;

pub use batch_writer::{BatchWriteMetrics, BatchWriter};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::context::PipelineContext;
use crate::error::{ReduceError, Result};
use crate::processors::Endpoint;
use crate::record::Record;

/// Keeps every record it receives. Clones share the same storage, so one
/// clone can go into a chain while another is kept for inspection.
#[derive(Debug, Clone, Default)]
pub struct CollectingEndpoint {
    records: Arc<Mutex<Vec<Record>>>,
    finished: Arc<AtomicBool>,
}

impl CollectingEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub fn records(&self) -> Vec<Record> {
        self.records.lock().clone()
    }

    pub fn take(&self) -> Vec<Record> {
        std::mem::take(&mut *self.records.lock())
    }
}

impl Endpoint for CollectingEndpoint {
    fn name(&self) -> &str {
        "collect"
    }

    fn add(&mut self, _ctx: &mut PipelineContext, record: Record) -> Result<()> {
        if self.is_finished() {
            return Err(ReduceError::invalid_state("collector received a record after finish"));
        }
        self.records.lock().push(record);
        Ok(())
    }

    fn finish(&mut self, _ctx: &mut PipelineContext) -> Result<()> {
        self.finished.store(true, Ordering::Release);
        Ok(())
    }
}

/// Drops everything, counting what it drops.
#[derive(Debug, Default)]
pub struct NullEndpoint {
    received: u64,
}

impl NullEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> u64 {
        self.received
    }
}

impl Endpoint for NullEndpoint {
    fn name(&self) -> &str {
        "null"
    }

    fn add(&mut self, _ctx: &mut PipelineContext, _record: Record) -> Result<()> {
        self.received += 1;
        Ok(())
    }

    fn finish(&mut self, ctx: &mut PipelineContext) -> Result<()> {
        ctx.incr("null.received", self.received);
        Ok(())
    }
}
