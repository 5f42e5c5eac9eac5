use serde::{Deserialize, Serialize};

use super::{Endpoint, ProcessorState};
use crate::context::PipelineContext;
use crate::error::{ReduceError, Result};
use crate::record::{KeyPath, Record, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepeatConfig {
    #[serde(default = "default_id")]
    pub id: String,
    pub count: usize,
    /// Receives the 0-based copy number of each emitted record.
    #[serde(default)]
    pub counter_field: Option<KeyPath>,
}

fn default_id() -> String {
    String::from("repeat")
}

impl RepeatConfig {
    pub fn new(count: usize) -> Self {
        Self {
            id: default_id(),
            count,
            counter_field: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.count == 0 {
            return Err(ReduceError::config("Repeat count must be at least 1"));
        }
        Ok(())
    }
}

/// Emits every incoming record `count` times.
pub struct RepeatProcessor {
    id: String,
    count: usize,
    counter_field: Option<KeyPath>,
    records_in: u64,
    state: ProcessorState,
    next: Box<dyn Endpoint>,
}

impl RepeatProcessor {
    pub fn new(config: &RepeatConfig, next: Box<dyn Endpoint>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            id: config.id.clone(),
            count: config.count,
            counter_field: config.counter_field.clone(),
            records_in: 0,
            state: ProcessorState::Idle,
            next,
        })
    }
}

impl Endpoint for RepeatProcessor {
    fn name(&self) -> &str {
        &self.id
    }

    fn add(&mut self, ctx: &mut PipelineContext, record: Record) -> Result<()> {
        self.state.begin_mapping(&self.id)?;
        self.records_in += 1;

        for copy in 1..self.count {
            let mut repeated = record.clone();
            if let Some(field) = &self.counter_field {
                repeated.set_path(field, Value::Int(copy as i64 - 1))?;
            }
            self.next.add(ctx, repeated)?;
        }

        // The original goes last so only `count - 1` clones are made.
        let mut last = record;
        if let Some(field) = &self.counter_field {
            last.set_path(field, Value::Int(self.count as i64 - 1))?;
        }
        self.next.add(ctx, last)
    }

    fn finish(&mut self, ctx: &mut PipelineContext) -> Result<()> {
        self.state.begin_reducing(&self.id)?;
        self.state = ProcessorState::Done;
        ctx.incr(&format!("{}.records_in", self.id), self.records_in);
        ctx.incr(
            &format!("{}.emitted", self.id),
            self.records_in * self.count as u64,
        );
        self.next.finish(ctx)
    }
}
