pub mod map_reduce;
pub mod repeat;
pub mod sort;
pub mod top;
pub mod unique;


pub use map_reduce::{MapReduceConfig, MapReduceProcessor};
pub use repeat::{RepeatConfig, RepeatProcessor};
pub use sort::{SortConfig, SortProcessor};
pub use top::{TopConfig, TopProcessor};
pub use unique::{UniqueConfig, UniqueProcessor};

use std::time::Duration;

use crate::context::PipelineContext;
use crate::error::{ReduceError, Result};
use crate::record::Record;

/// Anything records can be pushed into: a processor, a sink, a writer.
///
/// `finish` marks the end of the stream. Processors flush whatever they hold
/// and then finish their own downstream endpoint.
pub trait Endpoint: Send {
    fn name(&self) -> &str;

    fn add(&mut self, ctx: &mut PipelineContext, record: Record) -> Result<()>;

    fn finish(&mut self, ctx: &mut PipelineContext) -> Result<()>;
}

impl Endpoint for Box<dyn Endpoint> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn add(&mut self, ctx: &mut PipelineContext, record: Record) -> Result<()> {
        (**self).add(ctx, record)
    }

    fn finish(&mut self, ctx: &mut PipelineContext) -> Result<()> {
        (**self).finish(ctx)
    }
}

/// Lifecycle shared by every processor. Finishing is one-shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessorState {
    #[default]
    Idle,
    Mapping,
    Reducing,
    Done,
}

impl ProcessorState {
    /// Moves `Idle` to `Mapping`; records arriving after finishing are rejected.
    pub(crate) fn begin_mapping(&mut self, processor: &str) -> Result<()> {
        match self {
            ProcessorState::Idle => {
                *self = ProcessorState::Mapping;
                Ok(())
            }
            ProcessorState::Mapping => Ok(()),
            ProcessorState::Reducing | ProcessorState::Done => Err(ReduceError::invalid_state(
                format!("{} received a record after end of stream", processor),
            )),
        }
    }

    pub(crate) fn begin_reducing(&mut self, processor: &str) -> Result<()> {
        match self {
            ProcessorState::Idle | ProcessorState::Mapping => {
                *self = ProcessorState::Reducing;
                Ok(())
            }
            ProcessorState::Reducing | ProcessorState::Done => Err(ReduceError::invalid_state(
                format!("{} was already reduced", processor),
            )),
        }
    }
}

/// Record counts of one reduce phase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReduceStats {
    pub records_in: usize,
    pub pass_through: usize,
    pub after_sort: usize,
    pub after_dedup: usize,
    pub partitions: usize,
    pub elapsed: Duration,
}

impl ReduceStats {
    /// Records that left the processor by either route.
    pub fn records_out(&self) -> usize {
        self.pass_through + self.after_dedup
    }

    pub fn duplicates_removed(&self) -> usize {
        self.after_sort.saturating_sub(self.after_dedup)
    }
}
