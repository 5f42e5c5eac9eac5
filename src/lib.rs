// Record model and key paths
pub mod record;

// Typed keys, comparers and hashers
pub mod keys;

// Hash-partitioned spill storage
pub mod partition;

// Bounded queue of in-flight background tasks
pub mod task_queue;

// Reducer actions applied to groups
pub mod actions;

// Post processors: sort, map-reduce, top, unique, repeat
pub mod processors;

// Output endpoints
pub mod sinks;

// Pipeline configuration
pub mod config;

// Config-driven processor chains
pub mod pipeline;

pub mod constants;
pub mod context;
pub mod error;
pub mod utils;

// Re-export main types for convenience
pub use context::PipelineContext;
pub use error::{ReduceError, Result};
pub use keys::{KeyKind, KeySet, RecordComparer, TypedKey};
pub use processors::{
    Endpoint, MapReduceProcessor, ReduceStats, RepeatProcessor, SortProcessor, TopProcessor,
    UniqueProcessor,
};
pub use record::{KeyPath, Record, Value};
