use serde::{Deserialize, Serialize};

use super::{Endpoint, MapReduceConfig, MapReduceProcessor, ReduceStats};
use crate::actions::ActionRegistry;
use crate::context::PipelineContext;
use crate::error::Result;
use crate::keys::KeySet;
use crate::record::Record;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortConfig {
    #[serde(default = "default_id")]
    pub id: String,
    pub keys: KeySet,
}

fn default_id() -> String {
    String::from("sort")
}

impl SortConfig {
    pub fn new(keys: KeySet) -> Self {
        Self {
            id: default_id(),
            keys,
        }
    }

    fn map_reduce(&self) -> MapReduceConfig {
        let mut config = MapReduceConfig::new(&self.id, self.keys.clone());
        config.fan_out = 1;
        config.in_memory = true;
        config
    }

    pub fn validate(&self) -> Result<()> {
        self.map_reduce().validate()
    }
}

/// Total in-memory sort: a single unspilled partition, nothing passed through.
pub struct SortProcessor {
    inner: MapReduceProcessor,
}

impl SortProcessor {
    pub fn new(config: &SortConfig, next: Box<dyn Endpoint>) -> Result<Self> {
        Ok(Self {
            inner: MapReduceProcessor::new(&config.map_reduce(), &ActionRegistry::new(), next)?,
        })
    }

    pub fn stats(&self) -> &ReduceStats {
        self.inner.stats()
    }
}

impl Endpoint for SortProcessor {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn add(&mut self, ctx: &mut PipelineContext, record: Record) -> Result<()> {
        self.inner.add(ctx, record)
    }

    fn finish(&mut self, ctx: &mut PipelineContext) -> Result<()> {
        self.inner.finish(ctx)
    }
}
