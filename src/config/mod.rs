pub mod model;

#[cfg(test)]
mod tests;

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use tokio::fs;

use crate::constants::{MAX_TASK_QUEUE_CAPACITY, MAX_WRITE_BATCH_SIZE_RECORDS};

// Re-export main types
pub use self::model::{Config, LoggingConfig, OutputConfig, ProcessorConfig};

impl Config {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_json(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let mut config: Config = serde_json::from_str(content)?;
        config.apply_defaults();
        config.validate()?;
        Ok(config)
    }

    /// Points processors without their own spill directory at the shared one.
    fn apply_defaults(&mut self) {
        let temp_directory = self.temp_directory();
        for processor in &mut self.processors {
            if let ProcessorConfig::MapReduce(config) = processor {
                if config.directory.is_none() {
                    config.directory = Some(temp_directory.clone());
                }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.processors.is_empty() {
            anyhow::bail!("at least one processor must be configured");
        }

        if !matches!(self.logging.verbosity.as_str(), "silent" | "normal" | "verbose") {
            anyhow::bail!("verbosity must be 'silent', 'normal', or 'verbose'");
        }

        if self.output.write_buffering == 0 || self.output.write_buffering > MAX_TASK_QUEUE_CAPACITY {
            anyhow::bail!("write_buffering must be between 1 and {}", MAX_TASK_QUEUE_CAPACITY);
        }

        if self.output.batch_size == 0 || self.output.batch_size > MAX_WRITE_BATCH_SIZE_RECORDS {
            anyhow::bail!("batch_size must be between 1 and {}", MAX_WRITE_BATCH_SIZE_RECORDS);
        }

        let mut ids = HashSet::new();
        for processor in &self.processors {
            if !ids.insert(processor.id()) {
                anyhow::bail!("processor id '{}' is used more than once", processor.id());
            }
            match processor {
                ProcessorConfig::Sort(c) => c.validate(),
                ProcessorConfig::MapReduce(c) => c.validate(),
                ProcessorConfig::Top(c) => c.validate(),
                ProcessorConfig::Unique(_) => Ok(()),
                ProcessorConfig::Repeat(c) => c.validate(),
            }
            .with_context(|| format!("{} processor '{}'", processor.kind(), processor.id()))?;
        }

        Ok(())
    }
}
