use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_WRITE_BATCH_SIZE_RECORDS, DEFAULT_WRITE_BUFFERING, TEMP_DIR_NAME};
use crate::processors::{MapReduceConfig, RepeatConfig, SortConfig, TopConfig, UniqueConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_name")]
    pub name: String,
    /// Base directory for spill files of processors that do not set one.
    #[serde(default)]
    pub temp_directory: Option<PathBuf>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub output: OutputConfig,
    /// Applied in order; each processor feeds the next.
    pub processors: Vec<ProcessorConfig>,
}

fn default_name() -> String {
    String::from("pipeline")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub verbosity: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            verbosity: String::from("normal"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Serialized batches allowed in flight.
    #[serde(default = "default_write_buffering")]
    pub write_buffering: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_write_buffering() -> usize {
    DEFAULT_WRITE_BUFFERING
}

fn default_batch_size() -> usize {
    DEFAULT_WRITE_BATCH_SIZE_RECORDS
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            write_buffering: DEFAULT_WRITE_BUFFERING,
            batch_size: DEFAULT_WRITE_BATCH_SIZE_RECORDS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProcessorConfig {
    Sort(SortConfig),
    MapReduce(MapReduceConfig),
    Top(TopConfig),
    Unique(UniqueConfig),
    Repeat(RepeatConfig),
}

impl ProcessorConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            ProcessorConfig::Sort(_) => "sort",
            ProcessorConfig::MapReduce(_) => "map_reduce",
            ProcessorConfig::Top(_) => "top",
            ProcessorConfig::Unique(_) => "unique",
            ProcessorConfig::Repeat(_) => "repeat",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ProcessorConfig::Sort(c) => &c.id,
            ProcessorConfig::MapReduce(c) => &c.id,
            ProcessorConfig::Top(c) => &c.id,
            ProcessorConfig::Unique(c) => &c.id,
            ProcessorConfig::Repeat(c) => &c.id,
        }
    }
}

impl Config {
    pub fn temp_directory(&self) -> PathBuf {
        self.temp_directory
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(TEMP_DIR_NAME))
    }
}
