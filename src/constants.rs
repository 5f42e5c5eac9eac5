pub const DEFAULT_FAN_OUT: usize = 100;
pub const MAX_FAN_OUT: usize = 100_000;
pub const DEFAULT_READ_PARALLELISM: usize = 1;
pub const DEFAULT_WRITE_BUFFERING: usize = 1;
pub const MAX_TASK_QUEUE_CAPACITY: usize = 64;
pub const DEFAULT_MAX_NULL_KEY_INDEX: i32 = i32::MAX;

pub const BYTES_PER_KB: usize = 1024;
pub const BYTES_PER_MB: usize = 1_048_576;
pub const BYTES_PER_GB: usize = 1_073_741_824;

pub const SPILL_FILE_EXTENSION: &str = "tmp";
pub const TEMP_DIR_NAME: &str = "tuonella_reduce_temp";
pub const SPILL_READ_BUFFER_SIZE_KB: usize = 64;
pub const SPILL_WRITE_BUFFER_SIZE_KB: usize = 64;

pub const DEFAULT_WRITE_BATCH_SIZE_RECORDS: usize = 1000;
pub const MAX_WRITE_BATCH_SIZE_RECORDS: usize = 100_000;
pub const OUTPUT_BUFFER_SIZE_KB: usize = 512;

pub const ESTIMATED_VALUE_OVERHEAD_BYTES: usize = 32;
pub const PARTITION_MEMORY_BUDGET_PERCENT: f64 = 25.0;

pub const PROGRESS_REPORT_INTERVAL_PARTITIONS: usize = 10;
pub const PROGRESS_REPORT_INTERVAL_RECORDS: usize = 100_000;

pub const DEFAULT_STRING_SEPARATOR: &str = ";";
