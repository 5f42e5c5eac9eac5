use std::time::Duration;

use anyhow::Result;
use sysinfo::System;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

use crate::constants::{BYTES_PER_GB, BYTES_PER_KB, BYTES_PER_MB, PARTITION_MEMORY_BUDGET_PERCENT};

/// Installs the global subscriber. `verbosity` is `silent`, `normal` or `verbose`.
pub fn setup_logging(verbosity: &str) -> Result<()> {
    let level = match verbosity {
        "silent" => Level::ERROR,
        "normal" => Level::INFO,
        "verbose" => Level::DEBUG,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("tuonella_reduce={}", level).parse()?);

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

pub fn format_bytes(bytes: usize) -> String {
    let value = bytes as f64;
    if bytes < BYTES_PER_KB {
        format!("{} B", bytes)
    } else if bytes < BYTES_PER_MB {
        format!("{:.2} KB", value / BYTES_PER_KB as f64)
    } else if bytes < BYTES_PER_GB {
        format!("{:.2} MB", value / BYTES_PER_MB as f64)
    } else {
        format!("{:.2} GB", value / BYTES_PER_GB as f64)
    }
}

pub fn format_duration(duration: Duration) -> String {
    let seconds = duration.as_secs_f64();
    if seconds < 60.0 {
        format!("{:.1}s", seconds)
    } else if seconds < 3600.0 {
        format!("{:.1}m", seconds / 60.0)
    } else {
        format!("{:.1}h", seconds / 3600.0)
    }
}

pub fn available_memory_bytes() -> usize {
    let mut system = System::new();
    system.refresh_memory();
    system.available_memory() as usize
}

/// Largest partition that should be loaded and sorted in one piece.
pub fn partition_memory_budget(available_bytes: usize) -> usize {
    (available_bytes as f64 * PARTITION_MEMORY_BUDGET_PERCENT / 100.0) as usize
}
