use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::info;

/// Per-run state handed to every processor by `&mut`.
///
/// Counters are keyed by a dotted name such as `dedup.pass_through`.
#[derive(Debug)]
pub struct PipelineContext {
    name: String,
    started: Instant,
    counters: BTreeMap<String, u64>,
}

impl PipelineContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            started: Instant::now(),
            counters: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn incr(&mut self, counter: &str, by: u64) {
        *self.counters.entry(counter.to_string()).or_insert(0) += by;
    }

    pub fn counter(&self, counter: &str) -> u64 {
        self.counters.get(counter).copied().unwrap_or(0)
    }

    pub fn counters(&self) -> &BTreeMap<String, u64> {
        &self.counters
    }

    pub fn log_summary(&self) {
        info!(
            pipeline = %self.name,
            elapsed_ms = self.elapsed().as_millis() as u64,
            "pipeline finished"
        );
        for (counter, value) in &self.counters {
            info!(pipeline = %self.name, counter = %counter, value, "counter");
        }
    }
}

impl Default for PipelineContext {
    fn default() -> Self {
        Self::new("default")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let mut ctx = PipelineContext::new("run");
        ctx.incr("sort.in", 2);
        ctx.incr("sort.in", 3);
        ctx.incr("sort.out", 1);

        assert_eq!(ctx.counter("sort.in"), 5);
        assert_eq!(ctx.counter("missing"), 0);
        assert_eq!(ctx.counters().keys().collect::<Vec<_>>(), vec!["sort.in", "sort.out"]);
        assert_eq!(ctx.name(), "run");
    }
}
