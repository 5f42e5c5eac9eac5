use std::cmp::Ordering;

use super::{ActionMode, ReduceAction};
use crate::context::PipelineContext;
use crate::error::{ReduceError, Result};
use crate::record::{KeyPath, Record, Value};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    fn into_value(self) -> Value {
        match self {
            Number::Int(i) => Value::Int(i),
            Number::Float(f) => Value::Float(f),
        }
    }
}

/// Numeric view of a field; numeric strings are accepted.
fn number(action: &str, path: &KeyPath, value: &Value) -> Result<Number> {
    match value {
        Value::Int(i) => Ok(Number::Int(*i)),
        Value::Float(f) => Ok(Number::Float(*f)),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .map(Number::Int)
                .or_else(|_| trimmed.parse::<f64>().map(Number::Float))
                .map_err(|_| {
                    ReduceError::action(action, format!("'{}' holds non-numeric text '{}'", path, s))
                })
        }
        other => Err(ReduceError::action(
            action,
            format!("'{}' holds a {}, expected a number", path, other.type_name()),
        )),
    }
}

/// Non-null source values across the whole group.
fn present<'a>(group: &'a [Record], source: &'a KeyPath) -> impl Iterator<Item = &'a Value> + 'a {
    group
        .iter()
        .filter_map(move |record| record.get_path(source))
        .filter(|value| !value.is_null_like())
}

fn store(group: &mut [Record], target: &KeyPath, value: Value) -> Result<()> {
    match group.first_mut() {
        Some(first) => first.set_path(target, value),
        None => Ok(()),
    }
}

/// Sum in number mode, concatenation in string mode.
///
/// Integer sums stay integers until one overflows or a float shows up.
#[derive(Debug, Clone)]
pub struct AddAction {
    source: KeyPath,
    target: KeyPath,
    mode: ActionMode,
    separator: String,
}

impl AddAction {
    pub fn new(source: KeyPath, target: KeyPath, mode: ActionMode, separator: String) -> Self {
        Self {
            source,
            target,
            mode,
            separator,
        }
    }

    fn sum(&self, group: &[Record]) -> Result<Option<Number>> {
        let mut total: Option<Number> = None;
        for value in present(group, &self.source) {
            let n = number(self.name(), &self.source, value)?;
            total = Some(match (total, n) {
                (None, n) => n,
                (Some(Number::Int(a)), Number::Int(b)) => a
                    .checked_add(b)
                    .map(Number::Int)
                    .unwrap_or(Number::Float(a as f64 + b as f64)),
                (Some(a), b) => Number::Float(a.as_f64() + b.as_f64()),
            });
        }
        Ok(total)
    }
}

impl ReduceAction for AddAction {
    fn name(&self) -> &str {
        "add"
    }

    fn reduce(&self, _ctx: &mut PipelineContext, group: &mut [Record]) -> Result<()> {
        match self.mode {
            ActionMode::Number => match self.sum(group)? {
                Some(total) => store(group, &self.target, total.into_value()),
                None => Ok(()),
            },
            ActionMode::String => {
                let parts: Vec<String> = present(group, &self.source).map(Value::to_text).collect();
                if parts.is_empty() {
                    return Ok(());
                }
                store(group, &self.target, Value::String(parts.join(&self.separator)))
            }
        }
    }
}

/// Smallest or largest value of the group.
#[derive(Debug, Clone)]
pub struct ExtremeAction {
    source: KeyPath,
    target: KeyPath,
    mode: ActionMode,
    keep: Ordering,
}

impl ExtremeAction {
    pub fn min(source: KeyPath, target: KeyPath, mode: ActionMode) -> Self {
        Self {
            source,
            target,
            mode,
            keep: Ordering::Less,
        }
    }

    pub fn max(source: KeyPath, target: KeyPath, mode: ActionMode) -> Self {
        Self {
            source,
            target,
            mode,
            keep: Ordering::Greater,
        }
    }
}

impl ReduceAction for ExtremeAction {
    fn name(&self) -> &str {
        if self.keep == Ordering::Less {
            "min"
        } else {
            "max"
        }
    }

    fn reduce(&self, _ctx: &mut PipelineContext, group: &mut [Record]) -> Result<()> {
        let best = match self.mode {
            ActionMode::Number => {
                let mut best: Option<Number> = None;
                for value in present(group, &self.source) {
                    let n = number(self.name(), &self.source, value)?;
                    let replace = match best {
                        None => true,
                        Some(current) => n.as_f64().total_cmp(&current.as_f64()) == self.keep,
                    };
                    if replace {
                        best = Some(n);
                    }
                }
                best.map(Number::into_value)
            }
            ActionMode::String => {
                let mut best: Option<String> = None;
                for text in present(group, &self.source).map(Value::to_text) {
                    let replace = match &best {
                        None => true,
                        Some(current) => text.as_str().cmp(current.as_str()) == self.keep,
                    };
                    if replace {
                        best = Some(text);
                    }
                }
                best.map(Value::String)
            }
        };

        match best {
            Some(value) => store(group, &self.target, value),
            None => Ok(()),
        }
    }
}

/// Arithmetic mean, always written as a float.
#[derive(Debug, Clone)]
pub struct MeanAction {
    source: KeyPath,
    target: KeyPath,
}

impl MeanAction {
    pub fn new(source: KeyPath, target: KeyPath) -> Self {
        Self { source, target }
    }
}

impl ReduceAction for MeanAction {
    fn name(&self) -> &str {
        "mean"
    }

    fn reduce(&self, _ctx: &mut PipelineContext, group: &mut [Record]) -> Result<()> {
        let mut sum = 0.0;
        let mut count = 0usize;
        for value in present(group, &self.source) {
            sum += number(self.name(), &self.source, value)?.as_f64();
            count += 1;
        }
        if count == 0 {
            return Ok(());
        }
        store(group, &self.target, Value::Float(sum / count as f64))
    }
}

/// Number of non-null source values, or the group size without a source.
#[derive(Debug, Clone)]
pub struct CountAction {
    source: Option<KeyPath>,
    target: KeyPath,
}

impl CountAction {
    pub fn new(source: Option<KeyPath>, target: KeyPath) -> Self {
        Self { source, target }
    }
}

impl ReduceAction for CountAction {
    fn name(&self) -> &str {
        "count"
    }

    fn reduce(&self, _ctx: &mut PipelineContext, group: &mut [Record]) -> Result<()> {
        let count = match &self.source {
            Some(source) => present(group, source).count(),
            None => group.len(),
        };
        store(group, &self.target, Value::Int(count as i64))
    }
}
