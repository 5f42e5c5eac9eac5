//! Reducer actions applied to a group of records sharing a dedup key.
//!
//! Every action reads its source field from all records of the group and
//! writes the result into the group's first record, which is the only one
//! emitted downstream.

pub mod numeric;
pub mod script;

#[cfg(test)]
mod tests;

pub use numeric::{AddAction, CountAction, ExtremeAction, MeanAction};
pub use script::{ActionRegistry, ScriptAction, ScriptArgs, ScriptReduceAction};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_STRING_SEPARATOR;
use crate::context::PipelineContext;
use crate::error::{ReduceError, Result};
use crate::record::{KeyPath, Record};

pub trait ReduceAction: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// `group` is never empty; only `group[0]` is kept afterwards.
    fn reduce(&self, ctx: &mut PipelineContext, group: &mut [Record]) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Add,
    Min,
    Max,
    Mean,
    Count,
    Script,
}

impl ActionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Add => "add",
            ActionKind::Min => "min",
            ActionKind::Max => "max",
            ActionKind::Mean => "mean",
            ActionKind::Count => "count",
            ActionKind::Script => "script",
        }
    }
}

/// Whether values are combined as numbers or as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionMode {
    #[default]
    Number,
    String,
}

/// Configured form of a reducer action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSpec {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(default, alias = "field")]
    pub source: Option<KeyPath>,
    /// Defaults to `source`, i.e. the result replaces the first record's value.
    #[serde(default)]
    pub destination: Option<KeyPath>,
    #[serde(default)]
    pub mode: ActionMode,
    /// Registered script name, only for `script`.
    #[serde(default)]
    pub name: Option<String>,
    /// Joins values of a string-mode `add`.
    #[serde(default)]
    pub separator: Option<String>,
}

impl ActionSpec {
    pub fn new(kind: ActionKind, source: &str) -> Result<Self> {
        Ok(Self {
            kind,
            source: Some(KeyPath::parse(source)?),
            destination: None,
            mode: ActionMode::Number,
            name: None,
            separator: None,
        })
    }

    pub fn script(name: &str) -> Self {
        Self {
            kind: ActionKind::Script,
            source: None,
            destination: None,
            mode: ActionMode::Number,
            name: Some(name.to_string()),
            separator: None,
        }
    }

    pub fn to(mut self, destination: &str) -> Result<Self> {
        self.destination = Some(KeyPath::parse(destination)?);
        Ok(self)
    }

    pub fn with_mode(mut self, mode: ActionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_separator(mut self, separator: &str) -> Self {
        self.separator = Some(separator.to_string());
        self
    }

    pub fn target(&self) -> Option<&KeyPath> {
        self.destination.as_ref().or(self.source.as_ref())
    }

    pub fn validate(&self) -> Result<()> {
        let kind = self.kind.name();
        match self.kind {
            ActionKind::Script => {
                if self.name.as_deref().map_or(true, |n| n.trim().is_empty()) {
                    return Err(ReduceError::config("Script action needs a 'name'"));
                }
            }
            ActionKind::Count => {
                if self.target().is_none() {
                    return Err(ReduceError::config(
                        "Count action needs a 'source' or a 'destination'",
                    ));
                }
            }
            _ => {
                if self.source.is_none() {
                    return Err(ReduceError::config(format!("Action '{}' needs a 'source'", kind)));
                }
            }
        }
        if self.kind == ActionKind::Mean && self.mode == ActionMode::String {
            return Err(ReduceError::config("Action 'mean' has no string mode"));
        }
        if self.separator.is_some() && !(self.kind == ActionKind::Add && self.mode == ActionMode::String) {
            return Err(ReduceError::config(format!(
                "Action '{}' does not take a separator",
                kind
            )));
        }
        Ok(())
    }

    pub fn build(&self, registry: &ActionRegistry) -> Result<Box<dyn ReduceAction>> {
        self.validate()?;
        let source = self.source.clone();
        let target = self.target().cloned();

        let action: Box<dyn ReduceAction> = match (self.kind, source, target) {
            (ActionKind::Script, _, _) => {
                let name = self.name.clone().unwrap_or_default();
                let script = registry.get(&name).ok_or_else(|| {
                    ReduceError::config(format!("No script action registered as '{}'", name))
                })?;
                Box::new(ScriptReduceAction::new(
                    name,
                    script,
                    ScriptArgs {
                        source: self.source.clone(),
                        destination: self.target().cloned(),
                        mode: self.mode,
                    },
                ))
            }
            (ActionKind::Count, source, Some(target)) => Box::new(CountAction::new(source, target)),
            (ActionKind::Add, Some(source), Some(target)) => Box::new(AddAction::new(
                source,
                target,
                self.mode,
                self.separator
                    .clone()
                    .unwrap_or_else(|| DEFAULT_STRING_SEPARATOR.to_string()),
            )),
            (ActionKind::Min, Some(source), Some(target)) => {
                Box::new(ExtremeAction::min(source, target, self.mode))
            }
            (ActionKind::Max, Some(source), Some(target)) => {
                Box::new(ExtremeAction::max(source, target, self.mode))
            }
            (ActionKind::Mean, Some(source), Some(target)) => Box::new(MeanAction::new(source, target)),
            (kind, _, _) => {
                return Err(ReduceError::config(format!(
                    "Action '{}' is missing its fields",
                    kind.name()
                )))
            }
        };
        Ok(action)
    }
}

pub fn build_actions(specs: &[ActionSpec], registry: &ActionRegistry) -> Result<Vec<Box<dyn ReduceAction>>> {
    specs.iter().map(|spec| spec.build(registry)).collect()
}

/// Runs each action over the group in configuration order.
pub fn apply_actions(
    actions: &[Box<dyn ReduceAction>],
    ctx: &mut PipelineContext,
    group: &mut [Record],
) -> Result<()> {
    if group.is_empty() {
        return Ok(());
    }
    for action in actions {
        action.reduce(ctx, group)?;
    }
    Ok(())
}
