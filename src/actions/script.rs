use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{ActionMode, ReduceAction};
use crate::context::PipelineContext;
use crate::error::{ReduceError, Result};
use crate::record::{KeyPath, Record};

/// Fields a script action was configured with.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptArgs {
    pub source: Option<KeyPath>,
    pub destination: Option<KeyPath>,
    pub mode: ActionMode,
}

/// Custom group reducer registered by name at startup.
pub trait ScriptAction: Send + Sync {
    fn reduce(&self, ctx: &mut PipelineContext, args: &ScriptArgs, group: &mut [Record]) -> Result<()>;
}

impl<F> ScriptAction for F
where
    F: Fn(&ScriptArgs, &mut [Record]) -> Result<()> + Send + Sync,
{
    fn reduce(&self, _ctx: &mut PipelineContext, args: &ScriptArgs, group: &mut [Record]) -> Result<()> {
        self(args, group)
    }
}

/// Name to script lookup consulted while building actions.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    scripts: HashMap<String, Arc<dyn ScriptAction>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any script already registered under `name`.
    pub fn register(&mut self, name: &str, script: Arc<dyn ScriptAction>) -> &mut Self {
        self.scripts.insert(name.to_string(), script);
        self
    }

    pub fn register_fn<F>(&mut self, name: &str, script: F) -> &mut Self
    where
        F: Fn(&ScriptArgs, &mut [Record]) -> Result<()> + Send + Sync + 'static,
    {
        self.register(name, Arc::new(script))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ScriptAction>> {
        self.scripts.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.scripts.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.scripts.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("scripts", &self.names())
            .finish()
    }
}

pub struct ScriptReduceAction {
    name: String,
    script: Arc<dyn ScriptAction>,
    args: ScriptArgs,
}

impl ScriptReduceAction {
    pub fn new(name: String, script: Arc<dyn ScriptAction>, args: ScriptArgs) -> Self {
        Self { name, script, args }
    }
}

impl fmt::Debug for ScriptReduceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptReduceAction")
            .field("name", &self.name)
            .field("args", &self.args)
            .finish()
    }
}

impl ReduceAction for ScriptReduceAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn reduce(&self, ctx: &mut PipelineContext, group: &mut [Record]) -> Result<()> {
        self.script
            .reduce(ctx, &self.args, group)
            .map_err(|e| match e {
                ReduceError::Action { .. } => e,
                other => ReduceError::action(&self.name, other.to_string()),
            })
    }
}
