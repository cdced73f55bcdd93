use std::collections::HashMap;
use std::sync::Arc;

use crate::context::TransformContext;
use crate::target::Target;
use crate::value::ContextValue;

/// One explicit result for every helper call: a helper either keeps a
/// value, asks to drop the message, or reports a failure the pipeline
/// logs and recovers from.
#[derive(Clone, Debug, PartialEq)]
pub enum HelperOutcome {
    Keep(ContextValue),
    Drop,
    Error(String),
}

/// What a helper call is given. The same shape serves `filter_fn`,
/// `datamap_fn`, `alldata_fn`, a function-form `format_spec`, and a
/// `Computed` `targets_spec` — helpers that don't need a field simply
/// ignore it.
pub struct HelperInput<'a> {
    pub topic: &'a str,
    pub payload: &'a [u8],
    pub section_name: &'a str,
    pub context: &'a TransformContext,
    pub topic_targets: &'a [Target],
}

pub type HelperFn = Arc<dyn Fn(&HelperInput) -> HelperOutcome + Send + Sync>;

/// Name-to-function table of helpers a route or periodic task can invoke
/// by reference instead of dynamic symbol lookup. Populated by the host
/// binary before the engine starts; read-only for the lifetime of the
/// engine.
#[derive(Clone, Default)]
pub struct HelperRegistry {
    helpers: HashMap<String, HelperFn>,
}

impl HelperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, helper: HelperFn) {
        self.helpers.insert(name.into(), helper);
    }

    pub fn get(&self, name: &str) -> Option<&HelperFn> {
        self.helpers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.helpers.contains_key(name)
    }

    /// Calls a registered helper by name; an unregistered name is reported
    /// as a `HelperOutcome::Error` rather than panicking, since a
    /// misconfigured helper reference is a data problem, not a programming
    /// error.
    pub fn call(&self, name: &str, input: &HelperInput) -> HelperOutcome {
        match self.helpers.get(name) {
            Some(helper) => helper(input),
            None => HelperOutcome::Error(format!("helper `{name}` is not registered")),
        }
    }
}
