use std::sync::Arc;

use wardenlib::{ContextValue, HelperOutcome, HelperRegistry};

/// The compiled-in helper table: the thin adapter the host binary is
/// expected to provide. A real deployment typically replaces or extends
/// this with its own functions; these three exist so a fresh
/// `sample-config` is runnable without edits.
pub fn builtin_helpers() -> HelperRegistry {
    let mut registry = HelperRegistry::new();
    registry.register("heartbeat_payload", Arc::new(heartbeat_payload));
    registry.register("always_keep", Arc::new(always_keep));
    registry.register("noop_datamap", Arc::new(noop_datamap));
    registry
}

fn heartbeat_payload(_input: &wardenlib::HelperInput) -> HelperOutcome {
    HelperOutcome::Keep(ContextValue::Text("alive".to_string()))
}

fn always_keep(_input: &wardenlib::HelperInput) -> HelperOutcome {
    HelperOutcome::Keep(ContextValue::Bool(false))
}

fn noop_datamap(_input: &wardenlib::HelperInput) -> HelperOutcome {
    HelperOutcome::Keep(ContextValue::Map(Default::default()))
}
