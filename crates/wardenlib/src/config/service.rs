use indexmap::IndexMap;
use serde::Deserialize;

use crate::value::ContextValue;

/// A named service instance. The map key this struct is stored under in
/// [`crate::config::RawConfig::services`] is the service name used in
/// `"service:target"` target specs; `kind` selects which registered
/// plugin handles delivery for it.
#[derive(Clone, Debug, Deserialize, Default)]
pub struct ServiceConfig {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub targets: IndexMap<String, Vec<ContextValue>>,
    #[serde(default)]
    pub options: IndexMap<String, ContextValue>,
}
