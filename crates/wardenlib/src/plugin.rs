use async_trait::async_trait;
use indexmap::IndexMap;
use thiserror::Error;

use crate::job::Job;
use crate::value::ContextValue;

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("service `{service}` failed to initialize: {message}")]
    Init { service: String, message: String },
}

/// What the Registry hands a plugin on every call: service-level options
/// and the engine version. Logging is ambient via `tracing` macros rather
/// than a field, the way every other component in this crate logs.
#[derive(Clone, Debug)]
pub struct ServiceContext {
    pub service_name: String,
    pub options: IndexMap<String, ContextValue>,
    pub engine_version: &'static str,
}

impl ServiceContext {
    pub fn option(&self, key: &str) -> Option<&ContextValue> {
        self.options.get(key)
    }
}

/// The plugin contract. `async_trait`-based; plugins are polymorphic over
/// the single `deliver` capability, one implementation per service kind
/// (`log`, `file`, `http`, ...).
#[async_trait]
pub trait Service: Send + Sync {
    /// Called once at startup; may open connections, validate
    /// configuration. Failure here is fatal to the service it belongs to,
    /// not the whole engine.
    async fn init(&self, context: &ServiceContext) -> Result<(), ServiceError>;

    /// Called per Job. `true` = delivered, `false` = failed (retryable
    /// unless the plugin declares otherwise via logging/metrics the
    /// Registry does not currently inspect).
    async fn deliver(&self, context: &ServiceContext, job: &Job) -> bool;
}
