use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::config::service::ServiceConfig;
use crate::job::Job;
use crate::plugin::{Service, ServiceContext, ServiceError, ENGINE_VERSION};
use crate::target::Target;
use crate::value::ContextValue;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("service `{service}` declares unknown kind `{kind}`")]
    UnknownKind { service: String, kind: String },
    #[error(transparent)]
    Init(#[from] ServiceError),
}

/// Holds loaded service plugins and the per-service configuration they were
/// declared with. Read-only after [`ServiceRegistry::load`] completes, so
/// queue workers share it behind an `Arc` with lock-free reads.
#[derive(Default)]
pub struct ServiceRegistry {
    plugins: HashMap<String, Arc<dyn Service>>,
    services: HashMap<String, ServiceConfig>,
    contexts: HashMap<String, ServiceContext>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an available plugin implementation under a service kind
    /// name (e.g. `"log"`, `"file"`, `"http"`). Must happen before
    /// [`ServiceRegistry::load`].
    pub fn register_plugin(&mut self, kind: impl Into<String>, plugin: Arc<dyn Service>) {
        self.plugins.insert(kind.into(), plugin);
    }

    /// Calls `init` once per configured service, at startup.
    pub async fn load(
        &mut self,
        services: HashMap<String, ServiceConfig>,
    ) -> Result<(), RegistryError> {
        for (name, config) in services {
            let plugin = self
                .plugins
                .get(&config.kind)
                .ok_or_else(|| RegistryError::UnknownKind {
                    service: name.clone(),
                    kind: config.kind.clone(),
                })?
                .clone();

            let context = ServiceContext {
                service_name: name.clone(),
                options: config.options.clone(),
                engine_version: ENGINE_VERSION,
            };
            plugin.init(&context).await?;

            self.contexts.insert(name.clone(), context);
            self.services.insert(name, config);
        }
        Ok(())
    }

    pub fn is_declared(&self, target: &Target) -> bool {
        self.services
            .get(&target.service)
            .map(|config| config.targets.contains_key(&target.name))
            .unwrap_or(false)
    }

    pub fn target_parameters(&self, target: &Target) -> Vec<ContextValue> {
        self.services
            .get(&target.service)
            .and_then(|config| config.targets.get(&target.name))
            .cloned()
            .unwrap_or_default()
    }

    /// All `(service, target)` pairs declared anywhere across loaded
    /// services, used to size the dispatch queue set.
    pub fn declared_targets(&self) -> Vec<Target> {
        let mut targets = Vec::new();
        for (service_name, config) in &self.services {
            for target_name in config.targets.keys() {
                targets.push(Target::new(service_name, target_name));
            }
        }
        targets
    }

    /// The delivery surface queue workers call, implemented as a single
    /// awaited async call since every plugin in this crate does its own
    /// I/O asynchronously rather than blocking a thread.
    pub async fn dispatch(&self, target: &Target, job: &Job) -> bool {
        let Some(config) = self.services.get(&target.service) else {
            tracing::warn!(%target, "dispatch to undeclared service, treating as failure");
            return false;
        };
        let Some(plugin) = self.plugins.get(&config.kind) else {
            tracing::warn!(%target, kind = %config.kind, "dispatch to service with no loaded plugin, treating as failure");
            return false;
        };
        let Some(context) = self.contexts.get(&target.service) else {
            tracing::warn!(%target, "dispatch to service with no initialized context, treating as failure");
            return false;
        };
        plugin.deliver(context, job).await
    }
}
