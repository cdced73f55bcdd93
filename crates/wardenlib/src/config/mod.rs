use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use validator::Validate;

use crate::broker::{BrokerConnect, QoS};
use crate::config::periodic::PeriodicTaskConfig;
use crate::config::route::Route;
use crate::config::service::ServiceConfig;
use crate::target::Target;
use crate::topic::{TopicMatcher, TopicPatternError};

pub mod periodic;
pub mod route;
pub mod service;

/// Malformed or internally inconsistent configuration, detected at
/// startup and fatal. Each variant names the offending section so the
/// operator doesn't have to guess which part of the file is wrong.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("configuration section `{section}` is invalid: {message}")]
    Invalid { section: String, message: String },
    #[error("route `{route}` references unknown service `{service}`")]
    UnknownService { route: String, service: String },
    #[error("route `{route}` references unknown target `{service}:{target}`")]
    UnknownTarget {
        route: String,
        service: String,
        target: String,
    },
    #[error("invalid topic pattern in route `{route}`: {source}")]
    InvalidTopicPattern {
        route: String,
        #[source]
        source: TopicPatternError,
    },
    #[error("could not read configuration file {0:?}")]
    Io(#[source] std::io::Error, std::path::PathBuf),
}

/// Global defaults applied when a route does not override them.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct GlobalDefaults {
    #[serde(default)]
    pub ignore_retained: bool,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default)]
    pub retry_limit: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_shutdown_grace_period_secs")]
    pub shutdown_grace_period_secs: u64,
    #[serde(default)]
    pub strict_service_references: bool,
    #[serde(default)]
    pub strict_templates: bool,
}

fn default_queue_capacity() -> usize {
    256
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_shutdown_grace_period_secs() -> u64 {
    10
}

impl Default for GlobalDefaults {
    fn default() -> Self {
        Self {
            ignore_retained: false,
            queue_capacity: default_queue_capacity(),
            retry_limit: 0,
            retry_backoff_ms: default_retry_backoff_ms(),
            shutdown_grace_period_secs: default_shutdown_grace_period_secs(),
            strict_service_references: false,
            strict_templates: false,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct BrokerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    1883
}
fn default_client_id() -> String {
    "warden".to_string()
}
fn default_keep_alive() -> u16 {
    5
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            client_id: default_client_id(),
            keep_alive_secs: default_keep_alive(),
            username: None,
            password: None,
        }
    }
}

impl From<BrokerSection> for BrokerConnect {
    fn from(value: BrokerSection) -> Self {
        BrokerConnect {
            host: value.host,
            port: value.port,
            client_id: value.client_id,
            keep_alive_secs: value.keep_alive_secs,
            username: value.username,
            password: value.password,
        }
    }
}

/// The as-written configuration tree, deserialized directly from YAML.
#[derive(Clone, Debug, Deserialize, Default)]
pub struct RawConfig {
    #[serde(default)]
    pub defaults: GlobalDefaults,
    #[serde(default)]
    pub broker: BrokerSection,
    #[serde(default)]
    pub services: HashMap<String, ServiceConfig>,
    #[serde(default)]
    pub routes: Vec<Route>,
    pub failover: Option<route::FailoverConfig>,
    #[serde(default)]
    pub periodic: Vec<PeriodicTaskConfig>,
}

/// The resolved, immutable configuration the rest of the engine consumes,
/// passed around as an explicit value rather than kept in module-level
/// singletons.
#[derive(Debug)]
pub struct EngineConfig {
    pub defaults: GlobalDefaults,
    pub broker: BrokerConnect,
    pub services: HashMap<String, ServiceConfig>,
    pub routes: Vec<Route>,
    pub failover: Option<route::FailoverConfig>,
    pub periodic: Vec<PeriodicTaskConfig>,
    pub topic_matcher: TopicMatcher,
}

impl EngineConfig {
    pub fn from_yaml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(input)?;
        Self::resolve(raw)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e, path.to_path_buf()))?;
        Self::from_yaml_str(&content)
    }

    /// Resolves a [`RawConfig`] into an [`EngineConfig`], validating
    /// service references per route: strict mode rejects an unknown
    /// reference outright, lenient mode logs and skips it, but it is never
    /// silently accepted either way.
    pub fn resolve(raw: RawConfig) -> Result<Self, ConfigError> {
        for route in &raw.routes {
            if route.name.is_empty() {
                return Err(ConfigError::Invalid {
                    section: "routes".to_string(),
                    message: "route name must not be empty".to_string(),
                });
            }
        }

        let declared_targets: Vec<Target> = all_declared_targets(&raw);

        for route in &raw.routes {
            for target in route.targets_spec.static_targets() {
                if !declared_targets.contains(&target) {
                    if raw.defaults.strict_service_references {
                        return if raw.services.contains_key(&target.service) {
                            Err(ConfigError::UnknownTarget {
                                route: route.name.clone(),
                                service: target.service,
                                target: target.name,
                            })
                        } else {
                            Err(ConfigError::UnknownService {
                                route: route.name.clone(),
                                service: target.service,
                            })
                        };
                    } else {
                        tracing::warn!(
                            route = %route.name,
                            target = %target,
                            "route references unknown target, will be dropped at expansion time"
                        );
                    }
                }
            }
        }

        // The matcher's hit indices are positions into `raw.routes` in
        // configuration-declaration order; `priority` does not reorder
        // routes and carries through to `Job::priority` untouched, for a
        // service plugin to interpret as it sees fit.
        let patterns: Vec<&str> = raw.routes.iter().map(|r| r.topic_pattern.as_str()).collect();
        let topic_matcher = TopicMatcher::build(patterns).map_err(|source| {
            ConfigError::InvalidTopicPattern {
                route: raw
                    .routes
                    .first()
                    .map(|r| r.name.clone())
                    .unwrap_or_default(),
                source,
            }
        })?;

        Ok(Self {
            defaults: raw.defaults,
            broker: raw.broker.into(),
            services: raw.services,
            routes: raw.routes,
            failover: raw.failover,
            periodic: raw.periodic,
            topic_matcher,
        })
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.defaults.retry_backoff_ms)
    }

    pub fn shutdown_grace_period(&self) -> Duration {
        Duration::from_secs(self.defaults.shutdown_grace_period_secs)
    }

    /// All `(service, target)` pairs actually used anywhere in the
    /// configuration. Exactly one dispatch queue is started per entry.
    pub fn used_targets(&self) -> Vec<Target> {
        let mut targets = Vec::new();
        for route in &self.routes {
            for target in route.targets_spec.static_targets() {
                if !targets.contains(&target) {
                    targets.push(target);
                }
            }
        }
        if let Some(failover) = &self.failover {
            for target in &failover.targets {
                if !targets.contains(target) {
                    targets.push(target.clone());
                }
            }
        }
        targets
    }
}

fn all_declared_targets(raw: &RawConfig) -> Vec<Target> {
    let mut targets = Vec::new();
    for (service_name, service) in &raw.services {
        for target_name in service.targets.keys() {
            targets.push(Target::new(service_name, target_name));
        }
    }
    targets
}

impl Display for EngineConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "routes:")?;
        for route in &self.routes {
            writeln!(f, "  - {} -> {}", route.name, route.topic_pattern)?;
        }
        writeln!(f, "services: {}", self.services.keys().cloned().collect::<Vec<_>>().join(", "))
    }
}

pub fn deserialize_qos<'de, D>(deserializer: D) -> Result<QoS, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: u8 = Deserialize::deserialize(deserializer)?;
    Ok(match value {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtMostOnce,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
services:
  log:
    targets:
      info: []
routes:
  - name: hello
    topic_pattern: hello/1
    targets_spec:
      type: static
      targets: ["log:info"]
    format_spec:
      type: template
      template: "{name}: {number}"
"#;

    #[test]
    fn resolves_minimal_config() {
        let config = EngineConfig::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(1, config.routes.len());
        assert_eq!(1, config.used_targets().len());
    }

    #[test]
    fn strict_mode_rejects_unknown_service() {
        let mut raw: RawConfig = serde_yaml::from_str(SAMPLE).unwrap();
        raw.defaults.strict_service_references = true;
        raw.routes[0].targets_spec = route::TargetsSpec::Static {
            targets: vec!["missing:target".to_string()],
        };
        let result = EngineConfig::resolve(raw);
        assert!(matches!(result, Err(ConfigError::UnknownService { .. })));
    }

    #[test]
    fn lenient_mode_accepts_unknown_service() {
        let mut raw: RawConfig = serde_yaml::from_str(SAMPLE).unwrap();
        raw.routes[0].targets_spec = route::TargetsSpec::Static {
            targets: vec!["missing:target".to_string()],
        };
        assert!(EngineConfig::resolve(raw).is_ok());
    }
}
