use std::str::FromStr;

use derive_getters::Getters;
use serde::{Deserialize, Deserializer};

use crate::broker::QoS;
use crate::config::deserialize_qos;
use crate::target::Target;

/// Represents `targets_spec` as a tagged variant
/// (`{Static(list) | Template(string) | Computed(helper-ref)}`), resolved
/// once at configuration load rather than re-inspected at dispatch time
/// for every message.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TargetsSpec {
    Static { targets: Vec<String> },
    Template { template: String },
    Computed { function: String },
}

impl TargetsSpec {
    /// The concrete targets this spec names outright, used for
    /// configuration-time validation and for the failover section (which
    /// is always static). Returns an empty list for `Template`/`Computed`,
    /// which only resolve once a message's context is known.
    pub fn static_targets(&self) -> Vec<Target> {
        match self {
            TargetsSpec::Static { targets } => targets
                .iter()
                .filter_map(|s| Target::from_str(s).ok())
                .collect(),
            TargetsSpec::Template { .. } | TargetsSpec::Computed { .. } => Vec::new(),
        }
    }
}

/// `format_spec`: either a template string or a named helper function.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FormatSpec {
    Template { template: String },
    Function { function: String },
}

fn deserialize_qos_opt<'de, D>(deserializer: D) -> Result<Option<QoS>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "deserialize_qos")] QoS);
    Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|w| w.0))
}

/// A named routing rule. Immutable after load.
#[derive(Clone, Debug, Deserialize, Getters, PartialEq)]
pub struct Route {
    pub name: String,
    pub topic_pattern: String,
    pub targets_spec: TargetsSpec,
    #[serde(default)]
    pub filter_fn: Option<String>,
    #[serde(default)]
    pub datamap_fn: Option<String>,
    #[serde(default)]
    pub alldata_fn: Option<String>,
    #[serde(default)]
    pub format_spec: Option<FormatSpec>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default, deserialize_with = "deserialize_qos_opt")]
    pub qos_override: Option<QoS>,
    #[serde(default)]
    #[getter(skip)]
    pub ignore_retained: Option<bool>,
    #[serde(default)]
    pub retry_limit: Option<u32>,
}

impl Route {
    pub fn ignore_retained(&self, global_default: bool) -> bool {
        self.ignore_retained.unwrap_or(global_default)
    }
}

/// The dedicated pseudo-route named `failover`: its targets are evaluated
/// statically at startup, never from a template or helper.
#[derive(Clone, Debug, Deserialize, Getters, PartialEq)]
pub struct FailoverConfig {
    #[serde(deserialize_with = "deserialize_targets_list")]
    pub targets: Vec<Target>,
}

fn deserialize_targets_list<'de, D>(deserializer: D) -> Result<Vec<Target>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<String> = Deserialize::deserialize(deserializer)?;
    raw.into_iter()
        .map(|s| Target::from_str(&s).map_err(serde::de::Error::custom))
        .collect()
}
