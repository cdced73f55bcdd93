use serde::Deserialize;

use crate::target::Target;

/// A scheduled task entry: invoke a named helper on an interval and feed
/// its return value into the pipeline as a message.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct PeriodicTaskConfig {
    pub name: String,
    pub function_reference: String,
    pub interval_seconds: u64,
    #[serde(default)]
    pub run_immediately: bool,
    #[serde(default)]
    pub count: Option<u32>,
    /// The topic the synthetic Message carries. Defaults to
    /// `_periodic/<name>` when absent, used only to label the message;
    /// it does not have to match any declared route when `targets` is
    /// non-empty (see `DESIGN.md`).
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub targets: Vec<String>,
}

impl PeriodicTaskConfig {
    pub fn targets(&self) -> Vec<Target> {
        self.targets
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_periodic_task() {
        let yaml = r#"
name: heartbeat
function_reference: heartbeat_payload
interval_seconds: 30
"#;
        let task: PeriodicTaskConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(30, task.interval_seconds);
        assert!(!task.run_immediately);
        assert!(task.targets().is_empty());
    }
}
