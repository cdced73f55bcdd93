use std::fmt::{Display, Formatter};
use std::str::FromStr;

use thiserror::Error;

/// A `(service-kind, target-name)` pair; identifies exactly one dispatch
/// queue and one configuration entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Target {
    pub service: String,
    pub name: String,
}

impl Target {
    pub fn new(service: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            name: name.into(),
        }
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.service, self.name)
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("target `{0}` is not of the form `service:target`")]
pub struct TargetParseError(String);

impl FromStr for Target {
    type Err = TargetParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.split_once(':') {
            Some((service, name)) if !service.is_empty() && !name.is_empty() => {
                Ok(Target::new(service, name))
            }
            _ => Err(TargetParseError(value.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_service_colon_target() {
        assert_eq!(Target::new("log", "info"), "log:info".parse().unwrap());
    }

    #[test]
    fn rejects_malformed_spec() {
        assert!("log".parse::<Target>().is_err());
        assert!(":info".parse::<Target>().is_err());
        assert!("log:".parse::<Target>().is_err());
    }
}
