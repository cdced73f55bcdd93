use std::fmt::{Display, Formatter};

use indexmap::IndexMap;
use serde::de::{MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;

/// A decoded value living in a [`crate::context::TransformContext`].
///
/// Once a payload has been parsed, every key it contributes to the
/// context is one of these, regardless of the wire format it arrived in.
#[derive(Clone, Debug, PartialEq)]
pub enum ContextValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<ContextValue>),
    Map(IndexMap<String, ContextValue>),
}

impl ContextValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ContextValue::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, ContextValue>> {
        match self {
            ContextValue::Map(value) => Some(value),
            _ => None,
        }
    }

    /// Truthiness used by `filter_fn`'s "truthy return drops the message"
    /// contract.
    pub fn is_truthy(&self) -> bool {
        match self {
            ContextValue::Null => false,
            ContextValue::Bool(value) => *value,
            ContextValue::Number(value) => *value != 0.0,
            ContextValue::Text(value) => !value.is_empty(),
            ContextValue::List(value) => !value.is_empty(),
            ContextValue::Map(value) => !value.is_empty(),
        }
    }
}

/// Total, locale-independent text rendering used by template interpolation.
impl Display for ContextValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ContextValue::Null => write!(f, "null"),
            ContextValue::Bool(value) => write!(f, "{value}"),
            ContextValue::Number(value) => {
                if value.fract() == 0.0 && value.is_finite() {
                    write!(f, "{}", *value as i64)
                } else {
                    write!(f, "{value}")
                }
            }
            ContextValue::Text(value) => write!(f, "{value}"),
            ContextValue::List(_) | ContextValue::Map(_) => {
                write!(f, "{}", self.to_json_text())
            }
        }
    }
}

impl ContextValue {
    /// Round-trippable textual form for object-form values, used when an
    /// object-typed value is embedded in a rendered template.
    pub fn to_json_text(&self) -> String {
        serde_json::to_string(&JsonValue::from(self.clone())).unwrap_or_default()
    }
}

impl From<JsonValue> for ContextValue {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => ContextValue::Null,
            JsonValue::Bool(value) => ContextValue::Bool(value),
            JsonValue::Number(value) => ContextValue::Number(value.as_f64().unwrap_or(0.0)),
            JsonValue::String(value) => ContextValue::Text(value),
            JsonValue::Array(values) => {
                ContextValue::List(values.into_iter().map(ContextValue::from).collect())
            }
            JsonValue::Object(map) => ContextValue::Map(
                map.into_iter()
                    .map(|(key, value)| (key, ContextValue::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<ContextValue> for JsonValue {
    fn from(value: ContextValue) -> Self {
        match value {
            ContextValue::Null => JsonValue::Null,
            ContextValue::Bool(value) => JsonValue::Bool(value),
            ContextValue::Number(value) => serde_json::Number::from_f64(value)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            ContextValue::Text(value) => JsonValue::String(value),
            ContextValue::List(values) => {
                JsonValue::Array(values.into_iter().map(JsonValue::from).collect())
            }
            ContextValue::Map(map) => JsonValue::Object(
                map.into_iter()
                    .map(|(key, value)| (key, JsonValue::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for ContextValue {
    fn from(value: &str) -> Self {
        ContextValue::Text(value.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(value: String) -> Self {
        ContextValue::Text(value)
    }
}

impl From<bool> for ContextValue {
    fn from(value: bool) -> Self {
        ContextValue::Bool(value)
    }
}

impl From<i64> for ContextValue {
    fn from(value: i64) -> Self {
        ContextValue::Number(value as f64)
    }
}

/// Manual visitor-based impl so target parameters and service options can
/// be deserialized straight out of whatever the configuration format
/// hands us (YAML today), the same role `serde_yaml::Value`/`toml::Value`
/// play as an untyped escape hatch in their own ecosystems.
impl<'de> Deserialize<'de> for ContextValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ContextValueVisitor;

        impl<'de> Visitor<'de> for ContextValueVisitor {
            type Value = ContextValue;

            fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
                formatter.write_str("a null, bool, number, string, sequence, or map")
            }

            fn visit_bool<E>(self, value: bool) -> Result<Self::Value, E> {
                Ok(ContextValue::Bool(value))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E> {
                Ok(ContextValue::Number(value as f64))
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E> {
                Ok(ContextValue::Number(value as f64))
            }

            fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E> {
                Ok(ContextValue::Number(value))
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E> {
                Ok(ContextValue::Text(value.to_string()))
            }

            fn visit_string<E>(self, value: String) -> Result<Self::Value, E> {
                Ok(ContextValue::Text(value))
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E> {
                Ok(ContextValue::Null)
            }

            fn visit_none<E>(self) -> Result<Self::Value, E> {
                Ok(ContextValue::Null)
            }

            fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
            where
                D: Deserializer<'de>,
            {
                Deserialize::deserialize(deserializer)
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let mut values = Vec::new();
                while let Some(value) = seq.next_element()? {
                    values.push(value);
                }
                Ok(ContextValue::List(values))
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut values = IndexMap::new();
                while let Some((key, value)) = map.next_entry()? {
                    values.insert(key, value);
                }
                Ok(ContextValue::Map(values))
            }
        }

        deserializer.deserialize_any(ContextValueVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_renders_without_trailing_zero() {
        assert_eq!("42", ContextValue::Number(42.0).to_string());
        assert_eq!("3.5", ContextValue::Number(3.5).to_string());
    }

    #[test]
    fn map_renders_as_round_trippable_json() {
        let json: JsonValue = serde_json::from_str(r#"{"a":1,"b":"x"}"#).unwrap();
        let value = ContextValue::from(json);
        assert_eq!(r#"{"a":1,"b":"x"}"#, value.to_string());
    }

    #[test]
    fn from_json_preserves_key_order() {
        let json: JsonValue = serde_json::from_str(r#"{"z":1,"a":2}"#).unwrap();
        let ContextValue::Map(map) = ContextValue::from(json) else {
            panic!("expected map");
        };
        let keys: Vec<&str> = map.keys().map(|k| k.as_str()).collect();
        assert_eq!(vec!["z", "a"], keys);
    }
}
