use std::fmt::Write as _;

use chrono::{DateTime, Local, Utc};
use indexmap::IndexMap;
use serde::Deserialize;

use crate::broker::QoS;
use crate::config::route::Route;
use crate::message::Message;
use crate::topic;
use crate::value::ContextValue;

/// Which wall-clock the `_dt*` fields render in.
#[derive(Clone, Copy, Debug, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimeZoneMode {
    #[default]
    Local,
    Utc,
}

/// Built from a `Message` by the pipeline, extended by `datamap_fn` and
/// `alldata_fn`. A `Job`'s context is always a clone of this, never a
/// shared reference, so downstream plugins cannot affect future routing.
#[derive(Clone, Debug, PartialEq)]
pub struct TransformContext {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retained: bool,
    pub values: IndexMap<String, ContextValue>,
}

impl TransformContext {
    /// Message fields, topic captures, and time fields.
    pub fn base(route: &Route, message: &Message, time_zone: TimeZoneMode) -> Self {
        let mut values = IndexMap::new();

        let parts: Vec<ContextValue> = message
            .topic
            .split('/')
            .map(|segment| ContextValue::Text(segment.to_string()))
            .collect();
        values.insert("_topic_parts".to_string(), ContextValue::List(parts));

        let captures = topic::captures(&route.topic_pattern, &message.topic)
            .into_iter()
            .map(ContextValue::Text)
            .collect();
        values.insert("_topic".to_string(), ContextValue::List(captures));

        insert_time_fields(&mut values, message.receive_time, time_zone);

        Self {
            topic: message.topic.clone(),
            payload: message.payload.clone(),
            qos: message.qos,
            retained: message.retained,
            values,
        }
    }

    /// A minimal context for a periodic task tick, which has no originating
    /// `Message` or matched `Route` yet.
    pub fn empty(topic: impl Into<String>) -> Self {
        let mut values = IndexMap::new();
        insert_time_fields(
            &mut values,
            std::time::SystemTime::now(),
            TimeZoneMode::Local,
        );
        Self {
            topic: topic.into(),
            payload: Vec::new(),
            qos: QoS::AtMostOnce,
            retained: false,
            values,
        }
    }

    /// Stage 3 of §4.2: decode failure is never fatal, it just leaves the
    /// context without payload-derived keys.
    pub fn merge_decoded_payload(&mut self) {
        match serde_json::from_slice::<serde_json::Value>(&self.payload) {
            Ok(serde_json::Value::Object(map)) => {
                for (key, value) in map {
                    self.values.insert(key, ContextValue::from(value));
                }
            }
            Ok(serde_json::Value::Array(values)) => {
                self.values.insert(
                    "_payload".to_string(),
                    ContextValue::List(values.into_iter().map(ContextValue::from).collect()),
                );
            }
            Ok(scalar) => {
                self.values
                    .insert("_payload".to_string(), ContextValue::from(scalar));
            }
            Err(_) => {}
        }
    }

    pub fn merge(&mut self, other: IndexMap<String, ContextValue>) {
        for (key, value) in other {
            self.values.insert(key, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.values.get(key)
    }

    pub fn payload_as_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).to_string()
    }

    /// Interpolates `{name}` placeholders against `self.values`. A missing
    /// key resolves to the literal placeholder text, left in the output
    /// unchanged.
    pub fn render_template(&self, template: &str) -> String {
        let mut output = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            output.push_str(&rest[..open]);
            let after_open = &rest[open + 1..];
            match after_open.find('}') {
                Some(close) => {
                    let key = &after_open[..close];
                    match self.values.get(key) {
                        Some(value) => {
                            let _ = write!(output, "{value}");
                        }
                        None => {
                            let _ = write!(output, "{{{key}}}");
                        }
                    }
                    rest = &after_open[close + 1..];
                }
                None => {
                    output.push('{');
                    rest = after_open;
                }
            }
        }
        output.push_str(rest);
        output
    }
}

fn insert_time_fields(
    values: &mut IndexMap<String, ContextValue>,
    at: std::time::SystemTime,
    time_zone: TimeZoneMode,
) {
    let epoch = at
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let (dt, dthhmm) = match time_zone {
        TimeZoneMode::Local => {
            let dt: DateTime<Local> = at.into();
            (
                dt.format("%Y-%m-%d %H:%M:%S").to_string(),
                dt.format("%H:%M").to_string(),
            )
        }
        TimeZoneMode::Utc => {
            let dt: DateTime<Utc> = at.into();
            (
                dt.format("%Y-%m-%d %H:%M:%S").to_string(),
                dt.format("%H:%M").to_string(),
            )
        }
    };

    values.insert("_dt".to_string(), ContextValue::Text(dt));
    values.insert("_dthhmm".to_string(), ContextValue::Text(dthhmm));
    values.insert("_dtepoch".to_string(), ContextValue::Number(epoch as f64));
}
