use std::fmt::{Display, Formatter};
use std::time::SystemTime;

use crate::broker::QoS;

/// Immutable record of one broker delivery.
///
/// The single shape the pipeline consumes, whether the message came from
/// the broker or was synthesized by the periodic scheduler.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retained: bool,
    pub receive_time: SystemTime,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: Vec<u8>, qos: QoS, retained: bool) -> Self {
        Self {
            topic: topic.into(),
            payload,
            qos,
            retained,
            receive_time: SystemTime::now(),
        }
    }

    pub fn payload_as_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).to_string()
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "topic={} qos={} retained={} bytes={}",
            self.topic,
            self.qos,
            self.retained,
            self.payload.len()
        )
    }
}
