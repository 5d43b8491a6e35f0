//! Output of one recomputation pass.

use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Sentinel emitted for values that could not be determined.
pub const STATE_UNKNOWN: &str = "unknown";

/// Attribute value produced for a label.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Number(f64),
    Text(String),
    Unknown,
}

impl AttributeValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, AttributeValue::Unknown)
    }
}

impl Serialize for AttributeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AttributeValue::Number(v) => serializer.serialize_f64(*v),
            AttributeValue::Text(s) => serializer.serialize_str(s),
            AttributeValue::Unknown => serializer.serialize_str(STATE_UNKNOWN),
        }
    }
}

/// Overall status of a result set. Ordered by precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Ok,
    NoData,
    Error,
}

impl Status {
    /// Raises the status to `other` if it takes precedence; never lowers it.
    pub fn escalate(&mut self, other: Status) {
        if other > *self {
            *self = other;
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Ok => "ok",
            Status::NoData => "no_data",
            Status::Error => "error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attribute mapping plus status for one pass over a configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComputationResult {
    pub attributes: BTreeMap<String, AttributeValue>,
    pub status: Status,
}

impl ComputationResult {
    pub fn get(&self, label: &str) -> Option<&AttributeValue> {
        self.attributes.get(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_never_downgrades() {
        let mut status = Status::Ok;
        status.escalate(Status::Error);
        status.escalate(Status::NoData);
        status.escalate(Status::Ok);
        assert_eq!(status, Status::Error);
    }

    #[test]
    fn test_attribute_serialization() {
        let mut result = ComputationResult::default();
        result.attributes.insert("a".into(), AttributeValue::Number(1.5));
        result.attributes.insert("b".into(), AttributeValue::Text("on".into()));
        result.attributes.insert("c".into(), AttributeValue::Unknown);
        result.status = Status::NoData;

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["attributes"]["a"], 1.5);
        assert_eq!(json["attributes"]["b"], "on");
        assert_eq!(json["attributes"]["c"], "unknown");
        assert_eq!(json["status"], "no_data");
    }
}
