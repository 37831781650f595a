use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Value published on a channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    Scalar(f64),
    Text(String),
    /// Flat numeric array, e.g. an image detector before reshaping
    Waveform(Vec<f64>),
    Array(Array2<f64>),
}

/// Discriminant of [`Value`], used to declare what a channel publishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Scalar,
    Text,
    Waveform,
    Array,
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Scalar(_) => ValueKind::Scalar,
            Value::Text(_) => ValueKind::Text,
            Value::Waveform(_) => ValueKind::Waveform,
            Value::Array(_) => ValueKind::Array,
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Short human-readable description, used in log lines
    pub fn summary(&self) -> String {
        match self {
            Value::Scalar(v) => format!("{}", v),
            Value::Text(s) => format!("{:?}", s),
            Value::Waveform(data) => format!("waveform[{}]", data.len()),
            Value::Array(a) => format!("array[{}x{}]", a.nrows(), a.ncols()),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Scalar(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Array2<f64>> for Value {
    fn from(a: Array2<f64>) -> Self {
        Value::Array(a)
    }
}

/// One published value on a named channel
#[derive(Debug, Clone)]
pub struct ChannelUpdate {
    pub channel: String,
    pub value: Value,
    pub timestamp: Instant,
}

impl ChannelUpdate {
    pub fn new(channel: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            channel: channel.into(),
            value: value.into(),
            timestamp: Instant::now(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: Instant) -> Self {
        self.timestamp = timestamp;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_kind() {
        assert_eq!(Value::from(1.0).kind(), ValueKind::Scalar);
        assert_eq!(Value::from("um").kind(), ValueKind::Text);
        assert_eq!(Value::Waveform(vec![1.0]).kind(), ValueKind::Waveform);
        assert_eq!(Value::from(Array2::<f64>::zeros((2, 2))).kind(), ValueKind::Array);
    }

    #[test]
    fn test_value_json_shape() {
        let json = serde_json::to_value(Value::Scalar(2.5)).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "scalar", "value": 2.5}));
    }

    #[test]
    fn test_summary() {
        let value = Value::from(Array2::<f64>::zeros((4, 3)));
        assert_eq!(value.summary(), "array[4x3]");
    }
}
