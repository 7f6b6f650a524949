//! One polling cycle's observation: capture time + ordered parameter values

use chrono::{DateTime, Local};
use serde_json::{Number, Value};
use std::fmt;

use crate::probe::Payload;

/// Name of the leading CSV column
pub const TIMESTAMP_COLUMN: &str = "timestamp";
/// Where a device key literally named `timestamp` is moved
pub const DEVICE_TIMESTAMP_KEY: &str = "device_timestamp";

/// A scalar parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Number(Number),
    Text(String),
    Blank,
}

impl FieldValue {
    /// Booleans, arrays and objects are kept as their JSON text
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => FieldValue::Blank,
            Value::Number(n) => FieldValue::Number(n.clone()),
            Value::String(s) => FieldValue::Text(s.clone()),
            other => FieldValue::Text(other.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, FieldValue::Number(n) if n.is_f64())
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Blank => Ok(()),
        }
    }
}

/// Immutable capture of one payload
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    captured_at: DateTime<Local>,
    fields: Vec<(String, FieldValue)>,
}

impl Record {
    pub fn new(captured_at: DateTime<Local>, fields: Vec<(String, FieldValue)>) -> Self {
        Self {
            captured_at,
            fields,
        }
    }

    /// Wrap a device payload, keeping the device's key order
    pub fn from_payload(captured_at: DateTime<Local>, payload: &Payload) -> Self {
        let fields = payload
            .iter()
            .map(|(key, value)| {
                let key = if key == TIMESTAMP_COLUMN {
                    free_device_timestamp_key(payload)
                } else {
                    key.clone()
                };
                (key, FieldValue::from_json(value))
            })
            .collect();

        Self::new(captured_at, fields)
    }

    pub fn captured_at(&self) -> DateTime<Local> {
        self.captured_at
    }

    /// ISO-8601 local time with microseconds
    pub fn timestamp(&self) -> String {
        self.captured_at.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn fields(&self) -> &[(String, FieldValue)] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// `device_timestamp`, or `device_timestamp_N` if the device already uses that name
fn free_device_timestamp_key(payload: &Payload) -> String {
    if !payload.contains_key(DEVICE_TIMESTAMP_KEY) {
        return DEVICE_TIMESTAMP_KEY.to_string();
    }
    (1..)
        .map(|n| format!("{}_{}", DEVICE_TIMESTAMP_KEY, n))
        .find(|candidate| !payload.contains_key(candidate))
        .unwrap_or_else(|| DEVICE_TIMESTAMP_KEY.to_string())
}
