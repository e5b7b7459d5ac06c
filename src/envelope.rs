//! Tagged envelope: the record format persisted to a storage medium.
//!
//! A medium only stores strings, so every value is written as
//! `{"type": <tag>, "value": <payload>}` where the tag records the value's
//! original shape. Decoding switches on the tag instead of guessing from the
//! payload, so `"42"` stored as a string never comes back as a number.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, StateError};

/// The shape of a value as recorded in its envelope.
///
/// Non-finite floats (`NaN`, `±inf`) have no JSON form and serialize as
/// `null`, so they are tagged [`ValueKind::Object`] with payload `"null"`.
/// Reading one back as `f64` fails and the load reports nothing stored;
/// read it as `Option<f64>` to get `None` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Number,
    Boolean,
    /// Records, and also `null`.
    Object,
    Array,
    String,
}

impl ValueKind {
    /// Classify a JSON value.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Number(_) => ValueKind::Number,
            Value::Bool(_) => ValueKind::Boolean,
            Value::String(_) => ValueKind::String,
            Value::Array(_) => ValueKind::Array,
            Value::Object(_) | Value::Null => ValueKind::Object,
        }
    }
}

/// A value's type tag and its stringified payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Original type category.
    #[serde(rename = "type")]
    pub kind: ValueKind,
    /// Stringified payload.
    pub value: String,
}

impl Envelope {
    /// Wrap a value in an envelope.
    pub fn wrap<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        let json = serde_json::to_value(value)?;
        let kind = ValueKind::of(&json);
        let value = match json {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            other => serde_json::to_string(&other)?,
        };
        Ok(Self { kind, value })
    }

    /// Reconstruct the JSON value according to the recorded tag.
    pub fn to_value(&self) -> Result<Value> {
        let value = match self.kind {
            ValueKind::String => Value::String(self.value.clone()),
            ValueKind::Boolean => Value::Bool(self.value == "true"),
            ValueKind::Number => {
                let number: serde_json::Number = serde_json::from_str(self.value.trim())
                    .map_err(|e| {
                        StateError::Deserialization(format!(
                            "number payload {:?}: {}",
                            self.value, e
                        ))
                    })?;
                Value::Number(number)
            }
            ValueKind::Object | ValueKind::Array => serde_json::from_str(&self.value)
                .map_err(|e| StateError::Deserialization(format!("{:?} payload: {}", self.kind, e)))?,
        };
        Ok(value)
    }

    /// Reconstruct the original typed value.
    pub fn open<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.to_value()?)
            .map_err(|e| StateError::Deserialization(e.to_string()))
    }

    /// Serialize the envelope into the string record stored in a medium.
    pub fn to_record(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a stored record.
    ///
    /// Unknown tags and malformed records are deserialization failures.
    pub fn from_record(record: &str) -> Result<Self> {
        serde_json::from_str(record).map_err(|e| StateError::Deserialization(e.to_string()))
    }
}
