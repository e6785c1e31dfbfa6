//! Core data model.
//!
//! A job is one postal code to geocode, identified by its key. A result is
//! the (key, outcome) pair a worker produces for one delivery of that job.
//! Results travel on the `done` queue and land in the record file in the
//! same shape: a single-key JSON object `{"<key>": <viewport or null>}`.

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// A job taken off the `todo` queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub key: String,
}

impl Job {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// The message body published to `todo`: the raw key as a JSON string.
    pub fn to_message(&self) -> Value {
        Value::String(self.key.clone())
    }

    /// Parse a `todo` message body. Anything but a JSON string is rejected.
    pub fn from_message(body: &Value) -> Option<Self> {
        body.as_str().map(Self::new)
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// What one lookup attempt produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The viewport payload, passed through unexamined.
    Found(Value),
    /// Lookup failed for any reason. Serialized as `null`.
    Failed,
}

impl Outcome {
    /// Wrap a payload as-is. Only `null`, the wire form of a failure,
    /// becomes [`Outcome::Failed`].
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Null => Self::Failed,
            other => Self::Found(other),
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            Self::Found(v) => Some(v),
            Self::Failed => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Found(v) => v.clone(),
            Self::Failed => Value::Null,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Found(_) => "found",
            Self::Failed => "failed",
        }
    }
}

// ---------------------------------------------------------------------------
// JobResult
// ---------------------------------------------------------------------------

/// The result of one processing attempt for one job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    pub key: String,
    pub outcome: Outcome,
}

impl JobResult {
    pub fn new(key: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            key: key.into(),
            outcome,
        }
    }

    /// Encode as `{"<key>": <payload or null>}`.
    pub fn to_entry(&self) -> Value {
        let mut map = serde_json::Map::with_capacity(1);
        map.insert(self.key.clone(), self.outcome.to_value());
        Value::Object(map)
    }

    /// Decode a single-key mapping. Returns a description of the problem
    /// for anything else.
    pub fn from_entry(value: Value) -> std::result::Result<Self, String> {
        let Value::Object(map) = value else {
            return Err(format!("expected a JSON object, got {}", kind_of(&value)));
        };
        if map.len() != 1 {
            return Err(format!("expected exactly one key, got {}", map.len()));
        }
        let Some((key, outcome)) = map.into_iter().next() else {
            return Err("expected exactly one key, got 0".to_string());
        };
        Ok(Self::new(key, Outcome::from_value(outcome)))
    }
}

impl Serialize for JobResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match &self.outcome {
            Outcome::Found(v) => map.serialize_entry(&self.key, v)?,
            Outcome::Failed => map.serialize_entry(&self.key, &Value::Null)?,
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for JobResult {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_entry(value).map_err(de::Error::custom)
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
