//! Output record model shared by every datakit input
//!
//! A [`Record`] is one emitted metric, object or log data point:
//! - `name` is the measurement (object class, metric set or log source)
//! - `tags` identify the record and are never exploded from unbounded maps
//! - `fields` carry values, optionally including a JSON `message` snapshot
//!
//! Records are built immediately before they are fed and are not mutated
//! afterwards; the feed takes them by value.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Field holding the JSON snapshot of a record's tags and fields
pub const MESSAGE_FIELD: &str = "message";

/// Upper bound for the `message` snapshot, in bytes
pub const MAX_MESSAGE_LEN: usize = 256 * 1024;

/// Output category a batch of records is fed under
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Metric,
    Object,
    Logging,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Metric => "metric",
            Category::Object => "object",
            Category::Logging => "logging",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scalar field value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl FieldValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(v) => Some(v),
            _ => None,
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Int(v) => serde_json::Value::from(*v),
            FieldValue::Float(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            FieldValue::Bool(v) => serde_json::Value::Bool(*v),
            FieldValue::Str(v) => serde_json::Value::String(v.clone()),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v as i64)
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::Int(v as i64)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<usize> for FieldValue {
    fn from(v: usize) -> Self {
        FieldValue::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

/// One emitted data point
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub name: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, FieldValue>,
    pub timestamp: DateTime<Utc>,
}

impl Record {
    pub fn new(name: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp,
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_tag(key, value);
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set_field(key, value);
        self
    }

    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key.into(), value.into());
    }

    pub fn set_field(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Merge operator-supplied tags without overriding identifying tags
    pub fn merge_tags(&mut self, tags: &BTreeMap<String, String>) {
        for (k, v) in tags {
            self.tags.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Attach the `message` snapshot of the current tags and fields
    pub fn attach_message(&mut self) {
        let message = snapshot_message(&self.tags, &self.fields);
        self.fields
            .insert(MESSAGE_FIELD.to_string(), FieldValue::Str(message));
    }

    pub fn with_message(mut self) -> Self {
        self.attach_message();
        self
    }

    /// Set `message` to a caller-serialized body, capped like the snapshot
    pub fn set_message_body(&mut self, body: String) {
        self.fields.insert(
            MESSAGE_FIELD.to_string(),
            FieldValue::Str(truncate_on_char_boundary(body, MAX_MESSAGE_LEN)),
        );
    }
}

/// JSON object holding the union of `tags` and `fields`
///
/// Fields win over tags on key collision. An existing `message` field is
/// never nested into the new snapshot.
pub fn snapshot_message(
    tags: &BTreeMap<String, String>,
    fields: &BTreeMap<String, FieldValue>,
) -> String {
    let mut object = serde_json::Map::new();

    for (k, v) in tags {
        object.insert(k.clone(), serde_json::Value::String(v.clone()));
    }
    for (k, v) in fields {
        if k == MESSAGE_FIELD {
            continue;
        }
        object.insert(k.clone(), v.to_json());
    }

    let text = serde_json::Value::Object(object).to_string();
    truncate_on_char_boundary(text, MAX_MESSAGE_LEN)
}

fn truncate_on_char_boundary(mut text: String, max: usize) -> String {
    if text.len() <= max {
        return text;
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    text
}
