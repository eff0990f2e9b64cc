// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Telemetry record model.
//!
//! A [`Record`] is one unit of telemetry (log entry, metric point, or span)
//! carrying an epoch-millisecond timestamp and an insertion-ordered attribute
//! map with a closed set of scalar value kinds, so that serialization is
//! deterministic across runs.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::time::UNIX_EPOCH;

/// Scalar attribute value. Serializes as a plain JSON scalar.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Str(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Str(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

/// Mapping of unique string keys to scalar values.
///
/// Keys keep their first-insertion position; re-inserting a key replaces the
/// value in place. Serializes as a JSON object in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    entries: Vec<(String, AttributeValue)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        let key = key.into();
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Serialize for Attributes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// What kind of telemetry a record carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, derive_more::Display)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    #[display("log")]
    Log,
    #[display("metric")]
    Metric,
    #[display("span")]
    Span,
}

/// Log severity, serialized as OTLP-style severity text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, derive_more::Display)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    #[display("TRACE")]
    Trace,
    #[display("DEBUG")]
    Debug,
    #[display("INFO")]
    Info,
    #[display("WARN")]
    Warn,
    #[display("ERROR")]
    Error,
}

/// One unit of telemetry. Immutable once handed to the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    /// Event time, epoch milliseconds
    pub timestamp_ms: i64,
    pub kind: RecordKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub attributes: Attributes,
}

impl Record {
    /// Creates a log record stamped with the current time.
    pub fn log(severity: Severity, body: impl Into<String>) -> Self {
        Record {
            timestamp_ms: epoch_millis(),
            kind: RecordKind::Log,
            severity: Some(severity),
            body: Some(body.into()),
            name: None,
            attributes: Attributes::new(),
        }
    }

    /// Creates a metric point stamped with the current time.
    pub fn metric(name: impl Into<String>) -> Self {
        Record {
            timestamp_ms: epoch_millis(),
            kind: RecordKind::Metric,
            severity: None,
            body: None,
            name: Some(name.into()),
            attributes: Attributes::new(),
        }
    }

    /// Creates a span record stamped with the current time.
    pub fn span(name: impl Into<String>) -> Self {
        Record {
            timestamp_ms: epoch_millis(),
            kind: RecordKind::Span,
            severity: None,
            body: None,
            name: Some(name.into()),
            attributes: Attributes::new(),
        }
    }

    pub fn with_timestamp(mut self, timestamp_ms: i64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }

    pub fn with_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.attributes.insert(key, value);
        self
    }
}

fn epoch_millis() -> i64 {
    UNIX_EPOCH
        .elapsed()
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}
