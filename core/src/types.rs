//! Dataset schema and data payload types.
//!
//! # Design
//! A field's type and its type-specific attribute travel together in
//! `FieldKind`, so a duration field always carries a time unit, a money field
//! always carries a currency code, and no other field can carry either.
//! `fields` is a `BTreeMap` so the serialized schema is deterministic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single data row: field key to JSON value. The server validates rows
/// against the dataset schema.
pub type DataRow = serde_json::Map<String, serde_json::Value>;

/// Rows in the order they should be sent.
pub type Data = Vec<DataRow>;

/// Unit for the values of a duration field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
}

/// The type of a field, with the attributes only that type accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldKind {
    Number,
    Date,
    Datetime,
    String,
    Percentage,
    Duration { time_unit: TimeUnit },
    /// `currency_code` is an ISO 4217 code such as `USD`.
    Money { currency_code: String },
}

/// One column of a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    #[serde(flatten)]
    pub kind: FieldKind,
    /// Display name shown in Geckoboard.
    pub name: String,
    #[serde(default)]
    pub optional: bool,
}

impl Field {
    pub fn new(kind: FieldKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            optional: false,
        }
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(FieldKind::Number, name)
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(FieldKind::Date, name)
    }

    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(FieldKind::Datetime, name)
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(FieldKind::String, name)
    }

    pub fn percentage(name: impl Into<String>) -> Self {
        Self::new(FieldKind::Percentage, name)
    }

    pub fn duration(name: impl Into<String>, time_unit: TimeUnit) -> Self {
        Self::new(FieldKind::Duration { time_unit }, name)
    }

    pub fn money(name: impl Into<String>, currency_code: impl Into<String>) -> Self {
        Self::new(
            FieldKind::Money {
                currency_code: currency_code.into(),
            },
            name,
        )
    }

    /// Mark the field as optional.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// A named dataset and its schema.
///
/// `name` is used verbatim in request paths, so it must be URL-path-safe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(rename = "id")]
    pub name: String,
    pub fields: BTreeMap<String, Field>,
    /// Field keys forming the natural key used to deduplicate appended rows.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unique_by: Vec<String>,
}

impl Dataset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, field: Field) -> Self {
        self.fields.insert(key.into(), field);
        self
    }

    pub fn with_unique_by<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique_by = keys.into_iter().map(Into::into).collect();
        self
    }
}

/// Request body for append and replace calls.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DataPayload<'a> {
    pub data: &'a [DataRow],
}
