//! Dynamic records: the in-memory shape of one table row.
//!
//! A `Record` is either built by the caller before it is saved (no primary
//! key value yet) or produced by the entity mapper from a fetched row, in
//! which case foreign-key fields already hold the resolved target records.
//!
//! # Example
//!
//! ```
//! use duckorm_core::{Record, Value};
//!
//! let person = Record::new("persons")
//!     .with("first_name", "Rich")
//!     .with("age", 30);
//!
//! assert_eq!(person.table_name(), "persons");
//! assert_eq!(person.value("first_name").and_then(Value::as_str), Some("Rich"));
//! assert!(person.value("id").is_none());
//! ```

use crate::value::Value;
use indexmap::IndexMap;

/// The value held by one record field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// A scalar column value.
    Value(Value),
    /// A resolved foreign-key / one-to-one target.
    Record(Box<Record>),
    /// A materialized collection of related records.
    Records(Vec<Record>),
}

impl FieldValue {
    /// The scalar value, if this field holds one.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            FieldValue::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            FieldValue::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_records(&self) -> Option<&[Record]> {
        match self {
            FieldValue::Records(r) => Some(r),
            _ => None,
        }
    }

    /// Whether the field is absent in the SQL sense.
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Value(Value::Null))
    }

    /// Export as JSON; nested records become objects.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Value(v) => serde_json::to_value(v).unwrap_or(serde_json::Value::Null),
            FieldValue::Record(r) => r.to_json(),
            FieldValue::Records(rs) => {
                serde_json::Value::Array(rs.iter().map(Record::to_json).collect())
            }
        }
    }
}

macro_rules! impl_scalar_field_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(v: $ty) -> Self {
                    FieldValue::Value(v.into())
                }
            }
        )*
    };
}

impl_scalar_field_value!(Value, bool, i32, i64, u32, f64, &str, String);

impl From<Record> for FieldValue {
    fn from(r: Record) -> Self {
        FieldValue::Record(Box::new(r))
    }
}

impl From<Vec<Record>> for FieldValue {
    fn from(rs: Vec<Record>) -> Self {
        FieldValue::Records(rs)
    }
}

/// An ordered field map tagged with its table.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// The table name.
    table_name: String,
    /// Field values in insertion order.
    fields: IndexMap<String, FieldValue>,
}

impl Record {
    /// Create an empty record for the given table.
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            fields: IndexMap::new(),
        }
    }

    /// Builder-style `set`.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(field, value);
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Set a field, keeping its position if it already exists.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// The scalar value of a field, if it holds one.
    pub fn value(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).and_then(FieldValue::as_value)
    }

    /// The resolved record of a reference field, if it holds one.
    pub fn related(&self, field: &str) -> Option<&Record> {
        self.fields.get(field).and_then(FieldValue::as_record)
    }

    /// Remove a field, returning it.
    pub fn remove(&mut self, field: &str) -> Option<FieldValue> {
        self.fields.shift_remove(field)
    }

    /// Check if a field has been set.
    pub fn has(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate fields in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Export the record as a JSON object, preserving field order.
    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        serde_json::Value::Object(map)
    }
}
