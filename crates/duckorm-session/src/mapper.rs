//! Conversions between rows, records and bound statement values.
//!
//! These are the synchronous halves of the entity mapper. Substituting
//! resolved records for foreign-key values needs the executor and lives in
//! the session.

use duckorm_core::{Column, Error, FieldValue, Record, Result, Row, SqlType, Value};
use duckorm_schema::{Schema, SchemaRegistry};

/// Build a record from a row, in schema field order.
///
/// Every physical field is present in the result; a field missing from the
/// row reads as NULL.
pub fn to_record(schema: &Schema, row: &Row) -> Record {
    let mut record = Record::new(schema.table_name());
    for name in schema.physical_fields() {
        let value = row.get(name).cloned().unwrap_or(Value::Null);
        let value = match schema.column(name) {
            Some(column) => column_value(column, value),
            None => value,
        };
        record.set(name, value);
    }
    record
}

/// Restore the declared type of a value the driver widened.
///
/// SQLite stores booleans as integers. Timestamps stay text.
fn column_value(column: &Column, value: Value) -> Value {
    match (&column.sql_type, value) {
        (SqlType::Boolean, Value::Int(v)) => Value::Bool(v != 0),
        (_, value) => value,
    }
}

/// The primary-key value of a record, if it has one.
///
/// A one-to-one key holding a nested record yields that record's own key.
pub fn primary_key_value(
    registry: &SchemaRegistry,
    schema: &Schema,
    record: &Record,
) -> Result<Option<Value>> {
    let pk = schema.primary_key()?;
    match record.get(pk.name()) {
        None => Ok(None),
        Some(field) => key_of(registry, field),
    }
}

/// Reduce a field value to the scalar stored in its column.
fn key_of(registry: &SchemaRegistry, field: &FieldValue) -> Result<Option<Value>> {
    match field {
        FieldValue::Value(Value::Null) => Ok(None),
        FieldValue::Value(v) => Ok(Some(v.clone())),
        FieldValue::Record(nested) => {
            let schema = registry.require(nested.table_name())?;
            primary_key_value(registry, schema, nested)
        }
        FieldValue::Records(_) => Ok(None),
    }
}

/// Flatten a field value for binding: nested records become their key.
pub fn to_sql_value(
    registry: &SchemaRegistry,
    schema: &Schema,
    name: &str,
    field: &FieldValue,
) -> Result<Value> {
    match field {
        FieldValue::Value(v) => Ok(v.clone()),
        FieldValue::Record(_) => Ok(key_of(registry, field)?.unwrap_or(Value::Null)),
        FieldValue::Records(_) => Err(Error::UnknownField {
            table: schema.table_name().to_string(),
            field: name.to_string(),
        }),
    }
}

/// Named values for an INSERT of `record`.
///
/// Fields follow the schema order, then any one-to-many columns other
/// schemas attach to this table. A NULL generated key is left for the
/// database to assign. Collection fields are skipped; any other field the
/// table does not have is an error.
pub fn to_sql_values(
    registry: &SchemaRegistry,
    schema: &Schema,
    record: &Record,
) -> Result<Vec<(String, Value)>> {
    let generated_key = schema
        .primary_key()
        .ok()
        .filter(|pk| pk.is_generated())
        .map(|pk| pk.name().to_string());
    let inbound = registry.inbound_columns(schema.table_name());

    for name in record.field_names() {
        let known = match schema.field(name) {
            Some(_) => true,
            None => inbound.contains(&name),
        };
        if !known {
            return Err(Error::UnknownField {
                table: schema.table_name().to_string(),
                field: name.to_string(),
            });
        }
    }

    let mut values = Vec::with_capacity(record.len());
    let ordered = schema
        .physical_fields()
        .into_iter()
        .chain(inbound.iter().copied());
    for name in ordered {
        let Some(field) = record.get(name) else {
            continue;
        };
        let value = to_sql_value(registry, schema, name, field)?;
        if value.is_null() && generated_key.as_deref() == Some(name) {
            continue;
        }
        values.push((name.to_string(), value));
    }
    Ok(values)
}
