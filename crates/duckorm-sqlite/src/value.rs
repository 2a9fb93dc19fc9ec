//! Conversions between DuckORM values and SQLite storage classes.

use duckorm_core::Value;
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};

/// Binds a [`Value`] to a statement parameter.
#[derive(Debug)]
pub(crate) struct Bind<'a>(pub &'a Value);

impl ToSql for Bind<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self.0 {
            Value::Null => Ok(ToSqlOutput::Owned(SqlValue::Null)),
            Value::Bool(b) => Ok(ToSqlOutput::Owned(SqlValue::Integer(i64::from(*b)))),
            Value::Int(i) => Ok(ToSqlOutput::Owned(SqlValue::Integer(*i))),
            Value::Double(f) => Ok(ToSqlOutput::Owned(SqlValue::Real(*f))),
            Value::Text(s) => Ok(ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes()))),
            Value::List(_) => Err(rusqlite::Error::ToSqlConversionFailure(
                "list values cannot be bound to a parameter".into(),
            )),
        }
    }
}

/// Read one column of a result row.
///
/// SQLite has no boolean storage class, so booleans come back as integers.
/// Text that is not valid UTF-8 is decoded lossily; blobs are not produced
/// by DuckORM schemas and read as NULL.
pub(crate) fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null | ValueRef::Blob(_) => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Double(f),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
    }
}
