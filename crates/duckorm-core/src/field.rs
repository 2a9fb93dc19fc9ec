//! Column definitions and their DDL rendering.

use crate::error::{Error, Result};
use crate::types::{Dialect, SqlType};
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Referential action for foreign key constraints (ON DELETE / ON UPDATE).
///
/// These define what happens to referencing rows when the referenced row is
/// deleted or updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferentialAction {
    /// No action - raise error if any references exist.
    #[default]
    NoAction,
    /// Restrict - same as NO ACTION (alias for compatibility).
    Restrict,
    /// Cascade - automatically delete/update referencing rows.
    Cascade,
    /// Set null - set referencing columns to NULL.
    SetNull,
    /// Set default - set referencing columns to their default values.
    SetDefault,
}

impl ReferentialAction {
    /// Get the SQL representation of this action.
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
        }
    }

    /// Parse a referential action from a string (case-insensitive).
    ///
    /// Returns `None` if the string is not a recognized action.
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "NO ACTION" | "NOACTION" | "NO_ACTION" => Some(ReferentialAction::NoAction),
            "RESTRICT" => Some(ReferentialAction::Restrict),
            "CASCADE" => Some(ReferentialAction::Cascade),
            "SET NULL" | "SETNULL" | "SET_NULL" => Some(ReferentialAction::SetNull),
            "SET DEFAULT" | "SETDEFAULT" | "SET_DEFAULT" => Some(ReferentialAction::SetDefault),
            _ => None,
        }
    }
}

/// A physical column of a table.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Column name (also the record field name)
    pub name: String,
    pub sql_type: SqlType,
    pub unique: bool,
    pub primary_key: bool,
    pub not_null: bool,
    /// Only valid together with `primary_key`
    pub auto_increment: bool,
    /// Literal default, rendered as `DEFAULT '<value>'`
    pub default: Option<Value>,
}

impl Column {
    /// Create a plain nullable column.
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            unique: false,
            primary_key: false,
            not_null: false,
            auto_increment: false,
            default: None,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, SqlType::Str)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, SqlType::Int)
    }

    pub fn big_integer(name: impl Into<String>) -> Self {
        Self::new(name, SqlType::BigInt)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, SqlType::Float)
    }

    pub fn varchar(name: impl Into<String>, length: u32) -> Self {
        Self::new(name, SqlType::Varchar(length))
    }

    pub fn char(name: impl Into<String>, length: u32) -> Self {
        Self::new(name, SqlType::Char(length))
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, SqlType::Boolean)
    }

    pub fn timestamp(name: impl Into<String>) -> Self {
        Self::new(name, SqlType::Timestamp)
    }

    /// Set whether this is the primary key.
    pub const fn primary_key(mut self, value: bool) -> Self {
        self.primary_key = value;
        self
    }

    /// Set whether values are generated by the database.
    pub const fn auto_increment(mut self, value: bool) -> Self {
        self.auto_increment = value;
        self
    }

    pub const fn not_null(mut self, value: bool) -> Self {
        self.not_null = value;
        self
    }

    pub const fn unique(mut self, value: bool) -> Self {
        self.unique = value;
        self
    }

    /// Set the literal default value.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Check the structural invariants of the column.
    ///
    /// `table` is only used to label the error.
    pub fn validate(&self, table: &str) -> Result<()> {
        if self.auto_increment && !self.primary_key {
            return Err(Error::invalid_schema(
                table,
                Some(&self.name),
                "auto_increment requires primary_key",
            ));
        }
        if self.sql_type.length() == Some(0) {
            return Err(Error::invalid_schema(
                table,
                Some(&self.name),
                "character length must be positive",
            ));
        }
        if matches!(self.default, Some(Value::List(_))) {
            return Err(Error::invalid_schema(
                table,
                Some(&self.name),
                "default value must be a scalar",
            ));
        }
        Ok(())
    }

    /// The type portion of the column definition.
    ///
    /// On Postgres an auto-increment column is declared `SERIAL`, which
    /// replaces the base type entirely.
    pub fn ddl_type(&self, dialect: Dialect) -> String {
        if self.auto_increment && dialect == Dialect::Postgres {
            return "SERIAL".to_string();
        }
        self.sql_type.sql_name(dialect)
    }

    /// Everything after the column name in a column definition.
    ///
    /// Clauses are emitted in a fixed order: type, `PRIMARY KEY`,
    /// `AUTOINCREMENT`, `NOT NULL`, `UNIQUE`, `DEFAULT`.
    pub fn ddl_fragment(&self, dialect: Dialect) -> String {
        let mut sql = self.ddl_type(dialect);

        if self.primary_key {
            sql.push_str(" PRIMARY KEY");
        }
        if self.auto_increment && dialect == Dialect::Sqlite {
            sql.push_str(" AUTOINCREMENT");
        }
        if self.not_null {
            sql.push_str(" NOT NULL");
        }
        if self.unique {
            sql.push_str(" UNIQUE");
        }
        if let Some(default) = &self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default_literal(default, dialect));
        }

        sql
    }

    /// Full column definition: `name fragment`.
    pub fn column_sql(&self, dialect: Dialect) -> String {
        format!("{} {}", self.name, self.ddl_fragment(dialect))
    }
}

fn default_literal(value: &Value, dialect: Dialect) -> String {
    match (value, dialect) {
        (Value::Null, _) => "NULL".to_string(),
        (Value::Bool(b), Dialect::Sqlite) => Value::quote(if *b { "1" } else { "0" }),
        (Value::Bool(b), Dialect::Postgres) => Value::quote(if *b { "true" } else { "false" }),
        (other, _) => Value::quote(&other.to_string()),
    }
}
