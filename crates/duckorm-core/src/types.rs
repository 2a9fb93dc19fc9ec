//! SQL dialects and column types.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The SQL dialect families DuckORM can compile to.
///
/// The set is closed: anything else is rejected with
/// [`Error::UnsupportedDialect`] when a dialect name is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Sqlite,
    #[serde(alias = "postgresql")]
    Postgres,
}

impl Dialect {
    /// Canonical dialect name, as reported by executors.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgresql",
        }
    }

    /// Parse a dialect name (case-insensitive).
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            "postgresql" | "postgres" => Ok(Dialect::Postgres),
            _ => Err(Error::UnsupportedDialect(name.to_string())),
        }
    }
}

impl FromStr for Dialect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Dialect::parse(s)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Logical column types.
///
/// `Varchar` and `Char` carry their length, which must be positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    Str,
    Int,
    BigInt,
    Float,
    Varchar(u32),
    Char(u32),
    Boolean,
    Timestamp,
}

impl SqlType {
    /// The type name as written in a column definition.
    #[must_use]
    pub fn sql_name(&self, dialect: Dialect) -> String {
        match (self, dialect) {
            (SqlType::Str, _) => "TEXT".to_string(),
            (SqlType::Int, _) => "INTEGER".to_string(),
            (SqlType::BigInt, _) => "BIGINT".to_string(),
            (SqlType::Float, _) => "FLOAT".to_string(),
            (SqlType::Varchar(len), _) => format!("VARCHAR({len})"),
            (SqlType::Char(len), _) => format!("CHARACTER({len})"),
            // SQLite has no native boolean or timestamp storage class
            (SqlType::Boolean, Dialect::Sqlite) => "INTEGER".to_string(),
            (SqlType::Boolean, Dialect::Postgres) => "BOOLEAN".to_string(),
            (SqlType::Timestamp, Dialect::Sqlite) => "TEXT".to_string(),
            (SqlType::Timestamp, Dialect::Postgres) => "TIMESTAMP".to_string(),
        }
    }

    /// Declared length for sized character types.
    #[must_use]
    pub const fn length(&self) -> Option<u32> {
        match self {
            SqlType::Varchar(len) | SqlType::Char(len) => Some(*len),
            _ => None,
        }
    }

    /// Whether the type stores integers.
    #[must_use]
    pub const fn is_integer(&self) -> bool {
        matches!(self, SqlType::Int | SqlType::BigInt)
    }
}
