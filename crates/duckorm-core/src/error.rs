//! Error types for DuckORM operations.
//!
//! Compiler errors (dialect, schema, condition and relationship misuse) are
//! raised synchronously before any SQL reaches the executor. Executor errors
//! arrive as [`Error::Query`] or [`Error::Connection`] and are propagated as-is.

use std::fmt;

/// The primary error type for all DuckORM operations.
#[derive(Debug)]
pub enum Error {
    /// A dialect name outside the supported set was requested.
    UnsupportedDialect(String),
    /// A primary key was required but the schema declares none.
    MissingPrimaryKey {
        /// Table that was asked for its primary key
        table: String,
    },
    /// Unknown operator string, or an operator that cannot take the given value.
    InvalidOperator(String),
    /// A condition value that cannot be rendered as a SQL literal.
    UnsupportedValueType(String),
    /// `update` was called on a record whose primary key is absent.
    UpdateWithoutIdentity {
        /// Table of the record
        table: String,
    },
    /// A relation operation was attempted without a persisted owner.
    RelationshipNotBound {
        /// Relationship field name
        relationship: String,
    },
    /// A relationship names no target, or a target that is not registered.
    RelationshipTargetMissing {
        /// Relationship field name
        relationship: String,
        /// Target table, when one was declared
        target: Option<String>,
    },
    /// A schema or column violates a structural invariant.
    InvalidSchema(SchemaError),
    /// No schema is registered under this table name.
    UnknownSchema(String),
    /// A field name that the schema does not declare.
    UnknownField {
        /// Table being addressed
        table: String,
        /// Offending field name
        field: String,
    },
    /// Statement failure reported by the executor.
    Query(QueryError),
    /// Connection failure reported by the executor.
    Connection(ConnectionError),
    /// Anything else.
    Custom(String),
}

/// A schema or column definition that failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaError {
    /// Table the definition belongs to
    pub table: String,
    /// Column or relationship, if the problem is field-level
    pub field: Option<String>,
    pub message: String,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub message: String,
    /// The statement that failed, when known
    pub sql: Option<String>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// The statement could not be prepared
    Syntax,
    /// A constraint (unique, foreign key, not null) rejected the statement
    Constraint,
    /// The operation was cancelled before completing
    Cancelled,
    /// Any other database-side failure
    Database,
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to open the database
    Connect,
    /// The connection was used after `disconnect`
    Closed,
    /// The underlying handle is unusable (e.g. a poisoned lock)
    Broken,
}

impl Error {
    /// Create a schema validation error.
    pub fn invalid_schema(
        table: impl Into<String>,
        field: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        Error::InvalidSchema(SchemaError {
            table: table.into(),
            field: field.map(str::to_string),
            message: message.into(),
        })
    }

    /// Create a query error carrying the failing statement.
    pub fn query(kind: QueryErrorKind, message: impl Into<String>, sql: Option<&str>) -> Self {
        Error::Query(QueryError {
            kind,
            message: message.into(),
            sql: sql.map(str::to_string),
            source: None,
        })
    }

    /// Whether this error was raised by the SQL compiler rather than the executor.
    ///
    /// Compiler errors are raised before any I/O happens.
    pub fn is_compile_error(&self) -> bool {
        !matches!(
            self,
            Error::Query(_) | Error::Connection(_) | Error::Custom(_)
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnsupportedDialect(name) => write!(f, "Unsupported dialect: {name}"),
            Error::MissingPrimaryKey { table } => {
                write!(f, "Model has no primary key: {table}")
            }
            Error::InvalidOperator(msg) => write!(f, "Invalid operator: {msg}"),
            Error::UnsupportedValueType(msg) => write!(f, "Unsupported value type: {msg}"),
            Error::UpdateWithoutIdentity { table } => {
                write!(f, "Cannot update a {table} record without a primary key value")
            }
            Error::RelationshipNotBound { relationship } => write!(
                f,
                "Relationship '{relationship}' is not bound to a persisted record"
            ),
            Error::RelationshipTargetMissing {
                relationship,
                target,
            } => match target {
                Some(target) => write!(
                    f,
                    "Relationship '{relationship}' targets unregistered table '{target}'"
                ),
                None => write!(f, "Relationship '{relationship}' declares no target"),
            },
            Error::InvalidSchema(e) => write!(f, "Invalid schema: {e}"),
            Error::UnknownSchema(table) => write!(f, "No schema registered for table '{table}'"),
            Error::UnknownField { table, field } => {
                write!(f, "Table '{table}' has no field '{field}'")
            }
            Error::Query(e) => write!(f, "Query error: {e}"),
            Error::Connection(e) => write!(f, "Connection error: {e}"),
            Error::Custom(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{}.{}: {}", self.table, field, self.message),
            None => write!(f, "{}: {}", self.table, self.message),
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(sql) = &self.sql {
            write!(f, " (sql: {sql})")?;
        }
        Ok(())
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Query(e) => e
                .source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn std::error::Error + 'static)),
            Error::Connection(e) => e
                .source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl std::error::Error for SchemaError {}

impl From<SchemaError> for Error {
    fn from(err: SchemaError) -> Self {
        Error::InvalidSchema(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Custom(format!("JSON error: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
