//! DuckORM: declarative table schemas compiled to SQLite and Postgres SQL.
//!
//! This crate is the entry point. It re-exports the building blocks from the
//! workspace crates and adds a small migration runner on top of the session.
//!
//! | crate | role |
//! |---|---|
//! | `duckorm-core` | values, records, rows, columns, errors, the `Connection` trait |
//! | `duckorm-query` | conditions, select options, per-dialect SQL text |
//! | `duckorm-schema` | schemas, relationships, the registry and its DDL plan |
//! | `duckorm-session` | the `Session`: mapping, reference resolution, bound relations |
//! | `duckorm-sqlite` | embedded SQLite executor (feature `sqlite`, on by default) |
//!
//! # Example
//!
//! ```ignore
//! use duckorm::prelude::*;
//!
//! let mut registry = SchemaRegistry::new();
//! registry.register(
//!     Schema::builder("City")
//!         .table("cities")
//!         .column(Column::integer("id").primary_key(true).auto_increment(true))
//!         .column(Column::string("name"))
//!         .build()?,
//! )?;
//!
//! let session = Session::new(SqliteConnection::open_memory()?, registry)?;
//! session.create_all(&cx).await;
//! let natal = session.save(&cx, Record::new("cities").with("name", "Natal")).await;
//! ```

pub mod migration;

pub use duckorm_core::{
    Column, Connection, ConnectionError, ConnectionErrorKind, Cx, Dialect, Error, FieldValue,
    Outcome, QueryError, QueryErrorKind, Record, ReferentialAction, Result, Row, SchemaError,
    SqlType, Value, try_outcome, try_result,
};
pub use duckorm_query::{Condition, Operator, Select, SqlDialect, dialect_for};
pub use duckorm_schema::{
    Association, ForeignKey, ManyToMany, OneToMany, OneToOne, Relationship, RelationshipKind, Schema,
    SchemaBuilder, SchemaRegistry,
};
pub use duckorm_session::{BoundRelation, N1QueryTracker, N1Stats, Session, SessionConfig};
#[cfg(feature = "sqlite")]
pub use duckorm_sqlite::SqliteConnection;

pub use migration::{AppliedMigration, Migration, MigrationFuture, MigrationRunner, SqlMigration};

/// Everything needed to declare schemas and run a session.
pub mod prelude {
    pub use crate::migration::{Migration, MigrationRunner, SqlMigration};
    pub use duckorm_core::{
        Column, Connection, Cx, Dialect, Error, FieldValue, Outcome, Record, ReferentialAction,
        Result, Value,
    };
    pub use duckorm_query::{Condition, Select};
    pub use duckorm_schema::{ForeignKey, ManyToMany, OneToMany, OneToOne, Schema, SchemaRegistry};
    pub use duckorm_session::{Session, SessionConfig};
    #[cfg(feature = "sqlite")]
    pub use duckorm_sqlite::SqliteConnection;
}
