//! Conditions, select options and per-dialect SQL generation for DuckORM.
//!
//! `duckorm-query` turns dialect-neutral requests into SQL text. Nothing in
//! this crate performs I/O; every function is a pure transformation that
//! either yields a statement or a compile-time [`duckorm_core::Error`].

pub mod condition;
pub mod dialect;
pub mod select;

pub use condition::{Condition, Operator, render_conditions};
pub use dialect::{ForeignKeyClause, PostgresDialect, SqlDialect, SqliteDialect, dialect_for};
pub use select::Select;
