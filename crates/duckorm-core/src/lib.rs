//! Core types and traits for DuckORM.
//!
//! `duckorm-core` is the **foundation layer** shared by every other crate in the
//! workspace: the compiler crates describe tables with these types, and the
//! session crate moves them across the executor boundary.
//!
//! # Role In The Architecture
//!
//! - **Column model**: `Column` with its per-dialect DDL rendering and `SqlType`.
//! - **Literals**: `Value` is the value carried in conditions, rows and records.
//! - **Records**: `Record` is the dynamic, ordered entity shape a schema maps to.
//! - **Executor contract**: `Connection` is the async boundary to a database.
//! - **Errors**: one `Error` taxonomy used from the compiler down to the driver.
//!
//! Async operations take a `Cx` capability context and return `Outcome`, both
//! re-exported from `asupersync`.

#![allow(clippy::manual_async_fn)]

pub mod connection;
pub mod error;
pub mod field;
pub mod record;
pub mod row;
pub mod types;
pub mod validate;
pub mod value;

pub use asupersync::{Cx, Outcome};

pub use connection::Connection;
pub use error::{
    ConnectionError, ConnectionErrorKind, Error, QueryError, QueryErrorKind, Result, SchemaError,
};
pub use field::{Column, ReferentialAction};
pub use record::{FieldValue, Record};
pub use row::Row;
pub use types::{Dialect, SqlType};
pub use value::Value;

/// Propagate the non-`Ok` arms of an `Outcome` out of the enclosing async block.
///
/// `Outcome` has four arms, so `?` cannot be used on it directly.
#[macro_export]
macro_rules! try_outcome {
    ($expr:expr) => {
        match $expr {
            $crate::Outcome::Ok(value) => value,
            $crate::Outcome::Err(e) => return $crate::Outcome::Err(e),
            $crate::Outcome::Cancelled(reason) => return $crate::Outcome::Cancelled(reason),
            $crate::Outcome::Panicked(payload) => return $crate::Outcome::Panicked(payload),
        }
    };
}

/// Lift a compiler `Result` into an `Outcome`-returning async block.
#[macro_export]
macro_rules! try_result {
    ($expr:expr) => {
        match $expr {
            ::std::result::Result::Ok(value) => value,
            ::std::result::Result::Err(e) => return $crate::Outcome::Err(e.into()),
        }
    };
}
