//! The database executor contract.
//!
//! DuckORM compiles SQL text; a `Connection` is whatever actually runs it.
//! Insert and update statements carry `:name` placeholders, bound from the
//! `values` slice passed to [`Connection::execute`]. Every other statement
//! arrives with its literals already inlined.

use crate::error::Error;
use crate::row::Row;
use crate::value::Value;
use asupersync::{Cx, Outcome};
use std::future::Future;

/// An asynchronous SQL executor.
///
/// Implementations must be shareable across tasks; the session only ever
/// borrows the connection.
pub trait Connection: Send + Sync {
    /// Dialect name of the backing database, e.g. `"sqlite"` or `"postgresql"`.
    fn dialect_name(&self) -> &str;

    /// Open (or verify) the underlying connection.
    fn connect(&self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send;

    /// Release the underlying connection.
    fn disconnect(&self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send;

    /// Execute a statement, binding named values. Returns affected rows.
    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        values: &[(String, Value)],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;

    /// Fetch the first row of a query, if any.
    fn fetch_one(&self, cx: &Cx, sql: &str) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send;

    /// Fetch all rows of a query.
    fn fetch_all(&self, cx: &Cx, sql: &str) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send;
}
