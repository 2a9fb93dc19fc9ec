//! Embedded SQLite executor for DuckORM.
//!
//! [`SqliteConnection`] implements [`duckorm_core::Connection`] on top of an
//! in-process SQLite database. SQLite calls are synchronous and short; each
//! executor future does its work when first polled and completes
//! immediately.
//!
//! ```ignore
//! let conn = SqliteConnection::open_memory()?;
//! let session = Session::new(conn, registry)?;
//! ```

mod value;

use asupersync::{Cx, Outcome};
use duckorm_core::{
    Connection, ConnectionError, ConnectionErrorKind, Error, QueryError, QueryErrorKind, Result,
    Row, Value,
};
use rusqlite::ToSql;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use value::Bind;

/// A SQLite database opened in memory or from a file.
#[derive(Debug)]
pub struct SqliteConnection {
    /// `None` for an in-memory database
    path: Option<PathBuf>,
    /// `None` after `disconnect`
    inner: Mutex<Option<rusqlite::Connection>>,
}

impl SqliteConnection {
    /// A fresh in-memory database.
    pub fn open_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()
            .and_then(enforce_foreign_keys)
            .map_err(connect_error)?;
        tracing::debug!("Opened in-memory SQLite database");
        Ok(Self {
            path: None,
            inner: Mutex::new(Some(conn)),
        })
    }

    /// Open (or create) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = rusqlite::Connection::open(&path)
            .and_then(enforce_foreign_keys)
            .map_err(connect_error)?;
        tracing::debug!(path = %path.display(), "Opened SQLite database");
        Ok(Self {
            path: Some(path),
            inner: Mutex::new(Some(conn)),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().is_ok_and(|guard| guard.is_some())
    }

    fn with_conn<T>(&self, f: impl FnOnce(&rusqlite::Connection) -> Result<T>) -> Result<T> {
        let guard = self.inner.lock().map_err(|_| {
            connection_error(ConnectionErrorKind::Broken, "SQLite connection lock poisoned")
        })?;
        let conn = guard.as_ref().ok_or_else(|| {
            connection_error(ConnectionErrorKind::Closed, "SQLite connection is closed")
        })?;
        f(conn)
    }

    fn execute_sync(&self, sql: &str, values: &[(String, Value)]) -> Result<u64> {
        let names: Vec<String> = values.iter().map(|(name, _)| format!(":{name}")).collect();
        let binds: Vec<Bind<'_>> = values.iter().map(|(_, value)| Bind(value)).collect();
        let params: Vec<(&str, &dyn ToSql)> = names
            .iter()
            .zip(&binds)
            .map(|(name, bind)| (name.as_str(), bind as &dyn ToSql))
            .collect();

        self.with_conn(|conn| {
            let changed = conn
                .execute(sql, params.as_slice())
                .map_err(|e| query_error(e, sql))?;
            Ok(u64::try_from(changed).unwrap_or(u64::MAX))
        })
    }

    fn query_sync(&self, sql: &str, limit: Option<usize>) -> Result<Vec<Row>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql).map_err(|e| query_error(e, sql))?;
            let columns: Arc<Vec<String>> = Arc::new(
                stmt.column_names()
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            );

            let mut rows = stmt.query([]).map_err(|e| query_error(e, sql))?;
            let mut out = Vec::new();
            while let Some(row) = rows.next().map_err(|e| query_error(e, sql))? {
                let mut values = Vec::with_capacity(columns.len());
                for idx in 0..columns.len() {
                    let raw = row.get_ref(idx).map_err(|e| query_error(e, sql))?;
                    values.push(value::from_sql(raw));
                }
                out.push(Row::new(Arc::clone(&columns), values));
                if limit.is_some_and(|limit| out.len() >= limit) {
                    break;
                }
            }
            Ok(out)
        })
    }
}

impl Connection for SqliteConnection {
    fn dialect_name(&self) -> &str {
        "sqlite"
    }

    fn connect(&self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        async move {
            if let Some(reason) = cx.cancel_reason() {
                return Outcome::Cancelled(reason);
            }
            let Ok(mut guard) = self.inner.lock() else {
                return Outcome::Err(connection_error(
                    ConnectionErrorKind::Broken,
                    "SQLite connection lock poisoned",
                ));
            };
            if guard.is_some() {
                return Outcome::Ok(());
            }
            let opened = match &self.path {
                Some(path) => rusqlite::Connection::open(path),
                None => rusqlite::Connection::open_in_memory(),
            }
            .and_then(enforce_foreign_keys);
            match opened {
                Ok(conn) => {
                    *guard = Some(conn);
                    tracing::debug!("Reopened SQLite database");
                    Outcome::Ok(())
                }
                Err(e) => Outcome::Err(connect_error(e)),
            }
        }
    }

    fn disconnect(&self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        async move {
            if let Some(reason) = cx.cancel_reason() {
                return Outcome::Cancelled(reason);
            }
            let Ok(mut guard) = self.inner.lock() else {
                return Outcome::Err(connection_error(
                    ConnectionErrorKind::Broken,
                    "SQLite connection lock poisoned",
                ));
            };
            if let Some(conn) = guard.take() {
                if let Err((_, e)) = conn.close() {
                    return Outcome::Err(connection_error_from(ConnectionErrorKind::Broken, e));
                }
                tracing::debug!("Closed SQLite database");
            }
            Outcome::Ok(())
        }
    }

    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        values: &[(String, Value)],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        async move {
            if let Some(reason) = cx.cancel_reason() {
                return Outcome::Cancelled(reason);
            }
            tracing::trace!(sql, params = values.len(), "SQLite execute");
            match self.execute_sync(sql, values) {
                Ok(changed) => Outcome::Ok(changed),
                Err(e) => Outcome::Err(e),
            }
        }
    }

    fn fetch_one(&self, cx: &Cx, sql: &str) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send {
        async move {
            if let Some(reason) = cx.cancel_reason() {
                return Outcome::Cancelled(reason);
            }
            tracing::trace!(sql, "SQLite fetch_one");
            match self.query_sync(sql, Some(1)) {
                Ok(rows) => Outcome::Ok(rows.into_iter().next()),
                Err(e) => Outcome::Err(e),
            }
        }
    }

    fn fetch_all(&self, cx: &Cx, sql: &str) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        async move {
            if let Some(reason) = cx.cancel_reason() {
                return Outcome::Cancelled(reason);
            }
            tracing::trace!(sql, "SQLite fetch_all");
            match self.query_sync(sql, None) {
                Ok(rows) => Outcome::Ok(rows),
                Err(e) => Outcome::Err(e),
            }
        }
    }
}

fn connection_error(kind: ConnectionErrorKind, message: &str) -> Error {
    Error::Connection(ConnectionError {
        kind,
        message: message.to_string(),
        source: None,
    })
}

fn connection_error_from(kind: ConnectionErrorKind, err: rusqlite::Error) -> Error {
    Error::Connection(ConnectionError {
        kind,
        message: err.to_string(),
        source: Some(Box::new(err)),
    })
}

/// SQLite leaves foreign keys unenforced unless asked, per connection.
fn enforce_foreign_keys(conn: rusqlite::Connection) -> rusqlite::Result<rusqlite::Connection> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(conn)
}

fn connect_error(err: rusqlite::Error) -> Error {
    connection_error_from(ConnectionErrorKind::Connect, err)
}

fn query_error(err: rusqlite::Error, sql: &str) -> Error {
    let message = err.to_string();
    let kind = match err.sqlite_error_code() {
        Some(rusqlite::ErrorCode::ConstraintViolation) => QueryErrorKind::Constraint,
        Some(rusqlite::ErrorCode::OperationInterrupted) => QueryErrorKind::Cancelled,
        _ if message.contains("syntax error") => QueryErrorKind::Syntax,
        _ => QueryErrorKind::Database,
    };
    Error::Query(QueryError {
        kind,
        message,
        sql: Some(sql.to_string()),
        source: Some(Box::new(err)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_memory() {
        let conn = SqliteConnection::open_memory().unwrap();
        assert!(conn.is_open());
        assert!(conn.path().is_none());
        assert_eq!(conn.dialect_name(), "sqlite");
    }

    #[test]
    fn test_execute_and_query_sync() {
        let conn = SqliteConnection::open_memory().unwrap();
        conn.execute_sync("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT);", &[])
            .unwrap();
        let changed = conn
            .execute_sync(
                "INSERT INTO t(name) VALUES(:name);",
                &[("name".to_string(), Value::from("a'b"))],
            )
            .unwrap();
        assert_eq!(changed, 1);

        let rows = conn.query_sync("SELECT id, name FROM t;", None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("id"), Some(&Value::Int(1)));
        assert_eq!(rows[0].get("name"), Some(&Value::from("a'b")));
        assert_eq!(rows[0].columns(), ["id", "name"]);
    }

    #[test]
    fn test_query_limit() {
        let conn = SqliteConnection::open_memory().unwrap();
        conn.execute_sync("CREATE TABLE n (v INTEGER);", &[]).unwrap();
        for i in 0..3 {
            conn.execute_sync(
                "INSERT INTO n(v) VALUES(:v);",
                &[("v".to_string(), Value::Int(i))],
            )
            .unwrap();
        }
        assert_eq!(conn.query_sync("SELECT v FROM n;", Some(1)).unwrap().len(), 1);
        assert_eq!(conn.query_sync("SELECT v FROM n;", None).unwrap().len(), 3);
    }

    #[test]
    fn test_syntax_error_kind() {
        let conn = SqliteConnection::open_memory().unwrap();
        let err = conn.execute_sync("CREATE TABLE (", &[]).unwrap_err();
        match err {
            Error::Query(q) => {
                assert_eq!(q.kind, QueryErrorKind::Syntax);
                assert_eq!(q.sql.as_deref(), Some("CREATE TABLE ("));
            }
            other => panic!("expected query error, got {other:?}"),
        }
    }

    #[test]
    fn test_constraint_error_kind() {
        let conn = SqliteConnection::open_memory().unwrap();
        conn.execute_sync("CREATE TABLE u (name TEXT UNIQUE);", &[]).unwrap();
        let insert = "INSERT INTO u(name) VALUES(:name);";
        let values = [("name".to_string(), Value::from("x"))];
        conn.execute_sync(insert, &values).unwrap();
        let err = conn.execute_sync(insert, &values).unwrap_err();
        assert!(matches!(
            err,
            Error::Query(QueryError { kind: QueryErrorKind::Constraint, .. })
        ));
    }

    #[test]
    fn test_foreign_keys_are_enforced() {
        let conn = SqliteConnection::open_memory().unwrap();
        conn.execute_sync("CREATE TABLE cities (id INTEGER PRIMARY KEY);", &[]).unwrap();
        conn.execute_sync(
            "CREATE TABLE persons (id INTEGER PRIMARY KEY, city INTEGER REFERENCES cities (id));",
            &[],
        )
        .unwrap();
        let err = conn
            .execute_sync("INSERT INTO persons(city) VALUES(:city);", &[("city".to_string(), Value::Int(99))])
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Query(QueryError { kind: QueryErrorKind::Constraint, .. })
        ));
    }
}
