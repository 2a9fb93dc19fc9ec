//! Shared fixtures for the session integration tests.
#![allow(dead_code)]

use asupersync::{Cx, Outcome};
use duckorm_core::{Column, Connection, Error, QueryErrorKind, Row, Value};
use duckorm_schema::{ForeignKey, ManyToMany, OneToMany, Schema, SchemaRegistry};
use std::future::Future;
use std::sync::Mutex;

pub fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

pub fn expect_err<T>(outcome: Outcome<T, Error>) -> Error {
    match outcome {
        Outcome::Err(e) => e,
        Outcome::Ok(_) => panic!("expected an error, got Ok"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

/// Wraps a connection and records every statement it is asked to run.
///
/// Statements starting with `fail_prefix` are rejected with a query error
/// instead of reaching the inner connection.
pub struct RecordingConnection<C> {
    inner: C,
    log: Mutex<Vec<String>>,
    fail_prefix: Option<&'static str>,
}

impl<C: Connection> RecordingConnection<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            log: Mutex::new(Vec::new()),
            fail_prefix: None,
        }
    }

    pub fn failing_on(mut self, prefix: &'static str) -> Self {
        self.fail_prefix = Some(prefix);
        self
    }

    pub fn statements(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.log.lock().unwrap().clear();
    }

    fn record(&self, sql: &str) -> bool {
        self.log.lock().unwrap().push(sql.to_string());
        self.fail_prefix.is_some_and(|prefix| sql.starts_with(prefix))
    }
}

fn injected(sql: &str) -> Error {
    Error::query(QueryErrorKind::Database, "injected failure", Some(sql))
}

impl<C: Connection> Connection for RecordingConnection<C> {
    fn dialect_name(&self) -> &str {
        self.inner.dialect_name()
    }

    fn connect(&self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        self.inner.connect(cx)
    }

    fn disconnect(&self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        self.inner.disconnect(cx)
    }

    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        values: &[(String, Value)],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let fail = self.record(sql);
        async move {
            if fail {
                return Outcome::Err(injected(sql));
            }
            self.inner.execute(cx, sql, values).await
        }
    }

    fn fetch_one(&self, cx: &Cx, sql: &str) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send {
        let fail = self.record(sql);
        async move {
            if fail {
                return Outcome::Err(injected(sql));
            }
            self.inner.fetch_one(cx, sql).await
        }
    }

    fn fetch_all(&self, cx: &Cx, sql: &str) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let fail = self.record(sql);
        async move {
            if fail {
                return Outcome::Err(injected(sql));
            }
            self.inner.fetch_all(cx, sql).await
        }
    }
}

/// A connection that runs nothing: statements succeed with no rows.
pub struct StubConnection {
    dialect: &'static str,
}

impl StubConnection {
    pub fn new(dialect: &'static str) -> Self {
        Self { dialect }
    }
}

impl Connection for StubConnection {
    fn dialect_name(&self) -> &str {
        self.dialect
    }

    fn connect(&self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        async { Outcome::Ok(()) }
    }

    fn disconnect(&self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        async { Outcome::Ok(()) }
    }

    fn execute(
        &self,
        _cx: &Cx,
        _sql: &str,
        _values: &[(String, Value)],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        async { Outcome::Ok(0) }
    }

    fn fetch_one(&self, _cx: &Cx, _sql: &str) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send {
        async { Outcome::Ok(None) }
    }

    fn fetch_all(&self, _cx: &Cx, _sql: &str) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        async { Outcome::Ok(Vec::new()) }
    }
}

pub fn persons() -> Schema {
    Schema::builder("Person")
        .table("persons")
        .column(
            Column::integer("id")
                .primary_key(true)
                .auto_increment(true)
                .not_null(true),
        )
        .column(Column::string("first_name").unique(true))
        .column(Column::string("last_name").not_null(true))
        .column(Column::integer("age"))
        .column(Column::big_integer("salary"))
        .relationship("city", ForeignKey::new("cities"))
        .build()
        .unwrap()
}

pub fn cities() -> Schema {
    Schema::builder("City")
        .table("cities")
        .column(Column::integer("id").primary_key(true).auto_increment(true))
        .column(Column::string("name"))
        .relationship("persons", OneToMany::new("persons", "city"))
        .build()
        .unwrap()
}

pub fn users() -> Schema {
    Schema::builder("User")
        .table("users")
        .column(Column::integer("id").primary_key(true).auto_increment(true))
        .column(Column::string("name"))
        .relationship(
            "working_days",
            ManyToMany::new("working_days", "users_working_days"),
        )
        .build()
        .unwrap()
}

pub fn working_days() -> Schema {
    Schema::builder("WorkingDay")
        .table("working_days")
        .column(Column::integer("id").primary_key(true).auto_increment(true))
        .column(Column::string("week_day"))
        .build()
        .unwrap()
}

pub fn users_working_days() -> Schema {
    Schema::builder("UsersWorkingDay")
        .table("users_working_days")
        .column(Column::integer("id").primary_key(true).auto_increment(true))
        .relationship("users", ForeignKey::new("users"))
        .relationship("working_days", ForeignKey::new("working_days"))
        .build()
        .unwrap()
}

/// Every fixture schema. Persons come before cities so Postgres has to
/// defer the foreign key.
pub fn registry() -> SchemaRegistry {
    SchemaRegistry::new()
        .with(persons())
        .unwrap()
        .with(cities())
        .unwrap()
        .with(users())
        .unwrap()
        .with(working_days())
        .unwrap()
        .with(users_working_days())
        .unwrap()
}
