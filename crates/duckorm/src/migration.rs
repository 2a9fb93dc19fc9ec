//! Ordered, recorded schema migrations.
//!
//! A [`MigrationRunner`] applies [`Migration`]s through a [`Session`] and
//! records each applied name in the `duckorm_migrations` table. Running it
//! again only applies what is missing.
//!
//! ```ignore
//! let runner = MigrationRunner::new()?
//!     .add(SqlMigration::new("0001_tags")
//!         .up("CREATE TABLE tags (id INTEGER PRIMARY KEY, label TEXT);")
//!         .down("DROP TABLE tags;"));
//! let applied = runner.run_pending(&cx, &session).await;
//! ```

use asupersync::{Cx, Outcome};
use duckorm_core::{Column, Connection, Error, Result, Row, Value, try_outcome, try_result};
use duckorm_query::{Condition, Select};
use duckorm_schema::Schema;
use duckorm_session::Session;
use std::future::Future;
use std::pin::Pin;
use std::time::{SystemTime, UNIX_EPOCH};

/// Table holding one row per applied migration.
pub const MIGRATIONS_TABLE: &str = "duckorm_migrations";

/// Future returned by [`Migration::up`] and [`Migration::down`].
pub type MigrationFuture<'a> = Pin<Box<dyn Future<Output = Outcome<(), Error>> + Send + 'a>>;

/// One reversible schema change.
pub trait Migration<C: Connection>: Send + Sync {
    /// Unique name. Migrations are tracked by it.
    fn name(&self) -> &str;

    fn up<'a>(&'a self, cx: &'a Cx, session: &'a Session<C>) -> MigrationFuture<'a>;

    fn down<'a>(&'a self, cx: &'a Cx, session: &'a Session<C>) -> MigrationFuture<'a>;
}

/// A migration made of plain SQL statements.
#[derive(Debug, Clone)]
pub struct SqlMigration {
    name: String,
    up: Vec<String>,
    down: Vec<String>,
}

impl SqlMigration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            up: Vec::new(),
            down: Vec::new(),
        }
    }

    /// Append a statement to the forward direction.
    pub fn up(mut self, sql: impl Into<String>) -> Self {
        self.up.push(sql.into());
        self
    }

    /// Append a statement to the reverse direction.
    pub fn down(mut self, sql: impl Into<String>) -> Self {
        self.down.push(sql.into());
        self
    }
}

async fn run_statements<C: Connection>(
    cx: &Cx,
    session: &Session<C>,
    statements: &[String],
) -> Outcome<(), Error> {
    for sql in statements {
        try_outcome!(session.execute(cx, sql, &[]).await);
    }
    Outcome::Ok(())
}

impl<C: Connection> Migration<C> for SqlMigration {
    fn name(&self) -> &str {
        &self.name
    }

    fn up<'a>(&'a self, cx: &'a Cx, session: &'a Session<C>) -> MigrationFuture<'a> {
        Box::pin(run_statements(cx, session, &self.up))
    }

    fn down<'a>(&'a self, cx: &'a Cx, session: &'a Session<C>) -> MigrationFuture<'a> {
        Box::pin(run_statements(cx, session, &self.down))
    }
}

/// A row of the tracking table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    pub id: i64,
    pub name: String,
    /// Seconds since the Unix epoch
    pub applied_at: i64,
}

impl AppliedMigration {
    fn from_row(row: &Row) -> Result<Self> {
        let malformed = || Error::Custom(format!("malformed row in {MIGRATIONS_TABLE}"));
        Ok(Self {
            id: row.get("id").and_then(Value::as_i64).ok_or_else(malformed)?,
            name: row
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(malformed)?
                .to_string(),
            applied_at: row.get("applied_at").and_then(Value::as_i64).unwrap_or(0),
        })
    }
}

/// Applies migrations in registration order and records them.
pub struct MigrationRunner<C: Connection> {
    migrations: Vec<Box<dyn Migration<C>>>,
    tracking: Schema,
}

impl<C: Connection> MigrationRunner<C> {
    pub fn new() -> Result<Self> {
        let tracking = Schema::builder("Migration")
            .table(MIGRATIONS_TABLE)
            .column(Column::integer("id").primary_key(true).auto_increment(true))
            .column(Column::string("name").unique(true).not_null(true))
            .column(Column::big_integer("applied_at"))
            .build()?;
        Ok(Self {
            migrations: Vec::new(),
            tracking,
        })
    }

    /// Register a migration after the ones already added.
    pub fn add(mut self, migration: impl Migration<C> + 'static) -> Self {
        self.migrations.push(Box::new(migration));
        self
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    fn check_unique_names(&self) -> Result<()> {
        for (i, migration) in self.migrations.iter().enumerate() {
            if self.migrations[..i].iter().any(|m| m.name() == migration.name()) {
                return Err(Error::Custom(format!(
                    "migration '{}' is registered twice",
                    migration.name()
                )));
            }
        }
        Ok(())
    }

    async fn ensure_table(&self, cx: &Cx, session: &Session<C>) -> Outcome<(), Error> {
        let sql = try_result!(self.tracking.create_table_sql(session.dialect(), session.registry()));
        try_outcome!(session.execute(cx, &sql, &[]).await);
        Outcome::Ok(())
    }

    /// Applied migrations, oldest first.
    pub async fn applied(&self, cx: &Cx, session: &Session<C>) -> Outcome<Vec<AppliedMigration>, Error> {
        try_outcome!(self.ensure_table(cx, session).await);
        let sql = try_result!(self.tracking.select_sql(session.dialect(), &Select::new()));
        let rows = try_outcome!(session.fetch_all(cx, &sql).await);

        let mut applied = Vec::with_capacity(rows.len());
        for row in &rows {
            applied.push(try_result!(AppliedMigration::from_row(row)));
        }
        applied.sort_by_key(|m| m.id);
        Outcome::Ok(applied)
    }

    /// Names of registered migrations not applied yet, in order.
    pub async fn pending(&self, cx: &Cx, session: &Session<C>) -> Outcome<Vec<String>, Error> {
        let applied = try_outcome!(self.applied(cx, session).await);
        Outcome::Ok(
            self.migrations
                .iter()
                .map(|m| m.name())
                .filter(|name| !applied.iter().any(|a| a.name == *name))
                .map(str::to_string)
                .collect(),
        )
    }

    /// Apply every pending migration and return the names applied.
    ///
    /// Stops at the first failure. Migrations applied before it stay
    /// recorded.
    #[tracing::instrument(level = "info", skip_all, fields(registered = self.migrations.len()))]
    pub async fn run_pending(&self, cx: &Cx, session: &Session<C>) -> Outcome<Vec<String>, Error> {
        try_result!(self.check_unique_names());
        let pending = try_outcome!(self.pending(cx, session).await);

        let insert = try_result!(self.tracking.insert_sql(session.dialect(), &["applied_at", "name"]));
        let mut done = Vec::with_capacity(pending.len());
        for migration in &self.migrations {
            let name = migration.name();
            if !pending.iter().any(|p| p == name) {
                continue;
            }
            tracing::info!(migration = name, "Applying migration");
            try_outcome!(migration.up(cx, session).await);

            let values = [
                ("applied_at".to_string(), Value::Int(unix_now())),
                ("name".to_string(), Value::from(name)),
            ];
            try_outcome!(session.execute(cx, &insert, &values).await);
            done.push(name.to_string());
        }

        if done.is_empty() {
            tracing::debug!("No pending migrations");
        }
        Outcome::Ok(done)
    }

    /// Revert the most recently applied migration.
    ///
    /// Returns its name, or `None` when nothing is applied. The applied
    /// migration must still be registered with this runner.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn rollback_last(&self, cx: &Cx, session: &Session<C>) -> Outcome<Option<String>, Error> {
        let applied = try_outcome!(self.applied(cx, session).await);
        let Some(last) = applied.last() else {
            return Outcome::Ok(None);
        };
        let Some(migration) = self.migrations.iter().find(|m| m.name() == last.name) else {
            return Outcome::Err(Error::Custom(format!(
                "applied migration '{}' is not registered",
                last.name
            )));
        };

        tracing::info!(migration = %last.name, "Reverting migration");
        try_outcome!(migration.down(cx, session).await);

        let sql = try_result!(self
            .tracking
            .delete_sql(session.dialect(), &[Condition::eq("name", last.name.as_str())]));
        try_outcome!(session.execute(cx, &sql, &[]).await);
        Outcome::Ok(Some(last.name.clone()))
    }
}

impl<C: Connection> std::fmt::Debug for MigrationRunner<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.migrations.iter().map(|m| m.name()).collect();
        f.debug_struct("MigrationRunner")
            .field("migrations", &names)
            .finish_non_exhaustive()
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}
