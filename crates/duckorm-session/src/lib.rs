//! Session, entity mapper and relationship resolver for DuckORM.
//!
//! The [`Session`] is where compiled SQL meets a [`Connection`]. It owns the
//! executor, shares a [`SchemaRegistry`] and turns rows back into
//! [`Record`]s, resolving foreign-key and one-to-one fields as it goes.
//!
//! # Design
//!
//! - **Compile, then execute**: every statement is produced by the schema
//!   compiler first. Compilation errors return before the executor is touched.
//! - **Eager reference resolution**: each reference field of each row costs one
//!   extra `find_one`. The lookups are counted by an [`N1QueryTracker`].
//! - **Bound relations**: collection traversal goes through
//!   [`Session::relation`], which binds a relationship to one persisted owner.
//!
//! # Example
//!
//! ```ignore
//! let session = Session::new(SqliteConnection::open_memory()?, registry)?;
//! session.create_all(&cx).await?;
//!
//! let rich = session
//!     .save(&cx, Record::new("persons").with("first_name", "Rich"))
//!     .await?;
//! let found = session
//!     .find_one(&cx, "persons", &Select::new().filter(Condition::eq("first_name", "Rich")))
//!     .await?;
//! ```

pub mod mapper;
pub mod n1_detection;
pub mod relation;

pub use n1_detection::{N1QueryTracker, N1Stats};
pub use relation::BoundRelation;

use asupersync::{Cx, Outcome};
use duckorm_core::{
    Connection, Dialect, Error, FieldValue, Record, Result, Row, Value, try_outcome, try_result,
};
use duckorm_query::{Condition, Select, dialect_for};
use duckorm_schema::{Relationship, Schema, SchemaRegistry};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ============================================================================
// Session Configuration
// ============================================================================

/// Configuration for Session behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Count reference lookups and warn when a field crosses the threshold.
    pub n1_detection: bool,
    /// Lookups of one `(table, field)` pair before the warning fires.
    pub n1_threshold: usize,
    /// Log every statement at debug level under `duckorm::sql`.
    pub log_statements: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            n1_detection: true,
            n1_threshold: 3,
            log_statements: true,
        }
    }
}

impl SessionConfig {
    /// Parse a configuration from JSON. Missing keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn n1_detection(mut self, enabled: bool) -> Self {
        self.n1_detection = enabled;
        self
    }

    pub fn n1_threshold(mut self, threshold: usize) -> Self {
        self.n1_threshold = threshold;
        self
    }

    pub fn log_statements(mut self, enabled: bool) -> Self {
        self.log_statements = enabled;
        self
    }
}

// ============================================================================
// Session
// ============================================================================

/// Runs compiled statements against one connection.
pub struct Session<C: Connection> {
    connection: C,
    registry: Arc<SchemaRegistry>,
    dialect: Dialect,
    config: SessionConfig,
    /// Only locked between awaits.
    n1: Mutex<N1QueryTracker>,
}

impl<C: Connection> Session<C> {
    /// Create a session. The dialect comes from the connection's name.
    pub fn new(connection: C, registry: impl Into<Arc<SchemaRegistry>>) -> Result<Self> {
        Self::with_config(connection, registry, SessionConfig::default())
    }

    pub fn with_config(
        connection: C,
        registry: impl Into<Arc<SchemaRegistry>>,
        config: SessionConfig,
    ) -> Result<Self> {
        let dialect = Dialect::parse(connection.dialect_name())?;
        let mut tracker = N1QueryTracker::new().with_threshold(config.n1_threshold);
        if !config.n1_detection {
            tracker.disable();
        }
        Ok(Self {
            connection,
            registry: registry.into(),
            dialect,
            config,
            n1: Mutex::new(tracker),
        })
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The registered schema for `table`.
    pub fn schema(&self, table: &str) -> Result<Arc<Schema>> {
        self.registry.require(table).map(Arc::clone)
    }

    // ========================================================================
    // Executor
    // ========================================================================

    pub async fn connect(&self, cx: &Cx) -> Outcome<(), Error> {
        self.connection.connect(cx).await
    }

    pub async fn disconnect(&self, cx: &Cx) -> Outcome<(), Error> {
        self.connection.disconnect(cx).await
    }

    fn log_statement(&self, sql: &str, params: usize) {
        if self.config.log_statements {
            tracing::debug!(target: "duckorm::sql", dialect = self.dialect.name(), params, "{sql}");
        }
    }

    /// Run a statement, binding `values` to its named placeholders.
    pub async fn execute(&self, cx: &Cx, sql: &str, values: &[(String, Value)]) -> Outcome<u64, Error> {
        self.log_statement(sql, values.len());
        self.connection.execute(cx, sql, values).await
    }

    /// Raw first row of a query, without record mapping.
    pub async fn fetch_one(&self, cx: &Cx, sql: &str) -> Outcome<Option<Row>, Error> {
        self.log_statement(sql, 0);
        self.connection.fetch_one(cx, sql).await
    }

    /// Raw rows of a query, without record mapping.
    pub async fn fetch_all(&self, cx: &Cx, sql: &str) -> Outcome<Vec<Row>, Error> {
        self.log_statement(sql, 0);
        self.connection.fetch_all(cx, sql).await
    }

    async fn execute_all(&self, cx: &Cx, statements: &[String]) -> Outcome<(), Error> {
        for sql in statements {
            try_outcome!(self.execute(cx, sql, &[]).await);
        }
        Outcome::Ok(())
    }

    // ========================================================================
    // DDL
    // ========================================================================

    /// Create one table, constraints inline.
    #[tracing::instrument(level = "debug", skip(self, cx))]
    pub async fn create_table(&self, cx: &Cx, table: &str) -> Outcome<(), Error> {
        let schema = try_result!(self.schema(table));
        let sql = try_result!(schema.create_table_sql(self.dialect, &self.registry));
        try_outcome!(self.execute(cx, &sql, &[]).await);
        Outcome::Ok(())
    }

    /// Attach a table's relationships to tables that already exist.
    ///
    /// A column the database already reports as a foreign key is left
    /// alone, so associating a table created with inline constraints is a
    /// no-op.
    #[tracing::instrument(level = "debug", skip(self, cx))]
    pub async fn associate(&self, cx: &Cx, table: &str) -> Outcome<(), Error> {
        let schema = try_result!(self.schema(table));
        let associations = try_result!(schema.associations(self.dialect, &self.registry));

        let mut linked: Vec<(String, Vec<String>)> = Vec::new();
        for association in associations {
            if !linked.iter().any(|(t, _)| *t == association.table) {
                let columns = try_outcome!(self.foreign_key_columns(cx, &association.table).await);
                linked.push((association.table.clone(), columns));
            }
            let already = linked
                .iter()
                .any(|(t, columns)| *t == association.table && columns.contains(&association.column));
            if already {
                tracing::debug!(
                    table = %association.table,
                    column = %association.column,
                    "Foreign key already present"
                );
                continue;
            }
            try_outcome!(self.execute_all(cx, &association.statements).await);
        }
        Outcome::Ok(())
    }

    /// Columns of `table` that already carry a foreign key.
    async fn foreign_key_columns(&self, cx: &Cx, table: &str) -> Outcome<Vec<String>, Error> {
        let sql = dialect_for(self.dialect).list_foreign_keys_sql(table);
        let rows = try_outcome!(self.fetch_all(cx, &sql).await);
        Outcome::Ok(
            rows.iter()
                .filter_map(|row| row.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect(),
        )
    }

    /// Create every registered table, then attach deferred constraints and
    /// one-to-many columns.
    #[tracing::instrument(level = "debug", skip(self, cx))]
    pub async fn create_all(&self, cx: &Cx) -> Outcome<(), Error> {
        let statements = try_result!(self.registry.create_all_sql(self.dialect));
        self.execute_all(cx, &statements).await
    }

    #[tracing::instrument(level = "debug", skip(self, cx))]
    pub async fn drop_table(&self, cx: &Cx, table: &str, cascade: bool) -> Outcome<(), Error> {
        let schema = try_result!(self.schema(table));
        let sql = schema.drop_table_sql(self.dialect, cascade);
        try_outcome!(self.execute(cx, &sql, &[]).await);
        Outcome::Ok(())
    }

    /// Drop every registered table, referencing tables before the tables
    /// they point at.
    #[tracing::instrument(level = "debug", skip(self, cx))]
    pub async fn drop_all(&self, cx: &Cx) -> Outcome<(), Error> {
        let statements = self.registry.drop_all_sql(self.dialect);
        self.execute_all(cx, &statements).await
    }

    /// Names of the tables that exist in the database.
    pub async fn find_all_tables(&self, cx: &Cx) -> Outcome<Vec<String>, Error> {
        let sql = dialect_for(self.dialect).list_tables_sql();
        let rows = try_outcome!(self.fetch_all(cx, &sql).await);
        Outcome::Ok(
            rows.iter()
                .filter_map(|row| row.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect(),
        )
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Every row matching `select`, with references resolved.
    #[tracing::instrument(level = "debug", skip(self, cx, select))]
    pub async fn find_all(&self, cx: &Cx, table: &str, select: &Select) -> Outcome<Vec<Record>, Error> {
        let schema = try_result!(self.schema(table));
        let sql = try_result!(schema.select_sql(self.dialect, select));
        let rows = try_outcome!(self.fetch_all(cx, &sql).await);

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(try_outcome!(self.materialize(cx, &schema, row).await));
        }
        tracing::debug!(table, rows = records.len(), "Fetched records");
        Outcome::Ok(records)
    }

    /// The first row matching `select`. The limit is forced to 1.
    #[tracing::instrument(level = "debug", skip(self, cx, select))]
    pub async fn find_one(&self, cx: &Cx, table: &str, select: &Select) -> Outcome<Option<Record>, Error> {
        let schema = try_result!(self.schema(table));
        self.find_one_in(cx, &schema, &select.clone().limit(1)).await
    }

    /// The row whose primary key equals `id`.
    pub async fn find_by_id(&self, cx: &Cx, table: &str, id: impl Into<Value>) -> Outcome<Option<Record>, Error> {
        let id = id.into();
        let schema = try_result!(self.schema(table));
        let pk = try_result!(schema.primary_key()).name().to_string();
        self.find_one_in(cx, &schema, &schema.select_by(&pk, id)).await
    }

    async fn find_one_in(&self, cx: &Cx, schema: &Schema, select: &Select) -> Outcome<Option<Record>, Error> {
        let sql = try_result!(schema.select_sql(self.dialect, select));
        let Some(row) = try_outcome!(self.fetch_one(cx, &sql).await) else {
            return Outcome::Ok(None);
        };
        let record = try_outcome!(self.materialize(cx, schema, &row).await);
        Outcome::Ok(Some(record))
    }

    /// Map a row to a record and substitute the target record for every
    /// non-null reference field, in field order.
    ///
    /// A reference whose target row is gone keeps its raw key value.
    fn materialize<'a>(
        &'a self,
        cx: &'a Cx,
        schema: &'a Schema,
        row: &'a Row,
    ) -> BoxFuture<'a, Outcome<Record, Error>> {
        Box::pin(async move {
            let mut path = Vec::new();
            self.materialize_on_path(cx, schema, row, &mut path).await
        })
    }

    /// `path` holds the `(table, primary key)` of every record being
    /// resolved above this one. A reference back to one of them keeps its
    /// raw key, so cyclic data terminates.
    fn materialize_on_path<'a>(
        &'a self,
        cx: &'a Cx,
        schema: &'a Schema,
        row: &'a Row,
        path: &'a mut Vec<(String, Value)>,
    ) -> BoxFuture<'a, Outcome<Record, Error>> {
        Box::pin(async move {
            let mut record = mapper::to_record(schema, row);
            let own_key = row_key(schema, row);
            if let Some(key) = &own_key {
                path.push((schema.table_name().to_string(), key.clone()));
            }

            for (name, rel) in schema.reference_fields() {
                let value = match record.value(name) {
                    Some(v) if !v.is_null() => v.clone(),
                    _ => continue,
                };
                let target = try_result!(self.registry.resolve(schema, name, rel));
                let explicit_key = match rel {
                    Relationship::ForeignKey(fk) => fk.target_key.clone(),
                    _ => None,
                };
                let target_pk = target.primary_key().ok().map(|pk| pk.name().to_string());
                let key = match explicit_key {
                    Some(key) => key,
                    None => try_result!(target.primary_key()).name().to_string(),
                };

                if target_pk.as_deref() == Some(key.as_str())
                    && on_path(path, target.table_name(), &value)
                {
                    tracing::debug!(
                        table = schema.table_name(),
                        field = name,
                        key = %value,
                        "Reference cycle, keeping raw key"
                    );
                    continue;
                }

                self.record_lookup(schema.table_name(), name, &value);
                let sql = try_result!(target.select_sql(self.dialect, &target.select_by(&key, value)));
                let Some(target_row) = try_outcome!(self.fetch_one(cx, &sql).await) else {
                    tracing::debug!(
                        table = schema.table_name(),
                        field = name,
                        target = target.table_name(),
                        "Referenced row not found"
                    );
                    continue;
                };
                // Lookups by a non-key column only learn the target's key here.
                let revisits = row_key(target, &target_row)
                    .is_some_and(|k| on_path(path, target.table_name(), &k));
                if revisits {
                    continue;
                }
                let resolved =
                    try_outcome!(self.materialize_on_path(cx, target, &target_row, &mut *path).await);
                record.set(name, resolved);
            }

            if own_key.is_some() {
                path.pop();
            }
            Outcome::Ok(record)
        })
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Insert a record and return it with its generated key filled in.
    ///
    /// Nested records are stored as their primary-key value.
    #[tracing::instrument(level = "debug", skip(self, cx, record), fields(table = record.table_name()))]
    pub async fn save(&self, cx: &Cx, record: Record) -> Outcome<Record, Error> {
        let schema = try_result!(self.schema(record.table_name()));
        let values = try_result!(mapper::to_sql_values(&self.registry, &schema, &record));
        let fields: Vec<&str> = values.iter().map(|(name, _)| name.as_str()).collect();
        let sql = try_result!(schema.insert_sql(self.dialect, &fields));

        let generated_key = match schema.primary_key() {
            Ok(pk) if pk.is_generated() => {
                let current = try_result!(mapper::primary_key_value(&self.registry, &schema, &record));
                current.is_none().then(|| pk.name().to_string())
            }
            _ => None,
        };

        try_outcome!(self.execute(cx, &sql, &values).await);

        let mut saved = record;
        if let Some(pk) = generated_key {
            let sql = try_result!(schema.last_inserted_id_sql(self.dialect));
            if let Some(row) = try_outcome!(self.fetch_one(cx, &sql).await) {
                if let Some(id) = row.get(&pk) {
                    tracing::debug!(table = schema.table_name(), id = %id, "Assigned generated key");
                    saved.set(pk, id.clone());
                }
            }
        }
        Outcome::Ok(saved)
    }

    /// Apply `changes` to the stored row of `record` and return the row as
    /// it now reads.
    ///
    /// A record without a primary-key value fails with
    /// `UpdateWithoutIdentity` before any SQL runs. Empty changes skip the
    /// UPDATE and only refetch.
    #[tracing::instrument(level = "debug", skip(self, cx, record, changes), fields(table = record.table_name()))]
    pub async fn update(
        &self,
        cx: &Cx,
        record: &Record,
        changes: Vec<(&str, FieldValue)>,
    ) -> Outcome<Option<Record>, Error> {
        let schema = try_result!(self.schema(record.table_name()));
        let Some(key) = try_result!(mapper::primary_key_value(&self.registry, &schema, record)) else {
            return Outcome::Err(Error::UpdateWithoutIdentity {
                table: schema.table_name().to_string(),
            });
        };
        let pk = try_result!(schema.primary_key()).name().to_string();

        let mut patch = Record::new(schema.table_name());
        for (name, value) in changes {
            patch.set(name, value);
        }
        let values = try_result!(mapper::to_sql_values(&self.registry, &schema, &patch));

        if !values.is_empty() {
            let fields: Vec<&str> = values.iter().map(|(name, _)| name.as_str()).collect();
            let sql = try_result!(schema.update_sql(self.dialect, &fields, &key));
            try_outcome!(self.execute(cx, &sql, &values).await);
        }

        let current_key = values
            .iter()
            .find(|(name, _)| *name == pk)
            .map_or(key, |(_, v)| v.clone());
        self.find_one_in(cx, &schema, &schema.select_by(&pk, current_key))
            .await
    }

    /// Delete the rows matching `conditions` and return the affected count.
    ///
    /// Compilation errors are returned. An executor failure is logged and
    /// reported as zero rows deleted.
    #[tracing::instrument(level = "debug", skip(self, cx, conditions))]
    pub async fn delete(&self, cx: &Cx, table: &str, conditions: &[Condition]) -> Outcome<u64, Error> {
        let schema = try_result!(self.schema(table));
        let sql = try_result!(schema.delete_sql(self.dialect, conditions));
        match self.execute(cx, &sql, &[]).await {
            Outcome::Err(e) => {
                tracing::warn!(table, sql = %sql, error = %e, "DELETE ERROR");
                Outcome::Ok(0)
            }
            other => other,
        }
    }

    // ========================================================================
    // Relations
    // ========================================================================

    /// Bind relationship `name` of the persisted record `owner`.
    pub fn relation(&self, owner: &Record, name: &str) -> Result<BoundRelation<'_, C>> {
        let schema = self.schema(owner.table_name())?;
        let relationship = schema
            .relationship(name)
            .cloned()
            .ok_or_else(|| Error::UnknownField {
                table: schema.table_name().to_string(),
                field: name.to_string(),
            })?;
        let owner_key = mapper::primary_key_value(&self.registry, &schema, owner)?.ok_or_else(|| {
            Error::RelationshipNotBound {
                relationship: name.to_string(),
            }
        })?;
        Ok(BoundRelation::new(self, schema, owner_key, name, relationship))
    }

    // ========================================================================
    // N+1 tracking
    // ========================================================================

    fn tracker(&self) -> MutexGuard<'_, N1QueryTracker> {
        self.n1.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_lookup(&self, table: &str, field: &str, key: &Value) {
        self.tracker().record_load(table, field, &key.to_string());
    }

    pub fn n1_stats(&self) -> N1Stats {
        self.tracker().stats()
    }

    /// Reference lookups issued for `table.field` since the last reset.
    pub fn lookup_count(&self, table: &str, field: &str) -> usize {
        self.tracker().count_for(table, field)
    }

    pub fn reset_n1(&self) {
        self.tracker().reset();
    }
}

/// Primary-key value of a fetched row, if the schema has one and it is set.
fn row_key(schema: &Schema, row: &Row) -> Option<Value> {
    let pk = schema.primary_key().ok()?;
    row.get(pk.name()).filter(|v| !v.is_null()).cloned()
}

fn on_path(path: &[(String, Value)], table: &str, key: &Value) -> bool {
    path.iter().any(|(t, k)| t == table && k == key)
}

impl<C: Connection> std::fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("dialect", &self.dialect)
            .field("tables", &self.registry.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
