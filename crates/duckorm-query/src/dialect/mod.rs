//! Per-dialect SQL generation.
//!
//! Every dialect implements [`SqlDialect`] with the same method set. The
//! shared statement shapes live in the default methods. Each implementation
//! supplies the parts that genuinely differ: last-insert-id lookup, table
//! listing, cascade support and how a foreign key is attached to an existing
//! table.

mod postgres;
mod sqlite;

pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

use duckorm_core::{Dialect, ReferentialAction};

/// A foreign key constraint in dialect-neutral form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyClause {
    /// Explicit constraint name
    pub constraint_name: Option<String>,
    /// Referencing column on the owning table
    pub column: String,
    pub target_table: String,
    pub target_column: String,
    pub on_delete: Option<ReferentialAction>,
    pub on_update: Option<ReferentialAction>,
}

impl ForeignKeyClause {
    pub fn new(
        column: impl Into<String>,
        target_table: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        Self {
            constraint_name: None,
            column: column.into(),
            target_table: target_table.into(),
            target_column: target_column.into(),
            on_delete: None,
            on_update: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.constraint_name = Some(name.into());
        self
    }

    pub const fn on_delete(mut self, action: Option<ReferentialAction>) -> Self {
        self.on_delete = action;
        self
    }

    pub const fn on_update(mut self, action: Option<ReferentialAction>) -> Self {
        self.on_update = action;
        self
    }

    /// The constraint name, or `fk_{table}_{column}` when none was given.
    pub fn effective_name(&self, table: &str) -> String {
        self.constraint_name
            .clone()
            .unwrap_or_else(|| format!("fk_{}_{}", table, self.column))
    }

    /// `REFERENCES target (column)` plus any declared actions.
    pub fn references_sql(&self) -> String {
        let mut sql = format!(
            "REFERENCES {} ({})",
            self.target_table, self.target_column
        );
        if let Some(action) = self.on_delete {
            sql.push_str(" ON DELETE ");
            sql.push_str(action.as_sql());
        }
        if let Some(action) = self.on_update {
            sql.push_str(" ON UPDATE ");
            sql.push_str(action.as_sql());
        }
        sql
    }
}

/// SQL text generation for one dialect.
///
/// Field and table names are emitted as given; callers validate them as
/// plain identifiers beforehand.
pub trait SqlDialect: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// `CREATE TABLE IF NOT EXISTS` with column and constraint fragments.
    fn create_table_sql(&self, table: &str, fragments: &[String]) -> String {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({});",
            table,
            fragments.join(", ")
        );
        tracing::debug!(dialect = self.dialect().name(), table, sql = %sql, "Generated CREATE TABLE");
        sql
    }

    /// INSERT with one `:name` placeholder per field.
    fn insert_sql(&self, table: &str, fields: &[&str]) -> String {
        if fields.is_empty() {
            return format!("INSERT INTO {table} DEFAULT VALUES;");
        }
        let placeholders: Vec<String> = fields.iter().map(|f| format!(":{f}")).collect();
        format!(
            "INSERT INTO {}({}) VALUES({});",
            table,
            fields.join(", "),
            placeholders.join(", ")
        )
    }

    /// UPDATE assigning each field from its `:name` placeholder.
    fn update_sql(&self, table: &str, fields: &[&str], conditions: &str) -> String {
        let assignments: Vec<String> = fields.iter().map(|f| format!("{f} = :{f}")).collect();
        format!(
            "UPDATE {} SET {} WHERE {};",
            table,
            assignments.join(", "),
            conditions
        )
    }

    fn delete_sql(&self, table: &str, conditions: &str) -> String {
        format!("DELETE FROM {table} WHERE {conditions};")
    }

    fn select_sql(&self, table: &str, fields: &[&str], conditions: &str, limit: Option<u64>) -> String {
        let projection = if fields.is_empty() {
            "*".to_string()
        } else {
            fields.join(", ")
        };
        let mut sql = format!("SELECT {projection} FROM {table} WHERE {conditions}");
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        sql.push(';');
        sql
    }

    /// Query that yields the primary key of the row inserted last.
    fn select_last_inserted_id_sql(&self, table: &str, primary_key: &str) -> String;

    /// `DROP TABLE IF EXISTS`, with `CASCADE` only where supported.
    fn drop_table_sql(&self, table: &str, cascade: bool) -> String {
        if cascade && self.supports_cascade_drop() {
            format!("DROP TABLE IF EXISTS {table} CASCADE;")
        } else {
            format!("DROP TABLE IF EXISTS {table};")
        }
    }

    /// Query returning one `name` column per user table.
    fn list_tables_sql(&self) -> String;

    /// Query returning one `name` row per column of `table` that already
    /// carries a foreign key.
    fn list_foreign_keys_sql(&self, table: &str) -> String;

    /// Statement switching foreign-key enforcement for the connection, if
    /// the dialect has one.
    fn foreign_key_checks_sql(&self, enabled: bool) -> Option<String>;

    /// Table-level constraint fragment for a CREATE TABLE body.
    fn add_foreign_key_fragment(&self, fk: &ForeignKeyClause) -> String {
        let mut sql = String::new();
        if let Some(name) = &fk.constraint_name {
            sql.push_str(&format!("CONSTRAINT {name} "));
        }
        sql.push_str(&format!("FOREIGN KEY ({}) {}", fk.column, fk.references_sql()));
        sql
    }

    /// Add a new column carrying a foreign key to an existing table.
    fn alter_add_column_with_constraint(
        &self,
        table: &str,
        column_def: &str,
        fk: &ForeignKeyClause,
    ) -> Vec<String>;

    /// Attach a foreign key to a column that already exists.
    fn alter_add_constraint(&self, table: &str, column_def: &str, fk: &ForeignKeyClause) -> Vec<String>;

    fn supports_cascade_drop(&self) -> bool;

    /// Whether CREATE TABLE may reference a table that does not exist yet.
    fn supports_forward_references(&self) -> bool;
}

/// The generator for a dialect.
pub fn dialect_for(dialect: Dialect) -> &'static dyn SqlDialect {
    match dialect {
        Dialect::Sqlite => &SqliteDialect,
        Dialect::Postgres => &PostgresDialect,
    }
}
