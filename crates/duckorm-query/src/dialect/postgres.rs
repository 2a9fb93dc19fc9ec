//! PostgreSQL SQL generation.

use super::{ForeignKeyClause, SqlDialect};
use duckorm_core::Dialect;

/// SQL generator for PostgreSQL.
pub struct PostgresDialect;

impl PostgresDialect {
    fn add_constraint_statement(table: &str, fk: &ForeignKeyClause) -> String {
        format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) {};",
            table,
            fk.effective_name(table),
            fk.column,
            fk.references_sql()
        )
    }
}

impl SqlDialect for PostgresDialect {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    // Serial keys grow monotonically, so the highest key is the newest row.
    fn select_last_inserted_id_sql(&self, table: &str, primary_key: &str) -> String {
        format!("SELECT {primary_key} FROM {table} ORDER BY {primary_key} DESC LIMIT 1;")
    }

    fn list_tables_sql(&self) -> String {
        "SELECT tablename AS name FROM pg_tables WHERE schemaname = 'public';".to_string()
    }

    fn list_foreign_keys_sql(&self, table: &str) -> String {
        format!(
            "SELECT kcu.column_name AS name FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
             ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
             WHERE tc.constraint_type = 'FOREIGN KEY' AND tc.table_name = '{table}';"
        )
    }

    // CASCADE already removes dependent constraints.
    fn foreign_key_checks_sql(&self, _enabled: bool) -> Option<String> {
        None
    }

    fn alter_add_column_with_constraint(
        &self,
        table: &str,
        column_def: &str,
        fk: &ForeignKeyClause,
    ) -> Vec<String> {
        tracing::debug!(dialect = "postgresql", table, column = %fk.column, "Adding referencing column");
        vec![
            format!("ALTER TABLE {table} ADD COLUMN IF NOT EXISTS {column_def};"),
            Self::add_constraint_statement(table, fk),
        ]
    }

    fn alter_add_constraint(&self, table: &str, _column_def: &str, fk: &ForeignKeyClause) -> Vec<String> {
        tracing::debug!(dialect = "postgresql", table, column = %fk.column, "Adding foreign key constraint");
        vec![Self::add_constraint_statement(table, fk)]
    }

    fn supports_cascade_drop(&self) -> bool {
        true
    }

    fn supports_forward_references(&self) -> bool {
        false
    }
}
