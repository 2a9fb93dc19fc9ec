//! SQLite SQL generation.
//!
//! SQLite has no `ALTER TABLE ... ADD CONSTRAINT`, so a foreign key can only
//! be attached to an existing table by (re)adding the column with an inline
//! `REFERENCES` clause.

use super::{ForeignKeyClause, SqlDialect};
use duckorm_core::Dialect;

/// SQL generator for SQLite.
pub struct SqliteDialect;

impl SqlDialect for SqliteDialect {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn select_last_inserted_id_sql(&self, table: &str, primary_key: &str) -> String {
        format!("SELECT {primary_key} FROM {table} WHERE rowid = last_insert_rowid();")
    }

    fn list_tables_sql(&self) -> String {
        "SELECT name FROM sqlite_master WHERE type = 'table';".to_string()
    }

    fn list_foreign_keys_sql(&self, table: &str) -> String {
        format!("SELECT \"from\" AS name FROM pragma_foreign_key_list('{table}');")
    }

    fn foreign_key_checks_sql(&self, enabled: bool) -> Option<String> {
        let state = if enabled { "ON" } else { "OFF" };
        Some(format!("PRAGMA foreign_keys = {state};"))
    }

    fn alter_add_column_with_constraint(
        &self,
        table: &str,
        column_def: &str,
        fk: &ForeignKeyClause,
    ) -> Vec<String> {
        tracing::debug!(dialect = "sqlite", table, column = %fk.column, "Adding referencing column");
        vec![format!(
            "ALTER TABLE {} ADD COLUMN {} {};",
            table,
            column_def,
            fk.references_sql()
        )]
    }

    fn alter_add_constraint(&self, table: &str, column_def: &str, fk: &ForeignKeyClause) -> Vec<String> {
        tracing::debug!(
            dialect = "sqlite",
            table,
            column = %fk.column,
            "Recreating column to attach foreign key"
        );
        let mut stmts = vec![format!("ALTER TABLE {} DROP COLUMN {};", table, fk.column)];
        stmts.extend(self.alter_add_column_with_constraint(table, column_def, fk));
        stmts
    }

    fn supports_cascade_drop(&self) -> bool {
        false
    }

    fn supports_forward_references(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duckorm_core::ReferentialAction;

    #[test]
    fn test_last_inserted_id() {
        assert_eq!(
            SqliteDialect.select_last_inserted_id_sql("persons", "id"),
            "SELECT id FROM persons WHERE rowid = last_insert_rowid();"
        );
    }

    #[test]
    fn test_list_tables() {
        assert_eq!(
            SqliteDialect.list_tables_sql(),
            "SELECT name FROM sqlite_master WHERE type = 'table';"
        );
    }

    #[test]
    fn test_foreign_key_introspection() {
        assert_eq!(
            SqliteDialect.list_foreign_keys_sql("persons"),
            "SELECT \"from\" AS name FROM pragma_foreign_key_list('persons');"
        );
        assert_eq!(
            SqliteDialect.foreign_key_checks_sql(false).as_deref(),
            Some("PRAGMA foreign_keys = OFF;")
        );
        assert_eq!(
            SqliteDialect.foreign_key_checks_sql(true).as_deref(),
            Some("PRAGMA foreign_keys = ON;")
        );
    }

    #[test]
    fn test_drop_table_ignores_cascade() {
        assert_eq!(
            SqliteDialect.drop_table_sql("persons", true),
            "DROP TABLE IF EXISTS persons;"
        );
        assert_eq!(
            SqliteDialect.drop_table_sql("persons", false),
            "DROP TABLE IF EXISTS persons;"
        );
    }

    #[test]
    fn test_add_column_with_constraint() {
        let fk = ForeignKeyClause::new("city", "cities", "id");
        assert_eq!(
            SqliteDialect.alter_add_column_with_constraint("persons", "city INTEGER", &fk),
            vec!["ALTER TABLE persons ADD COLUMN city INTEGER REFERENCES cities (id);"]
        );
    }

    #[test]
    fn test_add_constraint_recreates_column() {
        let fk = ForeignKeyClause::new("city", "cities", "id")
            .on_delete(Some(ReferentialAction::Cascade));
        assert_eq!(
            SqliteDialect.alter_add_constraint("persons", "city INTEGER", &fk),
            vec![
                "ALTER TABLE persons DROP COLUMN city;",
                "ALTER TABLE persons ADD COLUMN city INTEGER REFERENCES cities (id) ON DELETE CASCADE;",
            ]
        );
    }
}
