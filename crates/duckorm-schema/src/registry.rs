//! The schema registry.
//!
//! Schemas are registered explicitly and looked up by table name.
//! Registration order is preserved and drives the order of `create_all`.

use crate::relationship::{ManyToMany, Relationship};
use crate::schema::Schema;
use duckorm_core::{Dialect, Error, Result};
use duckorm_query::dialect_for;
use indexmap::IndexMap;
use std::sync::Arc;

/// The two referencing columns of a many-to-many join table.
#[derive(Debug, Clone, Copy)]
pub struct JoinColumns<'a> {
    pub join: &'a Schema,
    /// Column holding the owner's key
    pub local: &'a str,
    /// Column holding the target's key
    pub remote: &'a str,
}

/// Table name → schema, in registration order.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: IndexMap<String, Arc<Schema>>,
}

impl SchemaRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema. Table names must be unique.
    pub fn register(&mut self, schema: Schema) -> Result<Arc<Schema>> {
        let table = schema.table_name().to_string();
        if self.schemas.contains_key(&table) {
            return Err(Error::invalid_schema(&table, None, "table already registered"));
        }
        tracing::debug!(table = %table, schema = schema.name(), "Registering schema");
        let schema = Arc::new(schema);
        self.schemas.insert(table, Arc::clone(&schema));
        Ok(schema)
    }

    /// Builder-style `register`.
    pub fn with(mut self, schema: Schema) -> Result<Self> {
        self.register(schema)?;
        Ok(self)
    }

    pub fn unregister(&mut self, table: &str) -> Option<Arc<Schema>> {
        self.schemas.shift_remove(table)
    }

    pub fn get(&self, table: &str) -> Option<&Arc<Schema>> {
        self.schemas.get(table)
    }

    /// Look a schema up, failing with `UnknownSchema`.
    pub fn require(&self, table: &str) -> Result<&Arc<Schema>> {
        self.schemas
            .get(table)
            .ok_or_else(|| Error::UnknownSchema(table.to_string()))
    }

    pub fn contains(&self, table: &str) -> bool {
        self.schemas.contains_key(table)
    }

    /// Every schema, in registration order.
    pub fn all_schemas(&self) -> impl Iterator<Item = &Arc<Schema>> {
        self.schemas.values()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Resolve the target of `owner`'s relationship field.
    ///
    /// A schema may reference itself before it is registered.
    pub fn resolve<'a>(
        &'a self,
        owner: &'a Schema,
        field: &str,
        rel: &Relationship,
    ) -> Result<&'a Schema> {
        let target = rel.require_target(field)?;
        if target == owner.table_name() {
            return Ok(owner);
        }
        self.schemas
            .get(target)
            .map(|schema| &**schema)
            .ok_or_else(|| Error::RelationshipTargetMissing {
                relationship: field.to_string(),
                target: Some(target.to_string()),
            })
    }

    /// Locate the owner and target columns of a many-to-many join table.
    ///
    /// For a self-referential relationship the first foreign key to the owner
    /// is the local column and the second the remote one.
    pub fn join_columns<'a>(
        &'a self,
        owner: &Schema,
        field: &str,
        rel: &ManyToMany,
    ) -> Result<JoinColumns<'a>> {
        if rel.target.is_empty() {
            return Err(Error::RelationshipTargetMissing {
                relationship: field.to_string(),
                target: None,
            });
        }
        if rel.target != owner.table_name() && !self.contains(&rel.target) {
            return Err(Error::RelationshipTargetMissing {
                relationship: field.to_string(),
                target: Some(rel.target.clone()),
            });
        }
        let join = self
            .schemas
            .get(&rel.through)
            .ok_or_else(|| Error::RelationshipTargetMissing {
                relationship: field.to_string(),
                target: Some(rel.through.clone()),
            })?;

        let mut local = None;
        let mut remote = None;
        for (name, join_rel) in join.reference_fields() {
            let Relationship::ForeignKey(fk) = join_rel else {
                continue;
            };
            if local.is_none() && fk.target == owner.table_name() {
                local = Some(name);
            } else if remote.is_none() && fk.target == rel.target {
                remote = Some(name);
            }
        }

        match (local, remote) {
            (Some(local), Some(remote)) => Ok(JoinColumns {
                join,
                local,
                remote,
            }),
            _ => Err(Error::invalid_schema(
                join.table_name(),
                Some(field),
                format!(
                    "join table needs foreign keys to both '{}' and '{}'",
                    owner.table_name(),
                    rel.target
                ),
            )),
        }
    }

    /// Columns that one-to-many relationships elsewhere add to `table`
    /// without `table` declaring them.
    pub fn inbound_columns(&self, table: &str) -> Vec<&str> {
        let Some(schema) = self.schemas.get(table) else {
            return Vec::new();
        };
        let mut columns = Vec::new();
        for owner in self.schemas.values() {
            for (_, rel) in owner.relationships() {
                if let Relationship::OneToMany(one) = rel {
                    if one.target == table
                        && schema.field(&one.fk_column).is_none()
                        && !columns.contains(&one.fk_column.as_str())
                    {
                        columns.push(one.fk_column.as_str());
                    }
                }
            }
        }
        columns
    }

    /// Check that every relationship resolves.
    pub fn validate(&self) -> Result<()> {
        for schema in self.schemas.values() {
            for (name, rel) in schema.relationships() {
                match rel {
                    Relationship::ManyToMany(many) => {
                        self.join_columns(schema, name, many)?;
                    }
                    Relationship::ForeignKey(fk) => {
                        let target = self.resolve(schema, name, rel)?;
                        if let Some(key) = &fk.target_key {
                            if target.field(key).is_none() {
                                return Err(Error::UnknownField {
                                    table: target.table_name().to_string(),
                                    field: key.clone(),
                                });
                            }
                        }
                    }
                    _ => {
                        self.resolve(schema, name, rel)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Statements creating every registered table.
    ///
    /// Pass one creates each table. On dialects that reject forward
    /// references, a constraint pointing at a table created later in the
    /// pass is left out (its column is still created). Pass two attaches
    /// those constraints and adds one-to-many columns to their targets.
    pub fn create_all_sql(&self, dialect: Dialect) -> Result<Vec<String>> {
        let generator = dialect_for(dialect);
        let mut stmts = Vec::with_capacity(self.schemas.len());
        let mut pending = Vec::with_capacity(self.schemas.len());

        for (position, schema) in self.schemas.values().enumerate() {
            let defer = |target: &str| {
                !generator.supports_forward_references()
                    && self
                        .schemas
                        .get_index_of(target)
                        .is_some_and(|p| p > position)
            };
            let plan = schema.plan_create(dialect, self, &defer)?;
            stmts.push(plan.create);
            pending.push((schema, plan.deferred));
        }

        for (schema, deferred) in pending {
            for constraint in deferred {
                stmts.extend(generator.alter_add_constraint(
                    schema.table_name(),
                    &constraint.column_def,
                    &constraint.clause,
                ));
            }
            for (name, rel) in schema.relationships() {
                if matches!(rel, Relationship::OneToMany(_)) {
                    if let Some(association) = schema.relationship_association(name, rel, dialect, self)? {
                        stmts.extend(association.statements);
                    }
                }
            }
        }

        tracing::info!(
            dialect = dialect.name(),
            tables = self.schemas.len(),
            statements = stmts.len(),
            "Planned schema creation"
        );
        Ok(stmts)
    }

    /// Statements dropping every registered table, cascading where the
    /// dialect can.
    ///
    /// A table is dropped before the tables it references, newest first
    /// among those free to go. A reference cycle cannot be ordered, so on a
    /// dialect without CASCADE its drops run with foreign-key checks off.
    pub fn drop_all_sql(&self, dialect: Dialect) -> Vec<String> {
        let generator = dialect_for(dialect);
        let (order, cyclic) = self.drop_order();
        let mut stmts: Vec<String> = order
            .iter()
            .map(|schema| schema.drop_table_sql(dialect, true))
            .collect();

        if cyclic && !generator.supports_cascade_drop() {
            if let (Some(off), Some(on)) = (
                generator.foreign_key_checks_sql(false),
                generator.foreign_key_checks_sql(true),
            ) {
                tracing::debug!(dialect = dialect.name(), "Dropping a reference cycle without foreign-key checks");
                stmts.insert(0, off);
                stmts.push(on);
            }
        }
        stmts
    }

    /// Registered schemas ordered so none is dropped while a remaining one
    /// still references it. The flag is set when a cycle forced the order.
    fn drop_order(&self) -> (Vec<&Schema>, bool) {
        let mut remaining: Vec<&Schema> = self.schemas.values().rev().map(|s| &**s).collect();
        let mut order = Vec::with_capacity(remaining.len());
        let mut cyclic = false;

        while !remaining.is_empty() {
            let free = remaining.iter().position(|candidate| {
                !remaining.iter().any(|other| {
                    other.table_name() != candidate.table_name() && references(other, candidate)
                })
            });
            let index = match free {
                Some(index) => index,
                None => {
                    cyclic = true;
                    0
                }
            };
            order.push(remaining.remove(index));
        }
        (order, cyclic)
    }
}

/// Whether rows of `referrer` can hold keys of `referenced`: through its own
/// foreign-key or one-to-one fields, or through a one-to-many column that
/// `referenced` attaches to it.
fn references(referrer: &Schema, referenced: &Schema) -> bool {
    let outbound = referrer.relationships().any(|(_, rel)| {
        matches!(rel, Relationship::ForeignKey(_) | Relationship::OneToOne(_))
            && rel.target() == referenced.table_name()
    });
    let inbound = referenced.relationships().any(|(_, rel)| {
        matches!(rel, Relationship::OneToMany(_)) && rel.target() == referrer.table_name()
    });
    outbound || inbound
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relationship::{ForeignKey, OneToMany};
    use duckorm_core::Column;

    fn city() -> Schema {
        Schema::builder("City")
            .table("cities")
            .column(Column::integer("id").primary_key(true).auto_increment(true))
            .column(Column::string("name"))
            .relationship("persons", OneToMany::new("persons", "city"))
            .build()
            .unwrap()
    }

    fn person() -> Schema {
        Schema::builder("Person")
            .table("persons")
            .column(Column::integer("id").primary_key(true).auto_increment(true))
            .column(Column::string("first_name"))
            .relationship("city", ForeignKey::new("cities"))
            .build()
            .unwrap()
    }

    fn users_and_days() -> SchemaRegistry {
        SchemaRegistry::new()
            .with(
                Schema::builder("User")
                    .table("users")
                    .column(Column::integer("id").primary_key(true).auto_increment(true))
                    .column(Column::string("name"))
                    .relationship(
                        "working_days",
                        ManyToMany::new("working_days", "users_working_days"),
                    )
                    .build()
                    .unwrap(),
            )
            .unwrap()
            .with(
                Schema::builder("WorkingDay")
                    .table("working_days")
                    .column(Column::integer("id").primary_key(true).auto_increment(true))
                    .column(Column::string("week_day"))
                    .build()
                    .unwrap(),
            )
            .unwrap()
            .with(
                Schema::builder("UsersWorkingDay")
                    .table("users_working_days")
                    .column(Column::integer("id").primary_key(true).auto_increment(true))
                    .relationship("users", ForeignKey::new("users"))
                    .relationship("working_days", ForeignKey::new("working_days"))
                    .build()
                    .unwrap(),
            )
            .unwrap()
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = SchemaRegistry::new();
        registry.register(city()).unwrap();
        assert!(registry.contains("cities"));
        assert_eq!(registry.require("cities").unwrap().name(), "City");
        assert!(matches!(
            registry.require("nope"),
            Err(Error::UnknownSchema(ref t)) if t == "nope"
        ));
    }

    #[test]
    fn test_register_duplicate_fails() {
        let mut registry = SchemaRegistry::new();
        registry.register(city()).unwrap();
        assert!(matches!(
            registry.register(city()),
            Err(Error::InvalidSchema(_))
        ));
    }

    #[test]
    fn test_registration_order_preserved() {
        let registry = SchemaRegistry::new()
            .with(person())
            .unwrap()
            .with(city())
            .unwrap();
        let tables: Vec<&str> = registry.all_schemas().map(|s| s.table_name()).collect();
        assert_eq!(tables, vec!["persons", "cities"]);

        let mut registry = registry;
        assert!(registry.unregister("persons").is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_create_all_sqlite_inlines_forward_references() {
        let registry = SchemaRegistry::new()
            .with(person())
            .unwrap()
            .with(city())
            .unwrap();
        assert_eq!(
            registry.create_all_sql(Dialect::Sqlite).unwrap(),
            vec![
                "CREATE TABLE IF NOT EXISTS persons (city INTEGER, first_name TEXT, id INTEGER PRIMARY KEY AUTOINCREMENT, FOREIGN KEY (city) REFERENCES cities (id));",
                "CREATE TABLE IF NOT EXISTS cities (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT);",
            ]
        );
    }

    #[test]
    fn test_create_all_postgres_defers_forward_references() {
        let registry = SchemaRegistry::new()
            .with(person())
            .unwrap()
            .with(city())
            .unwrap();
        assert_eq!(
            registry.create_all_sql(Dialect::Postgres).unwrap(),
            vec![
                "CREATE TABLE IF NOT EXISTS persons (city INTEGER, first_name TEXT, id SERIAL PRIMARY KEY);",
                "CREATE TABLE IF NOT EXISTS cities (id SERIAL PRIMARY KEY, name TEXT);",
                "ALTER TABLE persons ADD CONSTRAINT fk_persons_city FOREIGN KEY (city) REFERENCES cities (id);",
            ]
        );
    }

    #[test]
    fn test_create_all_postgres_backward_reference_is_inline() {
        let registry = SchemaRegistry::new()
            .with(city())
            .unwrap()
            .with(person())
            .unwrap();
        let stmts = registry.create_all_sql(Dialect::Postgres).unwrap();
        assert_eq!(stmts.len(), 2);
        assert!(stmts[1].ends_with("FOREIGN KEY (city) REFERENCES cities (id));"));
    }

    #[test]
    fn test_create_all_adds_one_to_many_column() {
        let city = city();
        let person = Schema::builder("Person")
            .table("persons")
            .column(Column::integer("id").primary_key(true).auto_increment(true))
            .build()
            .unwrap();
        let registry = SchemaRegistry::new()
            .with(city)
            .unwrap()
            .with(person)
            .unwrap();

        let stmts = registry.create_all_sql(Dialect::Sqlite).unwrap();
        assert_eq!(
            stmts.last().map(String::as_str),
            Some("ALTER TABLE persons ADD COLUMN city INTEGER REFERENCES cities (id);")
        );
        assert_eq!(registry.inbound_columns("persons"), vec!["city"]);
        assert!(registry.inbound_columns("cities").is_empty());
    }

    #[test]
    fn test_create_all_missing_target() {
        let registry = SchemaRegistry::new().with(person()).unwrap();
        assert!(matches!(
            registry.create_all_sql(Dialect::Sqlite),
            Err(Error::RelationshipTargetMissing { .. })
        ));
        assert!(registry.validate().is_err());
    }

    #[test]
    fn test_drop_all_newest_first_with_cascade() {
        let registry = SchemaRegistry::new()
            .with(city())
            .unwrap()
            .with(person())
            .unwrap();
        assert_eq!(
            registry.drop_all_sql(Dialect::Postgres),
            vec![
                "DROP TABLE IF EXISTS persons CASCADE;",
                "DROP TABLE IF EXISTS cities CASCADE;",
            ]
        );
        assert_eq!(
            registry.drop_all_sql(Dialect::Sqlite),
            vec!["DROP TABLE IF EXISTS persons;", "DROP TABLE IF EXISTS cities;"]
        );
    }

    #[test]
    fn test_drop_all_drops_referencing_tables_first() {
        let registry = SchemaRegistry::new()
            .with(person())
            .unwrap()
            .with(city())
            .unwrap();
        assert_eq!(
            registry.drop_all_sql(Dialect::Sqlite),
            vec!["DROP TABLE IF EXISTS persons;", "DROP TABLE IF EXISTS cities;"]
        );

        // The one-to-many column on persons points at cities too.
        let registry = SchemaRegistry::new()
            .with(
                Schema::builder("Person")
                    .table("persons")
                    .column(Column::integer("id").primary_key(true))
                    .build()
                    .unwrap(),
            )
            .unwrap()
            .with(city())
            .unwrap();
        assert_eq!(
            registry.drop_all_sql(Dialect::Postgres),
            vec![
                "DROP TABLE IF EXISTS persons CASCADE;",
                "DROP TABLE IF EXISTS cities CASCADE;",
            ]
        );
    }

    #[test]
    fn test_drop_all_cycle_disables_checks_on_sqlite() {
        let a = Schema::builder("A")
            .table("a")
            .column(Column::integer("id").primary_key(true))
            .relationship("b", ForeignKey::new("b"))
            .build()
            .unwrap();
        let b = Schema::builder("B")
            .table("b")
            .column(Column::integer("id").primary_key(true))
            .relationship("a", ForeignKey::new("a"))
            .build()
            .unwrap();
        let registry = SchemaRegistry::new().with(a).unwrap().with(b).unwrap();

        assert_eq!(
            registry.drop_all_sql(Dialect::Sqlite),
            vec![
                "PRAGMA foreign_keys = OFF;",
                "DROP TABLE IF EXISTS b;",
                "DROP TABLE IF EXISTS a;",
                "PRAGMA foreign_keys = ON;",
            ]
        );
        assert_eq!(
            registry.drop_all_sql(Dialect::Postgres),
            vec!["DROP TABLE IF EXISTS b CASCADE;", "DROP TABLE IF EXISTS a CASCADE;"]
        );
    }

    #[test]
    fn test_drop_all_ignores_self_references() {
        let employee = Schema::builder("Employee")
            .table("employees")
            .column(Column::integer("id").primary_key(true))
            .relationship("manager", ForeignKey::new("employees"))
            .build()
            .unwrap();
        let registry = SchemaRegistry::new().with(employee).unwrap();
        assert_eq!(
            registry.drop_all_sql(Dialect::Sqlite),
            vec!["DROP TABLE IF EXISTS employees;"]
        );
    }

    #[test]
    fn test_join_columns() {
        let registry = users_and_days();
        registry.validate().unwrap();

        let users = registry.require("users").unwrap();
        let Some(Relationship::ManyToMany(many)) = users.relationship("working_days") else {
            panic!("expected many-to-many");
        };
        let cols = registry.join_columns(users, "working_days", many).unwrap();
        assert_eq!(cols.join.table_name(), "users_working_days");
        assert_eq!(cols.local, "users");
        assert_eq!(cols.remote, "working_days");
    }

    #[test]
    fn test_join_columns_missing_foreign_key() {
        let registry = SchemaRegistry::new()
            .with(
                Schema::builder("User")
                    .table("users")
                    .column(Column::integer("id").primary_key(true))
                    .relationship("days", ManyToMany::new("days", "links"))
                    .build()
                    .unwrap(),
            )
            .unwrap()
            .with(
                Schema::builder("Day")
                    .table("days")
                    .column(Column::integer("id").primary_key(true))
                    .build()
                    .unwrap(),
            )
            .unwrap()
            .with(
                Schema::builder("Link")
                    .table("links")
                    .column(Column::integer("id").primary_key(true))
                    .relationship("users", ForeignKey::new("users"))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        assert!(matches!(registry.validate(), Err(Error::InvalidSchema(_))));
    }

    #[test]
    fn test_validate_unknown_target_key() {
        let registry = SchemaRegistry::new()
            .with(city())
            .unwrap()
            .with(
                Schema::builder("Person")
                    .table("persons")
                    .column(Column::integer("id").primary_key(true))
                    .relationship("city", ForeignKey::new("cities").references("code"))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        assert!(matches!(
            registry.validate(),
            Err(Error::UnknownField { ref field, .. }) if field == "code"
        ));
    }
}
