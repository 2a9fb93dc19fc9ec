//! Table schemas and their SQL compilation.
//!
//! A [`Schema`] is an immutable description of one table: plain columns plus
//! relationship fields. Fields are kept in lexicographic name order, which is
//! the order columns appear in generated DDL and default projections.

use crate::registry::SchemaRegistry;
use crate::relationship::Relationship;
use duckorm_core::validate::is_identifier;
use duckorm_core::{Column, Dialect, Error, Result, Value};
use duckorm_query::{Condition, ForeignKeyClause, Select, dialect_for, render_conditions};
use std::collections::BTreeMap;

/// Reference chains (a one-to-one key pointing at another one-to-one key...)
/// longer than this are treated as cycles.
const MAX_REFERENCE_DEPTH: usize = 16;

/// One field of a schema.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Column(Column),
    Relationship(Relationship),
}

impl Field {
    /// Whether the field occupies a column on the table.
    pub fn is_physical(&self) -> bool {
        match self {
            Field::Column(_) => true,
            Field::Relationship(rel) => rel.is_physical(),
        }
    }
}

/// The primary key of a schema.
#[derive(Debug, Clone, Copy)]
pub enum PrimaryKey<'a> {
    Column(&'a Column),
    /// A one-to-one relationship whose column is the key.
    OneToOne { name: &'a str },
}

impl PrimaryKey<'_> {
    pub fn name(&self) -> &str {
        match self {
            PrimaryKey::Column(col) => &col.name,
            PrimaryKey::OneToOne { name } => name,
        }
    }

    /// Whether the database assigns the key on insert.
    pub fn is_generated(&self) -> bool {
        matches!(self, PrimaryKey::Column(col) if col.auto_increment)
    }
}

/// A foreign key whose constraint was left out of CREATE TABLE.
#[derive(Debug, Clone)]
pub(crate) struct DeferredConstraint {
    pub column_def: String,
    pub clause: ForeignKeyClause,
}

#[derive(Debug, Clone)]
pub(crate) struct TablePlan {
    pub create: String,
    pub deferred: Vec<DeferredConstraint>,
}

/// Statements attaching one relationship to a table that already exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    /// Table receiving the foreign key.
    pub table: String,
    /// Column the foreign key sits on.
    pub column: String,
    pub statements: Vec<String>,
}

/// An immutable table description.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    name: String,
    table_name: String,
    fields: BTreeMap<String, Field>,
}

impl Schema {
    /// Start declaring a schema. The table name defaults to `name` lower-cased.
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// All fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        match self.fields.get(name) {
            Some(Field::Column(col)) => Some(col),
            _ => None,
        }
    }

    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        match self.fields.get(name) {
            Some(Field::Relationship(rel)) => Some(rel),
            _ => None,
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.fields.values().filter_map(|f| match f {
            Field::Column(col) => Some(col),
            Field::Relationship(_) => None,
        })
    }

    pub fn relationships(&self) -> impl Iterator<Item = (&str, &Relationship)> {
        self.fields.iter().filter_map(|(k, f)| match f {
            Field::Relationship(rel) => Some((k.as_str(), rel)),
            Field::Column(_) => None,
        })
    }

    /// Foreign-key and one-to-one fields, in field order.
    pub fn reference_fields(&self) -> impl Iterator<Item = (&str, &Relationship)> {
        self.relationships().filter(|(_, rel)| rel.is_physical())
    }

    /// Names of every field backed by a column, in field order.
    pub fn physical_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(_, f)| f.is_physical())
            .map(|(k, _)| k.as_str())
            .collect()
    }

    /// The primary key: a primary-key column, or a one-to-one field.
    pub fn primary_key(&self) -> Result<PrimaryKey<'_>> {
        for (name, field) in &self.fields {
            match field {
                Field::Column(col) if col.primary_key => return Ok(PrimaryKey::Column(col)),
                Field::Relationship(Relationship::OneToOne(_)) => {
                    return Ok(PrimaryKey::OneToOne {
                        name: name.as_str(),
                    });
                }
                _ => {}
            }
        }
        Err(Error::MissingPrimaryKey {
            table: self.table_name.clone(),
        })
    }

    /// SQL type of `key` (the primary key when `None`) as seen by a column
    /// referencing it. Generated keys are plain integers from the outside.
    pub fn key_sql_type(
        &self,
        key: Option<&str>,
        registry: &SchemaRegistry,
        dialect: Dialect,
    ) -> Result<String> {
        self.key_sql_type_at(key, registry, dialect, 0)
    }

    fn key_sql_type_at(
        &self,
        key: Option<&str>,
        registry: &SchemaRegistry,
        dialect: Dialect,
        depth: usize,
    ) -> Result<String> {
        if depth > MAX_REFERENCE_DEPTH {
            return Err(Error::invalid_schema(
                &self.table_name,
                key,
                "reference chain does not terminate in a column",
            ));
        }

        let field_name = match key {
            Some(k) => k.to_string(),
            None => self.primary_key()?.name().to_string(),
        };

        match self.fields.get(&field_name) {
            Some(Field::Column(col)) => Ok(col.sql_type.sql_name(dialect)),
            Some(Field::Relationship(rel)) if rel.is_physical() => {
                let target = registry.resolve(self, &field_name, rel)?;
                let target_key = match rel {
                    Relationship::ForeignKey(fk) => fk.target_key.as_deref(),
                    _ => None,
                };
                target.key_sql_type_at(target_key, registry, dialect, depth + 1)
            }
            _ => Err(Error::UnknownField {
                table: self.table_name.clone(),
                field: field_name,
            }),
        }
    }

    /// Column definition and constraint for a physical relationship field.
    fn reference_column(
        &self,
        name: &str,
        rel: &Relationship,
        registry: &SchemaRegistry,
        dialect: Dialect,
    ) -> Result<Option<(String, ForeignKeyClause)>> {
        match rel {
            Relationship::ForeignKey(fk) => {
                let target = registry.resolve(self, name, rel)?;
                let key = match &fk.target_key {
                    Some(key) => key.clone(),
                    None => target.primary_key()?.name().to_string(),
                };
                let mut column_def = format!(
                    "{} {}",
                    name,
                    target.key_sql_type(Some(&key), registry, dialect)?
                );
                if fk.not_null {
                    column_def.push_str(" NOT NULL");
                }
                if fk.unique {
                    column_def.push_str(" UNIQUE");
                }
                let mut clause = ForeignKeyClause::new(name, target.table_name(), key)
                    .on_delete(fk.on_delete)
                    .on_update(fk.on_update);
                if let Some(constraint) = &fk.constraint_name {
                    clause = clause.named(constraint);
                }
                Ok(Some((column_def, clause)))
            }
            Relationship::OneToOne(one) => {
                let target = registry.resolve(self, name, rel)?;
                let key = target.primary_key()?.name().to_string();
                let column_def = format!(
                    "{} {} PRIMARY KEY",
                    name,
                    target.key_sql_type(None, registry, dialect)?
                );
                let mut clause = ForeignKeyClause::new(name, target.table_name(), key)
                    .on_delete(one.on_delete)
                    .on_update(one.on_update);
                if let Some(constraint) = &one.constraint_name {
                    clause = clause.named(constraint);
                }
                Ok(Some((column_def, clause)))
            }
            Relationship::OneToMany(_) | Relationship::ManyToMany(_) => Ok(None),
        }
    }

    /// Plan the CREATE TABLE statement. Constraints whose target satisfies
    /// `defer` are left out and returned for a later ALTER.
    pub(crate) fn plan_create(
        &self,
        dialect: Dialect,
        registry: &SchemaRegistry,
        defer: &dyn Fn(&str) -> bool,
    ) -> Result<TablePlan> {
        let generator = dialect_for(dialect);
        let mut columns = Vec::with_capacity(self.fields.len());
        let mut constraints = Vec::new();
        let mut deferred = Vec::new();

        for (name, field) in &self.fields {
            match field {
                Field::Column(col) => columns.push(col.column_sql(dialect)),
                Field::Relationship(rel) => {
                    let Some((column_def, clause)) =
                        self.reference_column(name, rel, registry, dialect)?
                    else {
                        continue;
                    };
                    columns.push(column_def.clone());
                    if defer(&clause.target_table) {
                        tracing::debug!(
                            table = %self.table_name,
                            field = %name,
                            target = %clause.target_table,
                            "Deferring foreign key constraint"
                        );
                        deferred.push(DeferredConstraint { column_def, clause });
                    } else {
                        constraints.push(generator.add_foreign_key_fragment(&clause));
                    }
                }
            }
        }

        columns.extend(constraints);
        Ok(TablePlan {
            create: generator.create_table_sql(&self.table_name, &columns),
            deferred,
        })
    }

    /// `CREATE TABLE IF NOT EXISTS` with every column and constraint inline.
    pub fn create_table_sql(&self, dialect: Dialect, registry: &SchemaRegistry) -> Result<String> {
        Ok(self.plan_create(dialect, registry, &|_| false)?.create)
    }

    /// Statements that attach this schema's relationships to tables that
    /// already exist.
    pub fn association_sql(&self, dialect: Dialect, registry: &SchemaRegistry) -> Result<Vec<String>> {
        Ok(self
            .associations(dialect, registry)?
            .into_iter()
            .flat_map(|a| a.statements)
            .collect())
    }

    /// [`Schema::association_sql`] grouped by the column each relationship
    /// constrains, so a caller can skip columns that are already linked.
    pub fn associations(&self, dialect: Dialect, registry: &SchemaRegistry) -> Result<Vec<Association>> {
        let mut associations = Vec::new();
        for (name, rel) in self.relationships() {
            associations.extend(self.relationship_association(name, rel, dialect, registry)?);
        }
        Ok(associations)
    }

    pub(crate) fn relationship_association(
        &self,
        name: &str,
        rel: &Relationship,
        dialect: Dialect,
        registry: &SchemaRegistry,
    ) -> Result<Option<Association>> {
        let generator = dialect_for(dialect);
        let on_self = |statements| Association {
            table: self.table_name.clone(),
            column: name.to_string(),
            statements,
        };
        match rel {
            Relationship::ForeignKey(_) => {
                let Some((column_def, clause)) =
                    self.reference_column(name, rel, registry, dialect)?
                else {
                    return Ok(None);
                };
                Ok(Some(on_self(generator.alter_add_constraint(
                    &self.table_name,
                    &column_def,
                    &clause,
                ))))
            }
            Relationship::OneToOne(_) => {
                let Some((column_def, clause)) =
                    self.reference_column(name, rel, registry, dialect)?
                else {
                    return Ok(None);
                };
                if dialect == Dialect::Sqlite {
                    // A primary key column cannot be dropped, only the table.
                    Ok(Some(on_self(vec![
                        generator.drop_table_sql(&self.table_name, false),
                        self.create_table_sql(dialect, registry)?,
                    ])))
                } else {
                    Ok(Some(on_self(generator.alter_add_constraint(
                        &self.table_name,
                        &column_def,
                        &clause,
                    ))))
                }
            }
            Relationship::OneToMany(one) => {
                let target = registry.resolve(self, name, rel)?;
                if target.field(&one.fk_column).is_some() {
                    return Ok(None);
                }
                let column_def = format!(
                    "{} {}",
                    one.fk_column,
                    self.key_sql_type(None, registry, dialect)?
                );
                let mut clause = ForeignKeyClause::new(
                    &one.fk_column,
                    &self.table_name,
                    self.primary_key()?.name(),
                )
                .on_delete(one.on_delete)
                .on_update(one.on_update);
                if let Some(constraint) = &one.constraint_name {
                    clause = clause.named(constraint);
                }
                Ok(Some(Association {
                    table: target.table_name().to_string(),
                    column: one.fk_column.clone(),
                    statements: generator.alter_add_column_with_constraint(
                        target.table_name(),
                        &column_def,
                        &clause,
                    ),
                }))
            }
            Relationship::ManyToMany(_) => {
                registry.resolve(self, name, rel)?;
                Ok(None)
            }
        }
    }

    pub fn drop_table_sql(&self, dialect: Dialect, cascade: bool) -> String {
        dialect_for(dialect).drop_table_sql(&self.table_name, cascade)
    }

    /// SELECT for the projection, filter and limit in `select`.
    pub fn select_sql(&self, dialect: Dialect, select: &Select) -> Result<String> {
        let available = self.physical_fields();
        let fields = select
            .projection(&available)
            .map_err(|field| Error::UnknownField {
                table: self.table_name.clone(),
                field,
            })?;
        let conditions = select.where_sql()?;
        Ok(dialect_for(dialect).select_sql(&self.table_name, &fields, &conditions, select.limit))
    }

    /// Select options fetching the single row whose `key` equals `value`.
    pub fn select_by(&self, key: &str, value: Value) -> Select {
        Select::new().filter(Condition::eq(key, value)).limit(1)
    }

    /// INSERT with named placeholders for `fields`.
    pub fn insert_sql(&self, dialect: Dialect, fields: &[&str]) -> Result<String> {
        self.check_fields(fields)?;
        Ok(dialect_for(dialect).insert_sql(&self.table_name, fields))
    }

    /// UPDATE of `fields` on the row whose primary key equals `key`.
    pub fn update_sql(&self, dialect: Dialect, fields: &[&str], key: &Value) -> Result<String> {
        self.check_fields(fields)?;
        let pk = self.primary_key()?;
        let conditions = render_conditions(&[Condition::eq(pk.name(), key.clone())])?;
        Ok(dialect_for(dialect).update_sql(&self.table_name, fields, &conditions))
    }

    pub fn delete_sql(&self, dialect: Dialect, conditions: &[Condition]) -> Result<String> {
        let conditions = render_conditions(conditions)?;
        Ok(dialect_for(dialect).delete_sql(&self.table_name, &conditions))
    }

    /// Query yielding the primary key of the most recently inserted row.
    pub fn last_inserted_id_sql(&self, dialect: Dialect) -> Result<String> {
        let pk = self.primary_key()?;
        Ok(dialect_for(dialect).select_last_inserted_id_sql(&self.table_name, pk.name()))
    }

    fn check_fields(&self, fields: &[&str]) -> Result<()> {
        match fields.iter().find(|f| !is_identifier(f)) {
            Some(bad) => Err(Error::UnknownField {
                table: self.table_name.clone(),
                field: (*bad).to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// Builder for [`Schema`].
///
/// ```
/// use duckorm_core::Column;
/// use duckorm_schema::{ForeignKey, Schema};
///
/// let person = Schema::builder("Person")
///     .table("persons")
///     .column(Column::integer("id").primary_key(true).auto_increment(true))
///     .column(Column::string("first_name").unique(true))
///     .relationship("city", ForeignKey::new("cities"))
///     .build()
///     .unwrap();
/// assert_eq!(person.physical_fields(), vec!["city", "first_name", "id"]);
/// ```
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    name: String,
    table_name: Option<String>,
    fields: Vec<(String, Field)>,
}

impl SchemaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table_name: None,
            fields: Vec::new(),
        }
    }

    /// Override the table name.
    pub fn table(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    pub fn column(mut self, column: Column) -> Self {
        self.fields.push((column.name.clone(), Field::Column(column)));
        self
    }

    pub fn relationship(mut self, name: impl Into<String>, rel: impl Into<Relationship>) -> Self {
        self.fields.push((name.into(), Field::Relationship(rel.into())));
        self
    }

    /// Validate and freeze the schema.
    pub fn build(self) -> Result<Schema> {
        let table_name = self
            .table_name
            .unwrap_or_else(|| self.name.to_lowercase());
        if !is_identifier(&table_name) {
            return Err(Error::invalid_schema(
                &table_name,
                None,
                "table name is not a valid identifier",
            ));
        }

        let mut fields = BTreeMap::new();
        let mut primary_keys = 0;
        for (name, field) in self.fields {
            if !is_identifier(&name) {
                return Err(Error::invalid_schema(
                    &table_name,
                    Some(&name),
                    "field name is not a valid identifier",
                ));
            }
            match &field {
                Field::Column(col) => {
                    col.validate(&table_name)?;
                    if col.primary_key {
                        primary_keys += 1;
                    }
                }
                Field::Relationship(rel) => {
                    let target = rel.require_target(&name)?;
                    if !is_identifier(target) {
                        return Err(Error::invalid_schema(
                            &table_name,
                            Some(&name),
                            "relationship target is not a valid identifier",
                        ));
                    }
                    match rel {
                        Relationship::OneToOne(_) => primary_keys += 1,
                        Relationship::OneToMany(one) if !is_identifier(&one.fk_column) => {
                            return Err(Error::invalid_schema(
                                &table_name,
                                Some(&name),
                                "foreign key column is not a valid identifier",
                            ));
                        }
                        Relationship::ManyToMany(many) if !is_identifier(&many.through) => {
                            return Err(Error::invalid_schema(
                                &table_name,
                                Some(&name),
                                "join table is not a valid identifier",
                            ));
                        }
                        _ => {}
                    }
                }
            }
            if fields.insert(name.clone(), field).is_some() {
                return Err(Error::invalid_schema(
                    &table_name,
                    Some(&name),
                    "field declared twice",
                ));
            }
        }

        if primary_keys > 1 {
            return Err(Error::invalid_schema(
                &table_name,
                None,
                "at most one primary key may be declared",
            ));
        }

        Ok(Schema {
            name: self.name,
            table_name,
            fields,
        })
    }
}
