//! Relationships bound to one persisted owner.
//!
//! A relationship declared on a schema knows nothing about a particular row.
//! [`Session::relation`](crate::Session::relation) pairs it with an owner's
//! primary-key value; the resulting [`BoundRelation`] is a fresh value each
//! time and never changes the schema.

use crate::Session;
use crate::mapper;
use asupersync::{Cx, Outcome};
use duckorm_core::{Connection, Error, Record, Value, try_outcome, try_result};
use duckorm_query::{Condition, Select};
use duckorm_schema::{Relationship, RelationshipKind, Schema};
use std::sync::Arc;

/// A one-to-many or many-to-many relationship scoped to one owner row.
pub struct BoundRelation<'s, C: Connection> {
    session: &'s Session<C>,
    owner: Arc<Schema>,
    owner_key: Value,
    name: String,
    relationship: Relationship,
}

impl<'s, C: Connection> BoundRelation<'s, C> {
    pub(crate) fn new(
        session: &'s Session<C>,
        owner: Arc<Schema>,
        owner_key: Value,
        name: &str,
        relationship: Relationship,
    ) -> Self {
        Self {
            session,
            owner,
            owner_key,
            name: name.to_string(),
            relationship,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> RelationshipKind {
        self.relationship.kind()
    }

    /// The owner's primary-key value.
    pub fn owner_key(&self) -> &Value {
        &self.owner_key
    }

    fn not_a_collection(&self) -> Error {
        Error::Custom(format!(
            "relationship '{}' on '{}' is a {:?} and holds no collection",
            self.name,
            self.owner.table_name(),
            self.relationship.kind()
        ))
    }

    fn check_target(&self, record: &Record) -> Result<(), Error> {
        let target = self.relationship.target();
        if record.table_name() == target {
            Ok(())
        } else {
            Err(Error::Custom(format!(
                "relationship '{}' expects a '{}' record, got '{}'",
                self.name,
                target,
                record.table_name()
            )))
        }
    }

    /// Link `related` to the owner.
    ///
    /// One-to-many: the foreign-key column is set to the owner's key, then
    /// the record is inserted, or updated when it already has a key.
    /// Many-to-many: `related` is saved first if new, then a join row is
    /// inserted unless the same link exists. Returns the related record as
    /// stored.
    #[tracing::instrument(level = "debug", skip(self, cx, related), fields(relationship = %self.name))]
    pub async fn add(&self, cx: &Cx, related: Record) -> Outcome<Record, Error> {
        try_result!(self.check_target(&related));
        match &self.relationship {
            Relationship::OneToMany(one) => {
                let session = self.session;
                let target = try_result!(session.schema(&one.target));
                let existing = try_result!(mapper::primary_key_value(
                    session.registry(),
                    &target,
                    &related
                ));
                if existing.is_some() {
                    let changes = vec![(one.fk_column.as_str(), self.owner_key.clone().into())];
                    let updated = try_outcome!(session.update(cx, &related, changes).await);
                    return Outcome::Ok(updated.unwrap_or(related));
                }
                let mut related = related;
                related.set(one.fk_column.as_str(), self.owner_key.clone());
                session.save(cx, related).await
            }
            Relationship::ManyToMany(many) => {
                let session = self.session;
                let columns = try_result!(session.registry().join_columns(&self.owner, &self.name, many));
                let target = try_result!(session.schema(&many.target));

                let other = match try_result!(mapper::primary_key_value(session.registry(), &target, &related)) {
                    Some(_) => related,
                    None => try_outcome!(session.save(cx, related).await),
                };
                let Some(other_key) = try_result!(mapper::primary_key_value(session.registry(), &target, &other)) else {
                    return Outcome::Err(Error::Custom(format!(
                        "'{}' record has no key after save",
                        target.table_name()
                    )));
                };

                let link = Select::new()
                    .filter(Condition::eq(columns.local, self.owner_key.clone()))
                    .filter(Condition::eq(columns.remote, other_key.clone()))
                    .limit(1);
                let sql = try_result!(columns.join.select_sql(session.dialect(), &link));
                if try_outcome!(session.fetch_one(cx, &sql).await).is_some() {
                    tracing::debug!(join = columns.join.table_name(), "Link already present");
                    return Outcome::Ok(other);
                }

                let join_record = Record::new(columns.join.table_name())
                    .with(columns.local, self.owner_key.clone())
                    .with(columns.remote, other_key);
                try_outcome!(session.save(cx, join_record).await);
                Outcome::Ok(other)
            }
            Relationship::ForeignKey(_) | Relationship::OneToOne(_) => {
                Outcome::Err(self.not_a_collection())
            }
        }
    }

    /// Every record linked to the owner.
    ///
    /// One-to-many rows come back in the order the database returns them.
    /// Many-to-many targets are deduplicated and kept in first-seen order.
    #[tracing::instrument(level = "debug", skip(self, cx), fields(relationship = %self.name))]
    pub async fn get_all(&self, cx: &Cx) -> Outcome<Vec<Record>, Error> {
        let session = self.session;
        match &self.relationship {
            Relationship::OneToMany(one) => {
                let select = Select::new().filter(Condition::eq(one.fk_column.as_str(), self.owner_key.clone()));
                session.find_all(cx, &one.target, &select).await
            }
            Relationship::ManyToMany(many) => {
                let columns = try_result!(session.registry().join_columns(&self.owner, &self.name, many));
                let select = Select::new()
                    .include([columns.remote])
                    .filter(Condition::eq(columns.local, self.owner_key.clone()));
                let sql = try_result!(columns.join.select_sql(session.dialect(), &select));
                let rows = try_outcome!(session.fetch_all(cx, &sql).await);

                let mut keys: Vec<Value> = Vec::with_capacity(rows.len());
                for row in &rows {
                    match row.get(columns.remote) {
                        Some(key) if !key.is_null() && !keys.contains(key) => keys.push(key.clone()),
                        _ => {}
                    }
                }

                let target = try_result!(session.schema(&many.target));
                let explicit_key = match columns.join.relationship(columns.remote) {
                    Some(Relationship::ForeignKey(fk)) => fk.target_key.clone(),
                    _ => None,
                };
                let key_column = match explicit_key {
                    Some(key) => key,
                    None => try_result!(target.primary_key()).name().to_string(),
                };

                let mut records = Vec::with_capacity(keys.len());
                for key in keys {
                    let select = target.select_by(&key_column, key);
                    if let Some(record) = try_outcome!(session.find_one(cx, target.table_name(), &select).await) {
                        records.push(record);
                    }
                }
                Outcome::Ok(records)
            }
            Relationship::ForeignKey(_) | Relationship::OneToOne(_) => {
                Outcome::Err(self.not_a_collection())
            }
        }
    }
}

impl<C: Connection> std::fmt::Debug for BoundRelation<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundRelation")
            .field("owner", &self.owner.table_name())
            .field("owner_key", &self.owner_key)
            .field("name", &self.name)
            .field("relationship", &self.relationship)
            .finish()
    }
}
