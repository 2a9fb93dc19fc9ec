//! Relationship declarations.
//!
//! A relationship is a schema field that points at another table. Targets are
//! named by table name and resolved through the
//! [`SchemaRegistry`](crate::SchemaRegistry) when SQL is compiled, so
//! mutually-referencing schemas can be declared in any order.
//!
//! `ForeignKey` and `OneToOne` occupy one physical column on the owning
//! table. `OneToMany` and `ManyToMany` are virtual: they add nothing to the
//! owner and are only traversed through a bound relation.

use duckorm_core::{Error, ReferentialAction, Result};

/// The kind of a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationshipKind {
    /// Many owners reference one target row.
    ForeignKey,
    /// The owner's primary key is also a reference to the target.
    OneToOne,
    /// One owner is referenced by many target rows.
    OneToMany,
    /// Owners and targets are linked through a join table.
    ManyToMany,
}

/// A column holding the key of a row in `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub target: String,
    /// Referenced column; the target's primary key when `None`.
    pub target_key: Option<String>,
    pub unique: bool,
    pub not_null: bool,
    pub on_delete: Option<ReferentialAction>,
    pub on_update: Option<ReferentialAction>,
    pub constraint_name: Option<String>,
}

impl ForeignKey {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            target_key: None,
            unique: false,
            not_null: false,
            on_delete: None,
            on_update: None,
            constraint_name: None,
        }
    }

    /// Reference a column other than the target's primary key.
    pub fn references(mut self, key: impl Into<String>) -> Self {
        self.target_key = Some(key.into());
        self
    }

    pub const fn unique(mut self, value: bool) -> Self {
        self.unique = value;
        self
    }

    pub const fn not_null(mut self, value: bool) -> Self {
        self.not_null = value;
        self
    }

    pub const fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = Some(action);
        self
    }

    pub const fn on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = Some(action);
        self
    }

    pub fn constraint_name(mut self, name: impl Into<String>) -> Self {
        self.constraint_name = Some(name.into());
        self
    }
}

/// The owner's primary key doubles as a reference to `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneToOne {
    pub target: String,
    pub on_delete: Option<ReferentialAction>,
    pub on_update: Option<ReferentialAction>,
    pub constraint_name: Option<String>,
}

impl OneToOne {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            on_delete: None,
            on_update: None,
            constraint_name: None,
        }
    }

    pub const fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = Some(action);
        self
    }

    pub const fn on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = Some(action);
        self
    }

    pub fn constraint_name(mut self, name: impl Into<String>) -> Self {
        self.constraint_name = Some(name.into());
        self
    }
}

/// Rows of `target` whose `fk_column` holds the owner's primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneToMany {
    pub target: String,
    /// Referencing column on the target table.
    pub fk_column: String,
    pub on_delete: Option<ReferentialAction>,
    pub on_update: Option<ReferentialAction>,
    pub constraint_name: Option<String>,
}

impl OneToMany {
    pub fn new(target: impl Into<String>, fk_column: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            fk_column: fk_column.into(),
            on_delete: None,
            on_update: None,
            constraint_name: None,
        }
    }

    pub const fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = Some(action);
        self
    }

    pub const fn on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = Some(action);
        self
    }

    pub fn constraint_name(mut self, name: impl Into<String>) -> Self {
        self.constraint_name = Some(name.into());
        self
    }
}

/// Rows of `target` linked to the owner through the `through` join table.
///
/// The join table is an ordinary schema carrying one `ForeignKey` to the
/// owner and one to the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManyToMany {
    pub target: String,
    pub through: String,
}

impl ManyToMany {
    pub fn new(target: impl Into<String>, through: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            through: through.into(),
        }
    }
}

/// A relationship field declared on a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relationship {
    ForeignKey(ForeignKey),
    OneToOne(OneToOne),
    OneToMany(OneToMany),
    ManyToMany(ManyToMany),
}

impl Relationship {
    pub fn kind(&self) -> RelationshipKind {
        match self {
            Relationship::ForeignKey(_) => RelationshipKind::ForeignKey,
            Relationship::OneToOne(_) => RelationshipKind::OneToOne,
            Relationship::OneToMany(_) => RelationshipKind::OneToMany,
            Relationship::ManyToMany(_) => RelationshipKind::ManyToMany,
        }
    }

    /// The declared target table (possibly empty).
    pub fn target(&self) -> &str {
        match self {
            Relationship::ForeignKey(fk) => &fk.target,
            Relationship::OneToOne(o) => &o.target,
            Relationship::OneToMany(o) => &o.target,
            Relationship::ManyToMany(m) => &m.target,
        }
    }

    /// The target table, or `RelationshipTargetMissing` if none was declared.
    pub fn require_target(&self, field: &str) -> Result<&str> {
        let target = self.target();
        if target.is_empty() {
            return Err(Error::RelationshipTargetMissing {
                relationship: field.to_string(),
                target: None,
            });
        }
        Ok(target)
    }

    /// Whether the relationship occupies a column on the owning table.
    pub fn is_physical(&self) -> bool {
        matches!(self, Relationship::ForeignKey(_) | Relationship::OneToOne(_))
    }
}

impl From<ForeignKey> for Relationship {
    fn from(fk: ForeignKey) -> Self {
        Relationship::ForeignKey(fk)
    }
}

impl From<OneToOne> for Relationship {
    fn from(rel: OneToOne) -> Self {
        Relationship::OneToOne(rel)
    }
}

impl From<OneToMany> for Relationship {
    fn from(rel: OneToMany) -> Self {
        Relationship::OneToMany(rel)
    }
}

impl From<ManyToMany> for Relationship {
    fn from(rel: ManyToMany) -> Self {
        Relationship::ManyToMany(rel)
    }
}
