//! Schema declarations and DDL planning for DuckORM.
//!
//! `duckorm-schema` is where tables are described and compiled:
//!
//! - [`Schema`] / [`SchemaBuilder`]: columns and relationship fields of one table.
//! - [`Relationship`]: foreign key, one-to-one, one-to-many and many-to-many.
//! - [`SchemaRegistry`]: explicit registration, target resolution and the
//!   two-pass `create_all` plan.
//!
//! # Example
//!
//! ```
//! use duckorm_core::{Column, Dialect};
//! use duckorm_schema::{ForeignKey, OneToMany, Schema, SchemaRegistry};
//!
//! let mut registry = SchemaRegistry::new();
//! registry.register(
//!     Schema::builder("Person")
//!         .table("persons")
//!         .column(Column::integer("id").primary_key(true).auto_increment(true))
//!         .column(Column::string("first_name"))
//!         .relationship("city", ForeignKey::new("cities"))
//!         .build()?,
//! )?;
//! registry.register(
//!     Schema::builder("City")
//!         .table("cities")
//!         .column(Column::integer("id").primary_key(true).auto_increment(true))
//!         .relationship("persons", OneToMany::new("persons", "city"))
//!         .build()?,
//! )?;
//!
//! let stmts = registry.create_all_sql(Dialect::Postgres)?;
//! assert_eq!(stmts.len(), 3);
//! # Ok::<(), duckorm_core::Error>(())
//! ```

pub mod registry;
pub mod relationship;
pub mod schema;

pub use registry::{JoinColumns, SchemaRegistry};
pub use relationship::{ForeignKey, ManyToMany, OneToMany, OneToOne, Relationship, RelationshipKind};
pub use schema::{Association, Field, PrimaryKey, Schema, SchemaBuilder};
