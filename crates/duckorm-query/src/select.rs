//! Options for fetching records.

use crate::condition::{Condition, render_conditions};
use duckorm_core::Result;

/// What to fetch: projection, filter and row limit.
///
/// # Example
///
/// ```
/// use duckorm_query::{Condition, Select};
///
/// let select = Select::new()
///     .filter(Condition::eq("first_name", "Rich"))
///     .exclude(["salary"])
///     .limit(1);
/// assert_eq!(select.where_sql().unwrap(), "first_name = 'Rich'");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Select {
    /// Fields to fetch; empty means every physical field
    pub fields_includes: Vec<String>,
    /// Fields removed from the projection
    pub fields_excludes: Vec<String>,
    pub conditions: Vec<Condition>,
    pub limit: Option<u64>,
}

impl Select {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a condition; conditions are combined with AND.
    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Restrict the projection to these fields.
    pub fn include<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields_includes.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Remove these fields from the projection.
    pub fn exclude<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields_excludes.extend(fields.into_iter().map(Into::into));
        self
    }

    pub const fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The rendered WHERE clause body.
    pub fn where_sql(&self) -> Result<String> {
        render_conditions(&self.conditions)
    }

    /// Resolve the projection against `available` fields, keeping their order.
    ///
    /// Unknown names in the include list are returned as `Err(name)`.
    pub fn projection<'a>(&self, available: &[&'a str]) -> std::result::Result<Vec<&'a str>, String> {
        if let Some(unknown) = self
            .fields_includes
            .iter()
            .chain(&self.fields_excludes)
            .find(|f| !available.contains(&f.as_str()))
        {
            return Err(unknown.clone());
        }

        Ok(available
            .iter()
            .copied()
            .filter(|f| {
                self.fields_includes.is_empty() || self.fields_includes.iter().any(|i| i == f)
            })
            .filter(|f| !self.fields_excludes.iter().any(|e| e == f))
            .collect())
    }
}
