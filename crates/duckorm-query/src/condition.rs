//! WHERE-clause conditions.
//!
//! Conditions inline their literals into the SQL text (strings are quoted and
//! escaped, integers are written bare). Insert and update statements use named
//! placeholders instead; the two paths are intentionally separate.

use duckorm_core::{Error, Result, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Comparison operators available in a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "LIKE")]
    Like,
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "NOT IN")]
    NotIn,
}

impl Operator {
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Le => "<=",
            Operator::Ge => ">=",
            Operator::Like => "LIKE",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
        }
    }

    /// Parse an operator string. Anything outside the supported set is
    /// rejected with [`Error::InvalidOperator`].
    pub fn parse(op: &str) -> Result<Self> {
        match op.trim().to_ascii_uppercase().as_str() {
            "=" => Ok(Operator::Eq),
            "<=" => Ok(Operator::Le),
            ">=" => Ok(Operator::Ge),
            "LIKE" => Ok(Operator::Like),
            "IN" => Ok(Operator::In),
            "NOT IN" => Ok(Operator::NotIn),
            _ => Err(Error::InvalidOperator(format!("unknown operator '{op}'"))),
        }
    }

    /// Whether the operator takes a list operand.
    #[must_use]
    pub const fn is_membership(&self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Operator::parse(s)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// A single `field op value` predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    pub value: Value,
    /// Compare through `LOWER(...)` on both sides
    #[serde(default)]
    pub case_insensitive: bool,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
            case_insensitive: false,
        }
    }

    /// Build a condition from an operator string.
    pub fn parse(field: impl Into<String>, operator: &str, value: impl Into<Value>) -> Result<Self> {
        Ok(Self::new(field, Operator::parse(operator)?, value))
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Eq, value)
    }

    pub fn le(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Le, value)
    }

    pub fn ge(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Ge, value)
    }

    pub fn like(field: impl Into<String>, pattern: impl Into<Value>) -> Self {
        Self::new(field, Operator::Like, pattern)
    }

    pub fn is_in(field: impl Into<String>, values: impl Into<Value>) -> Self {
        Self::new(field, Operator::In, values)
    }

    pub fn not_in(field: impl Into<String>, values: impl Into<Value>) -> Self {
        Self::new(field, Operator::NotIn, values)
    }

    /// Compare case-insensitively.
    pub const fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }

    /// Render the predicate as SQL.
    pub fn render(&self) -> Result<String> {
        let literal = match (&self.value, self.operator.is_membership()) {
            (Value::List(items), true) => {
                let rendered = items
                    .iter()
                    .map(|item| self.list_item(item))
                    .collect::<Result<Vec<_>>>()?;
                format!("({})", rendered.join(", "))
            }
            (Value::List(_), false) => {
                return Err(Error::InvalidOperator(format!(
                    "a list value requires IN or NOT IN, got '{}' on field '{}'",
                    self.operator, self.field
                )));
            }
            (_, true) => {
                return Err(Error::InvalidOperator(format!(
                    "'{}' requires a list value on field '{}'",
                    self.operator, self.field
                )));
            }
            (scalar, false) => self.wrap(scalar_literal(scalar, &self.field)?),
        };

        let field = if self.case_insensitive {
            format!("LOWER({})", self.field)
        } else {
            self.field.clone()
        };

        Ok(format!("{} {} {}", field, self.operator.as_sql(), literal))
    }

    fn list_item(&self, item: &Value) -> Result<String> {
        let quoted = match item {
            Value::Text(s) => Value::quote(s),
            Value::Int(v) => Value::quote(&v.to_string()),
            other => {
                return Err(Error::UnsupportedValueType(format!(
                    "list item of type {} on field '{}'",
                    other.type_name(),
                    self.field
                )));
            }
        };
        Ok(self.wrap(quoted))
    }

    fn wrap(&self, literal: String) -> String {
        if self.case_insensitive {
            format!("LOWER({literal})")
        } else {
            literal
        }
    }
}

fn scalar_literal(value: &Value, field: &str) -> Result<String> {
    match value {
        Value::Text(s) => Ok(Value::quote(s)),
        Value::Int(v) => Ok(v.to_string()),
        other => Err(Error::UnsupportedValueType(format!(
            "{} value on field '{field}'",
            other.type_name()
        ))),
    }
}

/// Join conditions with `AND`. An empty set matches every row.
pub fn render_conditions(conditions: &[Condition]) -> Result<String> {
    if conditions.is_empty() {
        return Ok("1 = 1".to_string());
    }
    let parts = conditions
        .iter()
        .map(Condition::render)
        .collect::<Result<Vec<_>>>()?;
    Ok(parts.join(" AND "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_parse() {
        assert_eq!(Operator::parse("=").unwrap(), Operator::Eq);
        assert_eq!(Operator::parse("like").unwrap(), Operator::Like);
        assert_eq!(Operator::parse("not in").unwrap(), Operator::NotIn);
        assert_eq!(">=".parse::<Operator>().unwrap(), Operator::Ge);
    }

    #[test]
    fn test_operator_parse_rejects_unknown() {
        for op in ["!=", "<>", "<", "BETWEEN", ""] {
            assert!(
                matches!(Operator::parse(op), Err(Error::InvalidOperator(_))),
                "{op} should be rejected"
            );
        }
    }

    #[test]
    fn test_render_string_is_quoted() {
        let c = Condition::eq("first_name", "Rich");
        assert_eq!(c.render().unwrap(), "first_name = 'Rich'");
    }

    #[test]
    fn test_render_int_is_bare() {
        assert_eq!(Condition::ge("age", 18).render().unwrap(), "age >= 18");
        assert_eq!(Condition::le("age", 65).render().unwrap(), "age <= 65");
    }

    #[test]
    fn test_render_escapes_quotes() {
        let c = Condition::eq("last_name", "O'Brien");
        assert_eq!(c.render().unwrap(), "last_name = 'O''Brien'");
    }

    #[test]
    fn test_render_like() {
        let c = Condition::like("first_name", "Ri%");
        assert_eq!(c.render().unwrap(), "first_name LIKE 'Ri%'");
    }

    #[test]
    fn test_render_in_list() {
        let c = Condition::is_in("first_name", vec!["Rich", "Elton"]);
        assert_eq!(c.render().unwrap(), "first_name IN ('Rich', 'Elton')");

        let c = Condition::not_in("id", vec![1, 2]);
        assert_eq!(c.render().unwrap(), "id NOT IN ('1', '2')");
    }

    #[test]
    fn test_list_with_scalar_operator_fails() {
        for op in [Operator::Eq, Operator::Le, Operator::Ge, Operator::Like] {
            let c = Condition::new("first_name", op, vec!["a", "b"]);
            assert!(matches!(c.render(), Err(Error::InvalidOperator(_))));
        }
    }

    #[test]
    fn test_in_with_scalar_fails() {
        let c = Condition::is_in("first_name", "Rich");
        assert!(matches!(c.render(), Err(Error::InvalidOperator(_))));
    }

    #[test]
    fn test_unsupported_value_types() {
        assert!(matches!(
            Condition::eq("active", true).render(),
            Err(Error::UnsupportedValueType(_))
        ));
        assert!(matches!(
            Condition::eq("score", 1.5).render(),
            Err(Error::UnsupportedValueType(_))
        ));
        assert!(matches!(
            Condition::eq("nickname", Value::Null).render(),
            Err(Error::UnsupportedValueType(_))
        ));
        assert!(matches!(
            Condition::is_in("x", vec![Value::Null]).render(),
            Err(Error::UnsupportedValueType(_))
        ));
    }

    #[test]
    fn test_case_insensitive() {
        let c = Condition::eq("first_name", "rich").case_insensitive();
        assert_eq!(c.render().unwrap(), "LOWER(first_name) = LOWER('rich')");

        let c = Condition::is_in("first_name", vec!["A", "b"]).case_insensitive();
        assert_eq!(
            c.render().unwrap(),
            "LOWER(first_name) IN (LOWER('A'), LOWER('b'))"
        );
    }

    #[test]
    fn test_scalar_operators_never_fail() {
        let values = [Value::from("x"), Value::from(0), Value::from(-42), Value::from("")];
        for op in [Operator::Eq, Operator::Le, Operator::Ge, Operator::Like] {
            for value in &values {
                let c = Condition::new("f", op, value.clone());
                let sql = c.render().unwrap();
                assert!(sql.starts_with(&format!("f {} ", op.as_sql())), "{sql}");
            }
        }
    }

    #[test]
    fn test_render_conditions() {
        assert_eq!(render_conditions(&[]).unwrap(), "1 = 1");
        let sql = render_conditions(&[
            Condition::eq("first_name", "Rich"),
            Condition::ge("age", 18),
        ])
        .unwrap();
        assert_eq!(sql, "first_name = 'Rich' AND age >= 18");
    }

    #[test]
    fn test_condition_from_json() {
        let c: Condition =
            serde_json::from_str(r#"{"field": "age", "operator": ">=", "value": 21}"#).unwrap();
        assert_eq!(c, Condition::ge("age", 21));
    }
}
