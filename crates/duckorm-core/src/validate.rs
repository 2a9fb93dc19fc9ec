//! Identifier validation.
//!
//! Table, column and relationship names are spliced into SQL unquoted, so
//! they are restricted to plain SQL identifiers when a schema is built.

use std::sync::OnceLock;

use regex::Regex;

const IDENTIFIER_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

/// Compiled identifier pattern, built on first use.
fn identifier_regex() -> Option<&'static Regex> {
    static REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    REGEX
        .get_or_init(|| match Regex::new(IDENTIFIER_PATTERN) {
            Ok(regex) => Some(regex),
            Err(e) => {
                tracing::warn!(
                    pattern = IDENTIFIER_PATTERN,
                    error = %e,
                    "Invalid identifier pattern"
                );
                None
            }
        })
        .as_ref()
}

/// Check whether `name` is a bare SQL identifier.
///
/// ```
/// use duckorm_core::validate::is_identifier;
///
/// assert!(is_identifier("first_name"));
/// assert!(!is_identifier("first name"));
/// ```
pub fn is_identifier(name: &str) -> bool {
    identifier_regex().is_some_and(|regex| regex.is_match(name))
}
