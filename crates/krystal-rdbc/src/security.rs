//! SQL injection guards for text that reaches rendered statements.
//!
//! Statements are rendered with inline literals, so every string value goes
//! through [`escape_string_literal`]. Column names arriving from request
//! parameters (the filter mini-language) go through
//! [`validate_column_reference`] before they are used.

use crate::error::Error;

/// Validate a single SQL identifier (table, column, alias).
///
/// Enforces strict character rules:
/// - Must not be empty
/// - Maximum 255 characters
/// - Must start with ASCII letter or underscore
/// - May only contain ASCII alphanumeric characters and underscores
///
/// # Examples
///
/// ```
/// use krystal_rdbc::security::validate_sql_identifier;
///
/// assert!(validate_sql_identifier("linia").is_ok());
/// assert!(validate_sql_identifier("_private").is_ok());
///
/// assert!(validate_sql_identifier("x; DROP TABLE users--").is_err());
/// assert!(validate_sql_identifier("").is_err());
/// assert!(validate_sql_identifier("123abc").is_err());
/// ```
pub fn validate_sql_identifier(name: &str) -> crate::Result<()> {
    if name.is_empty() {
        return Err(Error::config("SQL identifier cannot be empty"));
    }

    if name.len() > 255 {
        return Err(Error::config(format!(
            "SQL identifier too long: {} chars (max 255)",
            name.len()
        )));
    }

    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => {
            return Err(Error::config(format!(
                "Invalid SQL identifier '{}': must start with a letter or underscore",
                name
            )));
        }
    }

    if let Some(c) = chars.find(|c| !c.is_ascii_alphanumeric() && *c != '_') {
        return Err(Error::config(format!(
            "Invalid SQL identifier '{}': contains invalid character '{}'",
            name, c
        )));
    }

    Ok(())
}

/// Validate a possibly qualified column reference such as `m.linia`.
///
/// Each dot-separated segment must be a valid identifier.
///
/// ```
/// use krystal_rdbc::security::validate_column_reference;
///
/// assert!(validate_column_reference("dbo.MASZYNY").is_ok());
/// assert!(validate_column_reference("m.").is_err());
/// ```
pub fn validate_column_reference(name: &str) -> crate::Result<()> {
    name.split('.').try_for_each(validate_sql_identifier)
}

/// Escape a string value for interpolation into a single-quoted SQL literal.
///
/// Replaces `'` with `''` (standard SQL escaping).
///
/// # Examples
///
/// ```
/// use krystal_rdbc::security::escape_string_literal;
///
/// assert_eq!(escape_string_literal("maszyna"), "maszyna");
/// assert_eq!(escape_string_literal("don't"), "don''t");
/// assert_eq!(escape_string_literal("x'; DROP TABLE users--"), "x''; DROP TABLE users--");
/// ```
pub fn escape_string_literal(value: &str) -> String {
    // Fast path: no escaping needed (common case)
    if !value.contains('\'') {
        return value.to_string();
    }
    value.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_length_limit() {
        let long = "a".repeat(256);
        assert!(validate_sql_identifier(&long).is_err());
        assert!(validate_sql_identifier(&long[..255]).is_ok());
    }

    #[test]
    fn test_column_reference_segments() {
        assert!(validate_column_reference("linia").is_ok());
        assert!(validate_column_reference("m.linia").is_ok());
        assert!(validate_column_reference("m..linia").is_err());
        assert!(validate_column_reference("m.linia--").is_err());
    }

    #[test]
    fn test_escape_is_idempotent_on_clean_input() {
        assert_eq!(escape_string_literal(""), "");
        assert_eq!(escape_string_literal("''"), "''''");
    }
}
