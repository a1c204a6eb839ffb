//! Identifier and column fragment validation for structured schema tools.

use crate::error::{DbError, DbResult};
use crate::models::DatabaseType;

/// MySQL's limit for table and column names.
pub const MAX_IDENTIFIER_LEN: usize = 64;

/// Sequences that would end a statement or start a comment.
const FORBIDDEN_SEQUENCES: &[&str] = &[";", "--", "/*", "*/", "#"];

/// Check that `name` is a safe table or column identifier.
///
/// Accepted: 1-64 ASCII letters, digits or underscores, not purely numeric.
pub fn validate_identifier(name: &str) -> DbResult<()> {
    if name.is_empty() {
        return Err(DbError::invalid_identifier(name, "must not be empty"));
    }
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(DbError::invalid_identifier(
            name,
            format!("must be at most {} characters", MAX_IDENTIFIER_LEN),
        ));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DbError::invalid_identifier(
            name,
            "may only contain letters, digits and underscores",
        ));
    }
    if name.chars().all(|c| c.is_ascii_digit()) {
        return Err(DbError::invalid_identifier(name, "must not be purely numeric"));
    }
    Ok(())
}

/// Quote a validated identifier for the target dialect.
pub fn quote_identifier(name: &str, db_type: DatabaseType) -> String {
    match db_type {
        DatabaseType::MySQL => format!("`{}`", name),
        DatabaseType::SQLite => format!("\"{}\"", name),
    }
}

/// Check a free-form column fragment (type, default or extra).
///
/// Fragments are inserted verbatim, so they must not terminate the statement,
/// open a comment, or leave quotes and parentheses unbalanced.
pub fn validate_fragment(field: &str, value: &str) -> DbResult<()> {
    if let Some(seq) = FORBIDDEN_SEQUENCES.iter().find(|s| value.contains(*s)) {
        return Err(DbError::invalid_input(format!(
            "column {} must not contain '{}'",
            field, seq
        )));
    }

    for quote in ['\'', '"', '`'] {
        if value.chars().filter(|&c| c == quote).count() % 2 != 0 {
            return Err(DbError::invalid_input(format!(
                "column {} has an unbalanced {} quote",
                field, quote
            )));
        }
    }

    let mut depth: i32 = 0;
    for c in value.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            break;
        }
    }
    if depth != 0 {
        return Err(DbError::invalid_input(format!(
            "column {} has unbalanced parentheses",
            field
        )));
    }

    Ok(())
}
