//! Deterministic DDL construction for `create_table` and `add_column`.
//!
//! Builders validate every identifier and fragment first and only then render
//! SQL, so a returned statement never contains unchecked input.

use crate::error::{DbError, DbResult};
use crate::models::{ColumnSpec, DatabaseType};
use crate::tools::identifier::{quote_identifier, validate_fragment, validate_identifier};
use std::collections::HashSet;

/// Validate a column spec without rendering it.
pub fn validate_column(column: &ColumnSpec) -> DbResult<()> {
    validate_identifier(&column.name)?;

    if column.data_type.trim().is_empty() {
        return Err(DbError::invalid_input(format!(
            "column '{}' must have a type",
            column.name
        )));
    }
    validate_fragment("type", &column.data_type)?;
    if let Some(default) = &column.default {
        validate_fragment("default", default)?;
    }
    if let Some(extra) = &column.extra {
        validate_fragment("extra", extra)?;
    }
    Ok(())
}

/// Render one column definition: `name type [NOT NULL] [DEFAULT x] [extra]`.
pub fn column_definition(column: &ColumnSpec, db_type: DatabaseType) -> DbResult<String> {
    validate_column(column)?;

    let mut def = format!(
        "{} {}",
        quote_identifier(&column.name, db_type),
        column.data_type.trim()
    );
    if !column.nullable {
        def.push_str(" NOT NULL");
    }
    if let Some(default) = column.default.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        def.push_str(" DEFAULT ");
        def.push_str(default);
    }
    if let Some(extra) = column.extra.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
        def.push(' ');
        def.push_str(extra);
    }
    Ok(def)
}

/// Build `CREATE TABLE <table> (<columns>)`.
pub fn build_create_table(
    table_name: &str,
    columns: &[ColumnSpec],
    db_type: DatabaseType,
) -> DbResult<String> {
    validate_identifier(table_name)?;

    if columns.is_empty() {
        return Err(DbError::invalid_input(
            "create_table requires at least one column",
        ));
    }

    let mut seen = HashSet::new();
    let mut definitions = Vec::with_capacity(columns.len());
    for column in columns {
        definitions.push(column_definition(column, db_type)?);
        if !seen.insert(column.name.to_lowercase()) {
            return Err(DbError::invalid_input(format!(
                "duplicate column name '{}'",
                column.name
            )));
        }
    }

    Ok(format!(
        "CREATE TABLE {} ({})",
        quote_identifier(table_name, db_type),
        definitions.join(", ")
    ))
}

/// Build `ALTER TABLE <table> ADD COLUMN <column>`.
pub fn build_add_column(
    table_name: &str,
    column: &ColumnSpec,
    db_type: DatabaseType,
) -> DbResult<String> {
    validate_identifier(table_name)?;
    let definition = column_definition(column, db_type)?;

    Ok(format!(
        "ALTER TABLE {} ADD COLUMN {}",
        quote_identifier(table_name, db_type),
        definition
    ))
}
