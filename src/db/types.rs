//! Database-agnostic type mappings.
//!
//! This module converts driver rows into JSON values.
//!
//! # Architecture
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Database-specific decoders handle the actual value extraction
//!
//! A decoder that cannot read a value in its category falls back to a
//! generic text/binary decode instead of silently producing `null`.

use crate::models::{DatabaseType, Row};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row as _, Type, TypeInfo, ValueRef};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    /// DATE, TIME, DATETIME, TIMESTAMP
    Temporal,
    Null,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC is an affinity, not an exact type
        if db == DatabaseType::SQLite && lower == "numeric" {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    if matches!(
        lower.as_str(),
        "date" | "time" | "datetime" | "timestamp"
    ) {
        return TypeCategory::Temporal;
    }

    // Boolean before integer: MySQL reports TINYINT(1) as BOOLEAN
    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("int") || lower.contains("serial") || lower == "year" {
        return TypeCategory::Integer;
    }

    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    if lower == "json" {
        return TypeCategory::Json;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bit" {
        return TypeCategory::Binary;
    }

    if lower.contains("char") || lower.contains("text") || lower == "enum" || lower == "set" {
        return TypeCategory::Text;
    }

    if lower == "null" {
        return TypeCategory::Null;
    }

    TypeCategory::Unknown
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper type for raw DECIMAL/NUMERIC values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

// =============================================================================
// Scalar Encoding
// =============================================================================

/// Decode binary data to JSON: UTF-8 text when valid, base64 otherwise.
pub fn decode_binary_value(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    match std::str::from_utf8(bytes) {
        Ok(s) => JsonValue::String(s.to_string()),
        Err(_) => JsonValue::String(STANDARD.encode(bytes)),
    }
}

/// Finite floats become numbers; NaN and infinities become strings.
pub fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

fn datetime_value(v: NaiveDateTime) -> JsonValue {
    JsonValue::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
}

fn timestamp_value(v: DateTime<Utc>) -> JsonValue {
    JsonValue::String(v.to_rfc3339())
}

fn date_value(v: NaiveDate) -> JsonValue {
    JsonValue::String(v.format("%Y-%m-%d").to_string())
}

fn time_value(v: NaiveTime) -> JsonValue {
    JsonValue::String(v.format("%H:%M:%S%.f").to_string())
}

// =============================================================================
// Row to JSON Trait
// =============================================================================

/// Trait for converting database rows to ordered JSON maps.
pub trait RowToJson {
    /// Column values in result order.
    fn to_json_values(&self) -> Vec<JsonValue>;
    fn column_names(&self) -> Vec<String>;

    /// Pair values with `keys` by position.
    ///
    /// `keys` should come from [`unique_column_names`]; a repeated key would
    /// overwrite the earlier value.
    fn to_json_row(&self, keys: &[String]) -> Row {
        keys.iter().cloned().zip(self.to_json_values()).collect()
    }
}

/// Make result column names unique so none collide as row keys.
///
/// The first occurrence keeps its name; later ones get `_2`, `_3`, ... until
/// the name is unused (`id`, `id` becomes `id`, `id_2`).
pub fn unique_column_names(names: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::with_capacity(names.len());
    let mut unique = Vec::with_capacity(names.len());

    for name in names {
        let mut candidate = name.clone();
        let mut suffix = 2;
        while seen.contains(&candidate) {
            candidate = format!("{}_{}", name, suffix);
            suffix += 1;
        }
        seen.insert(candidate.clone());
        unique.push(candidate);
    }
    unique
}

impl RowToJson for MySqlRow {
    fn to_json_values(&self) -> Vec<JsonValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let category = categorize_type(col.type_info().name(), DatabaseType::MySQL);
                mysql::decode_column(self, idx, category)
            })
            .collect()
    }

    fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name().to_string()).collect()
    }
}

impl RowToJson for SqliteRow {
    fn to_json_values(&self) -> Vec<JsonValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let category = categorize_type(col.type_info().name(), DatabaseType::SQLite);
                sqlite::decode_column(self, idx, category)
            })
            .collect()
    }

    fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name().to_string()).collect()
    }
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================
//
// Each decoder returns `None` when the value could not be read in its
// category, and `Some(JsonValue::Null)` for SQL NULL.

mod mysql {
    use super::*;

    pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> JsonValue {
        if row.try_get_raw(idx).is_ok_and(|v| v.is_null()) {
            return JsonValue::Null;
        }

        let decoded = match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary_col(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::Temporal => decode_temporal(row, idx),
            TypeCategory::Text | TypeCategory::Null | TypeCategory::Unknown => None,
        };

        decoded.or_else(|| decode_fallback(row, idx)).unwrap_or_else(|| {
            tracing::debug!(column = idx, ?category, "Failed to decode MySQL value");
            JsonValue::Null
        })
    }

    fn decode_decimal(row: &MySqlRow, idx: usize) -> Option<JsonValue> {
        match row.try_get::<Option<RawDecimal>, _>(idx) {
            Ok(v) => Some(v.map_or(JsonValue::Null, |d| JsonValue::String(d.0))),
            Err(e) => {
                tracing::error!("Failed to decode DECIMAL: {:?}", e);
                None
            }
        }
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> Option<JsonValue> {
        // Try signed types
        if let Ok(Some(v)) = row.try_get::<Option<i8>, _>(idx) {
            return Some(JsonValue::Number(v.into()));
        }
        if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
            return Some(JsonValue::Number(v.into()));
        }
        if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
            return Some(JsonValue::Number(v.into()));
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return Some(JsonValue::Number(v.into()));
        }
        // Try unsigned types
        if let Ok(Some(v)) = row.try_get::<Option<u8>, _>(idx) {
            return Some(JsonValue::Number(v.into()));
        }
        if let Ok(Some(v)) = row.try_get::<Option<u16>, _>(idx) {
            return Some(JsonValue::Number(v.into()));
        }
        if let Ok(Some(v)) = row.try_get::<Option<u32>, _>(idx) {
            return Some(JsonValue::Number(v.into()));
        }
        if let Ok(Some(v)) = row.try_get::<Option<u64>, _>(idx) {
            return Some(JsonValue::Number(v.into()));
        }
        None
    }

    fn decode_boolean(row: &MySqlRow, idx: usize) -> Option<JsonValue> {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(JsonValue::Bool)
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> Option<JsonValue> {
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return Some(float_value(v));
        }
        if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
            return Some(float_value(v as f64));
        }
        None
    }

    fn decode_binary_col(row: &MySqlRow, idx: usize) -> Option<JsonValue> {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(|v| decode_binary_value(&v))
    }

    fn decode_json(row: &MySqlRow, idx: usize) -> Option<JsonValue> {
        row.try_get::<Option<JsonValue>, _>(idx).ok().flatten()
    }

    fn decode_temporal(row: &MySqlRow, idx: usize) -> Option<JsonValue> {
        if let Ok(Some(v)) = row.try_get::<Option<NaiveDateTime>, _>(idx) {
            return Some(datetime_value(v));
        }
        if let Ok(Some(v)) = row.try_get::<Option<DateTime<Utc>>, _>(idx) {
            return Some(timestamp_value(v));
        }
        if let Ok(Some(v)) = row.try_get::<Option<NaiveDate>, _>(idx) {
            return Some(date_value(v));
        }
        // TIME values outside 00:00..24:00 (durations) fall through to text
        if let Ok(Some(v)) = row.try_get::<Option<NaiveTime>, _>(idx) {
            return Some(time_value(v));
        }
        None
    }

    /// Raw-query results use the text protocol, so every value has a text form.
    fn decode_fallback(row: &MySqlRow, idx: usize) -> Option<JsonValue> {
        if let Ok(Some(v)) = row.try_get_unchecked::<Option<String>, _>(idx) {
            return Some(JsonValue::String(v));
        }
        row.try_get_unchecked::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(|v| decode_binary_value(&v))
    }
}

mod sqlite {
    use super::*;

    pub fn decode_column(row: &SqliteRow, idx: usize, category: TypeCategory) -> JsonValue {
        let Ok(raw) = row.try_get_raw(idx) else {
            return JsonValue::Null;
        };
        if raw.is_null() {
            return JsonValue::Null;
        }
        // Storage class of this particular value (SQLite is dynamically typed)
        let storage = categorize_type(raw.type_info().name(), DatabaseType::SQLite);

        let decoded = match category {
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Decimal => decode_decimal(row, idx, storage),
            TypeCategory::Binary => decode_binary_col(row, idx),
            TypeCategory::Temporal => decode_temporal(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::Text | TypeCategory::Null | TypeCategory::Unknown => None,
        };

        decoded
            .or_else(|| decode_storage(row, idx, storage))
            .unwrap_or_else(|| {
                tracing::debug!(column = idx, ?category, "Failed to decode SQLite value");
                JsonValue::Null
            })
    }

    fn decode_integer(row: &SqliteRow, idx: usize) -> Option<JsonValue> {
        row.try_get::<Option<i64>, _>(idx)
            .ok()
            .flatten()
            .map(|v| JsonValue::Number(v.into()))
    }

    fn decode_boolean(row: &SqliteRow, idx: usize) -> Option<JsonValue> {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(JsonValue::Bool)
    }

    fn decode_float(row: &SqliteRow, idx: usize) -> Option<JsonValue> {
        row.try_get::<Option<f64>, _>(idx)
            .ok()
            .flatten()
            .map(float_value)
    }

    /// DECIMAL has no exact storage in SQLite; render whatever is stored as a string.
    fn decode_decimal(row: &SqliteRow, idx: usize, storage: TypeCategory) -> Option<JsonValue> {
        match storage {
            TypeCategory::Integer => decode_integer(row, idx).map(|v| JsonValue::String(v.to_string())),
            TypeCategory::Float => row
                .try_get::<Option<f64>, _>(idx)
                .ok()
                .flatten()
                .map(|v| JsonValue::String(v.to_string())),
            _ => None,
        }
    }

    fn decode_binary_col(row: &SqliteRow, idx: usize) -> Option<JsonValue> {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(|v| decode_binary_value(&v))
    }

    fn decode_temporal(row: &SqliteRow, idx: usize) -> Option<JsonValue> {
        if let Ok(Some(v)) = row.try_get::<Option<NaiveDateTime>, _>(idx) {
            return Some(datetime_value(v));
        }
        if let Ok(Some(v)) = row.try_get::<Option<NaiveDate>, _>(idx) {
            return Some(date_value(v));
        }
        if let Ok(Some(v)) = row.try_get::<Option<NaiveTime>, _>(idx) {
            return Some(time_value(v));
        }
        None
    }

    fn decode_json(row: &SqliteRow, idx: usize) -> Option<JsonValue> {
        row.try_get::<Option<String>, _>(idx)
            .ok()
            .flatten()
            .and_then(|s| serde_json::from_str::<JsonValue>(&s).ok())
    }

    fn decode_storage(row: &SqliteRow, idx: usize, storage: TypeCategory) -> Option<JsonValue> {
        match storage {
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary_col(row, idx),
            _ => row
                .try_get_unchecked::<Option<String>, _>(idx)
                .ok()
                .flatten()
                .map(JsonValue::String),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_unique_column_names() {
        assert_eq!(
            unique_column_names(names(&["id", "name", "id"])),
            names(&["id", "name", "id_2"])
        );
        assert_eq!(
            unique_column_names(names(&["id", "id", "id"])),
            names(&["id", "id_2", "id_3"])
        );
        // A generated name never shadows a real column
        assert_eq!(
            unique_column_names(names(&["id", "id_2", "id"])),
            names(&["id", "id_2", "id_3"])
        );
        assert_eq!(unique_column_names(names(&["a", "b"])), names(&["a", "b"]));
        assert!(unique_column_names(Vec::new()).is_empty());
    }

    #[test]
    fn test_categorize_type_integer() {
        assert_eq!(
            categorize_type("INT", DatabaseType::MySQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("BIGINT UNSIGNED", DatabaseType::MySQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("TINYINT", DatabaseType::MySQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("YEAR", DatabaseType::MySQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("INTEGER", DatabaseType::SQLite),
            TypeCategory::Integer
        );
    }

    #[test]
    fn test_categorize_type_decimal() {
        assert_eq!(
            categorize_type("DECIMAL", DatabaseType::MySQL),
            TypeCategory::Decimal
        );
        // SQLite NUMERIC affinity is not exact
        assert_eq!(
            categorize_type("numeric", DatabaseType::SQLite),
            TypeCategory::Float
        );
    }

    #[test]
    fn test_categorize_type_boolean_before_integer() {
        assert_eq!(
            categorize_type("BOOLEAN", DatabaseType::MySQL),
            TypeCategory::Boolean
        );
    }

    #[test]
    fn test_categorize_type_temporal() {
        for name in ["DATE", "TIME", "DATETIME", "TIMESTAMP"] {
            assert_eq!(
                categorize_type(name, DatabaseType::MySQL),
                TypeCategory::Temporal,
                "{}",
                name
            );
        }
    }

    #[test]
    fn test_categorize_type_other() {
        assert_eq!(
            categorize_type("JSON", DatabaseType::MySQL),
            TypeCategory::Json
        );
        assert_eq!(
            categorize_type("VARBINARY", DatabaseType::MySQL),
            TypeCategory::Binary
        );
        assert_eq!(
            categorize_type("VARCHAR", DatabaseType::MySQL),
            TypeCategory::Text
        );
        assert_eq!(
            categorize_type("NULL", DatabaseType::SQLite),
            TypeCategory::Null
        );
        assert_eq!(
            categorize_type("GEOMETRY", DatabaseType::MySQL),
            TypeCategory::Unknown
        );
    }

    #[test]
    fn test_decode_binary_value_with_valid_utf8() {
        let result = decode_binary_value(b"hello world");
        assert_eq!(result, JsonValue::String("hello world".to_string()));
    }

    #[test]
    fn test_decode_binary_value_with_invalid_utf8() {
        let bytes: &[u8] = &[0xFF, 0xFE, 0x00, 0x01];
        assert_eq!(
            decode_binary_value(bytes),
            JsonValue::String("//4AAQ==".to_string())
        );
    }

    #[test]
    fn test_float_value_non_finite() {
        assert_eq!(float_value(1.5), serde_json::json!(1.5));
        assert_eq!(float_value(f64::NAN), JsonValue::String("NaN".to_string()));
        assert_eq!(
            float_value(f64::INFINITY),
            JsonValue::String("inf".to_string())
        );
    }

    #[test]
    fn test_temporal_formatting() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(14, 5, 6)
            .unwrap();
        assert_eq!(datetime_value(dt), serde_json::json!("2024-03-09T14:05:06"));
        assert_eq!(date_value(dt.date()), serde_json::json!("2024-03-09"));
        assert_eq!(time_value(dt.time()), serde_json::json!("14:05:06"));
        assert_eq!(
            timestamp_value(dt.and_utc()),
            serde_json::json!("2024-03-09T14:05:06+00:00")
        );
    }
}
