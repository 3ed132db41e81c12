//! Driver row decoding.
//!
//! This module turns sqlx rows into the crate's loosely-typed [`Row`].
//!
//! # Architecture
//!
//! Decoding uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Database-specific decoders handle the actual value extraction
//!
//! SQLite is the exception: its values carry their own storage class, so the
//! SQLite decoder follows the value rather than the declared column type.

use crate::models::{DatabaseType, DbValue, Row as ValueRow};
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo, ValueRef};

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
    Temporal,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC is actually a float
        if db == DatabaseType::SQLite && lower == "numeric" {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    if lower.contains("int") || lower.contains("serial") || lower.contains("tiny") {
        return TypeCategory::Integer;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("float")
        || lower.contains("double")
        || lower == "real"
        || lower == "float4"
        || lower == "float8"
    {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    if lower.starts_with("timestamp")
        || lower == "datetime"
        || lower == "date"
        || lower.starts_with("time")
    {
        return TypeCategory::Temporal;
    }

    if lower.contains("char") || lower.contains("text") {
        return TypeCategory::Text;
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

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

// =============================================================================
// Row conversion
// =============================================================================

/// Trait for converting driver rows into value rows.
pub trait RowToValues {
    fn to_values(&self) -> ValueRow;
}

impl RowToValues for MySqlRow {
    fn to_values(&self) -> ValueRow {
        let mut out = ValueRow::new();
        for (idx, col) in self.columns().iter().enumerate() {
            let category = categorize_type(col.type_info().name(), DatabaseType::MySQL);
            out.push(col.name(), mysql::decode_column(self, idx, category));
        }
        out
    }
}

impl RowToValues for PgRow {
    fn to_values(&self) -> ValueRow {
        let mut out = ValueRow::new();
        for (idx, col) in self.columns().iter().enumerate() {
            let category = categorize_type(col.type_info().name(), DatabaseType::PostgreSQL);
            out.push(col.name(), postgres::decode_column(self, idx, category));
        }
        out
    }
}

impl RowToValues for SqliteRow {
    fn to_values(&self) -> ValueRow {
        let mut out = ValueRow::new();
        for (idx, col) in self.columns().iter().enumerate() {
            out.push(col.name(), sqlite::decode_column(self, idx));
        }
        out
    }
}

fn json_text(value: Option<serde_json::Value>) -> DbValue {
    value
        .map(|v| DbValue::Text(v.to_string()))
        .unwrap_or(DbValue::Null)
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;

    pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> DbValue {
        if row.try_get_raw(idx).map(|v| v.is_null()).unwrap_or(true) {
            return DbValue::Null;
        }
        match category {
            TypeCategory::Decimal => match row.try_get::<RawDecimal, _>(idx) {
                Ok(v) => DbValue::Text(v.0),
                Err(e) => {
                    tracing::error!("Failed to decode DECIMAL: {:?}", e);
                    DbValue::Null
                }
            },
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => row
                .try_get::<bool, _>(idx)
                .map(DbValue::Bool)
                .unwrap_or(DbValue::Null),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => row
                .try_get::<Vec<u8>, _>(idx)
                .map(DbValue::Bytes)
                .unwrap_or(DbValue::Null),
            TypeCategory::Json => json_text(row.try_get::<serde_json::Value, _>(idx).ok()),
            TypeCategory::Temporal => decode_temporal(row, idx),
            TypeCategory::Text | TypeCategory::Unknown => decode_text(row, idx),
        }
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> DbValue {
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return DbValue::Int(v);
        }
        if let Ok(v) = row.try_get::<i32, _>(idx) {
            return DbValue::Int(v.into());
        }
        if let Ok(v) = row.try_get::<i16, _>(idx) {
            return DbValue::Int(v.into());
        }
        if let Ok(v) = row.try_get::<i8, _>(idx) {
            return DbValue::Int(v.into());
        }
        if let Ok(v) = row.try_get::<u64, _>(idx) {
            // Values above i64::MAX keep their digits as text.
            return i64::try_from(v)
                .map(DbValue::Int)
                .unwrap_or_else(|_| DbValue::Text(v.to_string()));
        }
        if let Ok(v) = row.try_get::<u32, _>(idx) {
            return DbValue::Int(v.into());
        }
        if let Ok(v) = row.try_get::<u16, _>(idx) {
            return DbValue::Int(v.into());
        }
        if let Ok(v) = row.try_get::<u8, _>(idx) {
            return DbValue::Int(v.into());
        }
        DbValue::Null
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> DbValue {
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return DbValue::Float(v);
        }
        row.try_get::<f32, _>(idx)
            .map(|v| DbValue::Float(v.into()))
            .unwrap_or(DbValue::Null)
    }

    fn decode_temporal(row: &MySqlRow, idx: usize) -> DbValue {
        use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

        if let Ok(v) = row.try_get::<NaiveDateTime, _>(idx) {
            return DbValue::Text(v.to_string());
        }
        if let Ok(v) = row.try_get::<NaiveDate, _>(idx) {
            return DbValue::Text(v.to_string());
        }
        if let Ok(v) = row.try_get::<NaiveTime, _>(idx) {
            return DbValue::Text(v.to_string());
        }
        decode_text(row, idx)
    }

    fn decode_text(row: &MySqlRow, idx: usize) -> DbValue {
        row.try_get::<String, _>(idx)
            .map(DbValue::Text)
            .unwrap_or(DbValue::Null)
    }
}

mod postgres {
    use super::*;

    pub fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> DbValue {
        if row.try_get_raw(idx).map(|v| v.is_null()).unwrap_or(true) {
            return DbValue::Null;
        }
        match category {
            TypeCategory::Decimal => match row.try_get::<RawDecimal, _>(idx) {
                Ok(v) => DbValue::Text(v.0),
                Err(e) => {
                    tracing::error!("Failed to decode NUMERIC: {:?}", e);
                    DbValue::Null
                }
            },
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => row
                .try_get::<bool, _>(idx)
                .map(DbValue::Bool)
                .unwrap_or(DbValue::Null),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => row
                .try_get::<Vec<u8>, _>(idx)
                .map(DbValue::Bytes)
                .unwrap_or(DbValue::Null),
            TypeCategory::Json => json_text(row.try_get::<serde_json::Value, _>(idx).ok()),
            TypeCategory::Temporal => decode_temporal(row, idx),
            TypeCategory::Text | TypeCategory::Unknown => row
                .try_get::<String, _>(idx)
                .map(DbValue::Text)
                .unwrap_or(DbValue::Null),
        }
    }

    fn decode_integer(row: &PgRow, idx: usize) -> DbValue {
        if let Ok(v) = row.try_get::<i16, _>(idx) {
            return DbValue::Int(v.into());
        }
        if let Ok(v) = row.try_get::<i32, _>(idx) {
            return DbValue::Int(v.into());
        }
        row.try_get::<i64, _>(idx)
            .map(DbValue::Int)
            .unwrap_or(DbValue::Null)
    }

    fn decode_float(row: &PgRow, idx: usize) -> DbValue {
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return DbValue::Float(v);
        }
        row.try_get::<f32, _>(idx)
            .map(|v| DbValue::Float(v.into()))
            .unwrap_or(DbValue::Null)
    }

    fn decode_temporal(row: &PgRow, idx: usize) -> DbValue {
        use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

        if let Ok(v) = row.try_get::<DateTime<Utc>, _>(idx) {
            return DbValue::Text(v.to_rfc3339());
        }
        if let Ok(v) = row.try_get::<NaiveDateTime, _>(idx) {
            return DbValue::Text(v.to_string());
        }
        if let Ok(v) = row.try_get::<NaiveDate, _>(idx) {
            return DbValue::Text(v.to_string());
        }
        row.try_get::<NaiveTime, _>(idx)
            .map(|v| DbValue::Text(v.to_string()))
            .unwrap_or(DbValue::Null)
    }
}

mod sqlite {
    use super::*;

    /// Follows the storage class of the value itself.
    pub fn decode_column(row: &SqliteRow, idx: usize) -> DbValue {
        if row.try_get_raw(idx).map(|v| v.is_null()).unwrap_or(true) {
            return DbValue::Null;
        }
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return DbValue::Int(v);
        }
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return DbValue::Float(v);
        }
        if let Ok(v) = row.try_get::<String, _>(idx) {
            return DbValue::Text(v);
        }
        row.try_get::<Vec<u8>, _>(idx)
            .map(DbValue::Bytes)
            .unwrap_or(DbValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_type_integer() {
        assert_eq!(
            categorize_type("INT", DatabaseType::MySQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("BIGINT", DatabaseType::PostgreSQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("SERIAL", DatabaseType::PostgreSQL),
            TypeCategory::Integer
        );
    }

    #[test]
    fn test_categorize_type_decimal() {
        assert_eq!(
            categorize_type("DECIMAL", DatabaseType::MySQL),
            TypeCategory::Decimal
        );
        assert_eq!(
            categorize_type("NUMERIC", DatabaseType::PostgreSQL),
            TypeCategory::Decimal
        );
        // SQLite NUMERIC is a float
        assert_eq!(
            categorize_type("numeric", DatabaseType::SQLite),
            TypeCategory::Float
        );
    }

    #[test]
    fn test_categorize_type_temporal_and_text() {
        assert_eq!(
            categorize_type("TIMESTAMPTZ", DatabaseType::PostgreSQL),
            TypeCategory::Temporal
        );
        assert_eq!(
            categorize_type("DATETIME", DatabaseType::MySQL),
            TypeCategory::Temporal
        );
        assert_eq!(
            categorize_type("VARCHAR", DatabaseType::MySQL),
            TypeCategory::Text
        );
        assert_eq!(
            categorize_type("jsonb", DatabaseType::PostgreSQL),
            TypeCategory::Json
        );
        assert_eq!(
            categorize_type("uuid", DatabaseType::PostgreSQL),
            TypeCategory::Unknown
        );
    }

    #[test]
    fn test_json_text_keeps_document() {
        assert_eq!(
            json_text(Some(serde_json::json!({"a": 1}))),
            DbValue::Text("{\"a\":1}".to_string())
        );
        assert_eq!(json_text(None), DbValue::Null);
    }
}
