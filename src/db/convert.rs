use std::collections::HashMap;

use once_cell::sync::Lazy;
use rusqlite::Row;
use rusqlite::types::Value as SqlValue;

use super::error::{MappingError, StoreError};
use super::value::{ColumnType, FieldKind, FieldValue};

/// Converts one field value to and from its SQLite representation.
///
/// Implementations are stateless statics; a record field either names one
/// explicitly (override), or one is picked from the built-in table by field
/// kind, or the default pass-through handles it if the kind is primitive.
pub trait SqlConvert: Send + Sync {
    fn column_type(&self) -> ColumnType;
    fn to_param(&self, value: FieldValue) -> Result<SqlValue, MappingError>;
    fn from_column(&self, row: &Row<'_>, idx: usize) -> Result<FieldValue, StoreError>;
}

/// Uuids stored as their canonical hyphenated text form.
pub struct UuidTextConvert;

pub static UUID_TEXT: UuidTextConvert = UuidTextConvert;

impl SqlConvert for UuidTextConvert {
    fn column_type(&self) -> ColumnType {
        ColumnType::Text
    }

    fn to_param(&self, value: FieldValue) -> Result<SqlValue, MappingError> {
        Ok(SqlValue::Text(value.into_uuid()?.to_string()))
    }

    fn from_column(&self, row: &Row<'_>, idx: usize) -> Result<FieldValue, StoreError> {
        let text: String = row.get(idx)?;
        let parsed = text
            .parse()
            .map_err(|_| MappingError::InvalidStored { expected: "uuid" })?;
        Ok(FieldValue::Uuid(parsed))
    }
}

/// Instants stored as unix microseconds in an INTEGER column.
pub struct InstantMicrosConvert;

pub static INSTANT_MICROS: InstantMicrosConvert = InstantMicrosConvert;

impl SqlConvert for InstantMicrosConvert {
    fn column_type(&self) -> ColumnType {
        ColumnType::Integer
    }

    fn to_param(&self, value: FieldValue) -> Result<SqlValue, MappingError> {
        Ok(SqlValue::Integer(value.into_instant()?.timestamp_micros()))
    }

    fn from_column(&self, row: &Row<'_>, idx: usize) -> Result<FieldValue, StoreError> {
        let micros: i64 = row.get(idx)?;
        let instant = chrono::DateTime::from_timestamp_micros(micros)
            .ok_or(MappingError::InvalidStored { expected: "instant" })?;
        Ok(FieldValue::Instant(instant))
    }
}

pub struct BytesBlobConvert;

pub static BYTES_BLOB: BytesBlobConvert = BytesBlobConvert;

impl SqlConvert for BytesBlobConvert {
    fn column_type(&self) -> ColumnType {
        ColumnType::Blob
    }

    fn to_param(&self, value: FieldValue) -> Result<SqlValue, MappingError> {
        Ok(SqlValue::Blob(value.into_bytes()?))
    }

    fn from_column(&self, row: &Row<'_>, idx: usize) -> Result<FieldValue, StoreError> {
        Ok(FieldValue::Bytes(row.get(idx)?))
    }
}

static BUILTIN: Lazy<HashMap<FieldKind, &'static dyn SqlConvert>> = Lazy::new(|| {
    let mut table: HashMap<FieldKind, &'static dyn SqlConvert> = HashMap::new();
    table.insert(FieldKind::Uuid, &UUID_TEXT);
    table.insert(FieldKind::Bytes, &BYTES_BLOB);
    table
});

/// A field's converter after resolution, cached inside the table mapping.
pub enum FieldConverter {
    Custom(&'static dyn SqlConvert),
    Default(FieldKind),
}

impl FieldConverter {
    /// Resolution order: per-field override, then the built-in table keyed by
    /// kind, then the default pass-through for primitive kinds. Anything else
    /// is a mapping error naming the offending field and type.
    pub fn resolve(
        field: &'static str,
        kind: FieldKind,
        declared: Option<&'static dyn SqlConvert>,
    ) -> Result<Self, MappingError> {
        if let Some(converter) = declared {
            return Ok(FieldConverter::Custom(converter));
        }
        if let Some(converter) = BUILTIN.get(&kind) {
            return Ok(FieldConverter::Custom(*converter));
        }
        if kind.is_primitive() {
            return Ok(FieldConverter::Default(kind));
        }
        Err(MappingError::Unconvertible {
            field,
            kind: kind.name(),
        })
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            FieldConverter::Custom(converter) => converter.column_type(),
            FieldConverter::Default(kind) => match kind {
                FieldKind::Bool | FieldKind::I64 | FieldKind::U64 => ColumnType::Integer,
                FieldKind::F64 => ColumnType::Real,
                _ => ColumnType::Text,
            },
        }
    }

    pub fn to_param(&self, value: FieldValue) -> Result<SqlValue, MappingError> {
        match self {
            FieldConverter::Custom(converter) => converter.to_param(value),
            FieldConverter::Default(kind) => match (kind, value) {
                (FieldKind::Bool, FieldValue::Bool(v)) => Ok(SqlValue::Integer(v as i64)),
                (FieldKind::Char, FieldValue::Char(v)) => Ok(SqlValue::Text(v.to_string())),
                (FieldKind::I64, FieldValue::I64(v)) => Ok(SqlValue::Integer(v)),
                // bit-preserving; ids larger than i64::MAX survive the round trip
                (FieldKind::U64, FieldValue::U64(v)) => Ok(SqlValue::Integer(v as i64)),
                (FieldKind::F64, FieldValue::F64(v)) => Ok(SqlValue::Real(v)),
                (FieldKind::Text, FieldValue::Text(v)) => Ok(SqlValue::Text(v)),
                (kind, value) => Err(MappingError::ValueMismatch {
                    expected: kind.name(),
                    got: value.kind_name(),
                }),
            },
        }
    }

    pub fn from_column(&self, row: &Row<'_>, idx: usize) -> Result<FieldValue, StoreError> {
        match self {
            FieldConverter::Custom(converter) => converter.from_column(row, idx),
            FieldConverter::Default(kind) => match kind {
                FieldKind::Bool => Ok(FieldValue::Bool(row.get::<_, i64>(idx)? != 0)),
                FieldKind::Char => {
                    let text: String = row.get(idx)?;
                    let ch = text
                        .chars()
                        .next()
                        .ok_or(MappingError::InvalidStored { expected: "char" })?;
                    Ok(FieldValue::Char(ch))
                }
                FieldKind::I64 => Ok(FieldValue::I64(row.get(idx)?)),
                FieldKind::U64 => Ok(FieldValue::U64(row.get::<_, i64>(idx)? as u64)),
                FieldKind::F64 => Ok(FieldValue::F64(row.get(idx)?)),
                FieldKind::Text => Ok(FieldValue::Text(row.get(idx)?)),
                _ => Err(MappingError::InvalidStored {
                    expected: kind.name(),
                }
                .into()),
            },
        }
    }
}
