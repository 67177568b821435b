use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Intermediate representation a record's accessors move field values
/// through, so converters never need to know the concrete record type.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    Char(char),
    I64(i64),
    U64(u64),
    F64(f64),
    Text(String),
    Uuid(Uuid),
    Instant(DateTime<Utc>),
    Bytes(Vec<u8>),
}

impl FieldValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldValue::Bool(_) => "bool",
            FieldValue::Char(_) => "char",
            FieldValue::I64(_) => "i64",
            FieldValue::U64(_) => "u64",
            FieldValue::F64(_) => "f64",
            FieldValue::Text(_) => "text",
            FieldValue::Uuid(_) => "uuid",
            FieldValue::Instant(_) => "instant",
            FieldValue::Bytes(_) => "bytes",
        }
    }

    pub fn into_bool(self) -> Result<bool, super::MappingError> {
        match self {
            FieldValue::Bool(v) => Ok(v),
            other => Err(mismatch("bool", &other)),
        }
    }

    pub fn into_char(self) -> Result<char, super::MappingError> {
        match self {
            FieldValue::Char(v) => Ok(v),
            other => Err(mismatch("char", &other)),
        }
    }

    pub fn into_i64(self) -> Result<i64, super::MappingError> {
        match self {
            FieldValue::I64(v) => Ok(v),
            other => Err(mismatch("i64", &other)),
        }
    }

    pub fn into_u64(self) -> Result<u64, super::MappingError> {
        match self {
            FieldValue::U64(v) => Ok(v),
            other => Err(mismatch("u64", &other)),
        }
    }

    pub fn into_f64(self) -> Result<f64, super::MappingError> {
        match self {
            FieldValue::F64(v) => Ok(v),
            other => Err(mismatch("f64", &other)),
        }
    }

    pub fn into_text(self) -> Result<String, super::MappingError> {
        match self {
            FieldValue::Text(v) => Ok(v),
            other => Err(mismatch("text", &other)),
        }
    }

    pub fn into_uuid(self) -> Result<Uuid, super::MappingError> {
        match self {
            FieldValue::Uuid(v) => Ok(v),
            other => Err(mismatch("uuid", &other)),
        }
    }

    pub fn into_instant(self) -> Result<DateTime<Utc>, super::MappingError> {
        match self {
            FieldValue::Instant(v) => Ok(v),
            other => Err(mismatch("instant", &other)),
        }
    }

    pub fn into_bytes(self) -> Result<Vec<u8>, super::MappingError> {
        match self {
            FieldValue::Bytes(v) => Ok(v),
            other => Err(mismatch("bytes", &other)),
        }
    }
}

fn mismatch(expected: &'static str, got: &FieldValue) -> super::MappingError {
    super::MappingError::ValueMismatch {
        expected,
        got: got.kind_name(),
    }
}

/// Declared type of a record field, the key used to pick a converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Bool,
    Char,
    I64,
    U64,
    F64,
    Text,
    Uuid,
    Instant,
    Bytes,
}

impl FieldKind {
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Bool => "bool",
            FieldKind::Char => "char",
            FieldKind::I64 => "i64",
            FieldKind::U64 => "u64",
            FieldKind::F64 => "f64",
            FieldKind::Text => "text",
            FieldKind::Uuid => "uuid",
            FieldKind::Instant => "instant",
            FieldKind::Bytes => "bytes",
        }
    }

    /// Kinds the default pass-through converter handles on its own.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            FieldKind::Bool
                | FieldKind::Char
                | FieldKind::I64
                | FieldKind::U64
                | FieldKind::F64
                | FieldKind::Text
        )
    }
}

/// Native SQLite column affinity a converter stores its values under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Blob,
}

impl ColumnType {
    pub fn sql(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
            ColumnType::Blob => "BLOB",
        }
    }
}
