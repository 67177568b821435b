use thiserror::Error;

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("no storage converter for field `{field}` of type {kind}")]
    Unconvertible {
        field: &'static str,
        kind: &'static str,
    },
    #[error("expected a {expected} value, got {got}")]
    ValueMismatch {
        expected: &'static str,
        got: &'static str,
    },
    #[error("stored value does not decode as {expected}")]
    InvalidStored { expected: &'static str },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error(transparent)]
    Mapping(#[from] MappingError),
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read or write settings snapshot: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings snapshot is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),
}
