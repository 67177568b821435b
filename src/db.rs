pub use self::convert::SqlConvert;
pub use self::error::{MappingError, SettingsError, StoreError};
pub use self::mapping::{FieldSpec, Record, TableMapping, table_mapping};
pub use self::settings::DurableSettings;
pub use self::store::{Database, RecordIter};
pub use self::value::{ColumnType, FieldKind, FieldValue};

pub mod convert;
pub mod error;
pub mod mapping;
pub mod settings;
pub mod store;
pub mod value;
