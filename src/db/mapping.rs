use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rusqlite::Row;
use rusqlite::types::Value as SqlValue;

use super::convert::{FieldConverter, SqlConvert};
use super::error::{MappingError, StoreError};
use super::value::{FieldKind, FieldValue};

/// One field of a persisted record: its column name, declared kind, an
/// optional converter override, and accessors through [`FieldValue`].
pub struct FieldSpec<T> {
    pub name: &'static str,
    pub kind: FieldKind,
    pub converter: Option<&'static dyn SqlConvert>,
    pub get: fn(&T) -> FieldValue,
    pub set: fn(&mut T, FieldValue) -> Result<(), MappingError>,
}

/// A persistable record type: declares its table name and field list once,
/// in a static descriptor table.
pub trait Record: Default + Send + Sync + 'static {
    const TABLE: &'static str;
    fn fields() -> &'static [FieldSpec<Self>];
}

struct MappedField<T: Record> {
    spec: &'static FieldSpec<T>,
    converter: FieldConverter,
}

/// Fully resolved table description for one record type: converters picked
/// per field and the SQL text prebuilt. Built once per type per process.
pub struct TableMapping<T: Record> {
    fields: Vec<MappedField<T>>,
    insert_sql: String,
    create_sql: String,
    select_sql: String,
}

impl<T: Record> TableMapping<T> {
    fn build() -> Result<Self, MappingError> {
        let mut fields = Vec::with_capacity(T::fields().len());
        for spec in T::fields() {
            let converter = FieldConverter::resolve(spec.name, spec.kind, spec.converter)?;
            fields.push(MappedField { spec, converter });
        }

        let columns: Vec<&str> = fields.iter().map(|f| f.spec.name).collect();
        let placeholders: Vec<String> = columns.iter().map(|c| format!(":{c}")).collect();
        let insert_sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            T::TABLE,
            columns.join(", "),
            placeholders.join(", "),
        );

        let mut create_sql = format!("CREATE TABLE {} ({}_pk INTEGER PRIMARY KEY", T::TABLE, T::TABLE);
        for field in &fields {
            create_sql.push_str(", ");
            create_sql.push_str(field.spec.name);
            create_sql.push(' ');
            create_sql.push_str(field.converter.column_type().sql());
        }
        create_sql.push(')');

        Ok(Self {
            select_sql: format!("SELECT * FROM {}", T::TABLE),
            fields,
            insert_sql,
            create_sql,
        })
    }

    pub fn table(&self) -> &'static str {
        T::TABLE
    }

    pub fn insert_sql(&self) -> &str {
        &self.insert_sql
    }

    pub fn create_sql(&self) -> &str {
        &self.create_sql
    }

    pub fn select_sql(&self) -> &str {
        &self.select_sql
    }

    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|f| f.spec.name)
    }

    /// Named insert parameters, one per field, bound by column name.
    pub fn insert_params(&self, item: &T) -> Result<Vec<(String, SqlValue)>, MappingError> {
        self.fields
            .iter()
            .map(|field| {
                let value = (field.spec.get)(item);
                Ok((format!(":{}", field.spec.name), field.converter.to_param(value)?))
            })
            .collect()
    }

    /// Rebuilds a record from one row. `indices` carries each field's column
    /// position, resolved by name once per statement by the caller.
    pub fn from_row(&self, row: &Row<'_>, indices: &[usize]) -> Result<T, StoreError> {
        let mut item = T::default();
        for (field, &idx) in self.fields.iter().zip(indices) {
            let value = field.converter.from_column(row, idx)?;
            (field.spec.set)(&mut item, value)?;
        }
        Ok(item)
    }
}

static MAPPING_CACHE: Lazy<RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Memoized lookup of the mapping for `T`; derivation happens at most once
/// per concrete type for the process lifetime.
pub fn table_mapping<T: Record>() -> Result<Arc<TableMapping<T>>, MappingError> {
    let key = TypeId::of::<T>();
    if let Some(cached) = MAPPING_CACHE.read().get(&key) {
        if let Ok(mapping) = cached.clone().downcast::<TableMapping<T>>() {
            return Ok(mapping);
        }
    }

    let built = Arc::new(TableMapping::<T>::build()?);
    let mut cache = MAPPING_CACHE.write();
    let entry = cache
        .entry(key)
        .or_insert_with(|| built.clone() as Arc<dyn Any + Send + Sync>);
    Ok(entry.clone().downcast::<TableMapping<T>>().unwrap_or(built))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::convert::INSTANT_MICROS;

    #[derive(Default)]
    struct Sample {
        id: u64,
        label: String,
    }

    static SAMPLE_FIELDS: [FieldSpec<Sample>; 2] = [
        FieldSpec {
            name: "id",
            kind: FieldKind::U64,
            converter: None,
            get: |s| FieldValue::U64(s.id),
            set: |s, v| {
                s.id = v.into_u64()?;
                Ok(())
            },
        },
        FieldSpec {
            name: "label",
            kind: FieldKind::Text,
            converter: None,
            get: |s| FieldValue::Text(s.label.clone()),
            set: |s, v| {
                s.label = v.into_text()?;
                Ok(())
            },
        },
    ];

    impl Record for Sample {
        const TABLE: &'static str = "Sample";

        fn fields() -> &'static [FieldSpec<Self>] {
            &SAMPLE_FIELDS
        }
    }

    #[derive(Default)]
    struct Bare {
        stamp: chrono::DateTime<chrono::Utc>,
    }

    // an instant kind without an override resolves no converter
    static BARE_FIELDS: [FieldSpec<Bare>; 1] = [FieldSpec {
        name: "stamp",
        kind: FieldKind::Instant,
        converter: None,
        get: |b| FieldValue::Instant(b.stamp),
        set: |b, v| {
            b.stamp = v.into_instant()?;
            Ok(())
        },
    }];

    impl Record for Bare {
        const TABLE: &'static str = "Bare";

        fn fields() -> &'static [FieldSpec<Self>] {
            &BARE_FIELDS
        }
    }

    #[derive(Default)]
    struct Stamped {
        stamp: chrono::DateTime<chrono::Utc>,
    }

    static STAMPED_FIELDS: [FieldSpec<Stamped>; 1] = [FieldSpec {
        name: "stamp",
        kind: FieldKind::Instant,
        converter: Some(&INSTANT_MICROS),
        get: |b| FieldValue::Instant(b.stamp),
        set: |b, v| {
            b.stamp = v.into_instant()?;
            Ok(())
        },
    }];

    impl Record for Stamped {
        const TABLE: &'static str = "Stamped";

        fn fields() -> &'static [FieldSpec<Self>] {
            &STAMPED_FIELDS
        }
    }

    #[test]
    fn builds_sql_from_descriptors() {
        let mapping = table_mapping::<Sample>().expect("mapping");
        assert_eq!(
            mapping.insert_sql(),
            "INSERT INTO Sample (id, label) VALUES (:id, :label)"
        );
        assert_eq!(
            mapping.create_sql(),
            "CREATE TABLE Sample (Sample_pk INTEGER PRIMARY KEY, id INTEGER, label TEXT)"
        );
        assert_eq!(mapping.select_sql(), "SELECT * FROM Sample");
    }

    #[test]
    fn mapping_is_memoized_per_type() {
        let first = table_mapping::<Sample>().expect("mapping");
        let second = table_mapping::<Sample>().expect("mapping");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn unconvertible_kind_fails_fast_naming_the_field() {
        let err = match table_mapping::<Bare>() {
            Ok(_) => panic!("an instant field without an override must not resolve"),
            Err(err) => err,
        };
        match err {
            MappingError::Unconvertible { field, kind } => {
                assert_eq!(field, "stamp");
                assert_eq!(kind, "instant");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn override_converter_wins_resolution() {
        let mapping = table_mapping::<Stamped>().expect("override resolves");
        assert_eq!(
            mapping.create_sql(),
            "CREATE TABLE Stamped (Stamped_pk INTEGER PRIMARY KEY, stamp INTEGER)"
        );
    }

    #[test]
    fn insert_params_are_named_after_columns() {
        let mapping = table_mapping::<Sample>().expect("mapping");
        let item = Sample {
            id: 7,
            label: "week one".to_string(),
        };
        let params = mapping.insert_params(&item).expect("params");
        assert_eq!(params[0].0, ":id");
        assert_eq!(params[1].0, ":label");
    }
}
