use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension, ToSql};

use super::error::StoreError;
use super::mapping::{Record, TableMapping, table_mapping};

/// One file-backed SQLite database, tied to one community's storage
/// directory. Every operation opens its own connection and drops it before
/// returning; there is no pooling and no cross-operation transaction.
pub struct Database {
    db_path: PathBuf,
}

impl Database {
    pub fn open(directory: &Path, namespace: &str) -> Self {
        Self {
            db_path: directory.join(format!("{namespace}.db")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Inserts one record as a single parameterized statement, creating the
    /// table on first contact. Binding is by column name.
    pub fn insert<T: Record>(&self, item: &T) -> Result<(), StoreError> {
        let mapping = table_mapping::<T>()?;
        let conn = self.connect()?;
        establish_table(&conn, &mapping)?;

        let params = mapping.insert_params(item)?;
        let bound: Vec<(&str, &dyn ToSql)> = params
            .iter()
            .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
            .collect();
        let mut stmt = conn.prepare(mapping.insert_sql())?;
        stmt.execute(&bound[..])?;
        Ok(())
    }

    /// Reads every stored row of `T`. Column positions are resolved from
    /// names once per statement; rows are materialized before the scoped
    /// connection closes and handed back as a finite, one-shot iterator.
    pub fn select<T: Record>(&self) -> Result<RecordIter<T>, StoreError> {
        let mapping = table_mapping::<T>()?;
        let conn = self.connect()?;
        establish_table(&conn, &mapping)?;

        let mut stmt = conn.prepare(mapping.select_sql())?;
        let indices: Vec<usize> = mapping
            .column_names()
            .map(|name| stmt.column_index(name))
            .collect::<Result<_, _>>()?;

        let mut items = Vec::new();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            items.push(mapping.from_row(row, &indices)?);
        }
        Ok(RecordIter {
            inner: items.into_iter(),
        })
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        Ok(Connection::open(&self.db_path)?)
    }
}

/// Checks the catalog before creating; a lost race with a concurrent creator
/// surfaces as "already exists" and is treated as success.
fn establish_table<T: Record>(
    conn: &Connection,
    mapping: &TableMapping<T>,
) -> Result<(), StoreError> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [mapping.table()],
            |row| row.get(0),
        )
        .optional()?;
    if existing.is_some() {
        return Ok(());
    }

    match conn.execute(mapping.create_sql(), []) {
        Ok(_) => Ok(()),
        Err(e) if e.to_string().contains("already exists") => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Finite, non-restartable sequence of reconstructed records.
pub struct RecordIter<T> {
    inner: std::vec::IntoIter<T>,
}

impl<T> Iterator for RecordIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.inner.next()
    }
}

impl<T> ExactSizeIterator for RecordIter<T> {
    fn len(&self) -> usize {
        self.inner.len()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::db::convert::INSTANT_MICROS;
    use crate::db::mapping::FieldSpec;
    use crate::db::value::{FieldKind, FieldValue};

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Entry {
        id: u64,
        note: String,
        when: chrono::DateTime<chrono::Utc>,
    }

    static ENTRY_FIELDS: [FieldSpec<Entry>; 3] = [
        FieldSpec {
            name: "id",
            kind: FieldKind::U64,
            converter: None,
            get: |e| FieldValue::U64(e.id),
            set: |e, v| {
                e.id = v.into_u64()?;
                Ok(())
            },
        },
        FieldSpec {
            name: "note",
            kind: FieldKind::Text,
            converter: None,
            get: |e| FieldValue::Text(e.note.clone()),
            set: |e, v| {
                e.note = v.into_text()?;
                Ok(())
            },
        },
        FieldSpec {
            name: "logged_at",
            kind: FieldKind::Instant,
            converter: Some(&INSTANT_MICROS),
            get: |e| FieldValue::Instant(e.when),
            set: |e, v| {
                e.when = v.into_instant()?;
                Ok(())
            },
        },
    ];

    impl Record for Entry {
        const TABLE: &'static str = "Entry";

        fn fields() -> &'static [FieldSpec<Self>] {
            &ENTRY_FIELDS
        }
    }

    // same table, fields declared in reverse order
    #[derive(Debug, Default, Clone, PartialEq)]
    struct EntryReversed {
        when: chrono::DateTime<chrono::Utc>,
        note: String,
        id: u64,
    }

    static ENTRY_REVERSED_FIELDS: [FieldSpec<EntryReversed>; 3] = [
        FieldSpec {
            name: "logged_at",
            kind: FieldKind::Instant,
            converter: Some(&INSTANT_MICROS),
            get: |e| FieldValue::Instant(e.when),
            set: |e, v| {
                e.when = v.into_instant()?;
                Ok(())
            },
        },
        FieldSpec {
            name: "note",
            kind: FieldKind::Text,
            converter: None,
            get: |e| FieldValue::Text(e.note.clone()),
            set: |e, v| {
                e.note = v.into_text()?;
                Ok(())
            },
        },
        FieldSpec {
            name: "id",
            kind: FieldKind::U64,
            converter: None,
            get: |e| FieldValue::U64(e.id),
            set: |e, v| {
                e.id = v.into_u64()?;
                Ok(())
            },
        },
    ];

    impl Record for EntryReversed {
        const TABLE: &'static str = "Entry";

        fn fields() -> &'static [FieldSpec<Self>] {
            &ENTRY_REVERSED_FIELDS
        }
    }

    fn sample_entry() -> Entry {
        Entry {
            id: u64::MAX - 3,
            note: "finished chapter four".to_string(),
            when: chrono::DateTime::from_timestamp_micros(1_700_000_123_456_789).unwrap(),
        }
    }

    #[test]
    fn insert_then_select_round_trips() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path(), "RoundTrip");

        let entry = sample_entry();
        db.insert(&entry).expect("insert");

        let read: Vec<Entry> = db.select().expect("select").collect();
        assert_eq!(read, vec![entry]);
    }

    #[test]
    fn select_resolves_columns_by_name_not_declaration_order() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path(), "Reordered");

        let entry = sample_entry();
        db.insert(&entry).expect("insert");

        let read: Vec<EntryReversed> = db.select().expect("select").collect();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].id, entry.id);
        assert_eq!(read[0].note, entry.note);
        assert_eq!(read[0].when, entry.when);
    }

    #[test]
    fn select_on_fresh_database_yields_nothing() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path(), "Empty");
        let read: Vec<Entry> = db.select().expect("select").collect();
        assert!(read.is_empty());
    }

    #[test]
    fn data_survives_reopening_the_store() {
        let dir = TempDir::new().unwrap();
        let entry = sample_entry();
        {
            let db = Database::open(dir.path(), "Persist");
            db.insert(&entry).expect("insert");
        }

        let reopened = Database::open(dir.path(), "Persist");
        let read: Vec<Entry> = reopened.select().expect("select").collect();
        assert_eq!(read, vec![entry]);
    }
}
