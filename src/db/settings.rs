use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use super::error::SettingsError;

/// Dirty-tracked name/value settings backing. Typed wrappers expose their
/// fields through [`get`]/[`set`] over the map, so adding an optional field
/// never needs a snapshot migration.
///
/// [`get`]: DurableSettings::get
/// [`set`]: DurableSettings::set
#[derive(Debug, Clone)]
pub struct DurableSettings {
    snapshot_name: &'static str,
    values: HashMap<&'static str, JsonValue>,
    dirty: bool,
}

impl DurableSettings {
    pub fn new(snapshot_name: &'static str) -> Self {
        Self {
            snapshot_name,
            values: HashMap::new(),
            dirty: false,
        }
    }

    pub fn get<T: DeserializeOwned>(&self, field: &'static str) -> Option<T> {
        self.values
            .get(field)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    pub fn set<T: Serialize>(&mut self, field: &'static str, value: T) {
        if let Ok(value) = serde_json::to_value(value) {
            self.values.insert(field, value);
            self.dirty = true;
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Writes a full snapshot, but only when something changed since the
    /// last persist or load.
    pub fn persist(&mut self, directory: &Path) -> Result<(), SettingsError> {
        if !self.dirty {
            return Ok(());
        }
        let snapshot = serde_json::to_string_pretty(&self.values)?;
        std::fs::write(directory.join(self.snapshot_name), snapshot)?;
        self.dirty = false;
        Ok(())
    }

    /// Overlays each declared field's value from a prior snapshot onto the
    /// live map. A missing snapshot leaves defaults in place; unknown
    /// snapshot fields are ignored.
    pub fn load(
        &mut self,
        directory: &Path,
        declared: &[&'static str],
    ) -> Result<(), SettingsError> {
        let path = directory.join(self.snapshot_name);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let snapshot: HashMap<String, JsonValue> = serde_json::from_str(&contents)?;
        for &field in declared {
            if let Some(value) = snapshot.get(field) {
                self.values.insert(field, value.clone());
            }
        }
        self.dirty = false;
        Ok(())
    }
}
