use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{info, warn};

use crate::db::{Database, SettingsError};
use crate::squad::SquadConfig;

const STORE_NAMESPACE: &str = "ReadingSquad";

#[derive(Debug, Error)]
pub enum InstanceError {
    #[error("community storage io: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

/// One community's isolated state: its settings, its record store, and the
/// directory both live in.
pub struct Instance {
    id: u64,
    pub config: RwLock<SquadConfig>,
    pub database: Database,
    directory: PathBuf,
}

impl Instance {
    fn establish(data_dir: &Path, id: u64) -> Result<Arc<Self>, InstanceError> {
        let directory = data_dir.join(id.to_string());
        std::fs::create_dir_all(&directory)?;
        let config = SquadConfig::load(&directory)?;
        let database = Database::open(&directory, STORE_NAMESPACE);
        Ok(Arc::new(Self {
            id,
            config: RwLock::new(config),
            database,
            directory,
        }))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Writes the settings snapshot if anything changed.
    pub fn persist_config(&self) -> Result<(), SettingsError> {
        self.config.write().persist(&self.directory)
    }
}

/// Owns every community instance for the process. Communities come into
/// existence on first contact and are loaded from disk when a prior storage
/// directory exists.
pub struct InstanceRegistry {
    data_dir: PathBuf,
    instances: RwLock<HashMap<u64, Arc<Instance>>>,
}

impl InstanceRegistry {
    pub fn new(data_dir: PathBuf) -> Result<Self, InstanceError> {
        std::fs::create_dir_all(&data_dir)?;
        Ok(Self {
            data_dir,
            instances: RwLock::new(HashMap::new()),
        })
    }

    /// Brings every community with an existing storage directory back into
    /// memory. Non-numeric directory names are skipped.
    pub fn load_existing(&self) -> Result<usize, InstanceError> {
        let mut count = 0;
        for entry in std::fs::read_dir(&self.data_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(id) = entry.file_name().to_str().and_then(|n| n.parse().ok()) else {
                continue;
            };
            self.get(id)?;
            count += 1;
        }
        info!("Loaded {} existing communities", count);
        Ok(count)
    }

    /// Returns the instance for a community, establishing it on first
    /// contact.
    pub fn get(&self, id: u64) -> Result<Arc<Instance>, InstanceError> {
        if let Some(existing) = self.instances.read().get(&id) {
            return Ok(existing.clone());
        }

        let established = Instance::establish(&self.data_dir, id)?;
        let mut instances = self.instances.write();
        Ok(instances.entry(id).or_insert(established).clone())
    }

    pub fn loaded(&self) -> Vec<Arc<Instance>> {
        self.instances.read().values().cloned().collect()
    }

    /// Flushes dirty settings for every loaded community. A failing write
    /// for one community does not block the others.
    pub fn persist_all(&self) {
        for instance in self.loaded() {
            if let Err(e) = instance.persist_config() {
                warn!("Persisting settings for community {} failed: {}", instance.id(), e);
            }
        }
    }
}
