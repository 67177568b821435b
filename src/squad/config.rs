use std::path::Path;

use crate::db::{DurableSettings, SettingsError};

const SNAPSHOT: &str = "SquadService.Config.json";

const FIELDS: &[&str] = &[
    "channel_id",
    "role_id",
    "time_of_day",
    "weekday",
    "timezone",
    "enabled",
];

/// Per-community squad settings, durable across restarts. Every field is
/// optional until an operator sets it; the service stays dormant until the
/// scheduling trio (time, weekday, timezone) and channel are all present.
#[derive(Debug, Clone)]
pub struct SquadConfig {
    settings: DurableSettings,
}

impl SquadConfig {
    pub fn new() -> Self {
        Self {
            settings: DurableSettings::new(SNAPSHOT),
        }
    }

    pub fn load(directory: &Path) -> Result<Self, SettingsError> {
        let mut config = Self::new();
        config.settings.load(directory, FIELDS)?;
        Ok(config)
    }

    pub fn persist(&mut self, directory: &Path) -> Result<(), SettingsError> {
        self.settings.persist(directory)
    }

    pub fn channel_id(&self) -> Option<u64> {
        self.settings.get("channel_id")
    }

    pub fn set_channel_id(&mut self, id: u64) {
        self.settings.set("channel_id", id);
    }

    pub fn role_id(&self) -> Option<u64> {
        self.settings.get("role_id")
    }

    pub fn set_role_id(&mut self, id: u64) {
        self.settings.set("role_id", id);
    }

    pub fn time_of_day(&self) -> Option<String> {
        self.settings.get("time_of_day")
    }

    pub fn set_time_of_day(&mut self, time: &str) {
        self.settings.set("time_of_day", time);
    }

    pub fn weekday(&self) -> Option<String> {
        self.settings.get("weekday")
    }

    pub fn set_weekday(&mut self, weekday: &str) {
        self.settings.set("weekday", weekday);
    }

    pub fn timezone(&self) -> Option<String> {
        self.settings.get("timezone")
    }

    pub fn set_timezone(&mut self, zone: &str) {
        self.settings.set("timezone", zone);
    }

    pub fn enabled(&self) -> bool {
        self.settings.get("enabled").unwrap_or(false)
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.settings.set("enabled", enabled);
    }

    /// True once every field except `enabled` is set.
    pub fn is_configured(&self) -> bool {
        self.channel_id().is_some()
            && self.role_id().is_some()
            && self.time_of_day().is_some()
            && self.weekday().is_some()
            && self.timezone().is_some()
    }
}

impl Default for SquadConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn fresh_config_is_neither_configured_nor_enabled() {
        let config = SquadConfig::new();
        assert!(!config.is_configured());
        assert!(!config.enabled());
    }

    #[test]
    fn configured_requires_every_field_except_enabled() {
        let mut config = SquadConfig::new();
        config.set_channel_id(100);
        config.set_time_of_day("20:00");
        config.set_weekday("Friday");
        config.set_timezone("America/New_York");
        // channel and schedule alone are not enough without the role
        assert!(!config.is_configured());

        config.set_role_id(200);
        assert!(config.is_configured());
        assert!(!config.enabled());
    }

    #[test]
    fn settings_survive_a_persist_and_load_cycle() {
        let dir = TempDir::new().unwrap();

        let mut config = SquadConfig::new();
        config.set_channel_id(100);
        config.set_role_id(200);
        config.set_time_of_day("20:00");
        config.set_weekday("Friday");
        config.set_timezone("UTC");
        config.set_enabled(true);
        config.persist(dir.path()).expect("persist");

        let loaded = SquadConfig::load(dir.path()).expect("load");
        assert_eq!(loaded.channel_id(), Some(100));
        assert_eq!(loaded.role_id(), Some(200));
        assert_eq!(loaded.time_of_day().as_deref(), Some("20:00"));
        assert_eq!(loaded.weekday().as_deref(), Some("Friday"));
        assert_eq!(loaded.timezone().as_deref(), Some("UTC"));
        assert!(loaded.enabled());
        assert!(loaded.is_configured());
    }

    #[test]
    fn loading_without_a_snapshot_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let loaded = SquadConfig::load(dir.path()).expect("load");
        assert!(!loaded.is_configured());
    }
}
