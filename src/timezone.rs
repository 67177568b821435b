use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::schedule::ScheduleError;
use crate::utils::Throttle;

const VERSION_URL: &str = "https://data.iana.org/time-zones/tzdb/version";
const ARCHIVE_URL: &str = "https://data.iana.org/time-zones/tzdata-latest.tar.gz";
const ARCHIVE_NAME: &str = "tzdata.tar.gz";
const VERSION_NAME: &str = "tzdata.version";

const REFRESH_INTERVAL: Duration = Duration::from_secs(12 * 60 * 60);

#[derive(Debug, Error)]
pub enum TimezoneError {
    #[error("tzdata download failed: {0}")]
    Download(#[from] reqwest::Error),
    #[error("tzdata mirror io: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolves IANA zone names and keeps a local mirror of the tzdata archive
/// fresh. Name resolution itself always runs against the compiled-in zone
/// table; the mirror exists so operators can audit which release is current.
pub struct TimezoneProvider {
    directory: PathBuf,
    http: reqwest::Client,
    refresh_gate: Throttle,
}

impl TimezoneProvider {
    pub fn new(directory: PathBuf) -> Result<Self, TimezoneError> {
        std::fs::create_dir_all(&directory)?;
        ensure_directory_sanity(&directory)?;
        Ok(Self {
            directory,
            http: reqwest::Client::new(),
            refresh_gate: Throttle::new(REFRESH_INTERVAL),
        })
    }

    pub fn resolve(&self, name: &str) -> Result<Tz, ScheduleError> {
        name.parse()
            .map_err(|_| ScheduleError::Timezone(name.to_string()))
    }

    /// Checks the published tzdata version and refreshes the local mirror
    /// when it moved, at most once per twelve hours. Failures are logged and
    /// swallowed; a stale mirror never blocks scheduling.
    pub async fn refresh_if_due(&self) {
        if !self.refresh_gate.due() {
            return;
        }
        if let Err(e) = self.refresh().await {
            warn!("tzdata refresh failed: {}", e);
        }
    }

    async fn refresh(&self) -> Result<(), TimezoneError> {
        let published = self
            .http
            .get(VERSION_URL)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let published = published.trim().to_string();

        let version_path = self.directory.join(VERSION_NAME);
        let current = std::fs::read_to_string(&version_path)
            .map(|v| v.trim().to_string())
            .unwrap_or_default();
        if current == published {
            debug!("tzdata mirror already at {}", published);
            return Ok(());
        }

        info!("Refreshing tzdata mirror {} -> {}", current, published);
        let archive = self
            .http
            .get(ARCHIVE_URL)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        swap_in(&self.directory, ARCHIVE_NAME, &archive)?;
        std::fs::write(&version_path, &published)?;
        Ok(())
    }
}

/// Replaces the live archive without a window where it is absent: the new
/// content lands in `.temp`, the live file steps aside to `.pending`, the
/// temp file takes the live name, and only then is the old copy deleted.
fn swap_in(directory: &Path, name: &str, content: &[u8]) -> Result<(), TimezoneError> {
    let live = directory.join(name);
    let temp = directory.join(format!("{name}.temp"));
    let pending = directory.join(format!("{name}.pending"));

    std::fs::write(&temp, content)?;
    if live.exists() {
        std::fs::rename(&live, &pending)?;
    }
    std::fs::rename(&temp, &live)?;
    if pending.exists() {
        std::fs::remove_file(&pending)?;
    }
    Ok(())
}

/// Recovers from a crash mid-swap. A `.pending` file with no live archive
/// means the swap died between the two renames, so the old copy is restored;
/// leftover `.temp` files are incomplete downloads and are discarded.
fn ensure_directory_sanity(directory: &Path) -> Result<(), TimezoneError> {
    let live = directory.join(ARCHIVE_NAME);
    let temp = directory.join(format!("{ARCHIVE_NAME}.temp"));
    let pending = directory.join(format!("{ARCHIVE_NAME}.pending"));

    if pending.exists() {
        if live.exists() {
            std::fs::remove_file(&pending)?;
        } else {
            warn!("Restoring tzdata archive from interrupted swap");
            std::fs::rename(&pending, &live)?;
        }
    }
    if temp.exists() {
        std::fs::remove_file(&temp)?;
    }
    Ok(())
}
