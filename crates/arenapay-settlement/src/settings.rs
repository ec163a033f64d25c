//! Platform-wide settings and the maintenance gate.
//!
//! One settings record per process, read through [`SettingsStore::snapshot`]
//! and replaced as a whole by [`SettingsStore::upsert`] or
//! [`SettingsStore::reload`]. The engine only ever asks one question of it:
//! is the platform in maintenance mode?

use std::path::Path;
use std::sync::{PoisonError, RwLock};

use arenapay_types::{ArenaError, Result};
use serde::{Deserialize, Serialize};

/// Admission check consulted before joins and withdrawal requests.
pub trait MaintenanceGate: Send + Sync {
    fn maintenance_mode(&self) -> bool;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformSettings {
    /// While set, new joins and withdrawal requests are refused.
    pub maintenance_mode: bool,
    /// Site-wide announcement, if any.
    pub banner: Option<String>,
}

impl PlatformSettings {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| ArenaError::Configuration(format!("invalid platform settings: {e}")))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }
}

/// Process-wide holder of the current [`PlatformSettings`].
#[derive(Debug, Default)]
pub struct SettingsStore {
    current: RwLock<PlatformSettings>,
}

impl SettingsStore {
    #[must_use]
    pub fn new(initial: PlatformSettings) -> Self {
        Self {
            current: RwLock::new(initial),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> PlatformSettings {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the settings record.
    pub fn upsert(&self, settings: PlatformSettings) {
        let mut current = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if current.maintenance_mode != settings.maintenance_mode {
            tracing::info!(
                maintenance = settings.maintenance_mode,
                "maintenance mode changed"
            );
        }
        *current = settings;
    }

    /// Re-read the settings from their source. On error the current
    /// settings stay in force.
    pub fn reload<F>(&self, loader: F) -> Result<PlatformSettings>
    where
        F: FnOnce() -> Result<PlatformSettings>,
    {
        match loader() {
            Ok(settings) => {
                self.upsert(settings.clone());
                Ok(settings)
            }
            Err(e) => {
                tracing::warn!(error = %e, "settings reload failed; keeping current settings");
                Err(e)
            }
        }
    }
}

impl MaintenanceGate for SettingsStore {
    fn maintenance_mode(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .maintenance_mode
    }
}
