//! Install/Rollback State Machine
//!
//! Governs the current/previous package pointers. A previous pointer is
//! cleared on disk before any folder goes, and the current pointer moves only
//! after the old current folder is removed, so a failed deletion never leaves
//! the record naming a folder that was already deleted.

use tracing::info;

use super::store::{remove_dir_if_exists, InstallationState, PackageStore};
use crate::engine::error::Result;

/// Pointer state derived from the persisted record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageState {
    NoCurrent,
    HasCurrent(String),
    HasCurrentAndPrevious { current: String, previous: String },
}

impl From<&InstallationState> for PackageState {
    fn from(record: &InstallationState) -> Self {
        match (&record.current_package_hash, &record.previous_package_hash) {
            (None, _) => Self::NoCurrent,
            (Some(current), None) => Self::HasCurrent(current.clone()),
            (Some(current), Some(previous)) => Self::HasCurrentAndPrevious {
                current: current.clone(),
                previous: previous.clone(),
            },
        }
    }
}

impl PackageState {
    pub fn current(&self) -> Option<&str> {
        match self {
            Self::NoCurrent => None,
            Self::HasCurrent(current) | Self::HasCurrentAndPrevious { current, .. } => Some(current),
        }
    }

    pub fn previous(&self) -> Option<&str> {
        match self {
            Self::HasCurrentAndPrevious { previous, .. } => Some(previous),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The package was already current; nothing was touched
    AlreadyInstalled,
    Installed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOutcome {
    NothingToRollBack,
    RolledBack { restored: String },
}

/// Applies install, rollback and reset transitions to a package store
#[derive(Debug, Clone)]
pub struct Installer {
    store: PackageStore,
}

impl Installer {
    pub fn new(store: PackageStore) -> Self {
        Self { store }
    }

    pub fn state(&self) -> Result<PackageState> {
        Ok(PackageState::from(&self.store.load_state()?))
    }

    /// Make `package_hash` current.
    ///
    /// With `retain_previous` the old current becomes previous; without it the
    /// old packages are discarded and no previous is recorded.
    pub fn install(&self, package_hash: &str, retain_previous: bool) -> Result<InstallOutcome> {
        let mut record = self.store.load_state()?;
        if record.current_package_hash.as_deref() == Some(package_hash) {
            return Ok(InstallOutcome::AlreadyInstalled);
        }

        let vacated = record.previous_package_hash.take();
        if vacated.is_some() {
            self.store.save_state(&record)?;
        }
        if let Some(previous) = vacated.as_deref().filter(|previous| *previous != package_hash) {
            self.store.remove_package(previous)?;
        }

        if retain_previous {
            record.previous_package_hash = record.current_package_hash.take();
        } else if let Some(current) = record.current_package_hash.as_deref() {
            self.store.remove_package(current)?;
        }

        record.current_package_hash = Some(package_hash.to_string());
        self.store.save_state(&record)?;
        info!(
            "Installed package {} (previous: {})",
            package_hash,
            record.previous_package_hash.as_deref().unwrap_or("none")
        );
        Ok(InstallOutcome::Installed)
    }

    /// Drop the current package and promote the previous one
    pub fn rollback(&self) -> Result<RollbackOutcome> {
        let mut record = self.store.load_state()?;
        let Some(previous) = record.previous_package_hash.take() else {
            return Ok(RollbackOutcome::NothingToRollBack);
        };

        if let Some(current) = record.current_package_hash.as_deref() {
            self.store.remove_package(current)?;
        }
        record.current_package_hash = Some(previous.clone());
        self.store.save_state(&record)?;
        info!("Rolled back to package {}", previous);
        Ok(RollbackOutcome::RolledBack { restored: previous })
    }

    /// Delete the whole engine root and forget every package
    pub fn clear(&self) -> Result<()> {
        remove_dir_if_exists(self.store.paths().root())?;
        info!("Cleared all updates under {}", self.store.paths().root().display());
        Ok(())
    }
}
