//! Package Metadata Store
//!
//! Persists the current/previous pointer record and per-package descriptors.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::paths::UpdatePaths;
use crate::engine::error::{Result, UpdateError};

/// Pointer record stored in the status file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationState {
    #[serde(rename = "currentPackage", default, skip_serializing_if = "Option::is_none")]
    pub current_package_hash: Option<String>,
    #[serde(rename = "previousPackage", default, skip_serializing_if = "Option::is_none")]
    pub previous_package_hash: Option<String>,
}

/// Update descriptor as supplied by the server, plus the resolved bundle path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageDescriptor {
    pub package_hash: String,
    #[serde(default)]
    pub download_url: String,
    #[serde(rename = "bundlePath", default, skip_serializing_if = "Option::is_none")]
    pub relative_bundle_path: Option<String>,
    /// Server fields the engine passes through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PackageDescriptor {
    pub fn new(package_hash: impl Into<String>, download_url: impl Into<String>) -> Self {
        Self {
            package_hash: package_hash.into(),
            download_url: download_url.into(),
            relative_bundle_path: None,
            extra: Map::new(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            UpdateError::unknown(format!("Error reading descriptor {}", path.display()), e)
        })?;
        serde_json::from_str(&content).map_err(|e| {
            UpdateError::unknown(format!("Error parsing descriptor {}", path.display()), e)
        })
    }
}

/// A package hash becomes a folder name, so it must be a single plain path segment.
pub fn validate_package_hash(package_hash: &str) -> Result<()> {
    let valid = !package_hash.is_empty()
        && package_hash != "."
        && package_hash != ".."
        && !package_hash.contains(['/', '\\'])
        && !UpdatePaths::is_reserved_name(package_hash);
    if valid {
        Ok(())
    } else {
        Err(UpdateError::invalid(format!(
            "package hash \"{}\" cannot be used as a package folder name",
            package_hash
        )))
    }
}

/// What a package folder on disk currently holds
#[derive(Debug, Clone, PartialEq)]
pub enum PackageFolder {
    Absent,
    /// Folder exists without a readable descriptor (interrupted install)
    Staging { path: PathBuf },
    Complete {
        path: PathBuf,
        descriptor: PackageDescriptor,
    },
}

impl PackageFolder {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete { .. })
    }

    pub fn descriptor(&self) -> Option<&PackageDescriptor> {
        match self {
            Self::Complete { descriptor, .. } => Some(descriptor),
            _ => None,
        }
    }
}

/// Reads and writes engine records under one install root
#[derive(Debug, Clone)]
pub struct PackageStore {
    paths: UpdatePaths,
}

impl PackageStore {
    pub fn new(paths: UpdatePaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &UpdatePaths {
        &self.paths
    }

    /// Load the pointer record, or an empty one on first run
    pub fn load_state(&self) -> Result<InstallationState> {
        let status_path = self.paths.status_file();
        if !status_path.exists() {
            return Ok(InstallationState::default());
        }
        let content = fs::read_to_string(&status_path)
            .map_err(|e| UpdateError::unknown("Error getting current package info", e))?;
        serde_json::from_str(&content)
            .map_err(|e| UpdateError::unknown("Error getting current package info", e))
    }

    pub fn save_state(&self, state: &InstallationState) -> Result<()> {
        write_json_atomic(&self.paths.status_file(), state)
            .map_err(|e| UpdateError::unknown("Error updating current package info", e))?;
        debug!(
            current = ?state.current_package_hash,
            previous = ?state.previous_package_hash,
            "installation state saved"
        );
        Ok(())
    }

    /// Descriptor of a package, `None` when the folder is absent or incomplete
    pub fn package(&self, package_hash: &str) -> Option<PackageDescriptor> {
        PackageDescriptor::from_file(&self.paths.package_descriptor_file(package_hash)).ok()
    }

    pub fn write_descriptor(&self, package_folder: &Path, descriptor: &PackageDescriptor) -> Result<()> {
        let path = UpdatePaths::descriptor_in(package_folder);
        write_json_atomic(&path, descriptor).map_err(|e| {
            UpdateError::unknown(format!("Error writing descriptor {}", path.display()), e)
        })
    }

    pub fn inspect(&self, package_hash: &str) -> PackageFolder {
        let path = self.paths.package_folder(package_hash);
        if !path.is_dir() {
            return PackageFolder::Absent;
        }
        match PackageDescriptor::from_file(&UpdatePaths::descriptor_in(&path)) {
            Ok(descriptor) => PackageFolder::Complete { path, descriptor },
            Err(_) => PackageFolder::Staging { path },
        }
    }

    pub fn remove_package(&self, package_hash: &str) -> Result<()> {
        remove_dir_if_exists(&self.paths.package_folder(package_hash))
    }

    /// Hashes of every package folder under the root, complete or not
    pub fn list_package_folders(&self) -> Result<Vec<String>> {
        let root = self.paths.root();
        if !root.exists() {
            return Ok(vec![]);
        }
        let entries = fs::read_dir(root)
            .map_err(|e| UpdateError::unknown(format!("Error listing {}", root.display()), e))?;

        let mut hashes = Vec::new();
        for entry in entries {
            let entry = entry
                .map_err(|e| UpdateError::unknown(format!("Error listing {}", root.display()), e))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if !UpdatePaths::is_reserved_name(name) {
                    hashes.push(name.to_string());
                }
            }
        }
        hashes.sort();
        Ok(hashes)
    }
}

/// Write to a temp file first, then rename over the target
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, &content)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

pub(crate) fn remove_dir_if_exists(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)
            .map_err(|e| UpdateError::unknown(format!("Error deleting {}", path.display()), e))?;
    }
    Ok(())
}
