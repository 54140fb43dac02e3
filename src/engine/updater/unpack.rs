//! Unpack & Merge
//!
//! Turns a downloaded artifact into a populated package folder. Container
//! updates are extracted, diff updates are reconciled against the installed
//! package, and the bundle file is located in the merged tree.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::ZipArchive;

use super::paths::{relative_slash_path, UpdatePaths};
use super::store::remove_dir_if_exists;
use crate::engine::error::{Result, UpdateError};

/// What staging produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedPackage {
    pub relative_bundle_path: String,
    pub is_diff: bool,
}

/// Files to carry forward unchanged from the installed package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffManifest {
    pub files: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ManifestFormat {
    List(Vec<String>),
    Object { files: Vec<String> },
}

impl DiffManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            UpdateError::unknown(format!("Error reading {}", path.display()), e)
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let files = match serde_json::from_str::<ManifestFormat>(content) {
            Ok(ManifestFormat::List(files)) | Ok(ManifestFormat::Object { files }) => files,
            Err(e) => {
                return Err(UpdateError::invalid(format!(
                    "the diff manifest could not be parsed: {}",
                    e
                )))
            }
        };

        for file in &files {
            let is_plain_relative = !file.is_empty()
                && Path::new(file)
                    .components()
                    .all(|c| matches!(c, Component::Normal(_)));
            if !is_plain_relative {
                return Err(UpdateError::invalid(format!(
                    "the diff manifest lists \"{}\", which is not a relative path inside the package",
                    file
                )));
            }
        }
        Ok(Self { files })
    }
}

/// Stages downloaded artifacts into package folders
pub struct Unpacker {
    unzipped_folder: PathBuf,
}

impl Unpacker {
    pub fn new(unzipped_folder: PathBuf) -> Self {
        Self { unzipped_folder }
    }

    /// Populate `new_package_folder` from `artifact`.
    ///
    /// Any existing `new_package_folder` is wiped first, so re-running after a
    /// crash starts from a clean slate.
    pub fn stage(
        &self,
        artifact: &Path,
        is_container: bool,
        expected_bundle_file_name: &str,
        current_package_folder: Option<&Path>,
        new_package_folder: &Path,
    ) -> Result<StagedPackage> {
        remove_dir_if_exists(new_package_folder)?;

        if !is_container {
            let target = new_package_folder.join(expected_bundle_file_name);
            move_file(artifact, &target)?;
            return Ok(StagedPackage {
                relative_bundle_path: expected_bundle_file_name.to_string(),
                is_diff: false,
            });
        }

        let staged = self.merge_container(
            artifact,
            expected_bundle_file_name,
            current_package_folder,
            new_package_folder,
        );
        if let Err(e) = remove_dir_if_exists(&self.unzipped_folder) {
            warn!("Could not remove unzip staging folder: {}", e);
        }
        staged
    }

    fn merge_container(
        &self,
        artifact: &Path,
        expected_bundle_file_name: &str,
        current_package_folder: Option<&Path>,
        new_package_folder: &Path,
    ) -> Result<StagedPackage> {
        remove_dir_if_exists(&self.unzipped_folder)?;
        extract_zip(artifact, &self.unzipped_folder)?;
        if let Err(e) = fs::remove_file(artifact) {
            warn!("Could not delete downloaded container {}: {}", artifact.display(), e);
        }

        create_dir(new_package_folder)?;

        let manifest_path = UpdatePaths::diff_manifest_in(&self.unzipped_folder);
        let is_diff = manifest_path.is_file();
        if is_diff {
            let manifest = DiffManifest::load(&manifest_path)?;
            let current = current_package_folder.ok_or_else(|| {
                UpdateError::invalid("a diff update was received but no package is currently installed")
            })?;
            copy_forward(&manifest, current, new_package_folder)?;
            fs::remove_file(&manifest_path).map_err(|e| {
                UpdateError::unknown(format!("Error deleting {}", manifest_path.display()), e)
            })?;
        }

        copy_dir_contents(&self.unzipped_folder, new_package_folder)?;

        let relative_bundle_path = find_bundle(new_package_folder, expected_bundle_file_name)?
            .ok_or_else(|| {
                UpdateError::invalid(format!(
                    "a bundle file named \"{}\" could not be found within the downloaded contents. \
                     Release updates using the exact bundle file name shipped with the app binary",
                    expected_bundle_file_name
                ))
            })?;

        if is_diff {
            info!("Applying diff update.");
        } else {
            info!("Applying full update.");
        }
        Ok(StagedPackage {
            relative_bundle_path,
            is_diff,
        })
    }
}

fn extract_zip(archive_path: &Path, destination: &Path) -> Result<()> {
    let file = File::open(archive_path).map_err(|e| {
        UpdateError::unknown(format!("Error opening {}", archive_path.display()), e)
    })?;
    let mut archive = ZipArchive::new(file).map_err(|e| {
        UpdateError::invalid(format!("the downloaded container could not be read: {}", e))
    })?;
    create_dir(destination)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| {
            UpdateError::invalid(format!("the downloaded container is corrupt: {}", e))
        })?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(UpdateError::invalid(format!(
                "container entry \"{}\" points outside the package folder",
                entry.name()
            )));
        };
        let out_path = destination.join(relative);

        if entry.is_dir() {
            create_dir(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            create_dir(parent)?;
        }
        let mut out_file = File::create(&out_path).map_err(|e| {
            UpdateError::unknown(format!("Error creating {}", out_path.display()), e)
        })?;
        io::copy(&mut entry, &mut out_file).map_err(|e| {
            UpdateError::unknown(format!("Error extracting {}", out_path.display()), e)
        })?;
    }
    debug!("Extracted {} entries into {}", archive.len(), destination.display());
    Ok(())
}

fn copy_forward(manifest: &DiffManifest, current: &Path, new_package_folder: &Path) -> Result<()> {
    for file in &manifest.files {
        let source = current.join(file);
        let target = new_package_folder.join(file);
        if source.is_dir() {
            copy_dir_contents(&source, &target)?;
        } else if source.is_file() {
            copy_file(&source, &target)?;
        } else {
            warn!("Diff manifest lists {} but the installed package has no such file", file);
        }
    }
    Ok(())
}

/// Copy everything under `source` into `target`, overwriting existing files
pub fn copy_dir_contents(source: &Path, target: &Path) -> Result<()> {
    create_dir(target)?;
    for entry in WalkDir::new(source).min_depth(1) {
        let entry = entry.map_err(|e| {
            UpdateError::unknown(format!("Error walking {}", source.display()), e)
        })?;
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let destination = target.join(relative);
        if entry.file_type().is_dir() {
            create_dir(&destination)?;
        } else {
            copy_file(entry.path(), &destination)?;
        }
    }
    Ok(())
}

/// Shallowest file named `bundle_file_name`, ties broken by path
pub fn find_bundle(folder: &Path, bundle_file_name: &str) -> Result<Option<String>> {
    let file_name = Path::new(bundle_file_name)
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();

    let mut best: Option<(usize, String)> = None;
    for entry in WalkDir::new(folder).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            UpdateError::unknown(format!("Error walking {}", folder.display()), e)
        })?;
        if !entry.file_type().is_file() || entry.file_name() != file_name.as_os_str() {
            continue;
        }
        let Some(relative) = relative_slash_path(folder, entry.path()) else {
            continue;
        };
        let candidate = (entry.depth(), relative);
        if best.as_ref().map_or(true, |current| candidate < *current) {
            best = Some(candidate);
        }
    }
    Ok(best.map(|(_, relative)| relative))
}

pub(crate) fn move_file(source: &Path, target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        create_dir(parent)?;
    }
    if fs::rename(source, target).is_ok() {
        return Ok(());
    }
    // rename fails across filesystems
    copy_file(source, target)?;
    fs::remove_file(source)
        .map_err(|e| UpdateError::unknown(format!("Error deleting {}", source.display()), e))
}

fn copy_file(source: &Path, target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        create_dir(parent)?;
    }
    fs::copy(source, target).map_err(|e| {
        UpdateError::unknown(
            format!("Error copying {} to {}", source.display(), target.display()),
            e,
        )
    })?;
    Ok(())
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .map_err(|e| UpdateError::unknown(format!("Error creating {}", path.display()), e))
}
