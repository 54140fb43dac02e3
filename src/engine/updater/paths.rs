//! Path Resolver
//!
//! Well-known locations under the engine root. Pure path composition, no I/O.

use std::path::{Path, PathBuf};

pub const ROOT_FOLDER_NAME: &str = "BundlePush";
pub const TEST_PACKAGES_FOLDER_NAME: &str = "TestPackages";
pub const DOWNLOAD_FILE_NAME: &str = "download.zip";
pub const UNZIPPED_FOLDER_NAME: &str = "unzipped";
pub const STATUS_FILE_NAME: &str = "bundlepush.json";
pub const PACKAGE_FILE_NAME: &str = "app.json";
pub const DIFF_MANIFEST_FILE_NAME: &str = "diff-manifest.json";
pub const SIGNATURE_FILE_NAME: &str = ".bundle-signature";

/// Filesystem layout for one install root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePaths {
    root: PathBuf,
}

impl UpdatePaths {
    pub fn new(storage_root: &Path, test_configuration: bool) -> Self {
        let mut root = storage_root.join(ROOT_FOLDER_NAME);
        if test_configuration {
            root = root.join(TEST_PACKAGES_FOLDER_NAME);
        }
        Self { root }
    }

    /// Root of everything the engine owns
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn download_file(&self) -> PathBuf {
        self.root.join(DOWNLOAD_FILE_NAME)
    }

    pub fn unzipped_folder(&self) -> PathBuf {
        self.root.join(UNZIPPED_FOLDER_NAME)
    }

    pub fn status_file(&self) -> PathBuf {
        self.root.join(STATUS_FILE_NAME)
    }

    pub fn package_folder(&self, package_hash: &str) -> PathBuf {
        self.root.join(package_hash)
    }

    pub fn package_descriptor_file(&self, package_hash: &str) -> PathBuf {
        Self::descriptor_in(&self.package_folder(package_hash))
    }

    pub fn descriptor_in(package_folder: &Path) -> PathBuf {
        package_folder.join(PACKAGE_FILE_NAME)
    }

    pub fn signature_in(package_folder: &Path) -> PathBuf {
        package_folder.join(SIGNATURE_FILE_NAME)
    }

    pub fn diff_manifest_in(staging_folder: &Path) -> PathBuf {
        staging_folder.join(DIFF_MANIFEST_FILE_NAME)
    }

    /// Names under the root that are engine bookkeeping rather than packages
    pub fn is_reserved_name(name: &str) -> bool {
        matches!(
            name,
            DOWNLOAD_FILE_NAME | UNZIPPED_FOLDER_NAME | STATUS_FILE_NAME | TEST_PACKAGES_FOLDER_NAME
        ) || name.ends_with(".tmp")
    }
}

/// `path` relative to `base`, joined with `/` whatever the host separator
pub fn relative_slash_path(base: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(base).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_slash_path() {
        let base = Path::new("/data/pkg");
        assert_eq!(
            relative_slash_path(base, &base.join("assets").join("logo.png")),
            Some("assets/logo.png".to_string())
        );
        assert_eq!(relative_slash_path(base, base), None);
        assert_eq!(relative_slash_path(base, Path::new("/elsewhere/x")), None);
    }

    #[test]
    fn test_layout() {
        let paths = UpdatePaths::new(Path::new("/data/app"), false);
        assert_eq!(paths.root(), Path::new("/data/app/BundlePush"));
        assert_eq!(paths.download_file(), PathBuf::from("/data/app/BundlePush/download.zip"));
        assert_eq!(paths.unzipped_folder(), PathBuf::from("/data/app/BundlePush/unzipped"));
        assert_eq!(paths.status_file(), PathBuf::from("/data/app/BundlePush/bundlepush.json"));
        assert_eq!(
            paths.package_descriptor_file("abc123"),
            PathBuf::from("/data/app/BundlePush/abc123/app.json")
        );
    }

    #[test]
    fn test_test_configuration_root() {
        let paths = UpdatePaths::new(Path::new("/data/app"), true);
        assert_eq!(paths.root(), Path::new("/data/app/BundlePush/TestPackages"));
        assert_eq!(
            paths.package_folder("abc123"),
            PathBuf::from("/data/app/BundlePush/TestPackages/abc123")
        );
    }

    #[test]
    fn test_reserved_names() {
        assert!(UpdatePaths::is_reserved_name("download.zip"));
        assert!(UpdatePaths::is_reserved_name("bundlepush.tmp"));
        assert!(!UpdatePaths::is_reserved_name("abc123"));
    }
}
