//! Update Manager
//!
//! Composes the downloader, unpacker, verifier and state machine into the
//! calls a host runtime makes. Pointers are only touched by `install_package`,
//! `rollback_package` and `clear_updates`; a failed download never changes
//! which package is current.

use std::fs;
use std::path::PathBuf;

use tracing::{info, warn};

use super::download::{discard_partial, DownloadProgress, DownloadResult, Downloader, HttpTransport};
use super::paths::UpdatePaths;
use super::state::{InstallOutcome, Installer, PackageState, RollbackOutcome};
use super::store::{
    remove_dir_if_exists, validate_package_hash, InstallationState, PackageDescriptor, PackageFolder,
    PackageStore,
};
use super::unpack::{move_file, Unpacker};
use super::verify::{IntegrityVerifier, TrustDecision};
use crate::engine::config::UpdaterConfig;
use crate::engine::error::{Result, UpdateError};

/// Entry point for the update lifecycle of one install root
pub struct UpdateManager {
    store: PackageStore,
    installer: Installer,
    downloader: Downloader,
    unpacker: Unpacker,
    verifier: IntegrityVerifier,
    bundle_file_name: String,
}

impl UpdateManager {
    /// Create a manager that downloads over HTTP
    pub fn new(config: &UpdaterConfig) -> Result<Self> {
        let downloader = Downloader::new(&config.download)?;
        Self::build(config, downloader)
    }

    /// Create a manager with a custom transport (for testing)
    pub fn with_transport(config: &UpdaterConfig, transport: Box<dyn HttpTransport>) -> Result<Self> {
        Self::build(config, Downloader::with_transport(transport, &config.download))
    }

    fn build(config: &UpdaterConfig, downloader: Downloader) -> Result<Self> {
        let verifier = IntegrityVerifier::from_public_key(config.public_key.as_deref())
            .map_err(|e| UpdateError::unknown("Error loading the configured public key", e))?;
        let paths = UpdatePaths::new(&config.storage_root, config.test_configuration);
        let store = PackageStore::new(paths.clone());

        Ok(Self {
            installer: Installer::new(store.clone()),
            unpacker: Unpacker::new(paths.unzipped_folder()),
            store,
            downloader,
            verifier,
            bundle_file_name: config.bundle_file_name.clone(),
        })
    }

    pub fn paths(&self) -> &UpdatePaths {
        self.store.paths()
    }

    /// Bundle file name from the configuration
    pub fn bundle_file_name(&self) -> &str {
        &self.bundle_file_name
    }

    /// Download, stage and verify a package without installing it.
    ///
    /// Returns the descriptor as persisted in the package folder, with the
    /// resolved bundle path filled in.
    pub fn download_package<F>(
        &self,
        descriptor: &PackageDescriptor,
        expected_bundle_file_name: &str,
        on_progress: F,
    ) -> Result<PackageDescriptor>
    where
        F: FnMut(DownloadProgress),
    {
        let package_hash = descriptor.package_hash.as_str();
        validate_package_hash(package_hash)?;

        let record = self.store.load_state()?;
        if record.current_package_hash.as_deref() == Some(package_hash) {
            return Err(UpdateError::invalid(format!(
                "package {} is already the current package",
                package_hash
            )));
        }
        // Restaging wipes the folder first; the previous slot must stay intact for rollback.
        if record.previous_package_hash.as_deref() == Some(package_hash) {
            return match self.store.inspect(package_hash) {
                PackageFolder::Complete { descriptor, .. } => {
                    info!("Package {} is already staged as the previous package", package_hash);
                    Ok(descriptor)
                }
                _ => Err(UpdateError::invalid(format!(
                    "package {} is the previous package and cannot be restaged",
                    package_hash
                ))),
            };
        }

        let download_path = self.paths().download_file();
        let download = self.downloader.download(&descriptor.download_url, &download_path, on_progress)?;

        let new_folder = self.paths().package_folder(package_hash);
        let staged = self.stage_and_verify(descriptor, &record, &download, expected_bundle_file_name);
        if staged.is_err() {
            if let Err(e) = remove_dir_if_exists(&new_folder) {
                warn!("Could not remove partial package {}: {}", new_folder.display(), e);
            }
            discard_partial(&download_path);
        }
        staged
    }

    fn stage_and_verify(
        &self,
        descriptor: &PackageDescriptor,
        record: &InstallationState,
        download: &DownloadResult,
        expected_bundle_file_name: &str,
    ) -> Result<PackageDescriptor> {
        let package_hash = descriptor.package_hash.as_str();
        let new_folder = self.paths().package_folder(package_hash);
        let current_folder = record
            .current_package_hash
            .as_deref()
            .map(|hash| self.paths().package_folder(hash))
            .filter(|folder| folder.is_dir());

        let staged = self.unpacker.stage(
            &download.path,
            download.is_container,
            expected_bundle_file_name,
            current_folder.as_deref(),
            &new_folder,
        )?;

        let decision = self.verifier.verify(&new_folder, package_hash, staged.is_diff)?;
        info!("Package {} staged, trust decision: {:?}", package_hash, decision);

        // A descriptor shipped inside the container must not mark the folder complete.
        let descriptor_path = UpdatePaths::descriptor_in(&new_folder);
        if descriptor_path.exists() {
            fs::remove_file(&descriptor_path).map_err(|e| {
                UpdateError::unknown(format!("Error deleting {}", descriptor_path.display()), e)
            })?;
        }

        let mut persisted = descriptor.clone();
        persisted.relative_bundle_path = Some(staged.relative_bundle_path);
        self.store.write_descriptor(&new_folder, &persisted)?;
        Ok(persisted)
    }

    /// Make a fully staged package current
    pub fn install_package(&self, package_hash: &str, retain_previous: bool) -> Result<InstallOutcome> {
        validate_package_hash(package_hash)?;
        match self.store.inspect(package_hash) {
            PackageFolder::Complete { .. } => self.installer.install(package_hash, retain_previous),
            PackageFolder::Staging { .. } => Err(UpdateError::invalid(format!(
                "package {} was not completely staged",
                package_hash
            ))),
            PackageFolder::Absent => Err(UpdateError::invalid(format!(
                "package {} has not been downloaded",
                package_hash
            ))),
        }
    }

    pub fn rollback_package(&self) -> Result<RollbackOutcome> {
        self.installer.rollback()
    }

    /// Delete every package and the installation record
    pub fn clear_updates(&self) -> Result<()> {
        self.installer.clear()
    }

    pub fn state(&self) -> Result<PackageState> {
        self.installer.state()
    }

    /// Get the raw installation record
    pub fn current_package_info(&self) -> Result<InstallationState> {
        self.store.load_state()
    }

    pub fn current_package_hash(&self) -> Result<Option<String>> {
        Ok(self.store.load_state()?.current_package_hash)
    }

    pub fn previous_package_hash(&self) -> Result<Option<String>> {
        Ok(self.store.load_state()?.previous_package_hash)
    }

    /// Get the folder of the current package, if one is recorded
    pub fn current_package_folder(&self) -> Result<Option<PathBuf>> {
        Ok(self
            .current_package_hash()?
            .map(|hash| self.paths().package_folder(&hash)))
    }

    pub fn current_package(&self) -> Result<Option<PackageDescriptor>> {
        Ok(self.current_package_hash()?.and_then(|hash| self.store.package(&hash)))
    }

    pub fn previous_package(&self) -> Result<Option<PackageDescriptor>> {
        Ok(self.previous_package_hash()?.and_then(|hash| self.store.package(&hash)))
    }

    /// Get a package descriptor, `None` when absent or incomplete
    pub fn package(&self, package_hash: &str) -> Option<PackageDescriptor> {
        self.store.package(package_hash)
    }

    pub fn package_folder(&self, package_hash: &str) -> PackageFolder {
        self.store.inspect(package_hash)
    }

    /// Get the runnable bundle of the current package.
    ///
    /// Falls back to `bundle_file_name` at the package root when the descriptor
    /// has no resolved bundle path.
    pub fn current_bundle_path(&self, bundle_file_name: &str) -> Result<Option<PathBuf>> {
        let Some(folder) = self.current_package_folder()? else {
            return Ok(None);
        };
        let relative = self
            .current_package()?
            .and_then(|descriptor| descriptor.relative_bundle_path)
            .unwrap_or_else(|| bundle_file_name.to_string());
        Ok(Some(folder.join(relative)))
    }

    /// Re-verify an existing package folder
    pub fn verify_package(&self, package_hash: &str, is_diff: bool) -> Result<TrustDecision> {
        validate_package_hash(package_hash)?;
        match self.store.inspect(package_hash) {
            PackageFolder::Absent => Err(UpdateError::invalid(format!(
                "package {} has not been downloaded",
                package_hash
            ))),
            PackageFolder::Staging { path } | PackageFolder::Complete { path, .. } => {
                self.verifier.verify(&path, package_hash, is_diff)
            }
        }
    }

    /// Overwrite the current bundle file in place with the resource at `url`
    pub fn download_and_replace_current_bundle(&self, url: &str, bundle_file_name: &str) -> Result<PathBuf> {
        let target = self.current_bundle_path(bundle_file_name)?.ok_or_else(|| {
            UpdateError::invalid("there is no current package whose bundle could be replaced")
        })?;

        let download_path = self.paths().download_file();
        let download = self.downloader.download(url, &download_path, |_| {})?;
        if download.is_container {
            discard_partial(&download_path);
            return Err(UpdateError::invalid(
                "a compressed container cannot replace a bundle file",
            ));
        }
        move_file(&download_path, &target)?;
        info!("Replaced current bundle {}", target.display());
        Ok(target)
    }

    /// Delete package folders left behind by interrupted installs.
    ///
    /// Returns the hashes that were removed.
    pub fn cleanup_incomplete(&self) -> Result<Vec<String>> {
        let record = self.store.load_state()?;
        let referenced = |hash: &str| {
            record.current_package_hash.as_deref() == Some(hash)
                || record.previous_package_hash.as_deref() == Some(hash)
        };

        let mut removed = Vec::new();
        for hash in self.store.list_package_folders()? {
            if referenced(&hash) || self.store.inspect(&hash).is_complete() {
                continue;
            }
            self.store.remove_package(&hash)?;
            info!("Removed incomplete package {}", hash);
            removed.push(hash);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::updater::download::tests::{ScriptedTransport, Step};
    use crate::engine::updater::unpack::tests::write_zip;
    use crate::engine::updater::verify::{compute_folder_hash, UntrustedReason};
    use ed25519_dalek::SigningKey;
    use tempfile::{tempdir, TempDir};

    const URL: &str = "https://cdn.example.com/packages/";

    struct Harness {
        dir: TempDir,
        config: UpdaterConfig,
    }

    impl Harness {
        fn new() -> Self {
            let dir = tempdir().unwrap();
            let mut config = UpdaterConfig::for_root(dir.path());
            config.download.max_retries = 2;
            Self { dir, config }
        }

        fn manager(&self, payload: &[u8]) -> UpdateManager {
            let transport = ScriptedTransport::new(payload, vec![]);
            UpdateManager::with_transport(&self.config, Box::new(transport)).unwrap()
        }

        fn zip_payload(&self, entries: &[(&str, &str)]) -> Vec<u8> {
            let path = self.dir.path().join("fixture.zip");
            write_zip(&path, entries);
            let bytes = fs::read(&path).unwrap();
            fs::remove_file(&path).unwrap();
            bytes
        }

        /// Stage and install a full update built from `entries`
        fn install_full(&self, hash: &str, entries: &[(&str, &str)]) {
            let manager = self.manager(&self.zip_payload(entries));
            manager
                .download_package(&descriptor(hash), "index.bundle", |_| {})
                .unwrap();
            manager.install_package(hash, true).unwrap();
        }
    }

    fn descriptor(hash: &str) -> PackageDescriptor {
        PackageDescriptor::new(hash, format!("{}{}", URL, hash))
    }

    fn expected_digest(files: &[(&str, &str)]) -> String {
        let dir = tempdir().unwrap();
        for (name, data) in files {
            let path = dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, data).unwrap();
        }
        compute_folder_hash(dir.path()).unwrap()
    }

    #[test]
    fn test_full_update_without_key_skips_hash_check() {
        let harness = Harness::new();
        let payload = harness.zip_payload(&[("index.bundle", "bundle v1"), ("assets/logo.png", "logo")]);
        let manager = harness.manager(&payload);

        let mut last_progress = None;
        let persisted = manager
            .download_package(&descriptor("abc123"), "index.bundle", |p| last_progress = Some(p))
            .unwrap();

        assert_eq!(persisted.relative_bundle_path.as_deref(), Some("index.bundle"));
        let progress = last_progress.unwrap();
        assert_eq!(progress.received_bytes, payload.len() as u64);
        assert!(manager.package_folder("abc123").is_complete());
        assert_eq!(manager.current_package_hash().unwrap(), None);

        assert_eq!(manager.install_package("abc123", true).unwrap(), InstallOutcome::Installed);
        assert_eq!(manager.current_package_hash().unwrap().as_deref(), Some("abc123"));
        assert_eq!(
            manager.current_bundle_path("index.bundle").unwrap(),
            Some(manager.paths().package_folder("abc123").join("index.bundle"))
        );
        assert!(!manager.paths().download_file().exists());
        assert!(!manager.paths().unzipped_folder().exists());
    }

    #[test]
    fn test_diff_update_is_hash_checked_against_merged_tree() {
        let harness = Harness::new();
        harness.install_full("v1", &[("index.bundle", "bundle v1"), ("assets/logo.png", "logo")]);

        let merged_hash = expected_digest(&[("index.bundle", "bundle v2"), ("assets/logo.png", "logo")]);
        let payload = harness.zip_payload(&[
            ("diff-manifest.json", r#"["assets/logo.png"]"#),
            ("index.bundle", "bundle v2"),
        ]);
        let manager = harness.manager(&payload);

        manager
            .download_package(&descriptor(&merged_hash), "index.bundle", |_| {})
            .unwrap();
        let folder = manager.paths().package_folder(&merged_hash);
        assert_eq!(fs::read_to_string(folder.join("assets/logo.png")).unwrap(), "logo");
        assert_eq!(fs::read_to_string(folder.join("index.bundle")).unwrap(), "bundle v2");
        assert!(!folder.join("diff-manifest.json").exists());
        assert_eq!(
            manager.verify_package(&merged_hash, true).unwrap(),
            TrustDecision::Untrusted(UntrustedReason::HashOnly)
        );

        manager.install_package(&merged_hash, true).unwrap();
        assert_eq!(manager.previous_package_hash().unwrap().as_deref(), Some("v1"));
    }

    #[test]
    fn test_diff_update_with_wrong_hash_is_discarded() {
        let harness = Harness::new();
        harness.install_full("v1", &[("index.bundle", "bundle v1"), ("assets/logo.png", "logo")]);

        let payload = harness.zip_payload(&[
            ("diff-manifest.json", r#"["assets/logo.png"]"#),
            ("index.bundle", "bundle v2"),
        ]);
        let manager = harness.manager(&payload);
        let before = manager.current_package_info().unwrap();

        let err = manager
            .download_package(&descriptor("deadbeef"), "index.bundle", |_| {})
            .unwrap_err();

        assert!(err.is_content_error());
        assert_eq!(manager.package_folder("deadbeef"), PackageFolder::Absent);
        assert_eq!(manager.current_package_info().unwrap(), before);
    }

    #[test]
    fn test_missing_bundle_leaves_no_partial_folder() {
        let harness = Harness::new();
        let manager = harness.manager(&harness.zip_payload(&[("main.jsbundle", "x")]));

        let err = manager
            .download_package(&descriptor("abc123"), "index.bundle", |_| {})
            .unwrap_err();

        assert!(matches!(err, UpdateError::InvalidUpdate(_)));
        assert_eq!(manager.package_folder("abc123"), PackageFolder::Absent);
    }

    #[test]
    fn test_network_failure_keeps_current_package() {
        let harness = Harness::new();
        harness.install_full("v1", &[("index.bundle", "bundle v1")]);

        let manager =
            UpdateManager::with_transport(&harness.config, Box::new(ScriptedTransport::always(Step::Refuse)))
                .unwrap();
        let err = manager
            .download_package(&descriptor("v2"), "index.bundle", |_| {})
            .unwrap_err();

        assert!(matches!(err, UpdateError::Network { attempts: 3, .. }));
        assert_eq!(manager.current_package_hash().unwrap().as_deref(), Some("v1"));
        assert_eq!(manager.package_folder("v2"), PackageFolder::Absent);
        assert!(!manager.paths().download_file().exists());
    }

    #[test]
    fn test_raw_bundle_is_installed_under_expected_name() {
        let harness = Harness::new();
        let manager = harness.manager(b"plain bundle");

        let persisted = manager
            .download_package(&descriptor("raw1"), "main.jsbundle", |_| {})
            .unwrap();

        assert_eq!(persisted.relative_bundle_path.as_deref(), Some("main.jsbundle"));
        let bundle = manager.paths().package_folder("raw1").join("main.jsbundle");
        assert_eq!(fs::read(bundle).unwrap(), b"plain bundle");
    }

    #[test]
    fn test_configured_key_rejects_unsigned_update() {
        let mut harness = Harness::new();
        let key = SigningKey::from_bytes(&[3u8; 32]);
        harness.config.public_key = Some(hex::encode(key.verifying_key().to_bytes()));
        let manager = harness.manager(&harness.zip_payload(&[("index.bundle", "bundle")]));

        let err = manager
            .download_package(&descriptor("abc123"), "index.bundle", |_| {})
            .unwrap_err();

        assert!(err.is_content_error());
        assert_eq!(manager.package_folder("abc123"), PackageFolder::Absent);
    }

    #[test]
    fn test_invalid_public_key_fails_construction() {
        let mut harness = Harness::new();
        harness.config.public_key = Some("abcd".to_string());
        let transport = ScriptedTransport::new(b"", vec![]);
        assert!(UpdateManager::with_transport(&harness.config, Box::new(transport)).is_err());
    }

    #[test]
    fn test_rejects_unsafe_hash_before_download() {
        let harness = Harness::new();
        let transport = ScriptedTransport::new(b"bundle", vec![]);
        let offsets = transport.offsets();
        let manager = UpdateManager::with_transport(&harness.config, Box::new(transport)).unwrap();

        let err = manager
            .download_package(&descriptor("../escape"), "index.bundle", |_| {})
            .unwrap_err();

        assert!(err.is_content_error());
        assert!(offsets.lock().unwrap().is_empty());
    }

    #[test]
    fn test_redownloading_current_package_is_refused() {
        let harness = Harness::new();
        harness.install_full("v1", &[("index.bundle", "bundle v1")]);
        let manager = harness.manager(&harness.zip_payload(&[("index.bundle", "other")]));

        assert!(manager
            .download_package(&descriptor("v1"), "index.bundle", |_| {})
            .is_err());
        let bundle = manager.current_bundle_path("index.bundle").unwrap().unwrap();
        assert_eq!(fs::read_to_string(bundle).unwrap(), "bundle v1");
    }

    #[test]
    fn test_redownloading_previous_package_keeps_it_for_rollback() {
        let harness = Harness::new();
        harness.install_full("v1", &[("index.bundle", "bundle v1")]);
        harness.install_full("v2", &[("index.bundle", "bundle v2")]);

        // A payload that would fail staging if it were ever unpacked.
        let transport = ScriptedTransport::new(&harness.zip_payload(&[("main.js", "no bundle")]), vec![]);
        let offsets = transport.offsets();
        let manager = UpdateManager::with_transport(&harness.config, Box::new(transport)).unwrap();

        let persisted = manager
            .download_package(&descriptor("v1"), "index.bundle", |_| {})
            .unwrap();
        assert_eq!(persisted.package_hash, "v1");
        assert!(offsets.lock().unwrap().is_empty());
        assert!(manager.package_folder("v1").is_complete());
        assert_eq!(manager.previous_package_hash().unwrap().as_deref(), Some("v1"));

        assert_eq!(
            manager.rollback_package().unwrap(),
            RollbackOutcome::RolledBack { restored: "v1".to_string() }
        );
        let bundle = manager.current_bundle_path("index.bundle").unwrap().unwrap();
        assert_eq!(fs::read_to_string(bundle).unwrap(), "bundle v1");
    }

    #[test]
    fn test_incomplete_previous_package_is_not_restaged() {
        let harness = Harness::new();
        harness.install_full("v1", &[("index.bundle", "bundle v1")]);
        harness.install_full("v2", &[("index.bundle", "bundle v2")]);
        let manager = harness.manager(&harness.zip_payload(&[("index.bundle", "bundle v1")]));
        fs::remove_file(manager.paths().package_descriptor_file("v1")).unwrap();

        let err = manager
            .download_package(&descriptor("v1"), "index.bundle", |_| {})
            .unwrap_err();
        assert!(err.is_content_error());
        assert!(manager.paths().package_folder("v1").join("index.bundle").exists());
    }

    #[test]
    fn test_install_requires_complete_folder() {
        let harness = Harness::new();
        let manager = harness.manager(b"");
        fs::create_dir_all(manager.paths().package_folder("half")).unwrap();

        assert!(matches!(
            manager.install_package("half", true),
            Err(UpdateError::InvalidUpdate(_))
        ));
        assert!(matches!(
            manager.install_package("missing", true),
            Err(UpdateError::InvalidUpdate(_))
        ));
        assert_eq!(manager.current_package_hash().unwrap(), None);
    }

    #[test]
    fn test_rollback_restores_previous_bundle() {
        let harness = Harness::new();
        harness.install_full("v1", &[("index.bundle", "bundle v1")]);
        harness.install_full("v2", &[("index.bundle", "bundle v2")]);
        let manager = harness.manager(b"");

        assert_eq!(manager.previous_package().unwrap().unwrap().package_hash, "v1");
        assert_eq!(
            manager.rollback_package().unwrap(),
            RollbackOutcome::RolledBack { restored: "v1".to_string() }
        );

        let bundle = manager.current_bundle_path("index.bundle").unwrap().unwrap();
        assert_eq!(fs::read_to_string(bundle).unwrap(), "bundle v1");
        assert_eq!(manager.package_folder("v2"), PackageFolder::Absent);
        assert_eq!(manager.state().unwrap(), PackageState::HasCurrent("v1".to_string()));
    }

    #[test]
    fn test_bundle_path_falls_back_to_file_name() {
        let harness = Harness::new();
        let manager = harness.manager(b"");
        assert_eq!(manager.current_bundle_path("index.bundle").unwrap(), None);

        let folder = manager.paths().package_folder("legacy");
        fs::create_dir_all(&folder).unwrap();
        manager
            .store
            .write_descriptor(&folder, &descriptor("legacy"))
            .unwrap();
        manager.install_package("legacy", false).unwrap();

        assert_eq!(
            manager.current_bundle_path("index.bundle").unwrap(),
            Some(folder.join("index.bundle"))
        );
    }

    #[test]
    fn test_replace_current_bundle_in_place() {
        let harness = Harness::new();
        harness.install_full("v1", &[("index.bundle", "bundle v1")]);
        let manager = harness.manager(b"reloaded bundle");

        let target = manager
            .download_and_replace_current_bundle("http://localhost:8081/index.bundle", "index.bundle")
            .unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "reloaded bundle");
        assert_eq!(target, manager.paths().package_folder("v1").join("index.bundle"));
    }

    #[test]
    fn test_replace_with_container_discards_download() {
        let harness = Harness::new();
        harness.install_full("v1", &[("index.bundle", "bundle v1")]);
        let manager = harness.manager(&harness.zip_payload(&[("index.bundle", "zipped")]));

        let err = manager
            .download_and_replace_current_bundle("http://localhost:8081/index.bundle", "index.bundle")
            .unwrap_err();

        assert!(err.is_content_error());
        assert!(!manager.paths().download_file().exists());
        let bundle = manager.current_bundle_path("index.bundle").unwrap().unwrap();
        assert_eq!(fs::read_to_string(bundle).unwrap(), "bundle v1");
    }

    #[test]
    fn test_replace_without_current_package_fails() {
        let harness = Harness::new();
        let manager = harness.manager(b"bundle");
        let err = manager
            .download_and_replace_current_bundle("http://localhost:8081/index.bundle", "index.bundle")
            .unwrap_err();
        assert!(err.is_content_error());
    }

    #[test]
    fn test_cleanup_removes_only_unreferenced_partial_folders() {
        let harness = Harness::new();
        harness.install_full("v1", &[("index.bundle", "bundle v1")]);
        let manager = harness.manager(b"");
        let paths = manager.paths();
        fs::create_dir_all(paths.package_folder("crashed")).unwrap();
        fs::write(paths.package_folder("crashed").join("index.bundle"), "partial").unwrap();

        let removed = manager.cleanup_incomplete().unwrap();

        assert_eq!(removed, vec!["crashed".to_string()]);
        assert!(manager.package_folder("v1").is_complete());
        assert!(!paths.package_folder("crashed").exists());
    }

    #[test]
    fn test_clear_updates_forgets_everything() {
        let harness = Harness::new();
        harness.install_full("v1", &[("index.bundle", "bundle v1")]);
        let manager = harness.manager(b"");

        manager.clear_updates().unwrap();

        assert_eq!(manager.current_package_info().unwrap(), InstallationState::default());
        assert_eq!(manager.current_package().unwrap(), None);
    }
}
