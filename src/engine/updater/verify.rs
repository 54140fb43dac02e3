//! Cryptographic Verification
//!
//! Folder content digests and detached-signature checks for staged packages.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::Path;

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use walkdir::WalkDir;

use super::paths::{relative_slash_path, UpdatePaths, PACKAGE_FILE_NAME, SIGNATURE_FILE_NAME};
use crate::engine::config::ConfigError;
use crate::engine::error::{Result, UpdateError};

const IGNORED_NAMES: &[&str] = &[".DS_Store", "__MACOSX"];

/// Outcome of a successful verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustDecision {
    /// Signature and content hash both verified
    Trusted,
    /// Install may proceed, but code integrity was not fully established
    Untrusted(UntrustedReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UntrustedReason {
    /// A signature shipped but no public key is configured; hash verified
    SignatureNotChecked,
    /// Diff update without key or signature; hash verified
    HashOnly,
    /// Full update without key or signature; nothing verified
    Unverified,
}

/// Checks a detached signature over a message.
///
/// `signature` is the raw content of the signature file.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, message: &[u8], signature: &[u8]) -> std::result::Result<(), String>;
}

/// ed25519 over the package hash, signature stored as hex
pub struct Ed25519SignatureVerifier {
    public_key: VerifyingKey,
}

impl Ed25519SignatureVerifier {
    pub fn from_bytes(key_bytes: &[u8; 32]) -> std::result::Result<Self, ConfigError> {
        let public_key = VerifyingKey::from_bytes(key_bytes)
            .map_err(|e| ConfigError::InvalidPublicKey(e.to_string()))?;
        Ok(Self { public_key })
    }

    pub fn from_hex(key_hex: &str) -> std::result::Result<Self, ConfigError> {
        let bytes = hex::decode(key_hex.trim())
            .map_err(|e| ConfigError::InvalidPublicKey(e.to_string()))?;
        let key_bytes: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            ConfigError::InvalidPublicKey(format!("expected 32 bytes, got {}", bytes.len()))
        })?;
        Self::from_bytes(&key_bytes)
    }
}

impl SignatureVerifier for Ed25519SignatureVerifier {
    fn verify(&self, message: &[u8], signature: &[u8]) -> std::result::Result<(), String> {
        let text = std::str::from_utf8(signature).map_err(|e| e.to_string())?;
        let sig_bytes = hex::decode(text.trim()).map_err(|e| e.to_string())?;
        let sig_array: [u8; 64] = sig_bytes
            .as_slice()
            .try_into()
            .map_err(|_| format!("expected 64 signature bytes, got {}", sig_bytes.len()))?;
        let signature = Signature::from_bytes(&sig_array);
        self.public_key
            .verify(message, &signature)
            .map_err(|e| e.to_string())
    }
}

/// Verifier for staged package folders
pub struct IntegrityVerifier {
    signature_verifier: Option<Box<dyn SignatureVerifier>>,
}

impl IntegrityVerifier {
    pub fn new(signature_verifier: Option<Box<dyn SignatureVerifier>>) -> Self {
        Self { signature_verifier }
    }

    /// Verifier for installs without a configured trust key
    pub fn unsigned() -> Self {
        Self::new(None)
    }

    pub fn from_public_key(public_key: Option<&str>) -> std::result::Result<Self, ConfigError> {
        let signature_verifier = match public_key {
            Some(key) => Some(Box::new(Ed25519SignatureVerifier::from_hex(key)?) as Box<dyn SignatureVerifier>),
            None => None,
        };
        Ok(Self::new(signature_verifier))
    }

    pub fn has_public_key(&self) -> bool {
        self.signature_verifier.is_some()
    }

    /// Decide whether a staged package folder can be trusted.
    ///
    /// Every `Err` is a terminal `InvalidUpdate`.
    pub fn verify(&self, package_folder: &Path, expected_hash: &str, is_diff: bool) -> Result<TrustDecision> {
        let signature_path = UpdatePaths::signature_in(package_folder);
        let has_signature = signature_path.is_file();

        match (&self.signature_verifier, has_signature) {
            (Some(verifier), true) => {
                let signature = fs::read(&signature_path).map_err(|e| {
                    UpdateError::unknown(format!("Error reading {}", signature_path.display()), e)
                })?;
                verifier
                    .verify(expected_hash.as_bytes(), &signature)
                    .map_err(|reason| {
                        UpdateError::invalid(format!(
                            "the update could not be verified because it was not signed by a trusted party ({})",
                            reason
                        ))
                    })?;
                verify_folder_hash(package_folder, expected_hash)?;
                info!("Update signature and content hash verified for {}", expected_hash);
                Ok(TrustDecision::Trusted)
            }
            (Some(_), false) => Err(UpdateError::invalid(
                "a public key is configured but the update carries no signature. \
                 Release the update with a private key so it can be verified",
            )),
            (None, true) => {
                warn!(
                    "Signature exists in update {} but code integrity could not be checked \
                     because no public key is configured",
                    expected_hash
                );
                verify_folder_hash(package_folder, expected_hash)?;
                Ok(TrustDecision::Untrusted(UntrustedReason::SignatureNotChecked))
            }
            (None, false) if is_diff => {
                verify_folder_hash(package_folder, expected_hash)?;
                Ok(TrustDecision::Untrusted(UntrustedReason::HashOnly))
            }
            (None, false) => Ok(TrustDecision::Untrusted(UntrustedReason::Unverified)),
        }
    }
}

/// Recompute the folder digest and compare it with `expected_hash`
pub fn verify_folder_hash(package_folder: &Path, expected_hash: &str) -> Result<()> {
    let actual = compute_folder_hash(package_folder)?;
    if !actual.eq_ignore_ascii_case(expected_hash) {
        return Err(UpdateError::invalid(format!(
            "the package contents do not match the package hash (expected {}, computed {})",
            expected_hash, actual
        )));
    }
    Ok(())
}

/// SHA-256 over the sorted `path:sha256` manifest of a folder.
///
/// The descriptor and signature files at the folder root do not count.
pub fn compute_folder_hash(package_folder: &Path) -> Result<String> {
    let mut manifest = Vec::new();
    let walker = WalkDir::new(package_folder)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            !IGNORED_NAMES.contains(&name.as_ref())
        });

    for entry in walker {
        let entry = entry.map_err(|e| {
            UpdateError::unknown(format!("Error walking {}", package_folder.display()), e)
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(relative) = relative_slash_path(package_folder, entry.path()) else {
            continue;
        };
        if relative == PACKAGE_FILE_NAME || relative == SIGNATURE_FILE_NAME {
            continue;
        }
        let digest = calculate_sha256(entry.path())?;
        manifest.push(format!("{}:{}", relative, digest));
    }

    manifest.sort();
    let encoded = serde_json::to_string(&manifest)
        .map_err(|e| UpdateError::unknown("Error encoding hash manifest", e))?;
    Ok(hex::encode(Sha256::digest(encoded.as_bytes())))
}

/// Calculate SHA256 checksum of a file
pub fn calculate_sha256(path: &Path) -> Result<String> {
    let context = || format!("Error hashing {}", path.display());
    let file = File::open(path).map_err(|e| UpdateError::unknown(context(), e))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();

    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .map_err(|e| UpdateError::unknown(context(), e))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}
