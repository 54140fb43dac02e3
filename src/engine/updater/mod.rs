//! BundlePush Update Engine
//!
//! Downloads, stages, verifies and installs application bundle packages with
//! one-step rollback.
//!
//! Components:
//! - `paths` - Well-known locations under the engine root
//! - `store` - Installation record and package descriptors
//! - `download` - HTTP download with resume
//! - `unpack` - Container extraction and diff merge
//! - `verify` - Content hash and signature verification
//! - `state` - Install/rollback state machine
//! - `manager` - Facade used by the host runtime

pub mod paths;
pub mod store;
pub mod download;
pub mod unpack;
pub mod verify;
pub mod state;
pub mod manager;

pub use download::{DownloadProgress, Downloader, HttpTransport, ReqwestTransport};
pub use manager::UpdateManager;
pub use paths::UpdatePaths;
pub use state::{InstallOutcome, Installer, PackageState, RollbackOutcome};
pub use store::{InstallationState, PackageDescriptor, PackageFolder, PackageStore};
pub use verify::{IntegrityVerifier, SignatureVerifier, TrustDecision, UntrustedReason};
