// BundlePush Engine - Core module structure
pub mod config;
pub mod error;
pub mod cli;
pub mod updater;

pub use config::UpdaterConfig;
pub use error::{Result, UpdateError};
pub use updater::UpdateManager;
