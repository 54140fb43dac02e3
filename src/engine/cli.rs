//! BundlePush CLI Module
//! Command-line interface for driving the update engine by hand

pub mod formatter;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::engine::config::{UpdaterConfig, CONFIG_FILE_NAME};

#[derive(Parser, Debug)]
#[command(name = "bundlepush-cli")]
#[command(author = "BundlePush Team")]
#[command(version)]
#[command(about = "Over-the-air bundle update engine", long_about = None)]
pub struct Cli {
    /// Config file (defaults to bundlepush.config.json in the current directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Storage root, overrides the config file
    #[arg(short, long, global = true)]
    pub root: Option<PathBuf>,

    /// Output format (json for scripting)
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download, stage and verify a package described by a JSON descriptor
    Download {
        /// Update descriptor (packageHash, downloadUrl, ...)
        #[arg(short, long)]
        descriptor: PathBuf,

        /// Expected bundle file name
        #[arg(short, long)]
        bundle: Option<String>,
    },

    /// Make a staged package current
    Install {
        #[command(flatten)]
        target: InstallTarget,

        /// Discard the current package instead of keeping it for rollback
        #[arg(long)]
        discard_current: bool,
    },

    /// Roll back to the previous package
    Rollback,

    /// Show installed packages
    Status,

    /// Print the path of the runnable bundle
    BundlePath {
        /// Bundle file name used when the package has no resolved path
        #[arg(short, long)]
        bundle: Option<String>,
    },

    /// Delete all packages and the installation record
    Clear,

    /// Remove package folders left behind by interrupted installs
    Cleanup,

    /// Replace the current bundle file with a freshly downloaded one
    ReplaceBundle {
        /// Bundle URL
        #[arg(short, long)]
        url: String,

        /// Bundle file name used when the package has no resolved path
        #[arg(short, long)]
        bundle: Option<String>,
    },

    /// Re-run integrity verification on a package folder
    Verify {
        /// Package hash
        #[arg(long)]
        hash: String,

        /// Treat the package as a diff update
        #[arg(long)]
        diff: bool,
    },
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct InstallTarget {
    /// Update descriptor of the package
    #[arg(short, long)]
    pub descriptor: Option<PathBuf>,

    /// Package hash
    #[arg(long)]
    pub hash: Option<String>,
}

impl Cli {
    pub fn get_config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
    }

    /// Apply command-line overrides on top of a loaded config
    pub fn apply_overrides(&self, config: &mut UpdaterConfig) {
        if let Some(root) = &self.root {
            config.storage_root = root.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_install_by_hash() {
        let cli = Cli::parse_from(["bundlepush-cli", "--root", "/tmp/x", "install", "--hash", "abc123"]);
        match cli.command {
            Commands::Install { target, discard_current } => {
                assert_eq!(target.hash.as_deref(), Some("abc123"));
                assert!(target.descriptor.is_none());
                assert!(!discard_current);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(cli.root, Some(PathBuf::from("/tmp/x")));
    }

    #[test]
    fn test_install_requires_exactly_one_target() {
        assert!(Cli::try_parse_from(["bundlepush-cli", "install"]).is_err());
        assert!(Cli::try_parse_from([
            "bundlepush-cli",
            "install",
            "--hash",
            "abc",
            "--descriptor",
            "d.json"
        ])
        .is_err());
    }

    #[test]
    fn test_root_override() {
        let cli = Cli::parse_from(["bundlepush-cli", "status", "--root", "/data", "--format", "json"]);
        let mut config = UpdaterConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.storage_root, PathBuf::from("/data"));
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.get_config_path(), PathBuf::from(CONFIG_FILE_NAME));
    }
}
