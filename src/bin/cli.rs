//! BundlePush CLI - Main entry point for CLI binary
//!
//! This binary provides the `bundlepush-cli` tool for staging, installing and
//! rolling back bundle packages under a storage root.

use anyhow::{bail, Context};
use bundlepush_lib::engine::{
    cli::{
        formatter::{describe_reason, format_size, CliFormatter},
        Cli, Commands, InstallTarget, OutputFormat,
    },
    config::UpdaterConfig,
    updater::{
        InstallOutcome, PackageDescriptor, PackageFolder, RollbackOutcome, TrustDecision, UpdateManager,
    },
};
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bundlepush_lib=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let json_output = cli.format == OutputFormat::Json;

    if let Err(e) = run_cli(cli) {
        if json_output {
            println!(
                "{}",
                serde_json::json!({
                    "success": false,
                    "error": format!("{:#}", e)
                })
            );
        } else {
            CliFormatter::error(&format!("{:#}", e));
        }
        std::process::exit(1);
    }
}

fn run_cli(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.get_config_path();
    let mut config = UpdaterConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    cli.apply_overrides(&mut config);
    let json = cli.format == OutputFormat::Json;

    let manager = UpdateManager::new(&config)?;
    let default_bundle = config.bundle_file_name.clone();

    match cli.command {
        Commands::Download { descriptor, bundle } => {
            let bundle = bundle.unwrap_or(default_bundle);
            cmd_download(&manager, &load_descriptor(&descriptor)?, &bundle, json)?;
        }
        Commands::Install { target, discard_current } => {
            let hash = resolve_hash(target)?;
            cmd_install(&manager, &hash, !discard_current, json)?;
        }
        Commands::Rollback => cmd_rollback(&manager, json)?,
        Commands::Status => cmd_status(&manager, json)?,
        Commands::BundlePath { bundle } => {
            let bundle = bundle.unwrap_or(default_bundle);
            cmd_bundle_path(&manager, &bundle, json)?;
        }
        Commands::Clear => {
            manager.clear_updates()?;
            if json {
                println!("{}", serde_json::json!({ "success": true }));
            } else {
                CliFormatter::success("Cleared all updates");
            }
        }
        Commands::Cleanup => {
            let removed = manager.cleanup_incomplete()?;
            if json {
                println!("{}", serde_json::json!({ "success": true, "removed": removed }));
            } else if removed.is_empty() {
                CliFormatter::success("No incomplete packages found");
            } else {
                CliFormatter::success(&format!("Removed {} incomplete package(s):", removed.len()));
                for hash in &removed {
                    CliFormatter::item(hash);
                }
            }
        }
        Commands::ReplaceBundle { url, bundle } => {
            let bundle = bundle.unwrap_or(default_bundle);
            let target = manager.download_and_replace_current_bundle(&url, &bundle)?;
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "success": true, "bundlePath": target.display().to_string() })
                );
            } else {
                CliFormatter::success(&format!("Replaced {}", target.display()));
            }
        }
        Commands::Verify { hash, diff } => {
            let decision = manager.verify_package(&hash, diff)?;
            if json {
                let note = match decision {
                    TrustDecision::Trusted => None,
                    TrustDecision::Untrusted(reason) => Some(describe_reason(reason)),
                };
                println!(
                    "{}",
                    serde_json::json!({
                        "success": true,
                        "packageHash": hash,
                        "trusted": decision == TrustDecision::Trusted,
                        "note": note
                    })
                );
            } else {
                CliFormatter::trust_decision(&hash, decision);
            }
        }
    }

    Ok(())
}

fn load_descriptor(path: &std::path::Path) -> anyhow::Result<PackageDescriptor> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read descriptor {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid descriptor {}", path.display()))
}

fn resolve_hash(target: InstallTarget) -> anyhow::Result<String> {
    match (target.hash, target.descriptor) {
        (Some(hash), _) => Ok(hash),
        (None, Some(path)) => Ok(load_descriptor(&path)?.package_hash),
        (None, None) => bail!("either --hash or --descriptor is required"),
    }
}

fn cmd_download(
    manager: &UpdateManager,
    descriptor: &PackageDescriptor,
    bundle: &str,
    json: bool,
) -> anyhow::Result<()> {
    if !json {
        CliFormatter::info(&format!("Downloading package {}", descriptor.package_hash));
    }
    let mut received = 0;
    let persisted = manager.download_package(descriptor, bundle, |progress| {
        received = progress.received_bytes;
        if !json {
            CliFormatter::download_progress(progress.received_bytes, progress.total_bytes);
        }
    })?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "success": true,
                "bytes": received,
                "package": persisted
            })
        );
    } else {
        CliFormatter::end_progress();
        CliFormatter::success(&format!(
            "Staged package {} ({})",
            persisted.package_hash,
            format_size(received)
        ));
        CliFormatter::kv("Bundle", persisted.relative_bundle_path.as_deref().unwrap_or(bundle));
        CliFormatter::info(&format!(
            "Run `bundlepush-cli install --hash {}` to make it current",
            persisted.package_hash
        ));
    }
    Ok(())
}

fn cmd_install(manager: &UpdateManager, hash: &str, retain_previous: bool, json: bool) -> anyhow::Result<()> {
    let outcome = manager.install_package(hash, retain_previous)?;
    let state = manager.current_package_info()?;
    if json {
        println!(
            "{}",
            serde_json::json!({
                "success": true,
                "alreadyInstalled": outcome == InstallOutcome::AlreadyInstalled,
                "state": state
            })
        );
    } else {
        match outcome {
            InstallOutcome::AlreadyInstalled => CliFormatter::info(&format!("Package {} is already current", hash)),
            InstallOutcome::Installed => CliFormatter::success(&format!("Installed package {}", hash)),
        }
        CliFormatter::installation_state(&state);
    }
    Ok(())
}

fn cmd_rollback(manager: &UpdateManager, json: bool) -> anyhow::Result<()> {
    let outcome = manager.rollback_package()?;
    if json {
        let restored = match &outcome {
            RollbackOutcome::RolledBack { restored } => Some(restored.as_str()),
            RollbackOutcome::NothingToRollBack => None,
        };
        println!("{}", serde_json::json!({ "success": true, "restored": restored }));
    } else {
        match outcome {
            RollbackOutcome::RolledBack { restored } => {
                CliFormatter::success(&format!("Rolled back to package {}", restored))
            }
            RollbackOutcome::NothingToRollBack => CliFormatter::warning("No previous package to roll back to"),
        }
    }
    Ok(())
}

fn cmd_status(manager: &UpdateManager, json: bool) -> anyhow::Result<()> {
    let state = manager.current_package_info()?;
    let current = manager.current_package()?;
    let previous = manager.previous_package()?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "root": manager.paths().root().display().to_string(),
                "state": state,
                "currentPackage": current,
                "previousPackage": previous
            })
        );
        return Ok(());
    }

    CliFormatter::kv("Root", &manager.paths().root().display().to_string());
    CliFormatter::installation_state(&state);
    for hash in [&state.current_package_hash, &state.previous_package_hash].into_iter().flatten() {
        match manager.package_folder(hash) {
            PackageFolder::Complete { descriptor, .. } => CliFormatter::item(&format!(
                "{} -> {}",
                hash,
                descriptor.relative_bundle_path.as_deref().unwrap_or("(bundle path unresolved)")
            )),
            PackageFolder::Staging { .. } => {
                CliFormatter::warning(&format!("Package {} has no descriptor", hash))
            }
            PackageFolder::Absent => CliFormatter::warning(&format!("Package folder {} is missing", hash)),
        }
    }
    Ok(())
}

fn cmd_bundle_path(manager: &UpdateManager, bundle: &str, json: bool) -> anyhow::Result<()> {
    let path = manager.current_bundle_path(bundle)?;
    if json {
        println!(
            "{}",
            serde_json::json!({ "bundlePath": path.map(|p| p.display().to_string()) })
        );
    } else {
        match path {
            Some(path) => println!("{}", path.display()),
            None => CliFormatter::warning("No package is installed; the binary's embedded bundle is used"),
        }
    }
    Ok(())
}
