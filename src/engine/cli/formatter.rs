//! CLI Output Formatting Module
//! Colorized terminal output for the update commands

use colored::Colorize;
use std::io::Write;

use crate::engine::updater::{InstallationState, TrustDecision, UntrustedReason};

pub struct CliFormatter;

impl CliFormatter {
    /// Print a success message
    pub fn success(message: &str) {
        println!("{} {}", "✓".green().bold(), message);
    }

    /// Print an error message
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red().bold(), message);
    }

    /// Print a warning message
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow().bold(), message);
    }

    /// Print an info message
    pub fn info(message: &str) {
        println!("{} {}", "ℹ".blue().bold(), message);
    }

    /// Print a section header
    pub fn header(title: &str) {
        println!("\n{}", title.bright_cyan().bold());
        println!("{}", "─".repeat(title.len()).bright_black());
    }

    /// Print a key-value pair
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", key.bright_white().bold(), value);
    }

    /// Print a list item
    pub fn item(text: &str) {
        println!("  {} {}", "•".bright_black(), text);
    }

    /// Redraw the download progress bar in place
    pub fn download_progress(received: u64, total: u64) {
        print!(
            "\r  [{}] {} / {}",
            progress_bar(received, total),
            format_size(received),
            if total > 0 { format_size(total) } else { "?".to_string() }
        );
        std::io::stdout().flush().ok();
    }

    /// Finish a progress bar line
    pub fn end_progress() {
        println!();
    }

    /// Print the installation record
    pub fn installation_state(state: &InstallationState) {
        Self::header("Installed Packages");
        Self::kv("Current", state.current_package_hash.as_deref().unwrap_or("(none)"));
        Self::kv("Previous", state.previous_package_hash.as_deref().unwrap_or("(none)"));
    }

    /// Print a verification outcome
    pub fn trust_decision(package_hash: &str, decision: TrustDecision) {
        match decision {
            TrustDecision::Trusted => {
                Self::success(&format!("Package {} is signed and its content hash matches", package_hash))
            }
            TrustDecision::Untrusted(reason) => Self::warning(&format!(
                "Package {} accepted without a trusted signature: {}",
                package_hash,
                describe_reason(reason)
            )),
        }
    }
}

/// Text form of a verification shortfall
pub fn describe_reason(reason: UntrustedReason) -> &'static str {
    match reason {
        UntrustedReason::SignatureNotChecked => "signature present but no public key configured",
        UntrustedReason::HashOnly => "content hash verified, no signature",
        UntrustedReason::Unverified => "full update taken as-is, nothing verified",
    }
}

fn progress_bar(received: u64, total: u64) -> String {
    let filled = if total == 0 {
        0
    } else {
        (received.min(total) * 20 / total) as usize
    };
    format!(
        "{}{}",
        "█".repeat(filled).bright_green(),
        "░".repeat(20 - filled).bright_black()
    )
}

/// Format file size in human-readable format
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_idx])
}
