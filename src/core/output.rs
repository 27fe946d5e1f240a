//! Colored console output for provisioning
//!
//! Uses owo-colors for terminal colors and indicatif for spinners. Callers
//! only ever pass plain strings; presentation lives here.

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use std::time::Duration;

const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";
const TICK_INTERVAL_MS: u64 = 80;

/// Print an action header (blue, bold)
/// Example: "==> Installing Miniforge"
pub fn action(message: &str) {
    println!("{} {}", "==>".blue().bold(), message.bold());
}

/// Print a numbered stage header
/// Example: "(2/7) environment"
pub fn stage(current: usize, total: usize, name: &str) {
    println!("{} {}", format!("({}/{})", current, total).cyan(), name.bold());
}

/// Print a sub-action (cyan arrow)
/// Example: "  -> downloading Miniforge3-Linux-x86_64.sh"
pub fn sub_action(message: &str) {
    println!("  {} {}", "->".cyan(), message);
}

/// Print a detail line (dimmed)
pub fn detail(message: &str) {
    println!("     {}", message.dimmed());
}

/// Print a success message (green)
pub fn success(message: &str) {
    println!("{} {}", "==>".green().bold(), message.green());
}

/// Print an info message (cyan)
pub fn info(message: &str) {
    println!("{} {}", "::".cyan(), message);
}

/// Print a warning message (yellow)
pub fn warning(message: &str) {
    eprintln!("{} {}", "warning:".yellow().bold(), message.yellow());
}

/// Print an error message (red)
pub fn error(message: &str) {
    eprintln!("{} {}", "error:".red().bold(), message.red());
}

/// Print a multi-line diagnostic block, indented, to stderr
pub fn diagnostic(block: &str) {
    for line in block.lines() {
        eprintln!("    {}", line);
    }
}

/// Print a skip message (dimmed)
/// Example: "==> Miniforge already present, skipping"
pub fn skip(message: &str) {
    println!("{} {}", "==>".dimmed(), message.dimmed());
}

/// Create a spinner for a long-running external command
pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("     {spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars(SPINNER_CHARS);
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(TICK_INTERVAL_MS));
    pb
}

/// Shorten a command line for single-line display
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spinner_creation() {
        let pb = spinner("running mamba env create");
        pb.finish_and_clear();
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("qiime info", 60), "qiime info");
        assert_eq!(truncate("abcdefghij", 8), "abcde...");
        assert_eq!(truncate("ééééé", 5), "ééééé");
    }
}
