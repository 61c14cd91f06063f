//! Structured console output: banners, per-result lines and the recap.
//!
//! Colour is auto-detected from the terminal by the `colored` crate and can
//! be forced on or off with [`set_color_override`].

use colored::Colorize;

/// Per-host task counters accumulated across a full run.
#[derive(Debug, Clone, Default)]
pub struct HostSummary {
    /// Host address.
    pub host: String,
    /// Tasks that succeeded without changes.
    pub ok: u32,
    /// Tasks that reported a change.
    pub changed: u32,
    /// Tasks that failed.
    pub failed: u32,
    /// Tasks skipped by `when` or tag filters.
    pub skipped: u32,
    /// Failed tasks ignored via `ignore_errors`.
    pub ignored: u32,
}

impl HostSummary {
    /// Create a summary for a host with zeroed counters.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    /// Add another summary's counters into this one.
    pub fn merge(&mut self, other: &HostSummary) {
        self.ok += other.ok;
        self.changed += other.changed;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.ignored += other.ignored;
    }
}

/// Force colour on (`Some(true)`), off (`Some(false)`) or restore
/// auto-detection (`None`).
pub fn set_color_override(force: Option<bool>) {
    match force {
        Some(enabled) => colored::control::set_override(enabled),
        None => colored::control::unset_override(),
    }
}

/// Print the PLAY banner.
pub fn play_header(name: &str) {
    let sep = "*".repeat(72_usize.saturating_sub(name.len() + 8));
    println!("\n{} [{}] {}", "PLAY".blue().bold(), name.bold(), sep);
}

/// Print the TASK banner.
pub fn task_header(name: &str) {
    let sep = "-".repeat(72_usize.saturating_sub(name.len() + 8));
    println!("\n{} [{}] {}", "TASK".bold(), name, sep);
}

/// Print the HANDLER banner.
pub fn handler_header(name: &str) {
    let sep = "-".repeat(72_usize.saturating_sub(name.len() + 11));
    println!("\n{} [{}] {}", "HANDLER".bold(), name, sep);
}

/// Print a host separator line.
pub fn host_header(host: &str) {
    println!("\n{}", format!("  HOST [{}]", host).cyan());
}

/// Print an ok result line and any captured output.
pub fn ok(host: &str, output: &str) {
    println!("  {}: [{}]", "ok".green(), host);
    output_block("stdout", output);
}

/// Print a changed result line and any captured output.
pub fn changed(host: &str, output: &str) {
    println!("  {}: [{}]", "changed".yellow(), host);
    output_block("stdout", output);
}

/// Print a failed result line.
pub fn failed(host: &str, message: &str) {
    println!("  {}: [{}]", "FAILED".red(), host);
    if !message.trim().is_empty() {
        println!("  {}", message.trim());
    }
}

/// Print an ignored-error result line.
pub fn ignored(host: &str, message: &str) {
    println!("  {}: [{}] (ignored)", "failed".yellow(), host);
    if !message.trim().is_empty() {
        println!("  {}", message.trim());
    }
}

/// Print a skipped result line.
pub fn skipped(host: &str) {
    println!("  {}: [{}]", "skipping".cyan(), host);
}

/// Print a dry-run line for a command or copy.
pub fn dry_run(msg: &str) {
    println!("  {} {}", "[dry-run]".cyan(), msg);
}

/// Print a retry attempt note.
pub fn retry_note(attempt: u32, retries: u32) {
    println!("    retry {}/{}", attempt, retries);
}

/// Print captured command output indented under a label.
pub fn output_block(label: &str, output: &str) {
    if output.trim().is_empty() {
        return;
    }
    println!("  {}:", label.bold());
    for line in output.trim_end_matches('\n').lines() {
        println!("    {}", line);
    }
}

/// Print a note that a task result was registered.
pub fn register_note(var_name: &str, value: &str) {
    if value.trim().is_empty() {
        println!("  {} => {}", "registered".blue(), var_name);
    } else {
        println!("  {} => {}: {}", "registered".blue(), var_name, value.trim());
    }
}

/// Print the final PLAY RECAP table.
pub fn recap(summaries: &[HostSummary]) {
    println!("\n{}{}", "PLAY RECAP ".bold(), "*".repeat(62));
    for s in summaries {
        let host = format!("{:<24}", s.host);
        let host = if s.failed > 0 {
            host.red()
        } else if s.changed > 0 {
            host.yellow()
        } else {
            host.green()
        };

        println!(
            "  {} : {} {} {} {} {}",
            host,
            format!("ok={:<4}", s.ok).green(),
            format!("changed={:<4}", s.changed).yellow(),
            format!("failed={:<4}", s.failed).red(),
            format!("skipped={:<4}", s.skipped).cyan(),
            format!("ignored={:<4}", s.ignored).yellow(),
        );
    }
    println!();
}
