//! Output formatting utilities

use std::time::Duration;

use console::{style, Style, StyledObject};

use cinder_targets::TargetStatus;

/// Print a success message
pub fn success(message: &str) {
    println!("{} {}", style("✓").green().bold(), message);
}

/// Print an error message
pub fn error(message: &str) {
    eprintln!("{} {}", style("✗").red().bold(), message);
}

/// Print a warning message
pub fn warning(message: &str) {
    println!("{} {}", style("!").yellow().bold(), message);
}

/// Print an info message
pub fn info(message: &str) {
    println!("{} {}", style("→").blue(), message);
}

/// Create a styled header
pub fn header(text: &str) -> String {
    style(text).bold().to_string()
}

/// Create a styled key-value line
pub fn key_value(key: &str, value: &str) -> String {
    format!("  {}: {}", style(key).dim(), value)
}

/// Style for target names
pub fn target_style() -> Style {
    Style::new().bold()
}

/// Style for paths
pub fn path_style() -> Style {
    Style::new().cyan()
}

/// Seconds with one decimal, dimmed
pub fn duration(duration: Duration) -> StyledObject<String> {
    style(format!("{:.1}s", duration.as_secs_f64())).dim()
}

/// Status marker for a target line
pub fn status_icon(status: &TargetStatus) -> StyledObject<&'static str> {
    match status {
        TargetStatus::Succeeded => style("✓").green(),
        TargetStatus::Skipped => style("○").cyan(),
        TargetStatus::Failed { .. } => style("✗").red(),
        TargetStatus::Cancelled => style("-").yellow(),
    }
}

/// "1 target" / "3 targets"
pub fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{} {}", count, noun)
    } else {
        format!("{} {}s", count, noun)
    }
}
