//! Output for CLI commands.

use colored::Colorize;
use tabled::{Table, Tabled};

/// Where command output goes. `silent` suppresses informational messages
/// but never results or errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct Output {
    pub silent: bool,
}

impl Output {
    /// Print rows as a table.
    pub fn table<T: Tabled>(&self, rows: &[T]) {
        if rows.is_empty() {
            println!("{}", "No items found.".dimmed());
        } else {
            println!("{}", Table::new(rows));
        }
    }

    /// Print a line of command output.
    pub fn line(&self, text: impl AsRef<str>) {
        println!("{}", text.as_ref());
    }

    /// Print a success message.
    pub fn success(&self, message: &str) {
        if !self.silent {
            println!("{} {}", "Success:".green().bold(), message);
        }
    }

    /// Print an info message.
    pub fn info(&self, message: &str) {
        if !self.silent {
            println!("{} {}", "Info:".blue().bold(), message);
        }
    }
}

/// Format a size in MiB for humans.
pub fn format_size(mib: u64) -> String {
    if mib >= 1024 && mib % 1024 == 0 {
        format!("{} GiB", mib / 1024)
    } else {
        format!("{mib} MiB")
    }
}
