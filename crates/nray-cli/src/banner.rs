//! Startup banner.

use colored::Colorize;

pub struct Banner {
    version: String,
}

impl Banner {
    pub fn new(version: &str) -> Self {
        Self {
            version: version.to_string(),
        }
    }

    pub fn print(&self, role: &str) {
        println!(
            "{} {} {}",
            "nray".bright_cyan().bold(),
            self.version.bright_green(),
            format!("({role})").bright_black()
        );
    }
}
