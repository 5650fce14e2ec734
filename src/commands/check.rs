//! `sift check`: report external tool availability.

use anyhow::{bail, Result};
use colored::Colorize;
use std::path::Path;

use crate::config::WorkerConfig;
use crate::orchestrator::executor::check_tools;

pub fn execute(data_dir: &Path) -> Result<()> {
    let config = WorkerConfig::load(data_dir)?;
    println!("{} Checking tools for device {}", "→".cyan().bold(), config.device);

    let mut missing = false;
    for tool in check_tools(&config) {
        match &tool.resolved {
            Some(path) => println!(
                "  {} {:<14} {}",
                "✓".green().bold(),
                tool.name,
                path.display().to_string().dimmed()
            ),
            None => {
                missing = true;
                println!(
                    "  {} {:<14} not found ({})",
                    "✗".red().bold(),
                    tool.name,
                    tool.configured.display()
                );
                for line in tool.install_hint().lines() {
                    println!("      {}", line.dimmed());
                }
            }
        }
    }

    if missing {
        bail!("Required tools are missing");
    }
    println!("{} Ready", "✓".green().bold());
    Ok(())
}
