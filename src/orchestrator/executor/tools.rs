//! Startup check for the external tools.

use std::path::{Path, PathBuf};

use crate::config::WorkerConfig;

use super::ExecutorError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCheck {
    pub name: &'static str,
    pub configured: PathBuf,
    pub resolved: Option<PathBuf>,
}

impl ToolCheck {
    pub fn is_available(&self) -> bool {
        self.resolved.is_some()
    }

    pub fn install_hint(&self) -> &'static str {
        match self.name {
            "hashcat" => {
                "Please install hashcat.\n\
                 On Ubuntu/Debian: sudo apt-get install hashcat\n\
                 On macOS: brew install hashcat\n\
                 On Arch: sudo pacman -S hashcat"
            }
            _ => {
                "Please install hcxtools.\n\
                 On Ubuntu/Debian: sudo apt-get install hcxtools\n\
                 On macOS: brew install hcxtools\n\
                 On Arch: sudo pacman -S hcxtools"
            }
        }
    }
}

fn resolve(path: &Path) -> Option<PathBuf> {
    which::which(path).ok()
}

/// Resolve the cracking and extraction tools.
pub fn check_tools(config: &WorkerConfig) -> Vec<ToolCheck> {
    vec![
        ToolCheck {
            name: "hashcat",
            configured: config.cracker_path.clone(),
            resolved: resolve(&config.cracker_path),
        },
        ToolCheck {
            name: "hcxpcapngtool",
            configured: config.extractor_path.clone(),
            resolved: resolve(&config.extractor_path),
        },
    ]
}

/// Fail on the first tool that cannot be found, with install guidance.
pub fn require_tools(config: &WorkerConfig) -> Result<(), ExecutorError> {
    for check in check_tools(config) {
        if check.is_available() {
            continue;
        }
        return Err(ExecutorError::ToolUnavailable {
            tool: check.name.to_string(),
            reason: format!(
                "{} not found in PATH. {}",
                check.configured.display(),
                check.install_hint()
            ),
        });
    }
    Ok(())
}
