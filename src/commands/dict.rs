//! Dictionary commands.

use anyhow::{Context, Result};
use colored::Colorize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use super::common::{truncate, Workspace};
use crate::fs::Area;
use crate::models::Dictionary;
use crate::orchestrator::dictionaries::ordered_dictionaries;
use crate::store::JobStore;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub added: Vec<String>,
    pub skipped: usize,
}

pub fn sync(data_dir: &Path, pattern: &str) -> Result<()> {
    let workspace = Workspace::open(data_dir)?;
    let dir = workspace.storage.dir(Area::Dictionaries).to_path_buf();
    println!(
        "{} Scanning {} for {}",
        "→".cyan().bold(),
        dir.display(),
        pattern
    );

    let report = sync_dictionaries(workspace.store.as_ref(), &dir, pattern)?;
    for name in &report.added {
        println!("  {} {name}", "+".green().bold());
    }
    println!(
        "{} {} added, {} already registered",
        "✓".green().bold(),
        report.added.len(),
        report.skipped
    );
    Ok(())
}

/// Register every file in `dir` matching `pattern` that is not yet known.
pub fn sync_dictionaries(store: &dyn JobStore, dir: &Path, pattern: &str) -> Result<SyncReport> {
    let known: HashSet<PathBuf> = store
        .list_dictionaries()
        .context("Failed to list dictionaries")?
        .into_iter()
        .map(|dictionary| dictionary.path)
        .collect();

    let full_pattern = dir.join(pattern);
    let full_pattern = full_pattern.to_string_lossy();
    let mut report = SyncReport::default();
    let mut paths: Vec<PathBuf> = glob::glob(&full_pattern)
        .with_context(|| format!("Invalid pattern: {pattern}"))?
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!("Skipping unreadable dictionary entry: {e}");
                None
            }
        })
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    for path in paths {
        if known.contains(&path) {
            report.skipped += 1;
            continue;
        }
        let size = fs::metadata(&path)
            .with_context(|| format!("Failed to stat {}", path.display()))?
            .len();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        store
            .save_dictionary(&Dictionary::new(name.clone(), path, size))
            .context("Failed to register dictionary")?;
        tracing::info!(dictionary = %name, size, "Registered dictionary");
        report.added.push(name);
    }
    Ok(report)
}

pub fn list(data_dir: &Path) -> Result<()> {
    let workspace = Workspace::open(data_dir)?;
    let dictionaries = ordered_dictionaries(
        workspace
            .store
            .list_dictionaries()
            .context("Failed to list dictionaries")?,
    );
    if dictionaries.is_empty() {
        println!("{} No dictionaries registered", "─".dimmed());
        return Ok(());
    }
    for dictionary in &dictionaries {
        let exists = dictionary.path.is_file();
        println!(
            "  {} {:<32} {:>12}",
            if exists { "✓".green().bold() } else { "✗".red().bold() },
            truncate(&dictionary.name, 32),
            format_size(dictionary.size).dimmed()
        );
    }
    Ok(())
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FileStore;
    use tempfile::TempDir;

    #[test]
    fn test_sync_registers_matching_files_once() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::open(temp.path().join("store")).unwrap();
        let dir = temp.path().join("dictionaries");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("small.txt"), "a\nb\n").unwrap();
        fs::write(dir.join("large.txt"), "password\n".repeat(100)).unwrap();
        fs::write(dir.join("notes.md"), "ignore me").unwrap();

        let report = sync_dictionaries(&store, &dir, "*.txt").unwrap();
        assert_eq!(report.added, vec!["large.txt", "small.txt"]);
        assert_eq!(report.skipped, 0);

        let again = sync_dictionaries(&store, &dir, "*.txt").unwrap();
        assert!(again.added.is_empty());
        assert_eq!(again.skipped, 2);

        let registered = ordered_dictionaries(store.list_dictionaries().unwrap());
        assert_eq!(registered[0].name, "small.txt");
        assert_eq!(registered[0].size, 4);
    }

    #[test]
    fn test_sync_ignores_directories() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::open(temp.path().join("store")).unwrap();
        let dir = temp.path().join("dictionaries");
        fs::create_dir_all(dir.join("nested.txt")).unwrap();

        let report = sync_dictionaries(&store, &dir, "*").unwrap();
        assert!(report.added.is_empty());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KiB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MiB");
    }
}
