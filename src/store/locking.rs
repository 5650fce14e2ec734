//! File locking utilities for safe concurrent access
//!
//! The scheduler, session monitor and timeout manager all touch the same
//! record files from different threads. Every read and write goes through an
//! `fs2` advisory lock so a reader never observes a half-written record.
//!
//! Advisory locks are cooperative - all participants must use these functions
//! for the locking to be effective.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Read file contents with a shared (read) lock.
pub fn locked_read(path: &Path) -> io::Result<String> {
    let file = File::open(path)?;
    file.lock_shared()?;
    let mut content = String::new();
    BufReader::new(&file).read_to_string(&mut content)?;
    Ok(content)
}

/// Write file contents with an exclusive (write) lock.
///
/// The sequence is: open → lock → truncate → write → flush, so the file is
/// never observed empty by a locked reader.
pub fn locked_write(path: &Path, content: &str) -> io::Result<()> {
    #[allow(clippy::suspicious_open_options)]
    let file = OpenOptions::new().write(true).create(true).open(path)?;
    file.lock_exclusive()?;
    write_locked(&file, content)
}

/// Read-modify-write under a single exclusive lock.
///
/// `apply` receives the current content (`None` if the file did not exist or
/// was empty) and returns the new content, or `None` to leave the file alone.
pub fn locked_update<T>(
    path: &Path,
    apply: impl FnOnce(Option<&str>) -> io::Result<(Option<String>, T)>,
) -> io::Result<T> {
    #[allow(clippy::suspicious_open_options)]
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)?;
    file.lock_exclusive()?;

    let mut current = String::new();
    file.read_to_string(&mut current)?;
    let existing = if current.is_empty() {
        None
    } else {
        Some(current.as_str())
    };

    let (next, value) = apply(existing)?;
    if let Some(content) = next {
        file.seek(SeekFrom::Start(0))?;
        write_locked(&file, &content)?;
    }
    Ok(value)
}

/// Append one line under an exclusive lock.
pub fn locked_append(path: &Path, line: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().append(true).create(true).open(path)?;
    file.lock_exclusive()?;
    file.write_all(line.as_bytes())?;
    if !line.ends_with('\n') {
        file.write_all(b"\n")?;
    }
    file.flush()
}

fn write_locked(file: &File, content: &str) -> io::Result<()> {
    file.set_len(0)?;
    let mut writer = io::BufWriter::new(file);
    writer.write_all(content.as_bytes())?;
    writer.flush()
}
