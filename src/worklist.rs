use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{DefragError, Result};

/// Durable FIFO of file paths awaiting defragmentation.
///
/// Stored as one path per line. Duplicates are kept.
#[derive(Debug, Clone)]
pub struct Worklist {
    path: PathBuf,
    items: VecDeque<String>,
}

impl Worklist {
    /// Empty worklist bound to `path`; nothing is written until `persist`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Worklist {
            path: path.into(),
            items: VecDeque::new(),
        }
    }

    /// Load one item per non-blank line, trimmed, in file order
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|source| match source.kind() {
            ErrorKind::NotFound => DefragError::WorklistNotFound(path.to_path_buf()),
            _ => DefragError::WorklistIo {
                path: path.to_path_buf(),
                source,
            },
        })?;

        Ok(Worklist {
            path: path.to_path_buf(),
            items: parse_lines(&contents),
        })
    }

    /// Load, treating a missing file as an empty worklist
    pub fn open_or_create(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(DefragError::WorklistNotFound(_)) => Ok(Self::new(path)),
            other => other,
        }
    }

    /// Overwrite the file with the current items.
    ///
    /// Writes and syncs a sibling temp file, then renames it into place so a
    /// crash or power loss never leaves a half-written list behind.
    pub fn persist(&self) -> Result<()> {
        let io_err = |source| DefragError::WorklistIo {
            path: self.path.clone(),
            source,
        };

        let parent = self.path.parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(parent) = parent {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let mut contents = self.items.iter().map(String::as_str).collect::<Vec<_>>().join("\n");
        if !contents.is_empty() {
            contents.push('\n');
        }

        let temp_path = temp_path_for(&self.path);
        write_synced(&temp_path, contents.as_bytes()).map_err(|source| {
            let _ = fs::remove_file(&temp_path);
            io_err(source)
        })?;
        fs::rename(&temp_path, &self.path).map_err(|source| {
            let _ = fs::remove_file(&temp_path);
            io_err(source)
        })?;
        sync_dir(parent.unwrap_or(Path::new("."))).map_err(io_err)?;

        log::debug!("persisted {} worklist items to {}", self.items.len(), self.path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn front(&self) -> Option<&str> {
        self.items.front().map(String::as_str)
    }

    pub fn pop_front(&mut self) -> Option<String> {
        self.items.pop_front()
    }

    pub fn push_back(&mut self, item: impl Into<String>) {
        self.items.push_back(item.into());
    }

    /// Append items, skipping blank ones
    pub fn extend<I, S>(&mut self, items: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for item in items {
            let item = item.into();
            let trimmed = item.trim();
            if !trimmed.is_empty() {
                self.items.push_back(trimmed.to_string());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(String::as_str)
    }
}

fn parse_lines(contents: &str) -> VecDeque<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn write_synced(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

/// Make a completed rename durable
#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
