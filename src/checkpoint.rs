//! Checkpoint persistence
//!
//! A single watermark: the highest block number below which every block has
//! been handled. Zero means "no checkpoint".

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Durable storage for the resume watermark.
pub trait CheckpointStore: Send + Sync {
    /// Stored watermark, or 0 when absent or unreadable.
    fn load(&self) -> u64;

    /// Persist a new watermark.
    fn save(&self, block_number: u64) -> Result<()>;
}

/// Watermark kept as a decimal number in a text file.
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "checkpoint".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self) -> u64 {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) => {
                debug!("No checkpoint at {:?}: {}", self.path, e);
                return 0;
            }
        };

        match contents.trim().parse::<u64>() {
            Ok(block) => block,
            Err(e) => {
                warn!("Ignoring corrupt checkpoint at {:?}: {}", self.path, e);
                0
            }
        }
    }

    fn save(&self, block_number: u64) -> Result<()> {
        // Write-then-rename so a crash never leaves a half-written number.
        let tmp = self.temp_path();
        fs::write(&tmp, format!("{}\n", block_number))
            .with_context(|| format!("Failed to write checkpoint to {:?}", tmp))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to move checkpoint into {:?}", self.path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_checkpoint_is_zero() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("checkpoint.txt"));
        assert_eq!(store.load(), 0);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("checkpoint.txt"));

        store.save(12345).unwrap();
        assert_eq!(store.load(), 12345);
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "12345\n");

        store.save(67890).unwrap();
        assert_eq!(store.load(), 67890);
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn test_corrupt_checkpoint_is_zero() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("checkpoint.txt"));
        fs::write(store.path(), "not-a-number").unwrap();
        assert_eq!(store.load(), 0);
    }

    #[test]
    fn test_save_into_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("nope").join("checkpoint.txt"));
        assert!(store.save(1).is_err());
    }
}
