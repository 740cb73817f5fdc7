//! Resume-tailing checkpoints.
//!
//! A checkpoint records how far into which journal the watcher had folded,
//! plus the hash of the last line consumed. On the next start the hash is
//! checked against the file before the position is trusted.

use crate::error::WatchError;
use crate::journal::{self, JournalFile};
use fs2::FileExt;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// A persisted tailing position.
///
/// The file is JSON and can be inspected directly:
///
/// ```text
/// $ cat journalfold.checkpoint.json
/// {
///   "file": "Journal.2024-03-05T201501.01.log",
///   "offset": 18211,
///   "hash": "a3f2e1b09c4d7781"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Checkpoint {
    /// Journal file name.
    pub file: String,

    /// Byte offset just past the last line consumed.
    pub offset: u64,

    /// Hex-encoded xxh64 hash of the last line consumed.
    pub hash: String,
}

impl Checkpoint {
    pub fn new(file: impl Into<String>, offset: u64, line_hash: u64) -> Self {
        Checkpoint {
            file: file.into(),
            offset,
            hash: format!("{line_hash:016x}"),
        }
    }

    /// Find the journal this checkpoint points into and return it positioned
    /// at the checkpoint, if the file still holds the recorded line there.
    pub fn locate(&self, files: &[JournalFile]) -> Option<JournalFile> {
        let file = files.iter().find(|f| f.name() == self.file)?;
        match journal::read_line_hash_before(file.path(), self.offset) {
            Ok(Some(hash)) if format!("{hash:016x}") == self.hash => {
                Some(file.clone().with_offset(self.offset))
            }
            Ok(_) => {
                warn!(
                    "journalfold: checkpoint for {} no longer matches the file, ignoring it",
                    self.file
                );
                None
            }
            Err(e) => {
                warn!("journalfold: cannot verify checkpoint for {}: {e}", self.file);
                None
            }
        }
    }

    /// Read the checkpoint at `path`. A missing or unparsable file reads as
    /// `None` and the caller falls back to a full replay.
    pub fn read(path: &Path) -> io::Result<Option<Self>> {
        let bytes = match fs::read(path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            other => other?,
        };
        Ok(serde_json::from_slice(&bytes).ok())
    }

    /// Write to `path` through a synced temporary sibling renamed into
    /// place. A crash leaves either the old checkpoint or this one.
    pub fn write(&self, path: &Path) -> io::Result<()> {
        let tmp = tmp_path(path);
        {
            let mut file = File::create(&tmp)?;
            serde_json::to_writer_pretty(&mut file, self)?;
            file.sync_data()?;
        }
        fs::rename(&tmp, path)
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    path.with_extension("json.tmp")
}

/// Exclusive owner of a checkpoint file.
///
/// Holds an advisory lock on a sibling `.lock` file for its lifetime so two
/// monitors never write the same checkpoint. Positions are recorded in
/// memory and written by [`flush`](Self::flush).
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    lock: File,
    dirty: Option<Checkpoint>,
}

impl CheckpointStore {
    /// Open the store and take its lock.
    ///
    /// # Errors
    ///
    /// [`WatchError::CheckpointLocked`] if another store holds the lock,
    /// [`WatchError::Checkpoint`] if the lock file cannot be created.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, WatchError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(WatchError::Checkpoint)?;
        }
        let lock_path = path.with_extension("lock");
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(WatchError::Checkpoint)?;
        FileExt::try_lock_exclusive(&lock)
            .map_err(|_| WatchError::CheckpointLocked { path: path.clone() })?;

        Ok(CheckpointStore {
            path,
            lock,
            dirty: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> io::Result<Option<Checkpoint>> {
        Checkpoint::read(&self.path)
    }

    /// Remember a new position; written on the next [`flush`](Self::flush).
    pub fn record(&mut self, checkpoint: Checkpoint) {
        self.dirty = Some(checkpoint);
    }

    /// Write the last recorded position, if any.
    pub fn flush(&mut self) -> io::Result<()> {
        if let Some(checkpoint) = self.dirty.take() {
            checkpoint.write(&self.path)?;
        }
        Ok(())
    }

    /// Drop any recorded position and delete the file, along with a
    /// temporary left by an interrupted write. Idempotent.
    pub fn clear(&mut self) -> io::Result<()> {
        self.dirty = None;
        for path in [self.path.clone(), tmp_path(&self.path)] {
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != io::ErrorKind::NotFound {
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}

impl Drop for CheckpointStore {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.lock);
    }
}
