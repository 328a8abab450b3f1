//! Per-record JSON persistence.
//!
//! Every write goes to a sibling temp file first and is then renamed onto `<id>.json`, so a
//! reader sees either the old file or the new one, never a torn write. Transient failures
//! retry the whole temp-write/rename sequence from scratch; the target is only ever touched by
//! the final rename.

use crate::entry::{validate_id, InstructionEntry, RawInstruction};
use crate::{CatalogError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

pub const RECORD_EXTENSION: &str = "json";
pub const DEFAULT_WRITE_ATTEMPTS: u32 = 5;
pub const DEFAULT_WRITE_BACKOFF: Duration = Duration::from_millis(10);

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Filesystem operations used by the write path. Swappable so tests can inject failures.
pub trait StoreFs: Send + Sync {
    fn write_file(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    fn remove_file(&self, path: &Path) -> io::Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OsFs;

impl StoreFs for OsFs {
    fn write_file(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(bytes)?;
        file.sync_all()
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: u32,
    /// Linear backoff unit: attempt `n` waits `n * backoff` before the next try.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_WRITE_ATTEMPTS,
            backoff: DEFAULT_WRITE_BACKOFF,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LoadError {
    pub file: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct LoadedRecord {
    pub file_name: String,
    pub raw: RawInstruction,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct LoadOutcome {
    pub records: Vec<LoadedRecord>,
    pub errors: Vec<LoadError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    pub path: PathBuf,
    pub attempts: u32,
}

#[derive(Clone)]
pub struct RecordStore {
    dir: PathBuf,
    retry: RetryPolicy,
    fs: Arc<dyn StoreFs>,
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("dir", &self.dir)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl RecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            retry: RetryPolicy::default(),
            fs: Arc::new(OsFs),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = RetryPolicy {
            attempts: retry.attempts.max(1),
            backoff: retry.backoff,
        };
        self
    }

    pub fn with_fs(mut self, fs: Arc<dyn StoreFs>) -> Self {
        self.fs = fs;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn path_for(&self, id: &str) -> Result<PathBuf> {
        validate_id(id)?;
        Ok(self.dir.join(format!("{id}.{RECORD_EXTENSION}")))
    }

    /// Sorted `*.json` file names. A missing directory is an empty catalog.
    pub fn list_files(&self) -> Result<Vec<String>> {
        let read_dir = match std::fs::read_dir(&self.dir) {
            Ok(read_dir) => read_dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut names = Vec::new();
        for item in read_dir {
            let item = item?;
            if !item.file_type()?.is_file() {
                continue;
            }
            let Some(name) = item.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if is_record_file_name(&name) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Reads every record file. Unreadable or malformed files are reported in
    /// [`LoadOutcome::errors`] instead of failing the whole load.
    pub fn load(&self) -> Result<LoadOutcome> {
        let mut outcome = LoadOutcome::default();
        for file_name in self.list_files()? {
            match self.read_record(&file_name) {
                Ok(record) => outcome.records.push(record),
                Err(err) => {
                    log::warn!("Skipping instruction file {file_name}: {err}");
                    outcome.errors.push(LoadError {
                        file: file_name,
                        message: err.to_string(),
                    });
                }
            }
        }
        Ok(outcome)
    }

    pub fn load_one(&self, id: &str) -> Result<Option<LoadedRecord>> {
        let path = self.path_for(id)?;
        if !path.exists() {
            return Ok(None);
        }
        self.read_record(&format!("{id}.{RECORD_EXTENSION}"))
            .map(Some)
    }

    pub fn save(&self, entry: &InstructionEntry) -> Result<SaveReport> {
        let target = self.path_for(&entry.id)?;
        let mut bytes = serde_json::to_vec_pretty(entry)?;
        bytes.push(b'\n');
        std::fs::create_dir_all(&self.dir)?;
        self.write_atomic(&entry.id, &target, &bytes)
    }

    /// Deletes `<id>.json`. Returns `false` when there was nothing to delete.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let path = self.path_for(id)?;
        match self.fs.remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn write_atomic(&self, id: &str, target: &Path, bytes: &[u8]) -> Result<SaveReport> {
        let attempts = self.retry.attempts.max(1);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let tmp = self.dir.join(format!(
                ".{id}.{RECORD_EXTENSION}.tmp-{}-{}",
                std::process::id(),
                TMP_SEQ.fetch_add(1, Ordering::Relaxed)
            ));

            let result = self
                .fs
                .write_file(&tmp, bytes)
                .and_then(|()| self.fs.rename(&tmp, target));
            let err = match result {
                Ok(()) => {
                    return Ok(SaveReport {
                        path: target.to_path_buf(),
                        attempts: attempt,
                    })
                }
                Err(err) => err,
            };

            let _ = self.fs.remove_file(&tmp);
            if attempt >= attempts || !is_transient(&err) {
                return Err(CatalogError::AtomicWrite {
                    path: target.to_path_buf(),
                    attempts: attempt,
                    source: err,
                });
            }

            let delay = self.retry.backoff.saturating_mul(attempt);
            log::warn!(
                "Atomic write to {} failed (attempt {attempt}/{attempts}): {err}; retrying in {}ms",
                target.display(),
                delay.as_millis()
            );
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
        }
    }

    fn read_record(&self, file_name: &str) -> Result<LoadedRecord> {
        let path = self.dir.join(file_name);
        let text = std::fs::read_to_string(&path)?;
        let mut raw: RawInstruction = serde_json::from_str(&text)?;

        let stem = file_name
            .strip_suffix(&format!(".{RECORD_EXTENSION}"))
            .unwrap_or(file_name);
        match raw.id.as_deref().map(str::trim) {
            None | Some("") => raw.id = Some(stem.to_string()),
            Some(id) if id == stem => {}
            Some(id) => {
                return Err(CatalogError::validation(format!(
                    "embedded id '{id}' does not match file name"
                )))
            }
        }

        let modified = std::fs::metadata(&path)?
            .modified()
            .unwrap_or(SystemTime::UNIX_EPOCH);
        Ok(LoadedRecord {
            file_name: file_name.to_string(),
            raw,
            modified: DateTime::<Utc>::from(modified),
        })
    }
}

pub(crate) fn is_record_file_name(name: &str) -> bool {
    !name.starts_with('.') && name.ends_with(&format!(".{RECORD_EXTENSION}"))
}

/// Lock and permission errors that shared or networked filesystems report while another
/// process briefly holds the file.
fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::PermissionDenied
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::Interrupted
            | io::ErrorKind::TimedOut
    ) || matches!(err.raw_os_error(), Some(16 | 26 | 32 | 33))
}
