use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tempfile::NamedTempFile;

use crate::error::{LockError, UtilError};
use crate::Result;

const LOCK_SUFFIX: &str = ".lock";

/// RAII lock file guard, matching C git's lock file protocol but built on
/// two published primitives instead of a hand-rolled one: an flock'd marker
/// file at `<path>.lock` serializes concurrent writers, and a same-directory
/// [`NamedTempFile`] stages the new content for an atomic rename on commit.
///
/// - `acquire` creates (or opens) `<path>.lock` and takes an exclusive,
///   non-blocking flock on it — held across process crashes only as long as
///   the OS holds the file descriptor open, so a crashed writer's lock is
///   released automatically.
/// - Writes go to the staging file, never to `<path>.lock` directly.
/// - `commit` persists the staging file over `path` and drops the flock.
/// - `Drop` (or `rollback`) discards the staging file and drops the flock
///   without touching `path`.
pub struct LockFile {
    path: PathBuf,
    lock_path: PathBuf,
    marker: Option<File>,
    staging: Option<NamedTempFile>,
    committed: bool,
}

impl LockFile {
    /// Acquire a lock on `path`. Fails with [`LockError::AlreadyLocked`] if
    /// another holder currently has the marker file locked.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let lock_path = PathBuf::from(format!("{}{}", path.display(), LOCK_SUFFIX));

        let marker = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| {
                UtilError::Lock(LockError::Create {
                    path: lock_path.clone(),
                    source: e,
                })
            })?;

        match marker.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                return Err(UtilError::Lock(LockError::AlreadyLocked {
                    path: lock_path.clone(),
                }))
            }
            Err(e) => {
                return Err(UtilError::Lock(LockError::Create {
                    path: lock_path.clone(),
                    source: e,
                }))
            }
        }

        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        let staging = tempfile::Builder::new()
            .prefix(".tmp-lock-")
            .tempfile_in(parent)
            .map_err(|e| {
                UtilError::Lock(LockError::Create {
                    path: lock_path.clone(),
                    source: e,
                })
            })?;

        Ok(Self {
            path,
            lock_path,
            marker: Some(marker),
            staging: Some(staging),
            committed: false,
        })
    }

    /// Try to acquire without blocking. Returns `Ok(None)` if already locked,
    /// `Ok(Some(lockfile))` on success, or `Err` on other failures.
    pub fn try_acquire(path: impl AsRef<Path>) -> Result<Option<Self>> {
        match Self::acquire(path) {
            Ok(lk) => Ok(Some(lk)),
            Err(UtilError::Lock(LockError::AlreadyLocked { .. })) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Mutable access to the staging file for writers that want direct
    /// control (e.g. `File::set_len`) instead of going through `Write`.
    pub fn file_mut(&mut self) -> Option<&mut File> {
        self.staging.as_mut().map(|s| s.as_file_mut())
    }

    /// The path of the target file (without `.lock`).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The path of the marker file (with `.lock`).
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Commit: sync the staging file, persist it over the target path, and
    /// release the marker lock.
    pub fn commit(mut self) -> Result<()> {
        let staging = self.staging.take().expect("staging file present until commit/drop");
        staging.as_file().sync_all().map_err(|e| {
            UtilError::Lock(LockError::Commit {
                path: self.lock_path.clone(),
                source: e,
            })
        })?;
        staging.persist(&self.path).map_err(|e| {
            UtilError::Lock(LockError::Commit {
                path: self.lock_path.clone(),
                source: e.error,
            })
        })?;

        self.release_marker();
        self.committed = true;
        Ok(())
    }

    /// Rollback: discard the staging file and release the marker lock
    /// without touching the target path. Also happens on `Drop`.
    pub fn rollback(mut self) -> Result<()> {
        self.staging.take();
        self.release_marker();
        self.committed = true;
        Ok(())
    }

    fn release_marker(&mut self) {
        if let Some(marker) = self.marker.take() {
            let _ = marker.unlock();
        }
        let _ = std::fs::remove_file(&self.lock_path);
    }
}

impl Write for LockFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.staging
            .as_mut()
            .ok_or_else(|| io::Error::other("lock file already closed"))?
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.staging
            .as_mut()
            .ok_or_else(|| io::Error::other("lock file already closed"))?
            .flush()
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if !self.committed {
            self.staging.take();
            self.release_marker();
        }
    }
}
