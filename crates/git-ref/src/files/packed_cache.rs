//! The in-memory packed-ref cache: a name→entry map kept fresh against the
//! packed-refs file's mtime.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use git_utils::lockfile::LockFile;

use super::packed::{self, PackedEntry};
use crate::error::RefError;
use crate::name::RefName;

/// Lazily-loaded, mtime-revalidated view of the packed-refs file.
#[derive(Debug, Default)]
pub struct PackedCache {
    entries: HashMap<RefName, PackedEntry>,
    source_mtime: Option<SystemTime>,
    loaded: bool,
}

fn packed_refs_path(git_dir: &Path) -> PathBuf {
    git_dir.join("packed-refs")
}

impl PackedCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Revalidate against the packed file's mtime, reloading only if it has
    /// advanced since the last load (or this is the first call).
    ///
    /// A reparse failure drops the cache entirely — callers must not trust
    /// stale entries once corruption has been observed — and propagates the
    /// `Corrupt` error.
    pub fn ensure_loaded(&mut self, git_dir: &Path) -> Result<(), RefError> {
        let path = packed_refs_path(git_dir);
        let meta = match fs::metadata(&path) {
            Ok(meta) => Some(meta),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(RefError::io_path(path, e)),
        };

        let Some(meta) = meta else {
            self.entries.clear();
            self.source_mtime = None;
            self.loaded = true;
            return Ok(());
        };

        let mtime = meta.modified().map_err(|e| RefError::io_path(&path, e))?;
        if self.loaded {
            if let Some(prev) = self.source_mtime {
                if mtime <= prev {
                    return Ok(());
                }
            }
        }

        let data = fs::read(&path).map_err(|e| RefError::io_path(&path, e))?;
        match packed::parse(&data) {
            Ok(parsed) => {
                self.entries = parsed.into_iter().map(|e| (e.name.clone(), e)).collect();
                self.source_mtime = Some(mtime);
                self.loaded = true;
                Ok(())
            }
            Err(e) => {
                self.entries.clear();
                self.source_mtime = None;
                self.loaded = false;
                Err(e)
            }
        }
    }

    pub fn get(&self, name: &RefName) -> Option<&PackedEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &RefName) -> bool {
        self.entries.contains_key(name)
    }

    pub fn remove(&mut self, name: &RefName) -> Option<PackedEntry> {
        self.entries.remove(name)
    }

    pub fn insert(&mut self, entry: PackedEntry) {
        self.entries.insert(entry.name.clone(), entry);
    }

    pub fn iter(&self) -> impl Iterator<Item = &PackedEntry> {
        self.entries.values()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rewrite the packed file from the current in-memory entries, atomically,
    /// and refresh `source_mtime` from the committed file.
    pub fn commit(&mut self, git_dir: &Path) -> Result<(), RefError> {
        let path = packed_refs_path(git_dir);
        let all: Vec<PackedEntry> = self.entries.values().cloned().collect();
        let bytes = packed::emit(&all);

        let mut lock = LockFile::acquire(&path)?;
        lock.write_all(&bytes)
            .map_err(|e| RefError::io_path(&path, e))?;
        lock.commit()?;

        let meta = fs::metadata(&path).map_err(|e| RefError::io_path(&path, e))?;
        self.source_mtime = Some(meta.modified().map_err(|e| RefError::io_path(&path, e))?);
        self.loaded = true;
        Ok(())
    }
}
