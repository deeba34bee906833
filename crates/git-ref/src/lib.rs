//! The reference store: the mapping from human-readable names
//! (`refs/heads/main`, `HEAD`, `refs/tags/v1.0`, ...) to object identifiers.
//!
//! A reference either points directly at an object by hash, or symbolically
//! at another reference. The store keeps two on-disk representations in
//! sync — one file per loose reference, plus a single sorted `packed-refs`
//! file for bulk storage — and presents them as one logical namespace
//! through the [`RefStore`] trait. [`files::FilesRefStore`] is the only
//! backend implemented here.
//!
//! Object storage and hashing, and the reflog, are out of scope: this crate
//! only needs enough of each to check an oid exists, peel a tag, and rename
//! a log file, so both are expressed as minimal capability traits
//! ([`odb::ObjectDatabase`], [`reflog::ReflogSink`]) that an embedder
//! implements against its own object database and reflog.

mod error;
pub mod files;
mod name;
pub mod odb;
pub mod reflog;
mod store;

use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub use error::RefError;
pub use files::FilesRefStore;
pub use name::{RefName, REFNAME_MAX};
pub use store::{RefKindFilter, RefStore};

/// Which of the two on-disk representations a [`Reference`] was last read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    Loose,
    Packed,
}

/// What a reference points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceKind {
    Direct(git_hash::ObjectId),
    Symbolic(RefName),
}

/// A reference as last observed by a [`RefStore`].
///
/// Values are owned by the caller: the store never retains a `Reference`
/// after returning it, only the packed-ref cache backing [`RefStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    name: RefName,
    kind: ReferenceKind,
    storage: Storage,
    mtime: Option<SystemTime>,
    owner: PathBuf,
}

impl Reference {
    pub(crate) fn new(
        name: RefName,
        kind: ReferenceKind,
        storage: Storage,
        mtime: Option<SystemTime>,
        owner: &Path,
    ) -> Self {
        Self {
            name,
            kind,
            storage,
            mtime,
            owner: owner.to_path_buf(),
        }
    }

    /// The reference's name.
    pub fn name(&self) -> &RefName {
        &self.name
    }

    /// What the reference points at.
    pub fn kind(&self) -> &ReferenceKind {
        &self.kind
    }

    /// Is this a symbolic reference?
    pub fn is_symbolic(&self) -> bool {
        matches!(self.kind, ReferenceKind::Symbolic(_))
    }

    /// Is this a direct reference?
    pub fn is_direct(&self) -> bool {
        matches!(self.kind, ReferenceKind::Direct(_))
    }

    /// The target oid, if this is a direct reference.
    pub fn direct_oid(&self) -> Option<git_hash::ObjectId> {
        match &self.kind {
            ReferenceKind::Direct(oid) => Some(*oid),
            ReferenceKind::Symbolic(_) => None,
        }
    }

    /// The symbolic target, if this is a symbolic reference.
    pub fn symbolic_target(&self) -> Option<&RefName> {
        match &self.kind {
            ReferenceKind::Symbolic(target) => Some(target),
            ReferenceKind::Direct(_) => None,
        }
    }

    /// Was this reference last read from the packed file rather than a loose file?
    pub fn is_packed(&self) -> bool {
        matches!(self.storage, Storage::Packed)
    }

    /// The repository root this reference belongs to.
    pub fn owner(&self) -> &Path {
        &self.owner
    }

    pub(crate) fn mtime(&self) -> Option<SystemTime> {
        self.mtime
    }
}
