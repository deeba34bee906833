use std::path::PathBuf;

use git_hash::ObjectId;

/// Error kinds produced by reference-store operations.
#[derive(Debug, thiserror::Error)]
pub enum RefError {
    #[error("reference not found: {0}")]
    NotFound(String),

    #[error("reference already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid reference name: {0}")]
    InvalidName(String),

    #[error("corrupt reference data: {0}")]
    Corrupt(String),

    #[error("expected a {expected} reference, found {actual}: {name}")]
    KindMismatch {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("target object {oid} does not exist in the object database")]
    NonexistentTarget { oid: ObjectId },

    #[error("symbolic reference chain exceeds the maximum nesting of {max}: {name}")]
    TooNested { name: String, max: usize },

    #[error("I/O error on {path}: {source}")]
    IoPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error("out of memory")]
    OutOfMemory,

    #[error(transparent)]
    Lock(#[from] git_utils::UtilError),

    #[error(transparent)]
    Hash(#[from] git_hash::HashError),
}

impl RefError {
    pub(crate) fn io_path(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoPath {
            path: path.into(),
            source,
        }
    }
}
