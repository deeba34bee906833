//! The reference directory walker: enumerates loose references under
//! `refs/` plus the well-known top-level names, in list mode (names only,
//! for [`super::super::RefStore::foreach`]) and load mode (names with
//! their content, for [`super::mutate::packall`]).

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::RefError;
use crate::name::{RefName, SPECIAL_REFS};
use crate::Reference;

use super::loose;

/// List every loose reference name under `git_dir`, in no particular order.
pub(crate) fn list_loose_refs(git_dir: &Path) -> Result<Vec<RefName>, RefError> {
    let mut names = Vec::new();

    for special in SPECIAL_REFS {
        if git_dir.join(special).is_file() {
            names.push(RefName::new(special.as_bytes(), true)?);
        }
    }

    let refs_dir = git_dir.join("refs");
    if refs_dir.is_dir() {
        walk_dir(git_dir, &refs_dir, &mut names)?;
    }

    Ok(names)
}

fn walk_dir(git_dir: &Path, dir: &Path, out: &mut Vec<RefName>) -> Result<(), RefError> {
    let entries = fs::read_dir(dir).map_err(|e| RefError::io_path(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| RefError::io_path(dir, e))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|e| RefError::io_path(&path, e))?;

        if file_type.is_dir() {
            walk_dir(git_dir, &path, out)?;
            continue;
        }
        if !file_type.is_file() {
            continue;
        }

        let Ok(rel) = path.strip_prefix(git_dir) else {
            continue;
        };
        let Some(rel_str) = rel.to_str() else { continue };
        if rel_str.ends_with(".lock") {
            continue;
        }

        // Windows path separators never appear here in practice, but keep
        // the name grammar's `/`-only expectation honest.
        let normalized = rel_str.replace(std::path::MAIN_SEPARATOR, "/");
        match RefName::new(normalized.as_bytes(), true) {
            Ok(name) => out.push(name),
            Err(_) => continue,
        }
    }
    Ok(())
}

/// Load mode: enumerate loose references and read each one's content.
///
/// A file that disappears between listing and reading (e.g. deleted by a
/// concurrent writer) is silently skipped rather than surfaced as an error.
pub(crate) fn load_loose_refs(git_dir: &Path) -> Result<Vec<Reference>, RefError> {
    let names = list_loose_refs(git_dir)?;
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        if let Some(reference) = loose::read_loose_ref(git_dir, &name)? {
            out.push(reference);
        }
    }
    Ok(out)
}
