//! The loose-ref codec: reading and writing the single-file encoding of one
//! reference.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use bstr::ByteSlice;
use git_hash::ObjectId;
use git_utils::lockfile::LockFile;

use crate::error::RefError;
use crate::name::RefName;
use crate::{Reference, ReferenceKind, Storage};

const SYMBOLIC_PREFIX: &[u8] = b"ref: ";

/// Read a loose ref file, if present.
///
/// Content beginning with `ref: ` is a symbolic reference; otherwise the
/// first 40 bytes are parsed as a hex oid. A trailing `\r\n` is tolerated.
/// A present-but-unparseable file is `Corrupt`.
pub(crate) fn read_loose_ref(
    git_dir: &Path,
    name: &RefName,
) -> Result<Option<Reference>, RefError> {
    let path = loose_ref_path(git_dir, name);
    let content = match fs::read(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(RefError::io_path(path, e)),
    };
    let mtime = fs::metadata(&path)
        .and_then(|m| m.modified())
        .map_err(|e| RefError::io_path(&path, e))?;

    Ok(Some(parse_loose_content(
        git_dir, name, &content, Some(mtime),
    )?))
}

fn parse_loose_content(
    git_dir: &Path,
    name: &RefName,
    content: &[u8],
    mtime: Option<SystemTime>,
) -> Result<Reference, RefError> {
    let trimmed = content.trim_end_with(|c| c == '\n' || c == '\r');

    let kind = if let Some(target_bytes) = trimmed.strip_prefix(SYMBOLIC_PREFIX) {
        let target = RefName::new(target_bytes, false)?;
        ReferenceKind::Symbolic(target)
    } else {
        let hex = std::str::from_utf8(trimmed)
            .map_err(|_| RefError::Corrupt(format!("'{}': non-UTF8 loose ref content", name)))?;
        let oid = ObjectId::from_hex(hex)
            .map_err(|_| RefError::Corrupt(format!("'{}': malformed oid", name)))?;
        ReferenceKind::Direct(oid)
    };

    Ok(Reference::new(
        name.clone(),
        kind,
        Storage::Loose,
        mtime,
        git_dir,
    ))
}

/// Conditionally re-read a loose reference: if the file's mtime hasn't
/// advanced past what `reference` last observed, it's returned unchanged;
/// otherwise it's reparsed and mutated in place.
pub(crate) fn refresh_loose(git_dir: &Path, reference: &mut Reference) -> Result<(), RefError> {
    let path = loose_ref_path(git_dir, reference.name());
    let meta = fs::metadata(&path).map_err(|e| RefError::io_path(&path, e))?;
    let mtime = meta.modified().map_err(|e| RefError::io_path(&path, e))?;

    if reference.mtime() == Some(mtime) {
        return Ok(());
    }

    let content = fs::read(&path).map_err(|e| RefError::io_path(&path, e))?;
    *reference = parse_loose_content(git_dir, reference.name(), &content, Some(mtime))?;
    Ok(())
}

/// Write a direct loose ref atomically, returning the new file's mtime.
pub(crate) fn write_direct(
    git_dir: &Path,
    name: &RefName,
    oid: &ObjectId,
) -> Result<SystemTime, RefError> {
    write_loose(git_dir, name, format!("{}\n", oid.to_hex()).as_bytes())
}

/// Write a symbolic loose ref atomically, returning the new file's mtime.
pub(crate) fn write_symbolic(
    git_dir: &Path,
    name: &RefName,
    target: &RefName,
) -> Result<SystemTime, RefError> {
    write_loose(git_dir, name, format!("ref: {}\n", target).as_bytes())
}

fn write_loose(git_dir: &Path, name: &RefName, content: &[u8]) -> Result<SystemTime, RefError> {
    let path = loose_ref_path(git_dir, name);
    check_dir_file_conflict(git_dir, name)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| RefError::io_path(parent, e))?;
    }

    let mut lock = LockFile::acquire(&path)?;
    lock.write_all(content)
        .map_err(|e| RefError::io_path(&path, e))?;
    lock.commit()?;

    let meta = fs::metadata(&path).map_err(|e| RefError::io_path(&path, e))?;
    meta.modified().map_err(|e| RefError::io_path(&path, e))
}

/// Delete a loose ref file, then prune any parent directories under `refs/`
/// left empty by its removal.
pub(crate) fn delete_loose_ref(git_dir: &Path, name: &RefName) -> Result<(), RefError> {
    let path = loose_ref_path(git_dir, name);
    match fs::remove_file(&path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(RefError::io_path(&path, e)),
    }

    let refs_dir = git_dir.join("refs");
    let mut dir = path.parent().map(|p| p.to_path_buf());
    while let Some(d) = dir {
        if d == refs_dir || d == *git_dir {
            break;
        }
        let is_empty = fs::read_dir(&d)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if is_empty {
            let _ = fs::remove_dir(&d);
            dir = d.parent().map(|p| p.to_path_buf());
        } else {
            break;
        }
    }
    Ok(())
}

/// A reference name never exists as both a file and a directory in the
/// loose tree: check both directions before creating `name`.
pub(crate) fn check_dir_file_conflict(git_dir: &Path, name: &RefName) -> Result<(), RefError> {
    let ref_path = loose_ref_path(git_dir, name);

    let mut current = git_dir.to_path_buf();
    for component in name.as_str().split('/') {
        current = current.join(component);
        if current == ref_path {
            break;
        }
        if current.is_file() {
            return Err(RefError::AlreadyExists(format!(
                "'{}': '{}' already exists as a file",
                name,
                current.strip_prefix(git_dir).unwrap_or(&current).display()
            )));
        }
    }

    if ref_path.is_dir() {
        return Err(RefError::AlreadyExists(format!(
            "'{}': already exists as a directory",
            name
        )));
    }

    Ok(())
}

/// Force path for [`check_dir_file_conflict`]'s directory branch: if `name`'s
/// loose path is currently a directory (other loose refs nest under it),
/// clear it out so a leaf file can take its place.
pub(crate) fn clear_conflicting_dir(git_dir: &Path, name: &RefName) -> Result<(), RefError> {
    let ref_path = loose_ref_path(git_dir, name);
    if ref_path.is_dir() {
        fs::remove_dir_all(&ref_path).map_err(|e| RefError::io_path(&ref_path, e))?;
    }
    Ok(())
}

/// Peek the first few bytes of a loose ref file to tell direct from symbolic
/// without parsing the whole thing.
pub(crate) fn peek_is_symbolic(git_dir: &Path, name: &RefName) -> Result<bool, RefError> {
    let path = loose_ref_path(git_dir, name);
    let content = fs::read(&path).map_err(|e| RefError::io_path(&path, e))?;
    Ok(content.starts_with(SYMBOLIC_PREFIX))
}

pub(crate) fn loose_ref_path(git_dir: &Path, name: &RefName) -> PathBuf {
    git_dir.join(name.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid() -> ObjectId {
        ObjectId::from_hex("da39a3ee5e6b4b0d3255bfef95601890afd80709").unwrap()
    }

    #[test]
    fn read_direct_ref() {
        let dir = tempfile::tempdir().unwrap();
        let git_dir = dir.path();
        let refs_dir = git_dir.join("refs/heads");
        fs::create_dir_all(&refs_dir).unwrap();
        fs::write(
            refs_dir.join("main"),
            "da39a3ee5e6b4b0d3255bfef95601890afd80709\n",
        )
        .unwrap();

        let name = RefName::new("refs/heads/main", true).unwrap();
        let reference = read_loose_ref(git_dir, &name).unwrap().unwrap();
        assert_eq!(reference.direct_oid(), Some(oid()));
        assert!(!reference.is_packed());
    }

    #[test]
    fn read_symbolic_ref() {
        let dir = tempfile::tempdir().unwrap();
        let git_dir = dir.path();
        fs::write(git_dir.join("HEAD"), "ref: refs/heads/main\n").unwrap();

        let name = RefName::new("HEAD", true).unwrap();
        let reference = read_loose_ref(git_dir, &name).unwrap().unwrap();
        assert_eq!(
            reference.symbolic_target().unwrap().as_str(),
            "refs/heads/main"
        );
    }

    #[test]
    fn tolerates_crlf() {
        let dir = tempfile::tempdir().unwrap();
        let git_dir = dir.path();
        fs::write(
            git_dir.join("HEAD"),
            "da39a3ee5e6b4b0d3255bfef95601890afd80709\r\n",
        )
        .unwrap();

        let name = RefName::new("HEAD", true).unwrap();
        let reference = read_loose_ref(git_dir, &name).unwrap().unwrap();
        assert_eq!(reference.direct_oid(), Some(oid()));
    }

    #[test]
    fn read_nonexistent_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let name = RefName::new("refs/heads/nope", true).unwrap();
        assert!(read_loose_ref(dir.path(), &name).unwrap().is_none());
    }

    #[test]
    fn corrupt_short_oid_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let git_dir = dir.path();
        fs::write(git_dir.join("HEAD"), "abcd\n").unwrap();
        let name = RefName::new("HEAD", true).unwrap();
        assert!(matches!(
            read_loose_ref(git_dir, &name),
            Err(RefError::Corrupt(_))
        ));
    }

    #[test]
    fn write_and_read_direct() {
        let dir = tempfile::tempdir().unwrap();
        let git_dir = dir.path();
        let name = RefName::new("refs/heads/main", true).unwrap();
        write_direct(git_dir, &name, &oid()).unwrap();
        let reference = read_loose_ref(git_dir, &name).unwrap().unwrap();
        assert_eq!(reference.direct_oid(), Some(oid()));
    }

    #[test]
    fn write_and_read_symbolic() {
        let dir = tempfile::tempdir().unwrap();
        let git_dir = dir.path();
        let name = RefName::new("HEAD", true).unwrap();
        let target = RefName::new("refs/heads/main", false).unwrap();
        write_symbolic(git_dir, &name, &target).unwrap();
        let reference = read_loose_ref(git_dir, &name).unwrap().unwrap();
        assert_eq!(reference.symbolic_target(), Some(&target));
    }

    #[test]
    fn delete_removes_file_and_empty_parents() {
        let dir = tempfile::tempdir().unwrap();
        let git_dir = dir.path();
        let name = RefName::new("refs/heads/feature/sub", true).unwrap();
        write_direct(git_dir, &name, &oid()).unwrap();
        assert!(read_loose_ref(git_dir, &name).unwrap().is_some());

        delete_loose_ref(git_dir, &name).unwrap();
        assert!(read_loose_ref(git_dir, &name).unwrap().is_none());
        assert!(!git_dir.join("refs/heads/feature").exists());
    }

    #[test]
    fn delete_nonexistent_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let name = RefName::new("refs/heads/nope", true).unwrap();
        assert!(delete_loose_ref(dir.path(), &name).is_ok());
    }

    #[test]
    fn refresh_skips_reread_when_mtime_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let git_dir = dir.path();
        let name = RefName::new("refs/heads/main", true).unwrap();
        write_direct(git_dir, &name, &oid()).unwrap();
        let mut reference = read_loose_ref(git_dir, &name).unwrap().unwrap();

        refresh_loose(git_dir, &mut reference).unwrap();
        assert_eq!(reference.direct_oid(), Some(oid()));
    }

    #[test]
    fn dir_file_conflict_blocks_nested_create() {
        let dir = tempfile::tempdir().unwrap();
        let git_dir = dir.path();
        let parent = RefName::new("refs/heads/topic", true).unwrap();
        write_direct(git_dir, &parent, &oid()).unwrap();

        let child = RefName::new("refs/heads/topic/feature", true).unwrap();
        assert!(matches!(
            check_dir_file_conflict(git_dir, &child),
            Err(RefError::AlreadyExists(_))
        ));
    }

    #[test]
    fn dir_file_conflict_blocks_parent_create_over_existing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let git_dir = dir.path();
        let child = RefName::new("refs/heads/topic/feature", true).unwrap();
        write_direct(git_dir, &child, &oid()).unwrap();

        let parent = RefName::new("refs/heads/topic", true).unwrap();
        assert!(matches!(
            check_dir_file_conflict(git_dir, &parent),
            Err(RefError::AlreadyExists(_))
        ));
    }
}
