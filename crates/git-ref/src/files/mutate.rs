//! The mutating operations: create, set, delete, rename, and bulk repack.
//!
//! Each operation here is independently atomic; there is no multi-ref
//! transaction. Every write goes through the loose layer first (loose
//! always wins over packed), so updating a reference that currently only
//! exists in the packed file simply creates a shadowing loose file.

use std::cell::RefCell;
use std::path::Path;

use git_hash::ObjectId;

use crate::error::RefError;
use crate::name::RefName;
use crate::odb::ObjectDatabase;
use crate::reflog::ReflogSink;
use crate::{Reference, ReferenceKind};

use super::packed::PackedEntry;
use super::packed_cache::PackedCache;
use super::{loose, walk};

const TAG_PREFIX: &str = "refs/tags/";

fn check_namespace_available(
    git_dir: &Path,
    packed: &PackedCache,
    name: &RefName,
) -> Result<(), RefError> {
    loose::check_dir_file_conflict(git_dir, name)?;
    for entry in packed.iter() {
        if entry.name.directory_conflicts_with(name) {
            return Err(RefError::AlreadyExists(format!(
                "'{}': conflicts with packed reference '{}'",
                name, entry.name
            )));
        }
    }
    Ok(())
}

fn loose_or_packed_exists(
    git_dir: &Path,
    packed: &PackedCache,
    name: &RefName,
) -> Result<bool, RefError> {
    if loose::read_loose_ref(git_dir, name)?.is_some() {
        return Ok(true);
    }
    Ok(packed.contains(name))
}

pub(crate) fn create_direct(
    git_dir: &Path,
    packed: &RefCell<PackedCache>,
    odb: &dyn ObjectDatabase,
    name: &RefName,
    oid: ObjectId,
    force: bool,
) -> Result<Reference, RefError> {
    let mut cache = packed.borrow_mut();
    cache.ensure_loaded(git_dir)?;

    if !force && loose_or_packed_exists(git_dir, &cache, name)? {
        return Err(RefError::AlreadyExists(name.to_string()));
    }
    if force {
        loose::clear_conflicting_dir(git_dir, name)?;
    } else {
        check_namespace_available(git_dir, &cache, name)?;
    }
    drop(cache);

    if !odb.object_exists(&oid) {
        return Err(RefError::NonexistentTarget { oid });
    }

    let mtime = loose::write_direct(git_dir, name, &oid)?;
    Ok(Reference::new(
        name.clone(),
        ReferenceKind::Direct(oid),
        crate::Storage::Loose,
        Some(mtime),
        git_dir,
    ))
}

pub(crate) fn create_symbolic(
    git_dir: &Path,
    packed: &RefCell<PackedCache>,
    name: &RefName,
    target: &RefName,
    force: bool,
) -> Result<Reference, RefError> {
    let mut cache = packed.borrow_mut();
    cache.ensure_loaded(git_dir)?;

    if !force && loose_or_packed_exists(git_dir, &cache, name)? {
        return Err(RefError::AlreadyExists(name.to_string()));
    }
    if force {
        loose::clear_conflicting_dir(git_dir, name)?;
    } else {
        check_namespace_available(git_dir, &cache, name)?;
    }
    drop(cache);

    let mtime = loose::write_symbolic(git_dir, name, target)?;
    Ok(Reference::new(
        name.clone(),
        ReferenceKind::Symbolic(target.clone()),
        crate::Storage::Loose,
        Some(mtime),
        git_dir,
    ))
}

pub(crate) fn set_oid(
    git_dir: &Path,
    odb: &dyn ObjectDatabase,
    reference: &mut Reference,
    oid: ObjectId,
) -> Result<(), RefError> {
    if !reference.is_direct() {
        return Err(RefError::KindMismatch {
            name: reference.name().to_string(),
            expected: "direct",
            actual: "symbolic",
        });
    }
    if !odb.object_exists(&oid) {
        return Err(RefError::NonexistentTarget { oid });
    }

    let mtime = loose::write_direct(git_dir, reference.name(), &oid)?;
    *reference = Reference::new(
        reference.name().clone(),
        ReferenceKind::Direct(oid),
        crate::Storage::Loose,
        Some(mtime),
        git_dir,
    );
    Ok(())
}

pub(crate) fn set_target(
    git_dir: &Path,
    reference: &mut Reference,
    target: &RefName,
) -> Result<(), RefError> {
    if !reference.is_symbolic() {
        return Err(RefError::KindMismatch {
            name: reference.name().to_string(),
            expected: "symbolic",
            actual: "direct",
        });
    }

    let mtime = loose::write_symbolic(git_dir, reference.name(), target)?;
    *reference = Reference::new(
        reference.name().clone(),
        ReferenceKind::Symbolic(target.clone()),
        crate::Storage::Loose,
        Some(mtime),
        git_dir,
    );
    Ok(())
}

pub(crate) fn delete(
    git_dir: &Path,
    packed: &RefCell<PackedCache>,
    reference: &Reference,
) -> Result<(), RefError> {
    loose::delete_loose_ref(git_dir, reference.name())?;

    let mut cache = packed.borrow_mut();
    cache.ensure_loaded(git_dir)?;
    if cache.remove(reference.name()).is_some() {
        cache.commit(git_dir)?;
    }
    Ok(())
}

/// Rename `reference` to `new_name`. If `HEAD` is symbolic and currently
/// points at the old name, it's repointed to follow the rename. The
/// reflog, if any, is moved alongside via `reflog`.
pub(crate) fn rename(
    git_dir: &Path,
    packed: &RefCell<PackedCache>,
    reflog: &dyn ReflogSink,
    reference: &mut Reference,
    new_name: &RefName,
    force: bool,
) -> Result<(), RefError> {
    let old_name = reference.name().clone();
    if old_name == *new_name {
        return Ok(());
    }

    {
        let mut cache = packed.borrow_mut();
        cache.ensure_loaded(git_dir)?;
        if !force && loose_or_packed_exists(git_dir, &cache, new_name)? {
            return Err(RefError::AlreadyExists(new_name.to_string()));
        }
        if force {
            loose::clear_conflicting_dir(git_dir, new_name)?;
        } else {
            check_namespace_available(git_dir, &cache, new_name)?;
        }
    }

    let head_follows = {
        let head_name = RefName::new_unchecked("HEAD");
        match loose::read_loose_ref(git_dir, &head_name)? {
            Some(head) if head.symbolic_target() == Some(&old_name) => true,
            _ => false,
        }
    };

    let kind = reference.kind().clone();

    delete_by_name(git_dir, packed, &old_name)?;

    let create_result = match &kind {
        ReferenceKind::Direct(oid) => loose::write_direct(git_dir, new_name, oid).map(|_| ()),
        ReferenceKind::Symbolic(target) => {
            loose::write_symbolic(git_dir, new_name, target).map(|_| ())
        }
    };
    if let Err(e) = create_result {
        // Roll back: recreate the original reference under its old name.
        let _ = match &kind {
            ReferenceKind::Direct(oid) => loose::write_direct(git_dir, &old_name, oid).map(|_| ()),
            ReferenceKind::Symbolic(target) => {
                loose::write_symbolic(git_dir, &old_name, target).map(|_| ())
            }
        };
        return Err(e);
    }

    reflog.reflog_rename(&old_name, new_name)?;

    if head_follows {
        let head_name = RefName::new_unchecked("HEAD");
        loose::write_symbolic(git_dir, &head_name, new_name)?;
    }

    if let Some(r) = loose::read_loose_ref(git_dir, new_name)? {
        *reference = r;
    }
    Ok(())
}

fn delete_by_name(
    git_dir: &Path,
    packed: &RefCell<PackedCache>,
    name: &RefName,
) -> Result<(), RefError> {
    loose::delete_loose_ref(git_dir, name)?;
    let mut cache = packed.borrow_mut();
    cache.ensure_loaded(git_dir)?;
    if cache.remove(name).is_some() {
        cache.commit(git_dir)?;
    }
    Ok(())
}

/// Migrate every loose direct reference into the packed file.
///
/// Entries are written to the packed file first, with `was_loose` set;
/// only once that commit has landed are the corresponding loose files
/// unlinked. A failure partway through unlinking is not fatal to the
/// refs it didn't reach: every file is attempted, and the first failure
/// is returned once the sweep completes.
pub(crate) fn packall(
    git_dir: &Path,
    packed: &RefCell<PackedCache>,
    odb: &dyn ObjectDatabase,
) -> Result<(), RefError> {
    let loose_refs = walk::load_loose_refs(git_dir)?;

    let mut cache = packed.borrow_mut();
    cache.ensure_loaded(git_dir)?;

    let mut migrated: Vec<RefName> = Vec::new();
    for reference in &loose_refs {
        if reference.name().is_special() {
            continue;
        }
        let Some(oid) = reference.direct_oid() else {
            continue;
        };

        let mut entry = PackedEntry::new(reference.name().clone(), oid).marked_was_loose();
        if reference.name().as_str().starts_with(TAG_PREFIX) {
            if let Some(object) = odb.object_lookup(&oid) {
                if let Some(peel) = odb.tag_target(&object) {
                    entry = entry.with_peel(peel);
                }
            }
        }
        cache.insert(entry);
        migrated.push(reference.name().clone());
    }

    cache.commit(git_dir)?;
    drop(cache);

    let mut first_err = None;
    for name in &migrated {
        if let Err(e) = loose::delete_loose_ref(git_dir, name) {
            if first_err.is_none() {
                first_err = Some(e);
            }
        }
    }

    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
