//! The files-backed reference store: loose refs under `.git/refs/` plus a
//! single aggregated `packed-refs` file, presented as one logical
//! namespace through [`RefStore`].

pub(crate) mod loose;
pub(crate) mod mutate;
pub(crate) mod packed;
pub(crate) mod packed_cache;
pub(crate) mod walk;

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use git_hash::ObjectId;

use crate::error::RefError;
use crate::name::RefName;
use crate::odb::{EmptyObjectDatabase, ObjectDatabase};
use crate::reflog::{NullReflog, ReflogSink};
use crate::store::{RefKindFilter, RefStore};
use crate::{Reference, ReferenceKind, Storage};

use self::packed_cache::PackedCache;

/// Maximum depth a symbolic reference chain may be followed before
/// resolution gives up with [`RefError::TooNested`].
pub const MAX_NESTING: usize = 5;

/// The files backend: loose refs + packed-refs, matching the on-disk
/// layout of a typical `.git` directory's reference storage.
///
/// Not internally thread-safe: a store shared across threads must be
/// externally serialized by the caller.
pub struct FilesRefStore {
    git_dir: PathBuf,
    packed: RefCell<PackedCache>,
    odb: Box<dyn ObjectDatabase>,
    reflog: Box<dyn ReflogSink>,
}

impl FilesRefStore {
    /// Open a files-backed store rooted at `git_dir`, with no object
    /// database or reflog wired in (every direct-ref write will fail with
    /// `NonexistentTarget`, and renames won't move reflog files).
    pub fn new(git_dir: impl AsRef<Path>) -> Self {
        Self {
            git_dir: git_dir.as_ref().to_path_buf(),
            packed: RefCell::new(PackedCache::new()),
            odb: Box::new(EmptyObjectDatabase),
            reflog: Box::new(NullReflog),
        }
    }

    /// Open a files-backed store with a real object database and reflog
    /// sink plugged in.
    pub fn with_collaborators(
        git_dir: impl AsRef<Path>,
        odb: Box<dyn ObjectDatabase>,
        reflog: Box<dyn ReflogSink>,
    ) -> Self {
        Self {
            git_dir: git_dir.as_ref().to_path_buf(),
            packed: RefCell::new(PackedCache::new()),
            odb,
            reflog,
        }
    }

    /// The repository's `.git` directory this store is rooted at.
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    fn lookup_inner(&self, name: &RefName) -> Result<Reference, RefError> {
        if let Some(reference) = loose::read_loose_ref(&self.git_dir, name)? {
            return Ok(reference);
        }

        let mut cache = self.packed.borrow_mut();
        cache.ensure_loaded(&self.git_dir)?;
        match cache.get(name) {
            Some(entry) => Ok(Reference::new(
                name.clone(),
                ReferenceKind::Direct(entry.oid),
                Storage::Packed,
                None,
                &self.git_dir,
            )),
            None => Err(RefError::NotFound(name.to_string())),
        }
    }
}

impl RefStore for FilesRefStore {
    fn normalize(&self, name: &[u8], is_direct: bool) -> Result<RefName, RefError> {
        RefName::new(name, is_direct)
    }

    fn lookup(&self, name: &RefName) -> Result<Reference, RefError> {
        self.lookup_inner(name)
    }

    fn resolve(&self, reference: &Reference) -> Result<Reference, RefError> {
        let mut current = reference.clone();
        let mut depth = 0;
        loop {
            match current.kind() {
                ReferenceKind::Direct(_) => return Ok(current),
                ReferenceKind::Symbolic(target) => {
                    if depth >= MAX_NESTING {
                        return Err(RefError::TooNested {
                            name: reference.name().to_string(),
                            max: MAX_NESTING,
                        });
                    }
                    let target = target.clone();
                    current = self.lookup_inner(&target)?;
                    depth += 1;
                }
            }
        }
    }

    fn exists(&self, name: &RefName) -> Result<bool, RefError> {
        if loose::read_loose_ref(&self.git_dir, name)?.is_some() {
            return Ok(true);
        }
        let mut cache = self.packed.borrow_mut();
        cache.ensure_loaded(&self.git_dir)?;
        Ok(cache.contains(name))
    }

    fn create_direct(
        &self,
        name: &RefName,
        oid: ObjectId,
        force: bool,
    ) -> Result<Reference, RefError> {
        mutate::create_direct(&self.git_dir, &self.packed, self.odb.as_ref(), name, oid, force)
    }

    fn create_symbolic(
        &self,
        name: &RefName,
        target: &RefName,
        force: bool,
    ) -> Result<Reference, RefError> {
        mutate::create_symbolic(&self.git_dir, &self.packed, name, target, force)
    }

    fn set_oid(&self, reference: &mut Reference, oid: ObjectId) -> Result<(), RefError> {
        mutate::set_oid(&self.git_dir, self.odb.as_ref(), reference, oid)
    }

    fn set_target(&self, reference: &mut Reference, target: &RefName) -> Result<(), RefError> {
        mutate::set_target(&self.git_dir, reference, target)
    }

    fn rename(
        &self,
        reference: &mut Reference,
        new_name: &RefName,
        force: bool,
    ) -> Result<(), RefError> {
        mutate::rename(
            &self.git_dir,
            &self.packed,
            self.reflog.as_ref(),
            reference,
            new_name,
            force,
        )
    }

    fn delete(&self, reference: &Reference) -> Result<(), RefError> {
        mutate::delete(&self.git_dir, &self.packed, reference)
    }

    fn foreach(
        &self,
        kind_filter: Option<RefKindFilter>,
        cb: &mut dyn FnMut(&RefName) -> Result<(), RefError>,
    ) -> Result<(), RefError> {
        let passes_filter = |is_direct: bool| match kind_filter {
            Some(RefKindFilter::Direct) => is_direct,
            Some(RefKindFilter::Symbolic) => !is_direct,
            None => true,
        };

        let mut seen = std::collections::HashSet::new();

        for name in walk::list_loose_refs(&self.git_dir)? {
            let is_direct = !loose::peek_is_symbolic(&self.git_dir, &name)?;
            if passes_filter(is_direct) {
                cb(&name)?;
            }
            seen.insert(name);
        }

        let mut cache = self.packed.borrow_mut();
        cache.ensure_loaded(&self.git_dir)?;
        for entry in cache.iter() {
            if seen.contains(&entry.name) {
                continue;
            }
            // Packed entries are always direct.
            if passes_filter(true) {
                cb(&entry.name)?;
            }
        }

        Ok(())
    }

    fn packall(&self) -> Result<(), RefError> {
        mutate::packall(&self.git_dir, &self.packed, self.odb.as_ref())
    }

    fn reload(&self, reference: &mut Reference) -> Result<(), RefError> {
        if reference.is_packed() {
            // The packed cache already applies its own mtime-conditional
            // freshness check on access; a plain lookup reuses it.
            *reference = self.lookup_inner(reference.name())?;
            return Ok(());
        }

        match loose::refresh_loose(&self.git_dir, reference) {
            Ok(()) => Ok(()),
            Err(RefError::IoPath { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                // The loose file is gone — it may have been packed or
                // deleted since this reference was last read.
                *reference = self.lookup_inner(reference.name())?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::odb::tests_support::FakeObjectDatabase;

    fn oid(n: u8) -> ObjectId {
        ObjectId::from_hex(&format!("{:040x}", n)).unwrap()
    }

    fn name(s: &str) -> RefName {
        RefName::new(s, true).unwrap()
    }

    fn store_with_db(git_dir: &Path, db: FakeObjectDatabase) -> FilesRefStore {
        FilesRefStore::with_collaborators(git_dir, Box::new(db), Box::new(NullReflog))
    }

    #[test]
    fn create_lookup_direct_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let db = FakeObjectDatabase::new();
        db.insert_commit(oid(1));
        let store = store_with_db(dir.path(), db);

        store
            .create_direct(&name("refs/heads/main"), oid(1), false)
            .unwrap();
        let looked_up = store.lookup(&name("refs/heads/main")).unwrap();
        assert_eq!(looked_up.direct_oid(), Some(oid(1)));
    }

    #[test]
    fn resolve_symbolic_chain() {
        let dir = tempfile::tempdir().unwrap();
        let db = FakeObjectDatabase::new();
        db.insert_commit(oid(2));
        let store = store_with_db(dir.path(), db);

        store
            .create_direct(&name("refs/heads/main"), oid(2), false)
            .unwrap();
        store
            .create_symbolic(&name("HEAD"), &name("refs/heads/main"), false)
            .unwrap();

        let head = store.lookup(&name("HEAD")).unwrap();
        let resolved = store.resolve(&head).unwrap();
        assert_eq!(resolved.direct_oid(), Some(oid(2)));
    }

    #[test]
    fn too_nested_chain_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let db = FakeObjectDatabase::new();
        let store = store_with_db(dir.path(), db);

        let chain = ["refs/heads/a", "refs/heads/b", "refs/heads/c",
                      "refs/heads/d", "refs/heads/e", "refs/heads/f", "refs/heads/g"];
        for pair in chain.windows(2) {
            store
                .create_symbolic(&name(pair[0]), &name(pair[1]), false)
                .unwrap();
        }

        let start = store.lookup(&name("refs/heads/a")).unwrap();
        let err = store.resolve(&start).unwrap_err();
        assert!(matches!(err, RefError::TooNested { .. }));
    }

    #[test]
    fn loose_wins_over_packed() {
        let dir = tempfile::tempdir().unwrap();
        let db = FakeObjectDatabase::new();
        db.insert_commit(oid(1));
        db.insert_commit(oid(2));
        let store = store_with_db(dir.path(), db);

        store
            .create_direct(&name("refs/heads/x"), oid(1), false)
            .unwrap();
        store.packall().unwrap();
        store
            .create_direct(&name("refs/heads/x"), oid(2), true)
            .unwrap();

        let looked_up = store.lookup(&name("refs/heads/x")).unwrap();
        assert_eq!(looked_up.direct_oid(), Some(oid(2)));
        assert!(!looked_up.is_packed());
    }

    #[test]
    fn delete_after_loose_wins_removes_packed_too() {
        let dir = tempfile::tempdir().unwrap();
        let db = FakeObjectDatabase::new();
        db.insert_commit(oid(1));
        db.insert_commit(oid(2));
        let store = store_with_db(dir.path(), db);

        store
            .create_direct(&name("refs/heads/x"), oid(1), false)
            .unwrap();
        store.packall().unwrap();
        store
            .create_direct(&name("refs/heads/x"), oid(2), true)
            .unwrap();

        let reference = store.lookup(&name("refs/heads/x")).unwrap();
        store.delete(&reference).unwrap();
        assert!(matches!(
            store.lookup(&name("refs/heads/x")),
            Err(RefError::NotFound(_))
        ));
    }

    #[test]
    fn exists_reflects_loose_and_packed() {
        let dir = tempfile::tempdir().unwrap();
        let db = FakeObjectDatabase::new();
        db.insert_commit(oid(1));
        let store = store_with_db(dir.path(), db);

        assert!(!store.exists(&name("refs/heads/x")).unwrap());
        store
            .create_direct(&name("refs/heads/x"), oid(1), false)
            .unwrap();
        assert!(store.exists(&name("refs/heads/x")).unwrap());
    }

    #[test]
    fn listall_combines_loose_and_packed_without_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let db = FakeObjectDatabase::new();
        db.insert_commit(oid(1));
        db.insert_commit(oid(2));
        let store = store_with_db(dir.path(), db);

        store
            .create_direct(&name("refs/heads/x"), oid(1), false)
            .unwrap();
        store
            .create_direct(&name("refs/heads/y"), oid(2), false)
            .unwrap();
        store.packall().unwrap();
        store
            .create_direct(&name("refs/heads/z"), oid(1), false)
            .unwrap();

        let mut names: Vec<String> = store
            .listall(None)
            .unwrap()
            .into_iter()
            .map(|n| n.as_str().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["refs/heads/x", "refs/heads/y", "refs/heads/z"]);
    }

    #[test]
    fn reload_falls_back_when_loose_file_is_packed_away() {
        let dir = tempfile::tempdir().unwrap();
        let db = FakeObjectDatabase::new();
        db.insert_commit(oid(1));
        let store = store_with_db(dir.path(), db);

        let mut reference = store
            .create_direct(&name("refs/heads/x"), oid(1), false)
            .unwrap();
        store.packall().unwrap();

        store.reload(&mut reference).unwrap();
        assert_eq!(reference.direct_oid(), Some(oid(1)));
        assert!(reference.is_packed());
    }

    #[test]
    fn reload_refreshes_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let db = FakeObjectDatabase::new();
        db.insert_commit(oid(1));
        db.insert_commit(oid(2));
        let store = store_with_db(dir.path(), db);

        let mut reference = store
            .create_direct(&name("refs/heads/x"), oid(1), false)
            .unwrap();
        store
            .create_direct(&name("refs/heads/x"), oid(2), true)
            .unwrap();

        store.reload(&mut reference).unwrap();
        assert_eq!(reference.direct_oid(), Some(oid(2)));
    }
}
