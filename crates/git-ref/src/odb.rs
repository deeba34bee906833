//! The object database as seen by the reference store.
//!
//! The reference store never reads or writes object content; it only needs
//! to answer "does this oid exist" (before accepting a direct-ref write)
//! and "what does this tag object point at" (to precompute peel lines for
//! the packed-refs file). Both are exposed here as a minimal trait so the
//! reference store can be exercised and tested without a real object
//! database backing it.

use git_hash::ObjectId;

/// The kind of object an [`ObjectDatabase`] lookup returned, narrowed to
/// exactly what the reference store needs to distinguish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Object {
    /// An annotated tag object, carrying the oid it directly targets.
    Tag(ObjectId),
    /// Any other object type (blob, tree, commit).
    Other,
}

/// The subset of object-database capabilities the reference store depends on.
pub trait ObjectDatabase {
    /// Does an object with this oid exist in the database?
    fn object_exists(&self, oid: &ObjectId) -> bool;

    /// Look up an object by oid, if present.
    fn object_lookup(&self, oid: &ObjectId) -> Option<Object>;

    /// The oid a tag object directly targets.
    fn tag_target(&self, tag_obj: &Object) -> Option<ObjectId> {
        match tag_obj {
            Object::Tag(target) => Some(*target),
            Object::Other => None,
        }
    }
}

/// An [`ObjectDatabase`] that knows about no objects.
///
/// Useful for tests of the reference store in isolation, and as a
/// placeholder for embedders that haven't wired up a real object database
/// yet: every existence check fails closed (`object_exists` is always
/// false), so direct-ref creation will always report `NonexistentTarget`
/// unless a real database is supplied.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyObjectDatabase;

impl ObjectDatabase for EmptyObjectDatabase {
    fn object_exists(&self, _oid: &ObjectId) -> bool {
        false
    }

    fn object_lookup(&self, _oid: &ObjectId) -> Option<Object> {
        None
    }
}
