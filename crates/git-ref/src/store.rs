use git_hash::ObjectId;

use crate::error::RefError;
use crate::name::RefName;
use crate::Reference;

/// Restricts enumeration to direct or symbolic references only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKindFilter {
    Direct,
    Symbolic,
}

impl RefKindFilter {
    /// Does `reference` match this filter?
    pub fn accepts(self, reference: &Reference) -> bool {
        match self {
            RefKindFilter::Direct => reference.is_direct(),
            RefKindFilter::Symbolic => reference.is_symbolic(),
        }
    }
}

/// The reference store's public surface.
///
/// A single write — create, set, delete, rename — is the unit of
/// atomicity; there is no multi-update transaction. Implementations are
/// not required to be thread-safe: a shared store must be externally
/// serialized by callers that use it from more than one thread.
pub trait RefStore {
    /// Canonicalize and validate a reference name.
    fn normalize(&self, name: &[u8], is_direct: bool) -> Result<RefName, RefError>;

    /// Look up a reference by name, loose-then-packed.
    fn lookup(&self, name: &RefName) -> Result<Reference, RefError>;

    /// Follow a symbolic chain to its terminal direct reference.
    fn resolve(&self, reference: &Reference) -> Result<Reference, RefError>;

    /// Does a reference with this name exist, loose or packed?
    fn exists(&self, name: &RefName) -> Result<bool, RefError>;

    /// Create a direct reference pointing at `oid`.
    fn create_direct(&self, name: &RefName, oid: ObjectId, force: bool)
        -> Result<Reference, RefError>;

    /// Create a symbolic reference pointing at `target`.
    fn create_symbolic(
        &self,
        name: &RefName,
        target: &RefName,
        force: bool,
    ) -> Result<Reference, RefError>;

    /// Repoint a direct reference at a new oid.
    fn set_oid(&self, reference: &mut Reference, oid: ObjectId) -> Result<(), RefError>;

    /// Repoint a symbolic reference at a new target name.
    fn set_target(&self, reference: &mut Reference, target: &RefName) -> Result<(), RefError>;

    /// Rename a reference, following `HEAD` and the reflog along if needed.
    fn rename(
        &self,
        reference: &mut Reference,
        new_name: &RefName,
        force: bool,
    ) -> Result<(), RefError>;

    /// Delete a reference, loose and/or packed.
    fn delete(&self, reference: &Reference) -> Result<(), RefError>;

    /// Visit every reference name, loose and packed combined, each exactly once.
    fn foreach(
        &self,
        kind_filter: Option<RefKindFilter>,
        cb: &mut dyn FnMut(&RefName) -> Result<(), RefError>,
    ) -> Result<(), RefError>;

    /// Collect every reference name, loose and packed combined, each exactly once.
    fn listall(&self, kind_filter: Option<RefKindFilter>) -> Result<Vec<RefName>, RefError> {
        let mut names = Vec::new();
        self.foreach(kind_filter, &mut |name| {
            names.push(name.clone());
            Ok(())
        })?;
        Ok(names)
    }

    /// Migrate every loose direct reference into the packed file.
    fn packall(&self) -> Result<(), RefError>;

    /// Re-read a reference's content from its current storage.
    fn reload(&self, reference: &mut Reference) -> Result<(), RefError>;
}
