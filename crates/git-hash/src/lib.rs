//! Object identity for the reference store: the `ObjectId` type and the
//! hash algorithms it may carry. Hex encoding is delegated to the `hex`
//! crate; nothing here reimplements it.
//!
//! This crate deliberately stops at identity. Computing a hash from object
//! bytes is the object database's job, not the reference store's; nothing
//! here reads or writes object content.

mod error;
mod algorithm;
mod oid;

pub use algorithm::HashAlgorithm;
pub use error::HashError;
pub use oid::ObjectId;
