//! The reflog as seen by the reference store.
//!
//! `rename` needs to move a reference's reflog file alongside the
//! reference itself; nothing else the reference store does touches the
//! reflog. That one operation is exposed as a trait so a real reflog
//! implementation can be plugged in without this crate depending on the
//! rest of the reflog's read/append/expire machinery.

use crate::{RefError, RefName};

/// The subset of reflog capabilities the reference store depends on.
pub trait ReflogSink {
    /// Rename the reflog file for `old_name` to `new_name`, if one exists.
    ///
    /// A missing reflog is not an error: many references never accumulate
    /// one (bare repositories, tags).
    fn reflog_rename(&self, old_name: &RefName, new_name: &RefName) -> Result<(), RefError>;
}

/// A [`ReflogSink`] that does nothing.
///
/// Used by stores that don't maintain a reflog at all, and as the default
/// for tests that aren't exercising rename's reflog-following behavior.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReflog;

impl ReflogSink for NullReflog {
    fn reflog_rename(&self, _old_name: &RefName, _new_name: &RefName) -> Result<(), RefError> {
        Ok(())
    }
}
