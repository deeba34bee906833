use std::fmt;

use bstr::{BStr, BString, ByteSlice};

use crate::error::RefError;

/// Well-known reference names that are valid without a `/` component.
pub(crate) const SPECIAL_REFS: &[&str] = &["HEAD", "MERGE_HEAD", "FETCH_HEAD"];

/// Bytes forbidden anywhere in a reference name, beyond the control-byte range.
const FORBIDDEN_CHARS: &[u8] = b"~^:\\?[*";

/// Maximum length of a normalized reference name.
pub const REFNAME_MAX: usize = 1024;

/// A validated, canonicalized reference name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RefName(BString);

impl RefName {
    /// Normalize and validate `name` per the reference-name grammar.
    ///
    /// `is_direct` gates two extra rules that only apply when the name is
    /// going to carry an oid directly rather than merely be the argument of
    /// a symbolic-ref chain: it must contain a slash or be one of the
    /// well-known top-level names, and the canonical form must live under
    /// `refs/` unless it is exactly `HEAD`.
    pub fn new(name: impl AsRef<[u8]>, is_direct: bool) -> Result<Self, RefError> {
        let canonical = normalize(name.as_ref(), is_direct)?;
        Ok(Self(canonical))
    }

    /// Construct from an already-canonical name, skipping validation.
    ///
    /// Used internally when re-deriving a name from a trusted source, such
    /// as an entry already present in the packed-refs cache.
    pub(crate) fn new_unchecked(name: impl Into<BString>) -> Self {
        Self(name.into())
    }

    /// Get the short name (e.g. `main` from `refs/heads/main`).
    pub fn short_name(&self) -> &BStr {
        let s = self.0.as_bstr();
        for prefix in [&b"refs/heads/"[..], b"refs/tags/", b"refs/remotes/"] {
            if let Some(rest) = s.strip_prefix(prefix) {
                return rest.as_bstr();
            }
        }
        s
    }

    /// Is this one of the well-known top-level names (`HEAD`, ...)?
    pub fn is_special(&self) -> bool {
        SPECIAL_REFS.contains(&self.0.to_str_lossy().as_ref())
    }

    /// Is this name, or an ancestor directory of `other`, or vice versa?
    ///
    /// Two names collide in the loose tree if one is a strict `/`-prefix of
    /// the other: `refs/heads/x` cannot coexist with `refs/heads/x/y`.
    pub fn directory_conflicts_with(&self, other: &RefName) -> bool {
        if self == other {
            return false;
        }
        let a = self.0.as_bstr();
        let b = other.0.as_bstr();
        let (shorter, longer) = if a.len() < b.len() { (a, b) } else { (b, a) };
        longer.len() > shorter.len()
            && longer.starts_with(shorter.as_bytes())
            && longer[shorter.len()..].starts_with(b"/")
    }

    /// Get the raw bytes of this ref name.
    pub fn as_bstr(&self) -> &BStr {
        self.0.as_bstr()
    }

    /// Get as a string slice (ref names are validated to be printable ASCII/UTF-8).
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("<invalid-utf8>")
    }

    /// Get the inner byte string.
    pub fn into_inner(self) -> BString {
        self.0
    }
}

impl AsRef<BStr> for RefName {
    fn as_ref(&self) -> &BStr {
        self.0.as_bstr()
    }
}

impl fmt::Display for RefName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonicalize and validate `input`, returning the normalized bytes.
///
/// Mirrors the grammar in the reference implementation's `normalize_name`:
/// a single forward scan collapses repeated `/` while rejecting forbidden
/// bytes and positions as they're encountered, then a handful of whole-name
/// checks are applied to the collapsed result.
fn normalize(input: &[u8], is_direct: bool) -> Result<BString, RefError> {
    let name_str = || String::from_utf8_lossy(input).into_owned();

    if input.is_empty() {
        return Err(RefError::InvalidName("ref name is empty".into()));
    }
    if input.ends_with(b".") || input.ends_with(b"/") {
        return Err(RefError::InvalidName(format!(
            "'{}': ends with '.' or '/'",
            name_str()
        )));
    }
    if input.ends_with(b".lock") {
        return Err(RefError::InvalidName(format!(
            "'{}': ends with '.lock'",
            name_str()
        )));
    }

    let mut out = Vec::with_capacity(input.len());
    let mut prev: u8 = 0;
    for (i, &b) in input.iter().enumerate() {
        if b <= 0x20 || FORBIDDEN_CHARS.contains(&b) {
            return Err(RefError::InvalidName(format!(
                "'{}': contains forbidden byte 0x{:02x} at position {}",
                name_str(),
                b,
                i
            )));
        }
        if b == b'/' && prev == b'/' {
            // collapse consecutive slashes
            continue;
        }
        out.push(b);
        prev = b;
        if out.len() > REFNAME_MAX {
            return Err(RefError::InvalidName(format!(
                "'{}': exceeds maximum length of {} bytes",
                name_str(),
                REFNAME_MAX
            )));
        }
    }

    if out.starts_with(b".") || out.windows(2).any(|w| w == b"..") || out.windows(2).any(|w| w == b"/.") {
        return Err(RefError::InvalidName(format!(
            "'{}': starts with '.' or contains '..' or '/.'",
            name_str()
        )));
    }
    if out.windows(2).any(|w| w == b"@{") {
        return Err(RefError::InvalidName(format!(
            "'{}': contains '@{{'",
            name_str()
        )));
    }

    if is_direct {
        let is_well_known = SPECIAL_REFS.iter().any(|s| s.as_bytes() == out.as_slice());
        if !out.contains(&b'/') && !is_well_known {
            return Err(RefError::InvalidName(format!(
                "'{}': must contain '/' or be one of {:?}",
                name_str(),
                SPECIAL_REFS
            )));
        }
        if out != b"HEAD" && !out.starts_with(b"refs/") {
            return Err(RefError::InvalidName(format!(
                "'{}': must begin with 'refs/' unless exactly 'HEAD'",
                name_str()
            )));
        }
    }

    Ok(BString::from(out))
}
