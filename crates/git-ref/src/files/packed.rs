//! The packed-refs codec: parsing and emitting the sorted aggregate file.
//!
//! This module is pure: it never touches the filesystem. [`super::packed_cache`]
//! owns the file I/O and the mtime-based freshness tracking built on top of it.

use git_hash::ObjectId;

use crate::error::RefError;
use crate::name::RefName;

const TAG_PREFIX: &[u8] = b"refs/tags/";
const HEADER: &[u8] = b"# pack-refs with: peeled\n";

/// Bits recorded alongside a packed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PackedFlags {
    /// Set iff `peel` is populated.
    pub has_peel: bool,
    /// Set for entries migrated from loose storage during a repack; gates
    /// post-commit unlink of the corresponding loose file.
    pub was_loose: bool,
}

/// One record of the packed-refs file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedEntry {
    pub name: RefName,
    pub oid: ObjectId,
    pub peel: Option<ObjectId>,
    pub flags: PackedFlags,
}

impl PackedEntry {
    pub fn new(name: RefName, oid: ObjectId) -> Self {
        Self {
            name,
            oid,
            peel: None,
            flags: PackedFlags::default(),
        }
    }

    pub fn with_peel(mut self, peel: ObjectId) -> Self {
        self.peel = Some(peel);
        self.flags.has_peel = true;
        self
    }

    pub fn marked_was_loose(mut self) -> Self {
        self.flags.was_loose = true;
        self
    }

    fn is_under_tag_prefix(&self) -> bool {
        self.name.as_bstr().starts_with(TAG_PREFIX)
    }
}

/// Parse a packed-refs file's bytes into its entries.
///
/// `#`-prefixed lines at the start are skipped. A `^<oid>` line is valid
/// only immediately after an entry under `refs/tags/`; appearing first, or
/// after a non-tag entry, is `Corrupt`. A missing trailing newline on any
/// record, and a duplicate name, are both `Corrupt`.
pub fn parse(data: &[u8]) -> Result<Vec<PackedEntry>, RefError> {
    let mut entries: Vec<PackedEntry> = Vec::new();
    let mut pos = 0;

    while pos < data.len() && data[pos] == b'#' {
        let (_, next) = take_line(data, pos)?;
        pos = next;
    }

    while pos < data.len() {
        if data[pos] == b'^' {
            let (line, next) = take_line(data, pos)?;
            pos = next;
            let hex = std::str::from_utf8(&line[1..])
                .map_err(|_| RefError::Corrupt("non-UTF8 peel oid in packed-refs".into()))?;
            let peel_oid = ObjectId::from_hex(hex)?;

            let last = entries.last_mut().ok_or_else(|| {
                RefError::Corrupt("packed-refs: peel line with no preceding entry".into())
            })?;
            if !last.is_under_tag_prefix() {
                return Err(RefError::Corrupt(format!(
                    "packed-refs: peel line follows non-tag entry '{}'",
                    last.name
                )));
            }
            if last.flags.has_peel {
                return Err(RefError::Corrupt(format!(
                    "packed-refs: duplicate peel line for '{}'",
                    last.name
                )));
            }
            last.peel = Some(peel_oid);
            last.flags.has_peel = true;
        } else {
            let (line, next) = take_line(data, pos)?;
            pos = next;

            let space = line.iter().position(|&b| b == b' ').ok_or_else(|| {
                RefError::Corrupt("packed-refs: record missing oid/name separator".into())
            })?;
            let hex = std::str::from_utf8(&line[..space])
                .map_err(|_| RefError::Corrupt("non-UTF8 oid in packed-refs".into()))?;
            let oid = ObjectId::from_hex(hex)?;
            let name = RefName::new(&line[space + 1..], true)?;

            if entries.iter().any(|e| e.name == name) {
                return Err(RefError::Corrupt(format!(
                    "packed-refs: duplicate entry for '{}'",
                    name
                )));
            }
            entries.push(PackedEntry::new(name, oid));
        }
    }

    Ok(entries)
}

/// Read one `\n`-terminated line (tolerating a `\r` immediately before it),
/// returning the line's content and the position just past the newline.
fn take_line(data: &[u8], pos: usize) -> Result<(&[u8], usize), RefError> {
    match data[pos..].iter().position(|&b| b == b'\n') {
        Some(offset) => {
            let end = pos + offset;
            let mut line = &data[pos..end];
            if line.ends_with(b"\r") {
                line = &line[..line.len() - 1];
            }
            Ok((line, end + 1))
        }
        None => Err(RefError::Corrupt(
            "packed-refs: record missing trailing newline".into(),
        )),
    }
}

/// Emit a packed-refs file for `entries`, sorted by name, with peel lines
/// immediately following the tag entry they peel.
pub fn emit(entries: &[PackedEntry]) -> Vec<u8> {
    let mut sorted: Vec<&PackedEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut out = Vec::with_capacity(HEADER.len() + sorted.len() * 64);
    out.extend_from_slice(HEADER);
    for entry in sorted {
        out.extend_from_slice(entry.oid.to_hex().as_bytes());
        out.push(b' ');
        out.extend_from_slice(entry.name.as_bstr());
        out.push(b'\n');
        if let Some(peel) = entry.peel {
            out.push(b'^');
            out.extend_from_slice(peel.to_hex().as_bytes());
            out.push(b'\n');
        }
    }
    out
}
