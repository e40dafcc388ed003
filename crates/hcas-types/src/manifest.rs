//! Distribution manifests: ordered `path -> blob hash` listings.
//!
//! The wire form is one `path:hashHex` entry per line. The same line form is
//! what the storage backends persist and what `GET /distro/{hash}` returns
//! (as a JSON array), so every representation round-trips through
//! [`Manifest::parse`].

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::hash::ContentHash;

/// Separator between a path and its blob hash.
pub const ENTRY_SEPARATOR: char = ':';

/// One file in a distribution.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Relative, `/`-separated path inside the distribution.
    pub path: String,
    /// Hash of the blob stored for this path.
    pub hash: ContentHash,
}

impl ManifestEntry {
    pub fn new(path: impl Into<String>, hash: ContentHash) -> Self {
        Self {
            path: path.into(),
            hash,
        }
    }

    /// The `path:hashHex` line form (without newline).
    pub fn to_line(&self) -> String {
        format!("{}{}{}", self.path, ENTRY_SEPARATOR, self.hash.to_hex())
    }
}

/// An ordered, non-empty list of manifest entries with unique paths.
///
/// Entry order is significant: the distribution hash is the Merkle root over
/// the entries in exactly this order. Use [`Manifest::sorted`] to get the
/// canonical (path-sorted) order clients publish.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Build a manifest, preserving the given order.
    pub fn new(entries: Vec<ManifestEntry>) -> Result<Self, TypeError> {
        if entries.is_empty() {
            return Err(TypeError::malformed(0, "manifest has no entries"));
        }
        let mut seen = HashSet::with_capacity(entries.len());
        for (idx, entry) in entries.iter().enumerate() {
            validate_entry_path(&entry.path).map_err(|reason| TypeError::malformed(idx + 1, reason))?;
            if !seen.insert(entry.path.as_str()) {
                return Err(TypeError::malformed(
                    idx + 1,
                    format!("duplicate path {:?}", entry.path),
                ));
            }
        }
        // A path cannot be both a file and a directory of the published tree.
        for (idx, entry) in entries.iter().enumerate() {
            let path = entry.path.as_str();
            if let Some(parent) = path
                .match_indices('/')
                .map(|(at, _)| &path[..at])
                .find(|parent| seen.contains(parent))
            {
                return Err(TypeError::malformed(
                    idx + 1,
                    format!("path {path:?} is nested under file {parent:?}"),
                ));
            }
        }
        Ok(Self { entries })
    }

    /// Build a manifest in canonical order (sorted by path).
    pub fn sorted(mut entries: Vec<ManifestEntry>) -> Result<Self, TypeError> {
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Self::new(entries)
    }

    /// Parse the newline-delimited `path:hashHex` wire body.
    ///
    /// The whole body is rejected if any line is malformed; nothing is
    /// partially ingested.
    pub fn parse(body: &str) -> Result<Self, TypeError> {
        let mut entries = Vec::new();
        for (idx, line) in body.lines().enumerate() {
            let line_no = idx + 1;
            let parts: Vec<&str> = line.split(ENTRY_SEPARATOR).collect();
            if parts.len() != 2 {
                return Err(TypeError::malformed(
                    line_no,
                    "lines must be composed of {filepath}:{content hash} only",
                ));
            }
            let hash = ContentHash::from_hex(parts[1])
                .map_err(|e| TypeError::malformed(line_no, format!("bad hash: {e}")))?;
            entries.push(ManifestEntry::new(parts[0], hash));
        }
        Self::new(entries)
    }

    /// Parse from the persisted/JSON line list.
    pub fn from_lines<S: AsRef<str>>(lines: &[S]) -> Result<Self, TypeError> {
        let body: Vec<&str> = lines.iter().map(|l| l.as_ref()).collect();
        Self::parse(&body.join("\n"))
    }

    /// Wire body: one `path:hash` line per entry, each newline-terminated.
    pub fn to_wire(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&entry.to_line());
            out.push('\n');
        }
        out
    }

    /// Entries as `path:hash` strings, in manifest order.
    pub fn to_lines(&self) -> Vec<String> {
        self.entries.iter().map(ManifestEntry::to_line).collect()
    }

    /// Entries in manifest order.
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Number of files in the distribution.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always `false`: an empty manifest cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up the blob hash for a path.
    pub fn get(&self, path: &str) -> Option<&ContentHash> {
        self.entries
            .iter()
            .find(|e| e.path == path)
            .map(|e| &e.hash)
    }

    pub fn into_entries(self) -> Vec<ManifestEntry> {
        self.entries
    }
}

/// Check that a path can be materialized inside a distribution directory.
fn validate_entry_path(path: &str) -> Result<(), String> {
    if path.is_empty() {
        return Err("empty path".into());
    }
    if path.starts_with('/') {
        return Err(format!("absolute path {path:?}"));
    }
    if let Some(ch) = path.chars().find(|c| matches!(*c, '\0' | '\n' | '\r' | ENTRY_SEPARATOR)) {
        return Err(format!("path {path:?} contains forbidden character {ch:?}"));
    }
    for component in path.split('/') {
        match component {
            "" => return Err(format!("path {path:?} has an empty component")),
            "." | ".." => return Err(format!("path {path:?} is not normalized")),
            _ => {}
        }
    }
    Ok(())
}
