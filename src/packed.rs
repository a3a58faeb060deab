//! The persistent base store: a nested name -> fingerprint tree, serialized
//! as JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::PackedTreeError;
use crate::snapshot::{DiffState, FileEntry, Flat};

/// Recursive packed-tree node. `BTreeMap` (not `HashMap`) so the JSON
/// serialization is key-ordered and therefore diffable and deterministic —
/// useful for tests and for inspecting a base file by hand.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackedTree {
    #[serde(default)]
    pub fold: BTreeMap<String, PackedTree>,
    #[serde(default)]
    pub file: BTreeMap<String, String>,
}

impl PackedTree {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.fold.is_empty() && self.file.is_empty()
    }

    /// Insert a fingerprint at `path` (a forward-slash-separated relative
    /// name), creating intermediate folders as needed.
    pub fn insert(&mut self, path: &str, fingerprint: String) {
        let mut parts: Vec<&str> = path.split('/').collect();
        let leaf = parts.pop().expect("split always yields at least one part");
        let mut node = self;
        for part in parts {
            node = node.fold.entry(part.to_string()).or_insert_with(PackedTree::empty);
        }
        node.file.insert(leaf.to_string(), fingerprint);
    }

    /// Replace the subtree at `path` with `subtree`, creating intermediate
    /// folders as needed. `path` may be empty, replacing the whole tree.
    pub fn merge(&mut self, path: &str, subtree: PackedTree) {
        if path.is_empty() {
            *self = subtree;
            return;
        }
        let mut parts: Vec<&str> = path.split('/').collect();
        let leaf = parts.pop().expect("split always yields at least one part");
        let mut node = self;
        for part in parts {
            node = node.fold.entry(part.to_string()).or_insert_with(PackedTree::empty);
        }
        node.fold.insert(leaf.to_string(), subtree);
    }

    /// Returns the packed subtree rooted at `path`.
    pub fn get_branch(&self, path: &str) -> Result<&PackedTree, PackedTreeError> {
        let mut node = self;
        if path.is_empty() {
            return Ok(node);
        }
        for part in path.split('/') {
            node = node
                .fold
                .get(part)
                .ok_or_else(|| PackedTreeError::NoSuchBranch(path.to_string()))?;
        }
        Ok(node)
    }

    /// True iff every path segment of `path` is present in the tree.
    pub fn contains(&self, path: &str) -> bool {
        self.get_branch(path).is_ok()
    }

    /// Returns the longest prefix of `path` that is already present in the
    /// tree. Used by the driver to re-scope re-snapshotting to the smallest
    /// enclosing folder already known to the base store.
    pub fn get_min<'a>(&self, path: &'a str) -> &'a str {
        let parts: Vec<&str> = path.split('/').collect();
        let mut node = self;
        let mut covered = 0usize;
        for part in &parts {
            match node.fold.get(*part) {
                Some(next) => {
                    node = next;
                    covered += 1;
                }
                None => break,
            }
        }
        if covered == 0 {
            return &path[..parts[0].len()];
        }
        let end = parts[..covered].iter().map(|p| p.len()).sum::<usize>() + covered - 1;
        &path[..end]
    }

    /// Convert a `Flat` snapshot into a packed tree of fingerprints.
    pub fn pack(flat: &Flat) -> Self {
        let mut tree = Self::empty();
        for entry in flat.entries() {
            tree.insert(&entry.name, entry.fingerprint());
        }
        tree
    }

    /// Convert a packed tree into a `Flat` snapshot. Every unpacked entry
    /// gets a zero timestamp and `DiffState::Same`, per the data model's
    /// "unpacking a branch yields a flat snapshot with zero timestamps and
    /// SAME state" rule. A fingerprint is `{size}{hex digest}`: the digest is
    /// always 64 hex characters, so the leading run is the size and the
    /// trailing 64 characters are decoded back via `ContentHash::from_hex`.
    pub fn unpack(&self, root: impl Into<String>) -> Flat {
        let mut flat = Flat::new(root);
        self.unpack_into(&mut flat, "");
        flat
    }

    fn unpack_into(&self, flat: &mut Flat, prefix: &str) {
        for (name, fingerprint) in &self.file {
            let full = if prefix.is_empty() { name.clone() } else { format!("{prefix}{name}") };
            let split = fingerprint.len().saturating_sub(64);
            let size = fingerprint[..split].parse().unwrap_or(0);
            let hash = crate::hash::ContentHash::from_hex(&fingerprint[split..]);
            flat.insert(FileEntry {
                name: full,
                size,
                hash,
                mtime: 0,
                state: DiffState::Same,
                moved: false,
                is_clone: false,
                synced: false,
                ignore: false,
            });
        }
        for (name, subtree) in &self.fold {
            let child_prefix = format!("{prefix}{name}/");
            subtree.unpack_into(flat, &child_prefix);
        }
    }
}

/// The on-disk master file: a packed tree plus a small amount of bookkeeping.
/// Serializes as the 3-element array `[history, ignores, tree]` the wire
/// format uses; `BaseFile::load` also accepts a bare `{"fold":...,"file":...}`
/// document (an older master file with no history/ignores wrapper) by
/// treating the whole document as `tree`, so existing base files upgrade in
/// place without a migration step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaseFile {
    /// Folders already synced at least once, in sync order.
    pub history: Vec<String>,
    /// Compiled-from `.rignore` source lines, persisted so a later run can
    /// tell whether the ignore rules changed since the base was written.
    pub ignores: Vec<String>,
    pub tree: PackedTree,
}

impl BaseFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &std::path::Path) -> Result<Self, crate::error::SyncError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, path: &std::path::Path) -> Result<(), crate::error::SyncError> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }
}

impl Serialize for BaseFile {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeTuple;
        let mut tup = serializer.serialize_tuple(3)?;
        tup.serialize_element(&self.history)?;
        tup.serialize_element(&self.ignores)?;
        tup.serialize_element(&self.tree)?;
        tup.end()
    }
}

impl<'de> Deserialize<'de> for BaseFile {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::Array(mut elements) if elements.len() == 3 => {
                let tree = serde_json::from_value(elements.remove(2)).map_err(serde::de::Error::custom)?;
                let ignores = serde_json::from_value(elements.remove(1)).map_err(serde::de::Error::custom)?;
                let history = serde_json::from_value(elements.remove(0)).map_err(serde::de::Error::custom)?;
                Ok(BaseFile { history, ignores, tree })
            }
            other => {
                let tree = serde_json::from_value(other).map_err(serde::de::Error::custom)?;
                Ok(BaseFile { history: Vec::new(), ignores: Vec::new(), tree })
            }
        }
    }
}
