//! In-memory model of one tree: the `Flat` snapshot.
//!
//! A `Flat` indexes files by name, by fingerprint, and by lowercased name so
//! the reconciliation engine can answer "is this name taken", "has this
//! content moved", and "does this collide case-insensitively" in O(1).

use std::collections::{HashMap, HashSet};

use crate::hash::ContentHash;

/// Where a file stands relative to the base snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffState {
    Same,
    Updated,
    Deleted,
    Created,
}

/// One file, as seen in a single snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Forward-slash-separated path relative to the tree root.
    pub name: String,
    pub size: u64,
    pub hash: ContentHash,
    /// Modification time, seconds since epoch. Only used as a tiebreaker in
    /// recovery mode.
    pub mtime: u64,
    pub state: DiffState,
    /// Set by `calc_states` when this entry's fingerprint traces back to a
    /// different name in the base snapshot.
    pub moved: bool,
    /// True iff another entry in the same snapshot shares this fingerprint.
    pub is_clone: bool,
    /// Transient, reset to false at the start of every reconciliation pass.
    pub synced: bool,
    /// Derived from `.rignore` rules; ignored files are stripped before
    /// reconciliation ever sees them.
    pub ignore: bool,
}

impl FileEntry {
    pub fn fingerprint(&self) -> String {
        format!("{}{}", self.size, self.hash)
    }
}

/// A snapshot of one side of the sync (local or remote), at some point in
/// time — either freshly listed via the agent, or unpacked from the base.
#[derive(Debug, Clone)]
pub struct Flat {
    /// Root address of this side: a local path or a remote spec like
    /// `"onedrive:"`. Not necessarily a valid `Path` — remote backends don't
    /// follow OS path semantics, so names are joined onto `root` by plain
    /// string concatenation, matching the external agent's own conventions.
    pub root: String,
    entries: HashMap<String, FileEntry>,
    /// fingerprint -> name of the last-inserted entry with that fingerprint.
    /// Per the data model, this mapping is well-defined only when the
    /// fingerprint is unique; collisions are tracked via `is_clone` instead.
    by_fingerprint: HashMap<String, String>,
    lower: HashSet<String>,
    dirs: HashSet<String>,
}

impl Flat {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            entries: HashMap::new(),
            by_fingerprint: HashMap::new(),
            lower: HashSet::new(),
            dirs: HashSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_size(&self) -> u64 {
        self.entries.values().map(|f| f.size).sum()
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn entries(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries.values()
    }

    pub fn get(&self, name: &str) -> Option<&FileEntry> {
        self.entries.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut FileEntry> {
        self.entries.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn contains_lower(&self, name: &str) -> bool {
        self.lower.contains(&name.to_lowercase())
    }

    pub fn by_fingerprint(&self, fingerprint: &str) -> Option<&FileEntry> {
        self.by_fingerprint.get(fingerprint).and_then(|name| self.entries.get(name))
    }

    pub fn dirs(&self) -> &HashSet<String> {
        &self.dirs
    }

    fn track_dir(&mut self, name: &str) {
        let dir = match name.rfind('/') {
            Some(idx) => &name[..idx],
            None => "",
        };
        self.dirs.insert(format!("{}{}", self.root, dir));
    }

    /// Insert (or overwrite) an entry, maintaining the fingerprint/lowercase
    /// indices. On a fingerprint collision both the existing and the new
    /// entry are marked `is_clone`, and the fingerprint index keeps the
    /// last-inserted winner, matching the Python original's `uids` dict.
    pub fn insert(&mut self, mut entry: FileEntry) {
        let name = entry.name.clone();
        let fingerprint = entry.fingerprint();

        if let Some(existing_name) = self.by_fingerprint.get(&fingerprint).cloned() {
            if existing_name != name {
                entry.is_clone = true;
                if let Some(existing) = self.entries.get_mut(&existing_name) {
                    existing.is_clone = true;
                }
            }
        }
        self.by_fingerprint.insert(fingerprint, name.clone());

        self.lower.insert(name.to_lowercase());
        self.track_dir(&name);
        self.entries.insert(name, entry);
    }

    /// Remove an entry by name. Does not attempt to repair the
    /// fingerprint index for clones sharing the removed entry's fingerprint
    /// — the caller (the reconciliation engine) always re-inserts under the
    /// new name in the same step a remove happens, mirroring the Python
    /// `Flat.rm`/`Flat.update` pairing in `move`.
    pub fn remove(&mut self, name: &str) -> Option<FileEntry> {
        let removed = self.entries.remove(name)?;
        self.lower.remove(&name.to_lowercase());
        if self.by_fingerprint.get(&removed.fingerprint()).map(String::as_str) == Some(name) {
            self.by_fingerprint.remove(&removed.fingerprint());
        }
        Some(removed)
    }

    /// Reset every entry's transient `synced` flag. Called between a
    /// reconciliation pass and the next (spec invariant 4).
    pub fn clean(&mut self) {
        for entry in self.entries.values_mut() {
            entry.synced = false;
        }
    }

    /// Mark entries matching any ignore regex, then drop them from the
    /// snapshot entirely — ignored files never participate in reconciliation.
    pub fn apply_ignore(&mut self, regexes: &[regex::Regex]) {
        let ignored: Vec<String> = self
            .entries
            .iter()
            .filter(|(name, _)| {
                let full = format!("{}{}", self.root, name);
                regexes.iter().any(|r| r.is_match(&full))
            })
            .map(|(name, _)| name.clone())
            .collect();

        for name in ignored {
            self.remove(&name);
        }
    }
}
