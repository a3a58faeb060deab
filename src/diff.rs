//! Classifies every entry of a freshly listed snapshot against the base,
//! in place.

use crate::snapshot::{DiffState, FileEntry, Flat};

/// Compare `new` against `old`, setting `state` (and `moved`) on every entry
/// of `new`, and inserting DELETED placeholders for names present in `old`
/// but missing from `new`.
///
/// Two passes, matching the Python original:
/// 1. Any name in `old` that's absent from `new`, and whose fingerprint
///    doesn't survive elsewhere in `new` (or does, but only as a clone),
///    gets a placeholder entry inserted into `new` with `DiffState::Deleted`.
///    This is what lets the reconciliation engine later recognize "deleted
///    locally, moved remotely" as distinct from an ordinary delete.
/// 2. Every name that was already in `new` before step 1 (captured up front
///    so step 1's placeholders aren't reclassified) is compared against
///    `old` by name and by fingerprint to land on SAME / UPDATED / CREATED,
///    or flagged `moved` when its fingerprint traces to a different name.
pub fn calc_states(old: &Flat, new: &mut Flat) {
    let new_before_deletes: Vec<String> = new.names().cloned().collect();

    let to_delete: Vec<FileEntry> = old
        .entries()
        .filter(|file| {
            !new.contains(&file.name)
                && (new.by_fingerprint(&file.fingerprint()).is_none() || file.is_clone)
        })
        .cloned()
        .collect();

    for file in to_delete {
        new.insert(FileEntry {
            name: file.name,
            size: file.size,
            hash: file.hash,
            mtime: file.mtime,
            state: DiffState::Deleted,
            moved: false,
            is_clone: file.is_clone,
            synced: false,
            ignore: false,
        });
    }

    for name in new_before_deletes {
        let fingerprint = new.get(&name).expect("name came from new").fingerprint();
        let file_is_clone = new.get(&name).expect("name came from new").is_clone;
        let traces_to_old = old.by_fingerprint(&fingerprint).is_some();

        let (state, moved) = match old.get(&name) {
            Some(old_entry) => {
                if old_entry.fingerprint() != fingerprint {
                    if traces_to_old && !file_is_clone {
                        (DiffState::Same, true)
                    } else {
                        (DiffState::Updated, false)
                    }
                } else {
                    (DiffState::Same, false)
                }
            }
            None => {
                if traces_to_old && !file_is_clone {
                    (DiffState::Same, true)
                } else {
                    (DiffState::Created, false)
                }
            }
        };

        let entry = new.get_mut(&name).expect("name came from new");
        entry.state = state;
        entry.moved = moved;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_bytes;

    fn entry(name: &str, content: &[u8]) -> FileEntry {
        FileEntry {
            name: name.to_string(),
            size: content.len() as u64,
            hash: hash_bytes(content),
            mtime: 0,
            state: DiffState::Same,
            moved: false,
            is_clone: false,
            synced: false,
            ignore: false,
        }
    }

    #[test]
    fn unchanged_file_is_same() {
        let mut old = Flat::new("/r/");
        old.insert(entry("a.txt", b"hi"));
        let mut new = Flat::new("/r/");
        new.insert(entry("a.txt", b"hi"));

        calc_states(&old, &mut new);
        assert_eq!(new.get("a.txt").unwrap().state, DiffState::Same);
    }

    #[test]
    fn changed_content_is_updated() {
        let mut old = Flat::new("/r/");
        old.insert(entry("a.txt", b"hi"));
        let mut new = Flat::new("/r/");
        new.insert(entry("a.txt", b"bye"));

        calc_states(&old, &mut new);
        assert_eq!(new.get("a.txt").unwrap().state, DiffState::Updated);
    }

    #[test]
    fn brand_new_name_is_created() {
        let old = Flat::new("/r/");
        let mut new = Flat::new("/r/");
        new.insert(entry("a.txt", b"hi"));

        calc_states(&old, &mut new);
        assert_eq!(new.get("a.txt").unwrap().state, DiffState::Created);
    }

    #[test]
    fn removed_name_gets_deleted_placeholder() {
        let mut old = Flat::new("/r/");
        old.insert(entry("a.txt", b"hi"));
        let mut new = Flat::new("/r/");

        calc_states(&old, &mut new);
        assert_eq!(new.get("a.txt").unwrap().state, DiffState::Deleted);
    }

    #[test]
    fn renamed_name_is_marked_moved_same() {
        let mut old = Flat::new("/r/");
        old.insert(entry("old_name.txt", b"hi"));
        let mut new = Flat::new("/r/");
        new.insert(entry("new_name.txt", b"hi"));

        calc_states(&old, &mut new);
        let moved = new.get("new_name.txt").unwrap();
        assert_eq!(moved.state, DiffState::Same);
        assert!(moved.moved);
        // An ordinary (non-clone) move leaves no delete placeholder behind —
        // only clone-moves do, so the reconciliation engine can tell an
        // unambiguous rename from an ambiguous duplicate.
        assert!(new.get("old_name.txt").is_none());
    }

    #[test]
    fn clone_does_not_suppress_delete_placeholder() {
        let mut old = Flat::new("/r/");
        old.insert(entry("a.txt", b"dup"));
        old.insert(entry("b.txt", b"dup"));
        let mut new = Flat::new("/r/");
        new.insert(entry("b.txt", b"dup"));

        calc_states(&old, &mut new);
        // a.txt vanished and its fingerprint is a clone in old, so it still
        // gets a delete placeholder even though the fingerprint survives.
        assert_eq!(new.get("a.txt").unwrap().state, DiffState::Deleted);
        assert_eq!(new.get("b.txt").unwrap().state, DiffState::Same);
    }
}
