//! End-to-end reconciliation scenarios driven through `Reconciler` against an
//! in-memory `FakeAgent`: plain push/pull, delete propagation, rename
//! mirroring, conflicting edits, clone handling, the degenerate double-move
//! collision, and case-insensitive name collisions.

mod support;

use dupsync::agent::snapshot;
use dupsync::executor::JobExecutor;
use dupsync::reconcile::Reconciler;
use dupsync::{DiffState, FileEntry, Flat};
use support::FakeAgent;

fn entry(name: &str, size: u64, content: &[u8], state: DiffState) -> FileEntry {
    FileEntry {
        name: name.to_string(),
        size,
        hash: dupsync::hash_bytes(content),
        mtime: 0,
        state,
        moved: false,
        is_clone: false,
        synced: false,
        ignore: false,
    }
}

#[test]
fn new_local_file_is_pushed_to_remote() {
    let agent = FakeAgent::new();
    agent.put("/local/new.txt", b"hello");

    let mut lcl = Flat::new("/local/");
    lcl.insert(entry("new.txt", 5, b"hello", DiffState::Created));
    let rmt = Flat::new("/remote/");

    let executor = JobExecutor::new(2);
    let reconciler = Reconciler::new(&agent, &executor, lcl, rmt, false, false, 1);
    let (report, _lcl, rmt) = reconciler.run(None, false);

    assert_eq!(report.operations, 1);
    assert!(rmt.contains("new.txt"));
    assert!(agent.contains("/remote/new.txt"));
    assert_eq!(agent.get("/remote/new.txt").unwrap(), b"hello");
}

#[test]
fn remote_update_is_pulled_to_local() {
    let agent = FakeAgent::new();
    agent.put("/local/a.txt", b"old");
    agent.put("/remote/a.txt", b"new-content");

    let mut old = Flat::new("/");
    old.insert(entry("a.txt", 3, b"old", DiffState::Same));

    let mut lcl = Flat::new("/local/");
    lcl.insert(entry("a.txt", 3, b"old", DiffState::Same));
    let mut rmt = Flat::new("/remote/");
    rmt.insert(entry("a.txt", 11, b"new-content", DiffState::Same));

    let executor = JobExecutor::new(2);
    let reconciler = Reconciler::new(&agent, &executor, lcl, rmt, false, false, 1);
    let (report, lcl, _rmt) = reconciler.run(Some(&old), false);

    assert_eq!(report.operations, 1);
    assert_eq!(lcl.get("a.txt").unwrap().size, 11);
    assert_eq!(agent.get("/local/a.txt").unwrap(), b"new-content");
}

#[test]
fn delete_on_one_side_propagates_to_the_other() {
    let agent = FakeAgent::new();
    agent.put("/remote/gone.txt", b"still here");

    let mut old = Flat::new("/");
    old.insert(entry("gone.txt", 10, b"still here", DiffState::Same));

    let lcl = Flat::new("/local/"); // deleted locally
    let mut rmt = Flat::new("/remote/");
    rmt.insert(entry("gone.txt", 10, b"still here", DiffState::Same));

    let executor = JobExecutor::new(2);
    let reconciler = Reconciler::new(&agent, &executor, lcl, rmt, false, false, 1);
    let (report, _lcl, rmt) = reconciler.run(Some(&old), false);

    assert_eq!(report.operations, 1);
    assert!(!rmt.contains("gone.txt"));
    assert!(!agent.contains("/remote/gone.txt"));
}

#[test]
fn rename_on_one_side_is_mirrored() {
    let agent = FakeAgent::new();
    agent.put("/local/renamed.txt", b"payload");
    agent.put("/remote/original.txt", b"payload");

    let mut old = Flat::new("/");
    old.insert(entry("original.txt", 7, b"payload", DiffState::Same));

    let mut lcl = Flat::new("/local/");
    let mut renamed = entry("renamed.txt", 7, b"payload", DiffState::Same);
    renamed.moved = true;
    lcl.insert(renamed);

    let mut rmt = Flat::new("/remote/");
    rmt.insert(entry("original.txt", 7, b"payload", DiffState::Same));

    let executor = JobExecutor::new(2);
    let reconciler = Reconciler::new(&agent, &executor, lcl, rmt, false, false, 1);
    let (_report, _lcl, rmt) = reconciler.run(Some(&old), false);

    assert!(rmt.contains("renamed.txt"));
    assert!(!rmt.contains("original.txt"));
    assert!(agent.contains("/remote/renamed.txt"));
}

#[test]
fn conflicting_edits_on_both_sides_are_duplicated() {
    let agent = FakeAgent::new();
    agent.put("/local/doc.txt", b"local-edit");
    agent.put("/remote/doc.txt", b"remote-edit");

    let mut old = Flat::new("/");
    old.insert(entry("doc.txt", 8, b"original", DiffState::Same));

    let mut lcl = Flat::new("/local/");
    lcl.insert(entry("doc.txt", 10, b"local-edit", DiffState::Same));
    let mut rmt = Flat::new("/remote/");
    rmt.insert(entry("doc.txt", 11, b"remote-edit", DiffState::Same));

    let executor = JobExecutor::new(2);
    let reconciler = Reconciler::new(&agent, &executor, lcl, rmt, false, false, 1);
    let (report, lcl, rmt) = reconciler.run(Some(&old), false);

    assert!(report.operations > 0);
    // Both sides keep a copy of each variant under a disambiguating prefix.
    assert!(lcl.names().any(|n| n.contains("lcl_doc.txt")) || lcl.contains("doc.txt"));
    assert!(rmt.names().any(|n| n.contains("rmt_doc.txt")) || rmt.contains("doc.txt"));
}

#[test]
fn both_copies_of_a_clone_are_pushed_as_created() {
    // Base has one file; the new local snapshot has two names sharing that
    // content. Neither traces back to the old name unambiguously (both are
    // clones of each other), so `calc_states` treats both as newly created
    // and the reconciler pushes both to the other side.
    let agent = FakeAgent::new();
    agent.put("/local/copy_a.txt", b"shared");
    agent.put("/local/copy_b.txt", b"shared");

    let mut old = Flat::new("/");
    old.insert(entry("original.txt", 6, b"shared", DiffState::Same));

    let mut lcl = Flat::new("/local/");
    lcl.insert(entry("copy_a.txt", 6, b"shared", DiffState::Created));
    lcl.insert(entry("copy_b.txt", 6, b"shared", DiffState::Created));
    let rmt = Flat::new("/remote/");

    let executor = JobExecutor::new(2);
    let reconciler = Reconciler::new(&agent, &executor, lcl, rmt, false, false, 2);
    let (report, _lcl, rmt) = reconciler.run(Some(&old), false);

    assert!(report.operations >= 2);
    assert!(rmt.contains("copy_a.txt"));
    assert!(rmt.contains("copy_b.txt"));
}

#[test]
fn recovery_mode_prefers_newest_mtime() {
    let agent = FakeAgent::new();
    agent.put("/local/a.txt", b"local-version");
    agent.put("/remote/a.txt", b"remote-version");

    let mut lcl = Flat::new("/local/");
    let mut lcl_entry = entry("a.txt", 13, b"local-version", DiffState::Same);
    lcl_entry.mtime = 100;
    lcl.insert(lcl_entry);

    let mut rmt = Flat::new("/remote/");
    let mut rmt_entry = entry("a.txt", 14, b"remote-version", DiffState::Same);
    rmt_entry.mtime = 200;
    rmt.insert(rmt_entry);

    let executor = JobExecutor::new(2);
    let reconciler = Reconciler::new(&agent, &executor, lcl, rmt, false, false, 1);
    let (_report, lcl, _rmt) = reconciler.run(None, true);

    // Remote was newer, so it should have won and been pushed to local.
    assert_eq!(lcl.get("a.txt").unwrap().size, 14);
}

#[test]
fn degenerate_double_move_follows_already_moved_content() {
    // Base has a.txt = A, b.txt = B. Locally a.txt moves to new.txt and
    // b.txt moves into the name a.txt just vacated. Remote never touched
    // a.txt (still A) and separately lost b.txt. Resolving the collision
    // at a.txt must send remote's A specifically to new.txt, the name
    // local already gave it, not to an arbitrary underscore-prefixed slot.
    let agent = FakeAgent::new();
    agent.put("/local/new.txt", b"content-a");
    agent.put("/local/a.txt", b"content-b");
    agent.put("/remote/a.txt", b"content-a");

    let content_a_fp = entry("x", 9, b"content-a", DiffState::Same).fingerprint();
    let content_b_fp = entry("x", 9, b"content-b", DiffState::Same).fingerprint();

    let mut old = Flat::new("/");
    old.insert(entry("a.txt", 9, b"content-a", DiffState::Same));
    old.insert(entry("b.txt", 9, b"content-b", DiffState::Same));

    let mut lcl = Flat::new("/local/");
    lcl.insert(entry("new.txt", 9, b"content-a", DiffState::Same));
    lcl.insert(entry("a.txt", 9, b"content-b", DiffState::Same));

    let mut rmt = Flat::new("/remote/");
    rmt.insert(entry("a.txt", 9, b"content-a", DiffState::Same));

    let executor = JobExecutor::new(2);
    let reconciler = Reconciler::new(&agent, &executor, lcl, rmt, false, false, 2);
    let (report, _lcl, rmt) = reconciler.run(Some(&old), false);

    assert_eq!(report.operations, 2);
    assert_eq!(rmt.get("new.txt").unwrap().fingerprint(), content_a_fp);
    assert_eq!(rmt.get("a.txt").unwrap().fingerprint(), content_b_fp);
    assert!(!rmt.names().any(|n| n.starts_with('_')));
    assert_eq!(agent.get("/remote/new.txt").unwrap(), b"content-a");
    assert_eq!(agent.get("/remote/a.txt").unwrap(), b"content-b");
}

#[test]
fn case_insensitive_collision_prefixes_new_name_on_both_sides() {
    let agent = FakeAgent::new();
    agent.put("/local/Notes.txt", b"local-notes");
    agent.put("/remote/notes.txt", b"remote-notes");

    let mut lcl = Flat::new("/local/");
    lcl.insert(entry("Notes.txt", 11, b"local-notes", DiffState::Created));
    let mut rmt = Flat::new("/remote/");
    rmt.insert(entry("notes.txt", 12, b"remote-notes", DiffState::Same));

    let executor = JobExecutor::new(2);
    let reconciler = Reconciler::new(&agent, &executor, lcl, rmt, true, false, 2);
    let (report, lcl, rmt) = reconciler.run(None, false);

    assert_eq!(report.operations, 2);
    assert!(rmt.contains("notes.txt"));
    assert!(rmt.contains("_Notes.txt"));
    assert!(lcl.contains("_Notes.txt"));
    assert!(!lcl.contains("Notes.txt"));
    assert!(agent.contains("/remote/_Notes.txt"));
    assert!(agent.contains("/local/_Notes.txt"));
}

#[test]
fn snapshot_builder_joins_listing_and_hashes() {
    let agent = FakeAgent::new();
    agent.put("/local/one.txt", b"one");
    agent.put("/local/two.txt", b"two!");

    let flat = snapshot(&agent, "/local/", "SHA-1", &[]).expect("snapshot should succeed");
    assert_eq!(flat.len(), 2);
    assert!(flat.contains("one.txt"));
    assert!(flat.contains("two.txt"));
}
