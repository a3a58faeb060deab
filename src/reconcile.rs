//! The reconciliation engine: turns two classified snapshots (plus the
//! optional base) into a plan of agent operations and executes it.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::agent::Agent;
use crate::diff::calc_states;
use crate::executor::JobExecutor;
use crate::snapshot::{DiffState, FileEntry, Flat};

/// One cell of the 4x4 classification table. A plain enum dispatched via
/// `match`, not a table of trait objects or function pointers — the
/// dispatch table is data, the behavior lives in one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Null,
    Push,
    Pull,
    DelL,
    DelR,
    Conflict,
}

/// `LOGIC[lcl_state][rmt_state]` from the original tool, expressed as a
/// `const fn` match instead of a 2D array of function pointers.
const fn logic(lcl: DiffState, rmt: DiffState) -> Action {
    use DiffState::*;
    match (lcl, rmt) {
        (Same, Same) => Action::Null,
        (Same, Updated) => Action::Pull,
        (Same, Deleted) => Action::DelL,
        (Same, Created) => Action::Conflict,

        (Updated, Same) => Action::Push,
        (Updated, Updated) => Action::Conflict,
        (Updated, Deleted) => Action::Push,
        (Updated, Created) => Action::Conflict,

        (Deleted, Same) => Action::DelR,
        (Deleted, Updated) => Action::Pull,
        (Deleted, Deleted) => Action::Null,
        (Deleted, Created) => Action::Pull,

        (Created, Same) => Action::Conflict,
        (Created, Updated) => Action::Conflict,
        (Created, Deleted) => Action::Push,
        (Created, Created) => Action::Conflict,
    }
}

/// Tally of what a reconciliation pass did, for the driver to log and to
/// decide which folders need their base re-scoped (spec's "barrier" result).
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub operations: usize,
    pub new_dirs: HashSet<String>,
}

/// Owns mutable working copies of both sides. The driver's own `lcl`/`rmt`
/// snapshots are never touched directly — the reconciler clones them on
/// entry and hands back only the final report, since planning must not
/// mutate the caller's state until a pass fully completes.
pub struct Reconciler<'a> {
    agent: &'a dyn Agent,
    executor: &'a JobExecutor,
    lcl: Flat,
    rmt: Flat,
    case_insensitive: bool,
    dry_run: bool,
    count: usize,
    total: usize,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        agent: &'a dyn Agent,
        executor: &'a JobExecutor,
        lcl: Flat,
        rmt: Flat,
        case_insensitive: bool,
        dry_run: bool,
        total: usize,
    ) -> Self {
        Self { agent, executor, lcl, rmt, case_insensitive, dry_run, count: 0, total }
    }

    /// Run one full reconciliation pass. `old` is the base snapshot (absent
    /// on a first-ever sync of a folder); `recover` forces the
    /// newest-mtime-wins path used after an interrupted prior run.
    pub fn run(mut self, old: Option<&Flat>, recover: bool) -> (ReconcileReport, Flat, Flat) {
        let before_dirs: HashSet<String> =
            self.lcl.dirs().union(self.rmt.dirs()).cloned().collect();

        if let Some(old) = old {
            calc_states(old, &mut self.lcl);
            calc_states(old, &mut self.rmt);
        }

        if recover {
            self.match_states(true, true);
            self.match_states(false, true);
        } else {
            self.match_moves(old, true);
            self.match_moves(old, false);

            self.lcl.clean();
            self.rmt.clean();
            self.executor.wait();

            self.match_states(true, false);
            self.match_states(false, false);
        }

        self.executor.wait();

        let after_dirs: HashSet<String> =
            self.lcl.dirs().union(self.rmt.dirs()).cloned().collect();
        let new_dirs: HashSet<String> = after_dirs.difference(&before_dirs).cloned().collect();

        (ReconcileReport { operations: self.count, new_dirs }, self.lcl, self.rmt)
    }

    /// `forward = true` treats `lcl` as the source side of `LOGIC`/recovery
    /// comparisons (mirrors calling `match_states(lcl, rmt, ...)` vs.
    /// `match_states(rmt, lcl, ...)` in the original).
    fn match_states(&mut self, forward: bool, recover: bool) {
        let names: Vec<String> = {
            let src = if forward { &self.lcl } else { &self.rmt };
            let mut names: Vec<String> = src.names().cloned().collect();
            names.sort();
            names
        };

        for name in names {
            let (already_synced, src_state) = {
                let src = if forward { &self.lcl } else { &self.rmt };
                match src.get(&name) {
                    Some(f) => (f.synced, f.state),
                    None => continue,
                }
            };
            if already_synced {
                continue;
            }
            {
                let src = if forward { &mut self.lcl } else { &mut self.rmt };
                src.get_mut(&name).unwrap().synced = true;
            }

            let dst_has = {
                let dst = if forward { &self.rmt } else { &self.lcl };
                dst.get(&name).cloned()
            };

            match dst_has {
                Some(dst_entry) => {
                    {
                        let dst = if forward { &mut self.rmt } else { &mut self.lcl };
                        dst.get_mut(&name).unwrap().synced = true;
                    }
                    if !recover {
                        let action = logic(src_state, dst_entry.state);
                        self.dispatch(action, &name, &name, forward);
                    } else if self.fingerprint_at(&name, forward) != dst_entry.fingerprint() {
                        let src_mtime = self.mtime_at(&name, forward);
                        if src_mtime > dst_entry.mtime {
                            self.push(&name, &name, forward);
                        } else {
                            self.push(&name, &name, !forward);
                        }
                    }
                }
                None if src_state != DiffState::Deleted => {
                    self.safe_push(&name, forward);
                }
                None => {
                    let side = if forward { "lcl" } else { "rmt" };
                    warn!(side, name = %name, "unpaired deleted entry, nothing to delete on the other side");
                }
            }
        }
    }

    fn fingerprint_at(&self, name: &str, forward: bool) -> String {
        let flat = if forward { &self.lcl } else { &self.rmt };
        flat.get(name).expect("caller checked presence").fingerprint()
    }

    fn mtime_at(&self, name: &str, forward: bool) -> u64 {
        let flat = if forward { &self.lcl } else { &self.rmt };
        flat.get(name).expect("caller checked presence").mtime
    }

    fn dispatch(&mut self, action: Action, name_s: &str, name_d: &str, forward: bool) {
        match action {
            Action::Null => {}
            Action::Push => self.push(name_s, name_d, forward),
            Action::Pull => self.push(name_s, name_d, !forward),
            Action::DelL => self.delete(name_s, forward),
            Action::DelR => self.delete(name_s, !forward),
            Action::Conflict => self.conflict(name_s, name_d, forward),
        }
    }

    /// Mirrors file moves on `forward`'s side into the other side. `forward`
    /// selects which physical Flat plays the "source of truth for moves"
    /// role for this call (the original calls `match_moves` once per
    /// direction).
    fn match_moves(&mut self, old: Option<&Flat>, forward: bool) {
        let Some(old) = old else { return };

        let names: Vec<String> = {
            let src = if forward { &self.lcl } else { &self.rmt };
            let mut names: Vec<String> = src.names().cloned().collect();
            names.sort();
            names
        };

        for name in names {
            let entry = {
                let src = if forward { &self.lcl } else { &self.rmt };
                match src.get(&name) {
                    Some(f) => f.clone(),
                    None => continue,
                }
            };
            if entry.synced || !entry.moved {
                continue;
            }
            {
                let src = if forward { &mut self.lcl } else { &mut self.rmt };
                src.get_mut(&name).unwrap().synced = true;
            }

            let dst_entry = {
                let dst = if forward { &self.rmt } else { &self.lcl };
                dst.get(&name).cloned()
            };

            if let Some(dst_entry) = dst_entry {
                {
                    let dst = if forward { &mut self.rmt } else { &mut self.lcl };
                    dst.get_mut(&name).unwrap().synced = true;
                }

                if dst_entry.state == DiffState::Deleted {
                    // Falls through to the trace below; may trigger an
                    // unpaired-delete warning in match_states.
                } else if entry.fingerprint() == dst_entry.fingerprint() {
                    // Both sides moved the same content to the same name.
                    continue;
                } else if dst_entry.moved {
                    // Two different moves landed on the same name: flag both
                    // updated and let match_states resolve as a conflict.
                    let src = if forward { &mut self.lcl } else { &mut self.rmt };
                    src.get_mut(&name).unwrap().state = DiffState::Updated;
                    let dst = if forward { &mut self.rmt } else { &mut self.lcl };
                    dst.get_mut(&name).unwrap().state = DiffState::Updated;
                    continue;
                } else if let Some(target) = self.degenerate_double_move(&name, &dst_entry, old, forward) {
                    // The other side's occupant at `name` is untouched base
                    // content that our side already renamed elsewhere.
                    // Mirror that rename instead of picking an arbitrary
                    // name for the occupant.
                    self.move_within(&name, &target, !forward);
                    self.executor.wait();
                } else {
                    // Name is taken on the other side by something unrelated.
                    // Rename it out of the way before matching the move.
                    let dst = if forward { &self.rmt } else { &self.lcl };
                    let new_name = self.resolve_case_on(&name, dst);
                    self.move_within(&name, &new_name, !forward);
                    self.executor.wait();
                }
            }

            self.trace_and_move(&entry, old, forward);
        }
    }

    /// Detects the degenerate double-move: `old` already had something
    /// named `name`, the occupant blocking our move on the other side is
    /// still that exact base content, and our own side has since renamed
    /// that content elsewhere. When all three hold, the "conflict" isn't
    /// real — the other side just never moved its copy — so the fix is to
    /// land the occupant on the name our side already chose for it.
    fn degenerate_double_move(
        &self,
        name: &str,
        dst_entry: &FileEntry,
        old: &Flat,
        forward: bool,
    ) -> Option<String> {
        let old_entry = old.get(name)?;
        if old_entry.fingerprint() != dst_entry.fingerprint() {
            return None;
        }
        let src = if forward { &self.lcl } else { &self.rmt };
        let moved_entry = src.by_fingerprint(&old_entry.fingerprint())?;
        if moved_entry.moved && moved_entry.name != name {
            Some(moved_entry.name.clone())
        } else {
            None
        }
    }

    fn trace_and_move(&mut self, entry: &FileEntry, old: &Flat, forward: bool) {
        let Some(old_entry) = old.by_fingerprint(&entry.fingerprint()) else {
            // Never traced in the base at all: push it across as a plain
            // create, matching the original's NOTHERE fallback.
            self.safe_push(&entry.name, forward);
            return;
        };

        let dst = if forward { &self.rmt } else { &self.lcl };
        match dst.get(&old_entry.name) {
            Some(counterpart) if counterpart.is_clone => {
                if counterpart.state == DiffState::Created {
                    self.safe_push(&entry.name, forward);
                } else {
                    self.finish_nomove(&entry.name, &old_entry.name, forward);
                }
            }
            Some(counterpart) if !counterpart.moved => {
                self.finish_nomove(&entry.name, &old_entry.name, forward);
            }
            Some(_) => {
                // Counterpart also reports itself moved: fall through to the
                // fingerprint-based trace below.
                self.trace_by_fingerprint(entry, forward);
            }
            None => {
                self.trace_by_fingerprint(entry, forward);
            }
        }
    }

    fn trace_by_fingerprint(&mut self, entry: &FileEntry, forward: bool) {
        let dst = if forward { &self.rmt } else { &self.lcl };
        match dst.by_fingerprint(&entry.fingerprint()) {
            Some(counterpart) if counterpart.is_clone => {
                self.safe_push(&entry.name, forward);
            }
            Some(counterpart) if counterpart.moved => {
                let counterpart_name = counterpart.name.clone();
                self.finish_moved(&entry.name, &counterpart_name, forward);
            }
            Some(counterpart) => {
                let counterpart_name = counterpart.name.clone();
                self.finish_nomove(&entry.name, &counterpart_name, forward);
            }
            None => self.safe_push(&entry.name, forward),
        }
    }

    fn finish_nomove(&mut self, name: &str, rmt_name: &str, forward: bool) {
        let rmt_state = {
            let dst = if forward { &self.rmt } else { &self.lcl };
            dst.get(rmt_name).map(|f| f.state)
        };
        {
            let dst = if forward { &mut self.rmt } else { &mut self.lcl };
            if let Some(f) = dst.get_mut(rmt_name) {
                f.synced = true;
            }
        }
        if rmt_state == Some(DiffState::Deleted) {
            self.safe_push(name, forward);
        } else {
            self.safe_move(rmt_name, name, !forward);
        }
    }

    fn finish_moved(&mut self, name: &str, rmt_name: &str, forward: bool) {
        {
            let dst = if forward { &mut self.rmt } else { &mut self.lcl };
            if let Some(f) = dst.get_mut(rmt_name) {
                f.synced = true;
            }
        }
        self.safe_move(name, rmt_name, forward);
    }

    fn resolve_case_on(&self, name: &str, flat: &Flat) -> String {
        let mut candidate = name.to_string();
        loop {
            let taken = if self.case_insensitive {
                flat.contains_lower(&candidate)
            } else {
                flat.contains(&candidate)
            };
            if !taken {
                return candidate;
            }
            candidate = prepend(&candidate, "_");
        }
    }

    /// Alternates case-resolution between `src` and `dst` until a name
    /// settles on both, then copies and (if renamed) moves the source into
    /// place.
    fn safe_push(&mut self, name: &str, forward: bool) {
        let mut candidate = name.to_string();
        let mut previous = String::new();
        let mut check_dst = true;
        while candidate != previous {
            previous = candidate.clone();
            let flat = if check_dst == forward { &self.rmt } else { &self.lcl };
            candidate = self.resolve_case_on(&candidate, flat);
            check_dst = !check_dst;
        }

        self.push(name, &candidate, forward);

        if candidate != name {
            self.executor.wait();
            self.move_within(name, &candidate, forward);
        }
    }

    /// Resolves the destination name against both flats before moving.
    fn safe_move(&mut self, name_s: &str, name_d: &str, forward: bool) {
        let mut candidate = name_d.to_string();
        let mut previous = String::new();
        let mut check_dst = true;
        while candidate != previous {
            previous = candidate.clone();
            let flat = if check_dst { (if forward { &self.rmt } else { &self.lcl }) } else { (if forward { &self.lcl } else { &self.rmt }) };
            candidate = self.resolve_case_on(&candidate, flat);
            check_dst = !check_dst;
        }

        if candidate != name_d {
            self.move_within(name_d, &candidate, !forward);
        }
        self.move_within(name_s, &candidate, forward);
    }

    /// Copies `name_s` (from the `forward`-selected source side) to
    /// `name_d` on the other side, submitting the job and updating both
    /// flats as if it already completed (matching the original's
    /// fire-and-forget-then-update-model bookkeeping).
    fn push(&mut self, name_s: &str, name_d: &str, forward: bool) {
        self.count += 1;
        let (src_root, entry) = {
            let src = if forward { &self.lcl } else { &self.rmt };
            let entry = src.get(name_s).expect("push source must exist").clone();
            (src.root.clone(), entry)
        };
        let dst_root = if forward { self.rmt.root.clone() } else { self.lcl.root.clone() };

        let full_src = format!("{src_root}{name_s}");
        let full_dst = format!("{dst_root}{name_d}");

        if self.dry_run {
            info!(op = "push", %full_src, %full_dst, dry_run = true);
        } else {
            info!(count = self.count, total = self.total, op = "push", %full_src, %full_dst);
            let agent_ref = self.agent;
            let src_owned = full_src.clone();
            let dst_owned = full_dst.clone();
            self.executor.submit("push", move || agent_ref.copyto(&src_owned, &dst_owned));
        }

        let dst = if forward { &mut self.rmt } else { &mut self.lcl };
        dst.insert(FileEntry { name: name_d.to_string(), ..entry });
    }

    /// Moves/renames `name_s` to `name_d` within the `forward`-selected
    /// side, submitting the job and updating that flat.
    fn move_within(&mut self, name_s: &str, name_d: &str, forward: bool) {
        self.count += 1;
        let root = if forward { self.lcl.root.clone() } else { self.rmt.root.clone() };
        let full_src = format!("{root}{name_s}");
        let full_dst = format!("{root}{name_d}");

        if self.dry_run {
            info!(op = "move", %full_src, %full_dst, dry_run = true);
        } else {
            info!(count = self.count, total = self.total, op = "move", %full_src, %full_dst);
            let agent_ref = self.agent;
            let src_owned = full_src.clone();
            let dst_owned = full_dst.clone();
            self.executor.submit("move", move || agent_ref.moveto(&src_owned, &dst_owned));
        }

        let flat = if forward { &mut self.lcl } else { &mut self.rmt };
        if let Some(entry) = flat.remove(name_s) {
            flat.insert(FileEntry { name: name_d.to_string(), ..entry });
        }
    }

    fn delete(&mut self, name: &str, forward: bool) {
        self.count += 1;
        let root = if forward { self.lcl.root.clone() } else { self.rmt.root.clone() };
        let full = format!("{root}{name}");

        if self.dry_run {
            info!(op = "delete", path = %full, dry_run = true);
        } else {
            info!(count = self.count, total = self.total, op = "delete", path = %full);
            let agent_ref = self.agent;
            let owned = full.clone();
            self.executor.submit("delete", move || agent_ref.delete(&owned));
        }

        let flat = if forward { &mut self.lcl } else { &mut self.rmt };
        flat.remove(name);
    }

    /// Renames both conflicting names out of the way (`lcl_`/`rmt_` prefix)
    /// and pushes both copies across, so neither side's edit is lost.
    fn conflict(&mut self, name_s: &str, name_d: &str, forward: bool) {
        warn!(name = %name_s, "conflicting change on both sides, duplicating");

        let lcl_prefix_name = {
            let flat = if forward { &self.lcl } else { &self.rmt };
            self.resolve_case_on(&prepend(name_s, "lcl_"), flat)
        };
        let rmt_prefix_name = {
            let flat = if forward { &self.rmt } else { &self.lcl };
            self.resolve_case_on(&prepend(name_d, "rmt_"), flat)
        };

        let renamed = lcl_prefix_name != name_s || rmt_prefix_name != name_d;

        self.move_within(name_s, &lcl_prefix_name, forward);
        self.move_within(name_d, &rmt_prefix_name, !forward);

        if renamed {
            self.executor.wait();
        }

        self.safe_push(&lcl_prefix_name, forward);
        self.safe_push(&rmt_prefix_name, !forward);
    }
}

fn prepend(name: &str, prefix: &str) -> String {
    match name.rfind('/') {
        Some(idx) => format!("{}/{}{}", &name[..idx], prefix, &name[idx + 1..]),
        None => format!("{prefix}{name}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logic_table_matches_original_shape() {
        use DiffState::*;
        assert_eq!(logic(Same, Same), Action::Null);
        assert_eq!(logic(Same, Updated), Action::Pull);
        assert_eq!(logic(Same, Deleted), Action::DelL);
        assert_eq!(logic(Same, Created), Action::Conflict);
        assert_eq!(logic(Updated, Same), Action::Push);
        assert_eq!(logic(Deleted, Same), Action::DelR);
        assert_eq!(logic(Deleted, Deleted), Action::Null);
        assert_eq!(logic(Created, Deleted), Action::Push);
    }

    #[test]
    fn prepend_inserts_before_basename() {
        assert_eq!(prepend("a/b/c.txt", "_"), "a/b/_c.txt");
        assert_eq!(prepend("c.txt", "_"), "_c.txt");
    }
}
