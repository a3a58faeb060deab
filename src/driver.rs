//! Per-folder driver: scans both sides, reconciles, persists the base, and
//! manages crash recovery via a marker file written before a live pass and
//! cleared after it completes.

use std::io::ErrorKind;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::agent::{self, Agent};
use crate::config::Config;
use crate::error::SyncError;
use crate::executor::JobExecutor;
use crate::packed::{BaseFile, PackedTree};
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::snapshot::Flat;

/// The marker written before a live pass and removed once the base has been
/// persisted; its presence on the next run means the previous run crashed
/// mid-sync and forces recovery mode for that folder.
#[derive(Debug, Serialize, Deserialize)]
struct CrashMarker {
    folder: String,
}

pub struct Driver {
    config: Config,
    agent: Box<dyn Agent>,
    executor: JobExecutor,
    drive_dir: PathBuf,
}

/// Outcome of driving one folder, surfaced to the CLI for summary printing.
#[derive(Debug)]
pub struct FolderOutcome {
    pub folder: String,
    pub dry_report: ReconcileReport,
    pub live_report: Option<ReconcileReport>,
}

impl Driver {
    pub fn new(config: Config, agent: Box<dyn Agent>, drive_dir: PathBuf) -> Self {
        let executor = JobExecutor::new(config.workers);
        Self { config, agent, executor, drive_dir }
    }

    fn master_path(&self) -> PathBuf {
        self.drive_dir.join(&self.config.master)
    }

    fn recovery_marker_path(&self) -> PathBuf {
        self.drive_dir.join(&self.config.temp_file)
    }

    fn load_master(&self) -> Result<BaseFile, SyncError> {
        match BaseFile::load(&self.master_path()) {
            Ok(base) => Ok(base),
            Err(SyncError::Io(err)) if err.kind() == ErrorKind::NotFound => {
                warn!(path = ?self.master_path(), "master file missing, this must be a first run");
                Ok(BaseFile::new())
            }
            Err(other) => Err(other),
        }
    }

    fn pending_crash(&self) -> Option<String> {
        let marker_path = self.recovery_marker_path();
        let raw = std::fs::read_to_string(marker_path).ok()?;
        let marker: CrashMarker = serde_json::from_str(&raw).ok()?;
        warn!(folder = %marker.folder, "detected a crash, found the recovery marker, forcing recovery mode");
        Some(marker.folder)
    }

    /// Syncs a single folder. `dry_only` means never prompt or run the live
    /// pass (the CLI's `--dry-run` equivalent); `auto` skips the confirm
    /// prompt and runs the live pass unconditionally when there is work.
    pub fn sync_folder(
        &mut self,
        folder: &str,
        dry_only: bool,
        auto: bool,
        clean: bool,
        recover_override: bool,
    ) -> Result<FolderOutcome, SyncError> {
        let path_lcl = format!("{}{}/", self.config.base_l, folder);
        let path_rmt = format!("{}{}/", self.config.base_r, folder);

        let mut master = self.load_master()?;
        let crashed_folder = self.pending_crash();
        let recover = recover_override || crashed_folder.as_deref() == Some(folder);

        let min_path = master.tree.get_min(folder).to_string();
        let have_folder = master.tree.contains(folder);
        let recover = recover || !have_folder;

        let (lcl_ignores, lcl_ignore_paths) = agent::load_ignores(self.agent.as_ref(), &path_lcl)?;
        let (rmt_ignores, rmt_ignore_paths) = agent::load_ignores(self.agent.as_ref(), &path_rmt)?;

        let lcl = agent::snapshot(self.agent.as_ref(), &path_lcl, &self.config.hash_name, &lcl_ignores)?;
        let rmt = agent::snapshot(self.agent.as_ref(), &path_rmt, &self.config.hash_name, &rmt_ignores)?;

        master.ignores.extend(lcl_ignore_paths);
        master.ignores.extend(rmt_ignore_paths);
        master.ignores.sort();
        master.ignores.dedup();

        let old = if recover {
            None
        } else {
            let branch = master.tree.get_branch(folder).ok().cloned().unwrap_or_default();
            Some(branch.unpack(&path_lcl))
        };

        info!(folder, recover, "dry pass");
        let dry_reconciler = Reconciler::new(
            self.agent.as_ref(),
            &self.executor,
            lcl.clone(),
            rmt.clone(),
            self.config.case_insensitive,
            true,
            0,
        );
        let (dry_report, _, _) = dry_reconciler.run(old.as_ref(), recover);

        let mut live_report = None;

        if !dry_only && dry_report.operations > 0 && (auto || confirm_prompt()) {
            self.write_crash_marker(folder)?;

            info!(folder, total = dry_report.operations, "live pass");
            let live_reconciler = Reconciler::new(
                self.agent.as_ref(),
                &self.executor,
                lcl.clone(),
                rmt.clone(),
                self.config.case_insensitive,
                false,
                dry_report.operations,
            );
            let (report, new_lcl, _new_rmt) = live_reconciler.run(old.as_ref(), recover);

            self.persist_base(&mut master, &min_path, &path_lcl, new_lcl)?;
            self.clear_crash_marker()?;
            live_report = Some(report);
        }

        if clean {
            self.agent.rmdirs(&path_rmt).ok();
            self.agent.rmdirs(&path_lcl).ok();
        }

        Ok(FolderOutcome { folder: folder.to_string(), dry_report, live_report })
    }

    fn write_crash_marker(&self, folder: &str) -> Result<(), SyncError> {
        let raw = serde_json::to_string(&CrashMarker { folder: folder.to_string() })?;
        std::fs::write(self.recovery_marker_path(), raw)?;
        Ok(())
    }

    fn clear_crash_marker(&self) -> Result<(), SyncError> {
        match std::fs::remove_file(self.recovery_marker_path()) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Re-scopes and re-packs the base branch at `min_path` after a live
    /// pass. With `fast_save` the in-memory post-sync local snapshot is
    /// reused directly (no extra round trip to the agent); without it, the
    /// folder is re-listed from scratch, the safer but slower default.
    fn persist_base(
        &self,
        master: &mut BaseFile,
        min_path: &str,
        path_lcl: &str,
        live_lcl: Flat,
    ) -> Result<(), SyncError> {
        let fresh = if self.config.fast_save {
            live_lcl
        } else {
            let (ignores, _) = agent::load_ignores(self.agent.as_ref(), path_lcl)?;
            agent::snapshot(self.agent.as_ref(), path_lcl, &self.config.hash_name, &ignores)?
        };

        let packed = PackedTree::pack(&fresh);
        master.tree.merge(min_path, packed);
        if !master.history.iter().any(|h| h == min_path) {
            master.history.push(min_path.to_string());
        }
        master.save(&self.master_path())
    }

    pub fn default_dirs(&self) -> Vec<String> {
        self.config.default_dirs.clone()
    }
}

fn confirm_prompt() -> bool {
    use std::io::Write;
    print!("Execute? [y/N] ");
    std::io::stdout().flush().ok();
    let mut line = String::new();
    if std::io::stdin().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
}
