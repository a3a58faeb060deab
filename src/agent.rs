//! The file-operations agent boundary: everything this crate knows about the
//! outside world goes through the `Agent` trait. `RcloneAgent` is the
//! concrete adapter that shells out to an rclone-shaped CLI; tests use an
//! in-memory double instead.

use std::collections::HashMap;
use std::process::Command;

use tracing::{debug_span, warn};

use crate::error::AgentError;
use crate::ignore_filter;
use crate::snapshot::{DiffState, FileEntry, Flat};

/// One entry from `lsjson`.
#[derive(Debug, Clone)]
pub struct ListEntry {
    pub path: String,
    pub size: u64,
    /// Seconds since epoch, truncated from the ISO-8601 `ModTime` field.
    pub mtime: u64,
    pub is_dir: bool,
}

/// The sole I/O boundary of the crate. Every operation is named after the
/// corresponding rclone subcommand it front-ends.
pub trait Agent: Send + Sync {
    fn list(&self, root: &str) -> Result<Vec<ListEntry>, AgentError>;
    fn hashsum(&self, algo: &str, root: &str) -> Result<HashMap<String, String>, AgentError>;
    fn read_file(&self, path: &str) -> Result<String, AgentError>;
    fn copyto(&self, src: &str, dst: &str) -> Result<(), AgentError>;
    fn moveto(&self, src: &str, dst: &str) -> Result<(), AgentError>;
    fn delete(&self, path: &str) -> Result<(), AgentError>;
    fn mkdir(&self, path: &str) -> Result<(), AgentError>;
    fn rmdirs(&self, path: &str) -> Result<(), AgentError>;
}

/// Shells out to a binary with the rclone command contract. The binary name
/// is configurable (`Config::agent_bin`) so the crate fronts "a generic
/// file-operations agent", not specifically rclone.
pub struct RcloneAgent {
    bin: String,
    extra_flags: Vec<String>,
}

impl RcloneAgent {
    pub fn new(bin: impl Into<String>, extra_flags: Vec<String>) -> Self {
        Self { bin: bin.into(), extra_flags }
    }

    fn run(&self, args: &[&str]) -> Result<std::process::Output, AgentError> {
        let full_args: Vec<String> =
            args.iter().map(|s| s.to_string()).chain(self.extra_flags.iter().cloned()).collect();
        let _span = debug_span!("agent_exec", bin = %self.bin, args = ?full_args).entered();
        Command::new(&self.bin)
            .args(&full_args)
            .output()
            .map_err(|source| AgentError::Spawn { args: full_args.clone(), source })
    }
}

impl Agent for RcloneAgent {
    fn list(&self, root: &str) -> Result<Vec<ListEntry>, AgentError> {
        self.mkdir(root)?;
        let output = self.run(&["lsjson", "-R", "--files-only", root])?;
        if !output.status.success() {
            return Err(AgentError::NonZeroExit {
                args: vec!["lsjson".to_string(), root.to_string()],
                status: output.status.code().unwrap_or(-1),
            });
        }
        let raw: Vec<serde_json::Value> = serde_json::from_slice(&output.stdout)
            .map_err(|e| AgentError::MalformedListing(e.to_string()))?;

        raw.into_iter()
            .map(|value| {
                let path = value
                    .get("Path")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| AgentError::MalformedListing("missing Path".to_string()))?
                    .to_string();
                let size = value.get("Size").and_then(|v| v.as_u64()).unwrap_or(0);
                let mtime_str = value
                    .get("ModTime")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| AgentError::MalformedListing("missing ModTime".to_string()))?;
                let mtime = parse_modtime(mtime_str)
                    .ok_or_else(|| AgentError::MalformedListing(format!("bad ModTime: {mtime_str}")))?;
                let is_dir = value.get("IsDir").and_then(|v| v.as_bool()).unwrap_or(false);
                Ok(ListEntry { path, size, mtime, is_dir })
            })
            .collect()
    }

    fn hashsum(&self, algo: &str, root: &str) -> Result<HashMap<String, String>, AgentError> {
        let output = self.run(&["hashsum", algo, root])?;
        if !output.status.success() {
            return Err(AgentError::NonZeroExit {
                args: vec!["hashsum".to_string(), algo.to_string(), root.to_string()],
                status: output.status.code().unwrap_or(-1),
            });
        }
        let text = String::from_utf8_lossy(&output.stdout);
        let mut hashes = HashMap::new();
        for line in text.lines() {
            if let Some((hash, path)) = line.split_once("  ") {
                hashes.insert(path.trim().to_string(), hash.trim().to_string());
            }
        }
        Ok(hashes)
    }

    fn read_file(&self, path: &str) -> Result<String, AgentError> {
        let output = self.run(&["cat", path])?;
        if !output.status.success() {
            return Ok(String::new());
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn copyto(&self, src: &str, dst: &str) -> Result<(), AgentError> {
        let output = self.run(&["copyto", src, dst])?;
        if !output.status.success() {
            return Err(AgentError::NonZeroExit {
                args: vec!["copyto".to_string(), src.to_string(), dst.to_string()],
                status: output.status.code().unwrap_or(-1),
            });
        }
        Ok(())
    }

    fn moveto(&self, src: &str, dst: &str) -> Result<(), AgentError> {
        let output = self.run(&["moveto", src, dst])?;
        if !output.status.success() {
            return Err(AgentError::NonZeroExit {
                args: vec!["moveto".to_string(), src.to_string(), dst.to_string()],
                status: output.status.code().unwrap_or(-1),
            });
        }
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<(), AgentError> {
        let output = self.run(&["delete", path])?;
        if !output.status.success() {
            return Err(AgentError::NonZeroExit {
                args: vec!["delete".to_string(), path.to_string()],
                status: output.status.code().unwrap_or(-1),
            });
        }
        Ok(())
    }

    fn mkdir(&self, path: &str) -> Result<(), AgentError> {
        let output = self.run(&["mkdir", path])?;
        if !output.status.success() {
            return Err(AgentError::NonZeroExit {
                args: vec!["mkdir".to_string(), path.to_string()],
                status: output.status.code().unwrap_or(-1),
            });
        }
        Ok(())
    }

    fn rmdirs(&self, path: &str) -> Result<(), AgentError> {
        let output = self.run(&["rmdirs", path])?;
        if !output.status.success() {
            return Err(AgentError::NonZeroExit {
                args: vec!["rmdirs".to_string(), path.to_string()],
                status: output.status.code().unwrap_or(-1),
            });
        }
        Ok(())
    }
}

/// Parses the fixed-width `YYYY-MM-DDTHH:MM:SS` prefix of an rclone ModTime
/// into seconds since epoch, without pulling in a datetime crate. Mirrors
/// `datetime.strptime(time[:19], ...)`.
fn parse_modtime(raw: &str) -> Option<u64> {
    let prefix = raw.get(0..19)?;
    let (date, time) = prefix.split_once('T')?;
    let mut date_parts = date.split('-');
    let year: i64 = date_parts.next()?.parse().ok()?;
    let month: i64 = date_parts.next()?.parse().ok()?;
    let day: i64 = date_parts.next()?.parse().ok()?;

    let mut time_parts = time.split(':');
    let hour: i64 = time_parts.next()?.parse().ok()?;
    let minute: i64 = time_parts.next()?.parse().ok()?;
    let second: i64 = time_parts.next()?.parse().ok()?;

    let days = days_since_epoch(year, month, day);
    let seconds = days * 86_400 + hour * 3600 + minute * 60 + second;
    u64::try_from(seconds).ok()
}

fn is_leap_year(year: i64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_since_epoch(year: i64, month: i64, day: i64) -> i64 {
    const DAYS_IN_MONTH: [i64; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
    let mut days = 0i64;
    if year >= 1970 {
        for y in 1970..year {
            days += if is_leap_year(y) { 366 } else { 365 };
        }
    } else {
        for y in year..1970 {
            days -= if is_leap_year(y) { 366 } else { 365 };
        }
    }
    for m in 0..(month - 1) {
        days += DAYS_IN_MONTH[m as usize];
        if m == 1 && is_leap_year(year) {
            days += 1;
        }
    }
    days += day - 1;
    days
}

/// Builds a `Flat` snapshot of one side: ensures the directory, lists it,
/// hashes it, joins the two by relative path, and drops anything matching an
/// ignore regex.
pub fn snapshot(
    agent: &dyn Agent,
    root: &str,
    hash_name: &str,
    ignores: &[regex::Regex],
) -> Result<Flat, AgentError> {
    let entries = agent.list(root)?;
    let hashes = agent.hashsum(hash_name, root)?;

    let mut flat = Flat::new(root);
    for entry in entries {
        if ignore_filter_matches(ignores, root, &entry.path) {
            continue;
        }
        let Some(hash_hex) = hashes.get(&entry.path) else {
            warn!(path = %entry.path, "agent reported no hash, skipping");
            continue;
        };
        flat.insert(FileEntry {
            name: entry.path,
            size: entry.size,
            hash: crate::hash::ContentHash::from_hex(hash_hex),
            mtime: entry.mtime,
            state: DiffState::Same,
            moved: false,
            is_clone: false,
            synced: false,
            ignore: false,
        });
    }
    Ok(flat)
}

fn ignore_filter_matches(ignores: &[regex::Regex], root: &str, path: &str) -> bool {
    let full = format!("{root}{path}");
    ignores.iter().any(|r| r.is_match(&full))
}

/// Finds every `.rignore` file under `root`, at any nesting depth, reads and
/// compiles them all, and returns the absolute paths found (sorted) so the
/// caller can record them against the base. A tree with no `.rignore`
/// anywhere yields empty results, not an error.
pub fn load_ignores(
    agent: &dyn Agent,
    root: &str,
) -> Result<(Vec<regex::Regex>, Vec<String>), crate::error::SyncError> {
    let mut rignore_paths: Vec<String> = agent
        .list(root)?
        .into_iter()
        .map(|entry| entry.path)
        .filter(|path| path == ".rignore" || path.ends_with("/.rignore"))
        .collect();
    rignore_paths.sort();

    let mut contents = Vec::with_capacity(rignore_paths.len());
    for path in &rignore_paths {
        let text = agent.read_file(&format!("{root}{path}")).unwrap_or_default();
        contents.push((path.clone(), text));
    }

    let regexes = ignore_filter::compile_ignores(&contents)?;
    let absolute = rignore_paths.into_iter().map(|path| format!("{root}{path}")).collect();
    Ok((regexes, absolute))
}
