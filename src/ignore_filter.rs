//! Compiles `.rignore` files into path-matching regexes.
//!
//! Each non-blank, non-comment line in a `.rignore` file names a file or
//! folder to skip, relative to the folder the `.rignore` lives in. Lines are
//! regex-escaped and anchored to the containing directory before compilation,
//! so a literal name never accidentally behaves like a pattern.

use regex::Regex;

use crate::error::SyncError;

/// Read the `.rignore` lines, if any, directly under `dir_entries` (already
/// listed names, forward-slash relative to the snapshot root) and compile one
/// regex per ignore line found, scoped to the folder containing that
/// `.rignore` file.
pub fn compile_ignores(rignore_contents: &[(String, String)]) -> Result<Vec<Regex>, SyncError> {
    let mut regexes = Vec::new();
    for (rignore_path, contents) in rignore_contents {
        let dir = match rignore_path.rfind('/') {
            Some(idx) => &rignore_path[..idx + 1],
            None => "",
        };
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let pattern = format!("^{}{}$", regex::escape(dir), regex::escape(line));
            let compiled = Regex::new(&pattern).map_err(|source| SyncError::InvalidIgnorePattern {
                pattern: pattern.clone(),
                source,
            })?;
            regexes.push(compiled);
        }
    }
    Ok(regexes)
}
