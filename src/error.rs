//! Shared error types for the agent adapter, packed tree store, and config loader.

use thiserror::Error;

/// Errors surfaced by the external agent adapter.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("agent listing failed for {path}: {source}")]
    List { path: String, #[source] source: std::io::Error },

    #[error("agent hashsum failed for {path}: {source}")]
    Hashsum { path: String, #[source] source: std::io::Error },

    #[error("agent copy failed ({src} -> {dst}): {source}")]
    Copy { src: String, dst: String, #[source] source: std::io::Error },

    #[error("agent move failed ({src} -> {dst}): {source}")]
    Move { src: String, dst: String, #[source] source: std::io::Error },

    #[error("agent delete failed for {path}: {source}")]
    Delete { path: String, #[source] source: std::io::Error },

    #[error("agent mkdir failed for {path}: {source}")]
    Mkdir { path: String, #[source] source: std::io::Error },

    #[error("agent subprocess exited with status {status}: {args:?}")]
    NonZeroExit { args: Vec<String>, status: i32 },

    #[error("could not parse agent listing output: {0}")]
    MalformedListing(String),

    #[error("failed to spawn agent subprocess {args:?}: {source}")]
    Spawn { args: Vec<String>, #[source] source: std::io::Error },
}

/// Errors surfaced by the reconciliation / snapshotting core.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("invalid ignore pattern '{pattern}': {source}")]
    InvalidIgnorePattern { pattern: String, #[source] source: regex::Error },

    #[error("base store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("base store JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("packed tree error: {0}")]
    PackedTree(#[from] PackedTreeError),
}

/// Errors from packed-tree navigation.
#[derive(Error, Debug)]
pub enum PackedTreeError {
    #[error("path '{0}' has no branch in the base store")]
    NoSuchBranch(String),
}

/// Errors loading the JSON configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{path}: could not read file: {source}")]
    Read { path: String, #[source] source: std::io::Error },

    #[error("{path}: invalid JSON: {source}")]
    Parse { path: String, #[source] source: serde_json::Error },
}
