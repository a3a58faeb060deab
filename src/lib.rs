//! Two-way file tree reconciliation over a pluggable file-operations agent.

pub mod agent;
pub mod config;
pub mod diff;
pub mod driver;
pub mod error;
pub mod executor;
pub mod hash;
pub mod ignore_filter;
pub mod packed;
pub mod reconcile;
pub mod snapshot;

pub use agent::{Agent, RcloneAgent};
pub use config::Config;
pub use driver::Driver;
pub use hash::{hash_bytes, hash_file, ContentHash, Hasher};
pub use packed::{BaseFile, PackedTree};
pub use reconcile::{ReconcileReport, Reconciler};
pub use snapshot::{DiffState, FileEntry, Flat};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
