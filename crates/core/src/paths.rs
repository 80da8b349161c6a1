//! Centralized path functions for on-disk storage locations.
//!
//! Single source of truth — avoids ad-hoc `dirs::cache_dir().join(...)`
//! scattered across crates.

use std::path::PathBuf;

/// App cache root: `~/.cache/jobtrail/` (Linux) or the platform equivalent.
pub fn app_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|d| d.join("jobtrail"))
}

/// SQLite database file: `<app_cache_dir>/jobtrail.db`.
pub fn db_path() -> Option<PathBuf> {
    app_cache_dir().map(|d| d.join("jobtrail.db"))
}
