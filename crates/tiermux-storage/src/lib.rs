//! File-backed implementations of the `ConfigStore`/`StatsStore`/`LogSink`
//! collaborator traits `tiermux-provider-core` defines. Every write here
//! goes through a temp-file-then-rename so a crash mid-write never leaves a
//! half-written file behind.

mod config_store;
mod log_sink;
mod stats_store;

pub use config_store::FileConfigStore;
pub use log_sink::FileLogSink;
pub use stats_store::{FileStatsStore, STATS_SCHEMA_VERSION};

use std::path::{Path, PathBuf};

/// Writes `contents` to `path` atomically: writes to a sibling `.tmp` file
/// first, then renames over the destination. Renaming within the same
/// directory is atomic on the filesystems this targets (ext4, APFS, NTFS).
async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp_path = tmp_path_for(path);
    tokio::fs::write(&tmp_path, contents).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
