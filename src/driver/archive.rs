//! Download directory watching
//!
//! The browser writes an archive as `<name>.crdownload` (or `.tmp`/`.part`) and
//! renames it to `<name>.zip` when done. A download counts as complete once a zip
//! that was not there before appears and no partial file remains.

use crate::driver::{DriverError, DriverResult};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;

const ARCHIVE_EXTENSION: &str = "zip";
const PARTIAL_EXTENSIONS: [&str; 3] = ["crdownload", "tmp", "part"];

#[derive(Debug, Default)]
struct DirScan {
    archives: HashSet<PathBuf>,
    partials: usize,
}

fn scan(dir: &Path) -> DriverResult<DirScan> {
    let mut result = DirScan::default();

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(result),
        Err(e) => return Err(e.into()),
    };

    for entry in entries {
        let path = entry?.path();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some(ARCHIVE_EXTENSION) => {
                result.archives.insert(path);
            }
            Some(ext) if PARTIAL_EXTENSIONS.contains(&ext) => result.partials += 1,
            _ => {}
        }
    }

    Ok(result)
}

/// Lists the archives currently in `dir`
pub fn snapshot_dir(dir: &Path) -> DriverResult<HashSet<PathBuf>> {
    Ok(scan(dir)?.archives)
}

/// Polls `dir` until a new complete archive shows up
///
/// # Arguments
///
/// * `dir` - Directory the browser downloads into
/// * `baseline` - Archives present before the download was triggered
/// * `timeout` - Upper bound on the wait
/// * `poll` - Delay between directory scans
///
/// # Returns
///
/// * `Ok(path)` - The first new archive found
/// * `Err(DriverError::DownloadTimeout)` - No complete archive within `timeout`
pub async fn wait_for_archive(
    dir: &Path,
    baseline: &HashSet<PathBuf>,
    timeout: Duration,
    poll: Duration,
) -> DriverResult<PathBuf> {
    let deadline = Instant::now() + timeout;

    loop {
        let current = scan(dir)?;
        if current.partials == 0 {
            let mut fresh: Vec<_> = current.archives.difference(baseline).cloned().collect();
            fresh.sort();
            if let Some(archive) = fresh.into_iter().next() {
                tracing::debug!("Archive landed: {}", archive.display());
                return Ok(archive);
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(DriverError::DownloadTimeout {
                dir: dir.to_path_buf(),
                timeout,
            });
        }

        tokio::time::sleep(poll.min(deadline - now)).await;
    }
}
