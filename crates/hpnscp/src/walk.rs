//! Turns a list of local paths into the [`SendItem`] sequence
//! [`hpn_scp::Session::send_all`] expects. This is the filesystem-walking
//! collaborator the library deliberately stays ignorant of.

use std::fs;
use std::path::Path;
use std::time::SystemTime;

use anyhow::{Context, Result};
use hpn_scp::{SendFile, SendItem};

/// Walks `paths`, appending the records a sender would emit for each.
/// Directories are only descended into when `recursive` is set; a bare
/// directory path passed without `recursive` is reported as an error,
/// matching the stock tool's refusal.
pub fn collect(paths: &[impl AsRef<Path>], recursive: bool, preserve: bool) -> Result<Vec<SendItem>> {
    let mut items = Vec::new();
    for path in paths {
        visit(path.as_ref(), recursive, preserve, &mut items)?;
    }
    Ok(items)
}

fn visit(path: &Path, recursive: bool, preserve: bool, items: &mut Vec<SendItem>) -> Result<()> {
    let meta = fs::symlink_metadata(path).with_context(|| format!("{}: stat failed", path.display()))?;
    let name = path
        .file_name()
        .with_context(|| format!("{}: has no basename", path.display()))?
        .to_string_lossy()
        .into_owned();

    if meta.is_dir() {
        if !recursive {
            anyhow::bail!("{}: is a directory (pass --recursive)", path.display());
        }
        items.push(SendItem::EnterDir {
            name,
            mode: mode_of(&meta),
            times: preserve.then(|| times_of(&meta)),
        });
        let mut entries: Vec<_> = fs::read_dir(path)
            .with_context(|| format!("{}: read_dir failed", path.display()))?
            .collect::<std::io::Result<_>>()
            .with_context(|| format!("{}: read_dir failed", path.display()))?;
        entries.sort_by_key(std::fs::DirEntry::file_name);
        for entry in entries {
            visit(&entry.path(), recursive, preserve, items)?;
        }
        items.push(SendItem::LeaveDir);
    } else {
        items.push(SendItem::File(SendFile {
            path: path.to_path_buf(),
            name,
            mode: mode_of(&meta),
            times: preserve.then(|| times_of(&meta)),
        }));
    }
    Ok(())
}

#[cfg(unix)]
fn mode_of(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_of(_meta: &fs::Metadata) -> u32 {
    0o644
}

fn times_of(meta: &fs::Metadata) -> (u64, u64) {
    let mtime = unix_secs(meta.modified());
    let atime = unix_secs(meta.accessed());
    (mtime, atime)
}

fn unix_secs(time: std::io::Result<SystemTime>) -> u64 {
    time.ok()
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_secs())
}
