//! Modification-time gate for incremental copies.

use std::fs;
use std::io;

use camino::Utf8Path;

/// Returns whether `source` still needs to be processed into `dest`.
///
/// A missing destination is always stale. Once the destination's mtime
/// reaches the source's, the pair is current until the source changes
/// again; equal timestamps count as current so coarse filesystem clocks
/// don't cause rework.
pub fn is_stale(source: &Utf8Path, dest: &Utf8Path) -> io::Result<bool> {
    let dest_meta = match fs::metadata(dest) {
        Ok(meta) => meta,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(true),
        Err(err) => return Err(err),
    };

    let source_time = fs::metadata(source)?.modified()?;
    let dest_time = dest_meta.modified()?;

    Ok(dest_time < source_time)
}
