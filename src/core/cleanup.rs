//! Transient artifact removal
//!
//! Only downloaded files are ever removed here; installed prefixes are left alone.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// What a cleanup pass did.
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, std::io::Error)>,
}

/// Remove each file by name. Missing files are ignored.
pub fn remove_artifacts<P: AsRef<Path>>(paths: &[P]) -> CleanupReport {
    let mut report = CleanupReport::default();
    for path in paths {
        let path = path.as_ref();
        match std::fs::remove_file(path) {
            Ok(()) => report.removed.push(path.to_path_buf()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => report.failed.push((path.to_path_buf(), e)),
        }
    }
    report
}
