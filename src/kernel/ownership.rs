//! Recursive ownership changes for the ownership set.
//!
//! Semantics follow `chown -R` without `-L`: a symlink given as the root is
//! followed, symlinks below it are re-owned themselves and never traversed.

use crate::config::types::{EntrypointError, Result};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Counts from one recursive pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OwnershipReport {
    /// Entries visited, root included
    pub entries: u64,
    /// Entries whose owner or group was changed
    pub changed: u64,
}

/// Seam for the chown step so the hand-off can be exercised without root.
pub trait OwnershipFixer {
    fn chown_recursive(&self, path: &Path, uid: u32, gid: u32) -> Result<OwnershipReport>;

    /// Entries under `path` not owned by `uid:gid`.
    fn mismatched(&self, path: &Path, uid: u32, gid: u32) -> Result<Vec<PathBuf>>;
}

/// Real filesystem implementation
#[derive(Debug, Default, Clone, Copy)]
pub struct RecursiveChown;

fn ownership_error(path: &Path, source: std::io::Error) -> EntrypointError {
    EntrypointError::Ownership {
        path: path.to_path_buf(),
        source,
    }
}

fn walk(path: &Path) -> impl Iterator<Item = Result<walkdir::DirEntry>> + '_ {
    WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .map(move |entry| {
            entry.map_err(|e| {
                let at = e.path().unwrap_or(path).to_path_buf();
                ownership_error(&at, e.into())
            })
        })
}

impl OwnershipFixer for RecursiveChown {
    fn chown_recursive(&self, path: &Path, uid: u32, gid: u32) -> Result<OwnershipReport> {
        // chown -R fails on a missing operand; so do we.
        std::fs::metadata(path).map_err(|e| ownership_error(path, e))?;

        let mut report = OwnershipReport::default();
        for entry in walk(path) {
            let entry = entry?;
            let meta = entry
                .metadata()
                .map_err(|e| ownership_error(entry.path(), e.into()))?;
            report.entries += 1;

            if meta.uid() == uid && meta.gid() == gid {
                continue;
            }

            let changed = if entry.depth() == 0 {
                std::os::unix::fs::chown(entry.path(), Some(uid), Some(gid))
            } else {
                std::os::unix::fs::lchown(entry.path(), Some(uid), Some(gid))
            };
            changed.map_err(|e| ownership_error(entry.path(), e))?;
            report.changed += 1;
        }

        Ok(report)
    }

    fn mismatched(&self, path: &Path, uid: u32, gid: u32) -> Result<Vec<PathBuf>> {
        let mut wrong = Vec::new();
        for entry in walk(path) {
            let entry = entry?;
            let meta = entry
                .metadata()
                .map_err(|e| ownership_error(entry.path(), e.into()))?;
            if meta.uid() != uid || meta.gid() != gid {
                wrong.push(entry.into_path());
            }
        }
        Ok(wrong)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::{getgid, getuid};
    use std::fs;

    fn own_ids() -> (u32, u32) {
        (getuid().as_raw(), getgid().as_raw())
    }

    fn build_tree(root: &Path) {
        fs::create_dir_all(root.join("database/sessions")).unwrap();
        fs::write(root.join("database/database.db"), b"sqlite").unwrap();
        fs::write(root.join("database/sessions/s1"), b"").unwrap();
    }

    #[test]
    fn visits_every_entry_recursively() {
        let dir = tempfile::tempdir().unwrap();
        build_tree(dir.path());
        let (uid, gid) = own_ids();

        let report = RecursiveChown
            .chown_recursive(&dir.path().join("database"), uid, gid)
            .unwrap();

        // database, database.db, sessions, sessions/s1
        assert_eq!(report.entries, 4);
        assert_eq!(report.changed, 0);
        assert!(RecursiveChown
            .mismatched(&dir.path().join("database"), uid, gid)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (uid, gid) = own_ids();
        let err = RecursiveChown
            .chown_recursive(&dir.path().join("absent"), uid, gid)
            .unwrap_err();
        match err {
            EntrypointError::Ownership { path, .. } => assert!(path.ends_with("absent")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn nested_symlinks_are_not_traversed() {
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("secret"), b"").unwrap();

        let dir = tempfile::tempdir().unwrap();
        build_tree(dir.path());
        std::os::unix::fs::symlink(outside.path(), dir.path().join("database/escape")).unwrap();
        let (uid, gid) = own_ids();

        let report = RecursiveChown
            .chown_recursive(&dir.path().join("database"), uid, gid)
            .unwrap();
        // the link itself is visited, its target is not
        assert_eq!(report.entries, 5);
    }

    #[test]
    fn mismatches_are_reported_for_foreign_ids() {
        let dir = tempfile::tempdir().unwrap();
        build_tree(dir.path());
        let (uid, gid) = own_ids();

        let wrong = RecursiveChown
            .mismatched(&dir.path().join("database"), uid.wrapping_add(1), gid)
            .unwrap();
        assert_eq!(wrong.len(), 4);
    }
}
