//! Host-side scratch directories backing the overlay's upper and work layers.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{BuildError, Result};

/// Upper and work directories for one overlay.
///
/// Both live under a single scratch root so they share a filesystem,
/// which overlayfs requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchDirs {
    root: PathBuf,
    upper: PathBuf,
    work: PathBuf,
}

impl ScratchDirs {
    /// Scratch layout under `root`: `root/upper` and `root/work`.
    pub fn under(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            upper: root.join("upper"),
            work: root.join("work"),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn upper(&self) -> &Path {
        &self.upper
    }

    pub fn work(&self) -> &Path {
        &self.work
    }

    /// Ensure both directories exist and are empty.
    ///
    /// Safe to call repeatedly. Leftovers from an interrupted run are
    /// cleared so the next overlay starts from a fresh upper layer.
    pub fn prepare(&self) -> Result<()> {
        for dir in [&self.upper, &self.work] {
            ensure_fresh_dir(dir).map_err(|source| BuildError::ScratchSetup {
                path: dir.clone(),
                source,
            })?;
        }
        debug!(upper = %self.upper.display(), work = %self.work.display(), "scratch directories ready");
        Ok(())
    }

    /// Remove both directories recursively.
    ///
    /// Both removals are attempted; the first failure is returned.
    /// Directories that are already gone are not an error.
    pub fn teardown(&self) -> Result<()> {
        let mut first_err = None;
        for dir in [&self.upper, &self.work] {
            if let Err(source) = remove_dir_if_present(dir) {
                warn!(path = %dir.display(), error = %source, "failed to remove scratch directory");
                first_err.get_or_insert(BuildError::Cleanup {
                    path: dir.clone(),
                    source,
                });
            }
        }
        if let Some(err) = first_err {
            return Err(err);
        }

        // Only succeeds when nothing else was left behind in the root.
        if let Err(e) = fs::remove_dir(&self.root) {
            debug!(path = %self.root.display(), error = %e, "scratch root kept");
        }
        Ok(())
    }

    /// True if either directory still exists on the host.
    pub fn any_present(&self) -> bool {
        self.upper.exists() || self.work.exists()
    }
}

fn ensure_fresh_dir(dir: &Path) -> io::Result<()> {
    match fs::create_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && dir.is_dir() => {}
        Err(e) => return Err(e),
    }

    let mut stale = 0usize;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() && !path.is_symlink() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
        stale += 1;
    }
    if stale > 0 {
        warn!(path = %dir.display(), entries = stale, "cleared stale scratch contents");
    }
    Ok(())
}

fn remove_dir_if_present(dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(dir) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_prepare_creates_both_dirs() {
        let temp = TempDir::new().unwrap();
        let scratch = ScratchDirs::under(temp.path().join("scratch"));

        scratch.prepare().unwrap();

        assert!(scratch.upper().is_dir());
        assert!(scratch.work().is_dir());
    }

    #[test]
    fn test_prepare_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let scratch = ScratchDirs::under(temp.path().join("scratch"));

        scratch.prepare().unwrap();
        scratch.prepare().unwrap();

        let entries: Vec<_> = fs::read_dir(scratch.root())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_prepare_clears_stale_upper() {
        let temp = TempDir::new().unwrap();
        let scratch = ScratchDirs::under(temp.path());
        fs::create_dir_all(scratch.upper().join("stress-1.0.4")).unwrap();
        fs::write(scratch.upper().join("old.deb"), b"stale").unwrap();

        scratch.prepare().unwrap();

        assert_eq!(fs::read_dir(scratch.upper()).unwrap().count(), 0);
    }

    #[test]
    fn test_prepare_fails_when_path_is_a_file() {
        let temp = TempDir::new().unwrap();
        let scratch = ScratchDirs::under(temp.path());
        fs::write(scratch.upper(), b"not a dir").unwrap();

        let err = scratch.prepare().unwrap_err();
        assert!(matches!(err, BuildError::ScratchSetup { .. }));
    }

    #[test]
    fn test_teardown_removes_everything() {
        let temp = TempDir::new().unwrap();
        let scratch = ScratchDirs::under(temp.path().join("scratch"));
        scratch.prepare().unwrap();
        fs::write(scratch.upper().join("stress_1.0.4_amd64.deb"), b"deb").unwrap();

        scratch.teardown().unwrap();

        assert!(!scratch.any_present());
        assert!(!scratch.root().exists());
    }

    #[test]
    fn test_teardown_failure_is_cleanup_error() {
        let temp = TempDir::new().unwrap();
        let scratch = ScratchDirs::under(temp.path().join("scratch"));
        scratch.prepare().unwrap();
        fs::remove_dir(scratch.work()).unwrap();
        fs::write(scratch.work(), b"not a dir").unwrap();

        let err = scratch.teardown().unwrap_err();

        match err {
            BuildError::Cleanup { ref path, .. } => assert_eq!(path, scratch.work()),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!scratch.upper().exists());
    }

    #[test]
    fn test_teardown_without_prepare_is_ok() {
        let temp = TempDir::new().unwrap();
        let scratch = ScratchDirs::under(temp.path().join("never-created"));
        scratch.teardown().unwrap();
    }
}
