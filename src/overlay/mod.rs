//! Copy-on-write overlay over a build root.
//!
//! The root directory is mounted over itself as the overlay's lower layer,
//! so tools chrooted into it see the normal tree while every write lands in
//! a throwaway upper layer on the host.
//!
//! Lifecycle:
//!
//! ```text
//! OverlayManager::prepare()      create upper/ and work/
//!        │
//! OverlayManager::mount(root) ──► OverlayHandle
//!        │                          ├── base_view()   pre-mount view of root
//!        │                          ├── unmount()     MNT_DETACH, once
//!        │                          └── teardown()    rm -r upper/ work/, once
//!        ▼
//! OverlayHandle::release()       unmount, then teardown
//! ```
//!
//! A handle dropped without `release()` cleans up on its own, so a panic
//! mid-build still leaves no mount behind.

mod mount;
mod scratch;

pub use mount::{mountinfo_has_overlay, overlay_mounted_at, KernelMounter, Mounter, UnmountMode};
pub use scratch::ScratchDirs;

use std::fs::{self, File};
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{BuildError, Result};

/// Layers of one overlay mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlaySpec {
    lower: PathBuf,
    upper: PathBuf,
    work: PathBuf,
}

impl OverlaySpec {
    pub fn new(lower: impl Into<PathBuf>, scratch: &ScratchDirs) -> Self {
        Self {
            lower: lower.into(),
            upper: scratch.upper().to_path_buf(),
            work: scratch.work().to_path_buf(),
        }
    }

    /// Base root; also the mount point.
    pub fn lower(&self) -> &Path {
        &self.lower
    }

    pub fn upper(&self) -> &Path {
        &self.upper
    }

    pub fn work(&self) -> &Path {
        &self.work
    }

    /// Mount data string for the overlay filesystem.
    pub fn options(&self) -> String {
        format!(
            "lowerdir={},upperdir={},workdir={}",
            self.lower.display(),
            self.upper.display(),
            self.work.display()
        )
    }

    fn check_paths(&self) -> Result<()> {
        for path in [&self.lower, &self.upper, &self.work] {
            let text = path.to_string_lossy();
            if text.contains(',') || text.contains(':') {
                return Err(BuildError::InvalidRequest(format!(
                    "overlay path '{}' must not contain ',' or ':'",
                    text
                )));
            }
        }
        Ok(())
    }
}

/// Owns the scratch layout and the mount boundary.
pub struct OverlayManager {
    scratch: ScratchDirs,
    mounter: Box<dyn Mounter>,
}

impl OverlayManager {
    pub fn new(scratch: ScratchDirs, mounter: Box<dyn Mounter>) -> Self {
        Self { scratch, mounter }
    }

    /// Manager that mounts through the running kernel.
    pub fn kernel(scratch: ScratchDirs) -> Self {
        Self::new(scratch, Box::new(KernelMounter))
    }

    pub fn scratch(&self) -> &ScratchDirs {
        &self.scratch
    }

    pub fn spec_for(&self, lower: &Path) -> OverlaySpec {
        OverlaySpec::new(lower, &self.scratch)
    }

    /// Check that `lower` can take an overlay without touching anything.
    ///
    /// Fails when the root is missing, not a directory, or already has an
    /// overlay on it. A root with a live overlay must not be prepared, since
    /// that would wipe the mounted upper layer.
    pub fn check_lower(&self, lower: &Path) -> Result<()> {
        self.spec_for(lower).check_paths()?;
        check_root_dir(lower).map_err(|source| BuildError::RootUnavailable {
            path: lower.to_path_buf(),
            source,
        })?;
        match self.mounter.overlay_mounted(lower) {
            Ok(false) => Ok(()),
            Ok(true) => Err(BuildError::AlreadyMounted {
                target: lower.to_path_buf(),
            }),
            Err(e) => {
                warn!(target = %lower.display(), error = %e, "cannot inspect mounts, continuing");
                Ok(())
            }
        }
    }

    /// Ensure the upper and work directories exist. Idempotent.
    pub fn prepare(&self) -> Result<()> {
        self.scratch.prepare()
    }

    /// Mount the overlay over `lower`.
    ///
    /// On failure nothing was mounted and nothing needs releasing.
    pub fn mount(&self, lower: &Path) -> Result<OverlayHandle<'_>> {
        let spec = self.spec_for(lower);
        spec.check_paths()?;

        let base = open_base_root(lower).map_err(|source| BuildError::RootUnavailable {
            path: lower.to_path_buf(),
            source,
        })?;

        self.mounter
            .mount(&spec)
            .map_err(|source| BuildError::Mount {
                target: lower.to_path_buf(),
                source,
            })?;
        info!(target = %lower.display(), options = %spec.options(), "overlay mounted");

        Ok(OverlayHandle {
            manager: self,
            spec,
            base,
            mounted: true,
            scratch_live: true,
        })
    }
}

/// Open the root before mounting so the descriptor keeps pointing at the
/// underlying directory rather than the overlay stacked on top of it.
fn open_base_root(lower: &Path) -> io::Result<File> {
    check_root_dir(lower)?;
    File::open(lower)
}

fn check_root_dir(lower: &Path) -> io::Result<()> {
    if fs::metadata(lower)?.is_dir() {
        Ok(())
    } else {
        Err(io::Error::other("not a directory"))
    }
}

/// A mounted overlay, exclusively owned by one build.
pub struct OverlayHandle<'m> {
    manager: &'m OverlayManager,
    spec: OverlaySpec,
    base: File,
    mounted: bool,
    scratch_live: bool,
}

impl OverlayHandle<'_> {
    pub fn spec(&self) -> &OverlaySpec {
        &self.spec
    }

    /// The merged tree, as build commands see it.
    pub fn merged(&self) -> &Path {
        self.spec.lower()
    }

    pub fn upper(&self) -> &Path {
        self.spec.upper()
    }

    /// Path into the root as it was before the overlay was mounted.
    ///
    /// Files written here land on the real root filesystem and survive
    /// the unmount.
    pub fn base_view(&self) -> PathBuf {
        PathBuf::from(format!("/proc/self/fd/{}", self.base.as_raw_fd()))
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Lazily unmount the overlay. Only the first call does anything.
    pub fn unmount(&mut self) -> Result<()> {
        if !self.mounted {
            return Ok(());
        }
        self.mounted = false;

        let target = self.spec.lower();
        self.manager
            .mounter
            .unmount(target, UnmountMode::Detach)
            .map_err(|source| BuildError::Unmount {
                target: target.to_path_buf(),
                source,
            })?;
        info!(target = %target.display(), "overlay unmounted");
        Ok(())
    }

    /// Remove the scratch directories. Only the first call does anything.
    pub fn teardown(&mut self) -> Result<()> {
        if !self.scratch_live {
            return Ok(());
        }
        self.scratch_live = false;
        self.manager.scratch.teardown()
    }

    /// Unmount then tear down.
    ///
    /// An unmount failure is logged and does not stop the scratch removal;
    /// the teardown result is what gets returned.
    pub fn release(mut self) -> Result<()> {
        if let Err(e) = self.unmount() {
            warn!(error = %e, "unmount failed, removing scratch directories anyway");
        }
        self.teardown()
    }
}

impl Drop for OverlayHandle<'_> {
    fn drop(&mut self) {
        if !self.mounted && !self.scratch_live {
            return;
        }
        warn!(target = %self.spec.lower().display(), "overlay handle dropped without release");
        if let Err(e) = self.unmount() {
            warn!(error = %e, "unmount during drop failed");
        }
        if let Err(e) = self.teardown() {
            warn!(error = %e, "teardown during drop failed");
        }
    }
}
