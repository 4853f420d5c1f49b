//! Kernel mount boundary.
//!
//! [`Mounter`] is the only place the overlay manager touches mount(2) and
//! umount2(2), so tests can substitute a recording double.

use nix::mount::{mount, umount2, MntFlags, MsFlags};
use std::fs;
use std::io;
use std::path::Path;

use super::OverlaySpec;

/// How to detach an overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmountMode {
    /// Plain umount; fails with EBUSY while anything still uses the tree.
    Immediate,
    /// Lazy unmount (`MNT_DETACH`). Succeeds even while busy.
    Detach,
}

/// Mount and unmount overlay filesystems.
pub trait Mounter {
    /// Mount `spec` as an overlay on `spec.lower()`.
    fn mount(&self, spec: &OverlaySpec) -> nix::Result<()>;

    /// Unmount whatever is mounted at `target`.
    fn unmount(&self, target: &Path, mode: UnmountMode) -> nix::Result<()>;

    /// Whether an overlay is already mounted at `target`.
    fn overlay_mounted(&self, target: &Path) -> io::Result<bool>;
}

/// Mounter backed by the running kernel. Requires CAP_SYS_ADMIN.
#[derive(Debug, Default, Clone, Copy)]
pub struct KernelMounter;

impl Mounter for KernelMounter {
    fn mount(&self, spec: &OverlaySpec) -> nix::Result<()> {
        let options = spec.options();
        mount(
            Some("overlay"),
            spec.lower(),
            Some("overlay"),
            MsFlags::empty(),
            Some(options.as_str()),
        )
    }

    fn unmount(&self, target: &Path, mode: UnmountMode) -> nix::Result<()> {
        let flags = match mode {
            UnmountMode::Immediate => MntFlags::empty(),
            UnmountMode::Detach => MntFlags::MNT_DETACH,
        };
        umount2(target, flags)
    }

    fn overlay_mounted(&self, target: &Path) -> io::Result<bool> {
        overlay_mounted_at(target)
    }
}

/// Whether an overlay filesystem is currently mounted at `target`.
pub fn overlay_mounted_at(target: &Path) -> io::Result<bool> {
    let target = fs::canonicalize(target)?;
    let mountinfo = fs::read_to_string("/proc/self/mountinfo")?;
    Ok(mountinfo_has_overlay(&mountinfo, &target))
}

/// Scan `/proc/self/mountinfo` content for an overlay mounted at `target`.
pub fn mountinfo_has_overlay(mountinfo: &str, target: &Path) -> bool {
    let target = target.to_string_lossy();
    mountinfo.lines().any(|line| {
        let Some((left, right)) = line.split_once(" - ") else {
            return false;
        };
        let fstype = right.split(' ').next();
        let mount_point = left.split(' ').nth(4).map(unescape_mountinfo);
        fstype == Some("overlay") && mount_point.as_deref() == Some(target.as_ref())
    })
}

/// Undo the octal escapes (`\040` etc.) the kernel uses in mountinfo.
fn unescape_mountinfo(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|b| (b'0'..=b'7').contains(b)) {
                let value = digits.iter().fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
                if let Ok(value) = u8::try_from(value) {
                    out.push(value);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
