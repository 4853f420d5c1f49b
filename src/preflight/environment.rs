//! Build environment checks: privileges, kernel support, root and scratch layout.

use nix::unistd::Uid;
use std::fs;
use std::path::Path;

use crate::overlay::{overlay_mounted_at, ScratchDirs};

use super::types::CheckResult;

/// Mounting and chrooting both need root.
pub fn check_privileges() -> CheckResult {
    let euid = Uid::effective();
    if euid.is_root() {
        CheckResult::pass("root privileges")
    } else {
        CheckResult::fail(
            "root privileges",
            &format!("running as uid {}; mount(2) and chroot(8) need root", euid),
        )
    }
}

/// Look for `overlay` in `/proc/filesystems` content.
pub fn check_overlay_support(filesystems: &str) -> CheckResult {
    let supported = filesystems
        .lines()
        .any(|line| line.split_whitespace().last() == Some("overlay"));
    if supported {
        CheckResult::pass("overlay filesystem")
    } else {
        CheckResult::warn(
            "overlay filesystem",
            "not listed in /proc/filesystems; it may still autoload (modprobe overlay)",
        )
    }
}

pub fn check_kernel() -> CheckResult {
    match fs::read_to_string("/proc/filesystems") {
        Ok(content) => check_overlay_support(&content),
        Err(e) => CheckResult::warn(
            "overlay filesystem",
            &format!("cannot read /proc/filesystems: {}", e),
        ),
    }
}

/// The root must be a Debian-style tree that is not already overlaid.
pub fn check_rootdir(rootdir: Option<&Path>) -> Vec<CheckResult> {
    let Some(root) = rootdir else {
        return vec![CheckResult::warn(
            "root directory",
            "not configured; set PKGBUILD_ROOTDIR or pass --rootdir",
        )];
    };

    if !root.is_dir() {
        return vec![CheckResult::fail(
            "root directory",
            &format!("{} does not exist or is not a directory", root.display()),
        )];
    }

    let mut results = vec![CheckResult::pass_with(
        "root directory",
        &root.display().to_string(),
    )];

    if root.join("etc/apt").is_dir() {
        results.push(CheckResult::pass("apt configuration"));
    } else {
        results.push(CheckResult::fail(
            "apt configuration",
            &format!("{}/etc/apt missing; not a Debian root?", root.display()),
        ));
    }

    match overlay_mounted_at(root) {
        Ok(false) => results.push(CheckResult::pass("no stale overlay")),
        Ok(true) => results.push(CheckResult::fail(
            "no stale overlay",
            "an overlay is already mounted on the root; run `pkgbuild clean`",
        )),
        Err(e) => results.push(CheckResult::warn(
            "no stale overlay",
            &format!("cannot inspect mounts: {}", e),
        )),
    }

    results
}

/// Scratch layers must live outside the root and should not hold leftovers.
pub fn check_scratch(scratch: &ScratchDirs, rootdir: Option<&Path>) -> Vec<CheckResult> {
    let mut results = Vec::new();

    if let Some(root) = rootdir {
        if scratch.root().starts_with(root) {
            results.push(CheckResult::fail(
                "scratch location",
                &format!(
                    "{} is inside the root {}; overlay layers must not overlap",
                    scratch.root().display(),
                    root.display()
                ),
            ));
            return results;
        }
    }
    results.push(CheckResult::pass_with(
        "scratch location",
        &scratch.root().display().to_string(),
    ));

    if scratch.any_present() {
        results.push(CheckResult::warn(
            "scratch leftovers",
            "upper/work exist from a previous run; they will be cleared",
        ));
    }

    results
}
