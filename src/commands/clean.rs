//! Clean command - recovers from an interrupted build.
//!
//! A killed build can leave the overlay mounted on the root and the
//! scratch layers on the host. This detaches the former and removes the
//! latter.

use anyhow::{Context, Result};
use std::path::Path;

use pkgbuild::config::Config;
use pkgbuild::overlay::{KernelMounter, Mounter, UnmountMode};

/// Execute the clean command.
pub fn cmd_clean(config: &Config, rootdir: Option<&Path>) -> Result<()> {
    if let Some(root) = rootdir {
        let mounted = KernelMounter
            .overlay_mounted(root)
            .with_context(|| format!("inspecting mounts on '{}'", root.display()))?;
        if mounted {
            println!("Detaching overlay from {}...", root.display());
            KernelMounter
                .unmount(root, UnmountMode::Detach)
                .with_context(|| format!("unmounting overlay on '{}'", root.display()))?;
        } else {
            println!("No overlay mounted on {}.", root.display());
        }
    }

    let scratch = config.scratch();
    if scratch.any_present() {
        println!("Removing {}...", scratch.root().display());
        scratch.teardown()?;
        println!("Clean complete.");
    } else {
        println!("No scratch directories to clean.");
    }
    Ok(())
}
