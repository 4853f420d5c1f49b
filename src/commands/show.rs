//! Show command - displays configuration and overlay state.

use anyhow::Result;
use std::path::Path;

use pkgbuild::build::discover_artifacts;
use pkgbuild::config::Config;
use pkgbuild::overlay::overlay_mounted_at;

/// Show target for the show command.
pub enum ShowTarget {
    /// Show configuration
    Config,
    /// Show mount and scratch state
    Status,
}

/// Execute the show command.
pub fn cmd_show(target: ShowTarget, config: &Config, rootdir: Option<&Path>) -> Result<()> {
    match target {
        ShowTarget::Config => config.print(),
        ShowTarget::Status => print_status(config, rootdir),
    }
    Ok(())
}

fn print_status(config: &Config, rootdir: Option<&Path>) {
    println!("Status:");
    match rootdir {
        Some(root) => match overlay_mounted_at(root) {
            Ok(true) => println!("  overlay on {}: MOUNTED", root.display()),
            Ok(false) => println!("  overlay on {}: not mounted", root.display()),
            Err(e) => println!("  overlay on {}: unknown ({})", root.display(), e),
        },
        None => println!("  overlay: no root directory configured"),
    }

    let scratch = config.scratch();
    for (label, dir) in [("upper", scratch.upper()), ("work", scratch.work())] {
        let state = if dir.exists() { "present" } else { "absent" };
        println!("  {}: {} ({})", label, dir.display(), state);
    }

    // Packages still sitting in the upper layer mean a build never released.
    // The next build clears them unless the overlay is still mounted.
    if let Ok(pending) = discover_artifacts(scratch.upper()) {
        for deb in pending {
            println!("  leftover package (cleared by next build): {}", deb.display());
        }
    }
}
