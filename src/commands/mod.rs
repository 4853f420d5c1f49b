//! CLI command handlers.
//!
//! Each submodule handles a specific CLI command:
//! - `build` - Build a package (from flags or a pkg_build action file)
//! - `clean` - Recover from an interrupted build
//! - `preflight` - Run preflight checks
//! - `show` - Display configuration and state

pub mod build;
pub mod clean;
mod preflight;
pub mod show;

pub use build::{cmd_action, cmd_build};
pub use clean::cmd_clean;
pub use preflight::cmd_preflight;
pub use show::cmd_show;

use anyhow::{bail, Result};
use std::path::PathBuf;

use pkgbuild::config::Config;

/// `--rootdir` wins over PKGBUILD_ROOTDIR.
pub fn resolve_rootdir(cli: Option<PathBuf>, config: &Config) -> Result<PathBuf> {
    match cli.or_else(|| config.rootdir.clone()) {
        Some(root) => Ok(root),
        None => bail!("No root directory given. Pass --rootdir or set PKGBUILD_ROOTDIR."),
    }
}
