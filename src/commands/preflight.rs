//! Preflight command - runs preflight checks.

use anyhow::Result;
use std::path::Path;

use pkgbuild::config::Config;
use pkgbuild::preflight;

/// Execute the preflight command.
pub fn cmd_preflight(config: &Config, rootdir: Option<&Path>, strict: bool) -> Result<()> {
    if strict {
        preflight::run_preflight_or_fail(config, rootdir)?;
    } else {
        let report = preflight::run_preflight(config, rootdir);
        report.print();
        if !report.all_passed() {
            println!("Some checks failed. Use --strict to fail the build.");
        }
    }
    Ok(())
}
