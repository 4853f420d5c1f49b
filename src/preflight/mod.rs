//! Preflight checks for a package build.
//!
//! Validates privileges, kernel support, host tools and the root layout
//! before anything is mounted. Run with `pkgbuild preflight`.

mod environment;
mod host_tools;
mod types;

use anyhow::{bail, Result};
use std::path::Path;

use crate::config::Config;

pub use types::{CheckResult, CheckStatus, PreflightReport};

/// Run all preflight checks.
pub fn run_preflight(config: &Config, rootdir: Option<&Path>) -> PreflightReport {
    let mut checks = Vec::new();

    println!("Running preflight checks...\n");

    checks.push(environment::check_privileges());
    checks.push(environment::check_kernel());
    checks.extend(host_tools::check_host_tools());
    checks.extend(environment::check_rootdir(rootdir));
    checks.extend(environment::check_scratch(&config.scratch(), rootdir));

    PreflightReport { checks }
}

/// Run preflight and bail if any checks fail.
pub fn run_preflight_or_fail(config: &Config, rootdir: Option<&Path>) -> Result<()> {
    let report = run_preflight(config, rootdir);
    report.print();

    if !report.all_passed() {
        bail!(
            "Preflight failed: {} check(s) failed. Fix the issues above before building.",
            report.fail_count()
        );
    }

    println!("All preflight checks passed!\n");
    Ok(())
}
