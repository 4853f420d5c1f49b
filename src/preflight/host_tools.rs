//! Host tool availability checks.

use crate::process;

use super::types::CheckResult;

/// Tools the build step runs on the host, with package hints.
const REQUIRED_TOOLS: &[(&str, &str, &str)] = &[
    ("chroot", "coreutils", "Required to run build commands inside the root"),
    ("sh", "dash", "Required by maintainer scripts during package install"),
];

/// Check host tools are installed.
pub fn check_host_tools() -> Vec<CheckResult> {
    REQUIRED_TOOLS
        .iter()
        .map(|(tool, package, purpose)| check_tool_exists(tool, package, purpose))
        .collect()
}

fn check_tool_exists(tool: &str, package: &str, purpose: &str) -> CheckResult {
    match process::which(tool) {
        Some(path) => CheckResult::pass_with(tool, &path.display().to_string()),
        None => CheckResult::fail(
            tool,
            &format!("Not found. Install '{}' package. {}", package, purpose),
        ),
    }
}
