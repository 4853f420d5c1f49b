//! Build command - builds a source package inside an overlay of the root.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use pkgbuild::action::PackageBuildAction;
use pkgbuild::build::{BuildReport, BuildRequest, ChrootRunner, Orchestrator};
use pkgbuild::config::Config;
use pkgbuild::error::BuildError;
use pkgbuild::overlay::OverlayManager;

/// Execute the build command.
pub fn cmd_build(
    config: &Config,
    package: &str,
    patch: Option<PathBuf>,
    rootdir: &Path,
    report_path: Option<&Path>,
) -> Result<()> {
    let request = BuildRequest::new(package, patch, rootdir)?;
    let (report, result) = run_request(config, &request);
    if let Some(path) = report_path {
        write_reports(std::slice::from_ref(&report), path)?;
    }
    finish(&report, result)
}

/// Execute every pkg_build action in a YAML file, stopping at the first failure.
pub fn cmd_action(
    config: &Config,
    action_file: &Path,
    rootdir: &Path,
    report_path: Option<&Path>,
) -> Result<()> {
    let actions = PackageBuildAction::load(action_file)?;
    if actions.is_empty() {
        bail!("No pkg_build actions in '{}'", action_file.display());
    }
    let recipe_dir = action_file
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    let mut reports = Vec::new();
    let mut outcome = Ok(());
    for action in &actions {
        let request = action.to_request(rootdir, &recipe_dir)?;
        let (report, result) = run_request(config, &request);
        outcome = finish(&report, result);
        reports.push(report);
        if outcome.is_err() {
            break;
        }
    }

    if let Some(path) = report_path {
        write_reports(&reports, path)?;
    }
    outcome
}

fn run_request(config: &Config, request: &BuildRequest) -> (BuildReport, Result<(), BuildError>) {
    println!(
        "=== Building {} in {} ===\n",
        request.package(),
        request.rootdir().display()
    );

    let overlay = OverlayManager::kernel(config.scratch());
    let runner = ChrootRunner;
    let orchestrator = Orchestrator::new(&overlay, &runner, config.build_settings());

    let mut report = BuildReport::new(request);
    let result = orchestrator.execute(request, &mut report);
    (report, result)
}

fn finish(report: &BuildReport, result: Result<(), BuildError>) -> Result<()> {
    println!();
    for step in &report.steps {
        println!("  [{:?}] {:<10} {}", step.policy, step.tag, step.argv.join(" "));
    }
    if report.tolerated_failures() > 0 {
        println!(
            "  {} step(s) failed but were tolerated",
            report.tolerated_failures()
        );
    }
    for artifact in &report.artifacts {
        println!(
            "  built {} ({} bytes, sha256 {})",
            artifact.name, artifact.size, artifact.sha256
        );
    }
    if let Some(dir) = &report.preserved_in {
        println!("  packages kept in {}", dir.display());
    }

    match result {
        Ok(()) => {
            println!("\n=== {} built ===", report.package);
            Ok(())
        }
        Err(e) => {
            if e.is_cleanup_phase() {
                eprintln!(
                    "[WARN] Cleanup did not finish. Run `pkgbuild clean --rootdir {}`.",
                    report.rootdir.display()
                );
            }
            Err(e).with_context(|| format!("building '{}'", report.package))
        }
    }
}

fn write_reports(reports: &[BuildReport], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating '{}'", parent.display()))?;
        }
    }
    let json = if let [single] = reports {
        serde_json::to_string_pretty(single)?
    } else {
        serde_json::to_string_pretty(reports)?
    };
    fs::write(path, json).with_context(|| format!("writing report '{}'", path.display()))?;
    println!("Report written to {}", path.display());
    Ok(())
}
