//! Build a Debian source package inside an overlay of the target root.
//!
//! [`Orchestrator::run_build`] owns the whole lifecycle:
//!
//! 0. refuse a missing root or one that already carries an overlay
//! 1. add a `deb-src` line to the root's apt sources
//! 2. refresh indexes, install the packaging toolchain and build-deps
//! 3. export `DEB_BUILD_OPTIONS` for every later command
//! 4. fetch the source tree
//! 5. copy in and apply the patch, if any
//! 6. compile to binary packages
//! 7. copy `*.deb` from the upper layer into the base root, install them,
//!    fix up dependencies, drop the copies (always runs)
//! 8. detach-unmount and remove scratch directories (always runs)
//!
//! Steps 2 to 4 tolerate command failures. Patch and compile failures stop the
//! sequence but never skip 7 and 8.

mod artifacts;
pub mod command;
mod patch;
pub mod report;

pub use artifacts::{discover_artifacts, ARTIFACT_EXTENSION};
pub use command::{ChrootRunner, CommandRunner, ExternalCommand, Policy};
pub use report::{ArtifactRecord, BuildReport, StepOutcome, StepRecord};

use regex::Regex;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::error::{BuildError, Result};
use crate::overlay::{OverlayHandle, OverlayManager};
use crate::timing::Timer;

/// Default source repository appended to the root's apt sources.
pub const DEFAULT_DEB_SRC: &str = "deb-src https://deb.debian.org/debian buster main";

/// Default `DEB_BUILD_OPTIONS`: no automatic -dbgsym packages.
pub const DEFAULT_BUILD_OPTIONS: &str = "noautodbgsym";

/// Packaging helpers installed before build-deps.
pub const TOOLCHAIN_PACKAGES: &[&str] = &["dpkg-dev", "debhelper"];

const SOURCES_LIST: &str = "etc/apt/sources.list";

/// Debian source package name: lowercase alphanumerics plus `+ - .`,
/// at least two characters, starting with an alphanumeric.
const PACKAGE_NAME_PATTERN: &str = r"^[a-z0-9][a-z0-9+.\-]+$";

/// What to build and where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildRequest {
    package: String,
    patch: Option<PathBuf>,
    rootdir: PathBuf,
}

impl BuildRequest {
    /// Validate and build a request. An empty patch path means no patch.
    pub fn new(
        package: impl Into<String>,
        patch: Option<PathBuf>,
        rootdir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let package = package.into();
        let rootdir = rootdir.into();

        if package.is_empty() {
            return Err(BuildError::InvalidRequest("package name is empty".into()));
        }
        static PACKAGE_NAME: OnceLock<Option<Regex>> = OnceLock::new();
        let pattern = PACKAGE_NAME
            .get_or_init(|| Regex::new(PACKAGE_NAME_PATTERN).ok())
            .as_ref()
            .ok_or_else(|| BuildError::InvalidRequest("package name pattern".into()))?;
        if !pattern.is_match(&package) {
            return Err(BuildError::InvalidRequest(format!(
                "'{}' is not a valid source package name",
                package
            )));
        }

        if rootdir.as_os_str().is_empty() {
            return Err(BuildError::InvalidRequest("root directory is empty".into()));
        }

        let patch = patch.filter(|p| !p.as_os_str().is_empty());
        if let Some(ref p) = patch {
            if p.file_name().is_none() {
                return Err(BuildError::InvalidRequest(format!(
                    "patch path '{}' has no file name",
                    p.display()
                )));
            }
        }

        Ok(Self {
            package,
            patch,
            rootdir,
        })
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn patch(&self) -> Option<&Path> {
        self.patch.as_deref()
    }

    pub fn rootdir(&self) -> &Path {
        &self.rootdir
    }
}

/// Knobs the orchestrator takes from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSettings {
    /// Line appended to `etc/apt/sources.list`.
    pub deb_src: String,
    /// Value of `DEB_BUILD_OPTIONS` for fetch, patch and compile.
    pub build_options: String,
    /// Host directory that keeps a copy of every built package.
    pub artifact_dir: Option<PathBuf>,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            deb_src: DEFAULT_DEB_SRC.to_string(),
            build_options: DEFAULT_BUILD_OPTIONS.to_string(),
            artifact_dir: None,
        }
    }
}

/// Sequences the build commands around an overlay lifecycle.
///
/// Assumes it is the only build running against the request's root.
pub struct Orchestrator<'a> {
    overlay: &'a OverlayManager,
    runner: &'a dyn CommandRunner,
    settings: BuildSettings,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        overlay: &'a OverlayManager,
        runner: &'a dyn CommandRunner,
        settings: BuildSettings,
    ) -> Self {
        Self {
            overlay,
            runner,
            settings,
        }
    }

    /// Run the whole build step and return its report.
    pub fn run_build(&self, request: &BuildRequest) -> Result<BuildReport> {
        let mut report = BuildReport::new(request);
        self.execute(request, &mut report)?;
        Ok(report)
    }

    /// Like [`run_build`](Self::run_build), but the caller keeps the report
    /// even when the build fails.
    pub fn execute(&self, request: &BuildRequest, report: &mut BuildReport) -> Result<()> {
        let timer = Timer::start(&format!("build {}", request.package()));
        let result = self.lifecycle(request, report);
        match &result {
            Ok(()) => {
                info!(
                    package = request.package(),
                    artifacts = report.artifacts.len(),
                    tolerated = report.tolerated_failures(),
                    "package build finished"
                );
            }
            Err(e) => {
                warn!(package = request.package(), error = %e, "package build failed");
                report.error = Some(e.to_string());
            }
        }
        timer.finish();
        result
    }

    fn lifecycle(&self, request: &BuildRequest, report: &mut BuildReport) -> Result<()> {
        info!(package = request.package(), rootdir = %request.rootdir().display(), "starting package build");

        self.overlay.check_lower(request.rootdir())?;
        self.overlay.prepare()?;
        let handle = self.overlay.mount(request.rootdir())?;

        let mut session = Session {
            runner: self.runner,
            settings: &self.settings,
            handle: &handle,
            report,
            env: vec![("DEBIAN_FRONTEND".into(), "noninteractive".into())],
        };
        let built = session.build(request);
        let reinstalled = artifacts::reinstall(&mut session);

        let released = handle.release();
        settle(built, [reinstalled, released])
    }
}

/// First fatal cause wins; anything that failed afterwards is only logged.
fn settle<const N: usize>(built: Result<()>, cleanup: [Result<()>; N]) -> Result<()> {
    let mut outcome = built;
    for result in cleanup {
        if let Err(e) = result {
            if outcome.is_ok() {
                outcome = Err(e);
            } else {
                warn!(error = %e, "cleanup after failed build also failed");
            }
        }
    }
    outcome
}

/// State shared by the steps of one build.
pub(crate) struct Session<'s, 'm> {
    runner: &'s dyn CommandRunner,
    settings: &'s BuildSettings,
    handle: &'s OverlayHandle<'m>,
    report: &'s mut BuildReport,
    env: Vec<(String, String)>,
}

impl Session<'_, '_> {
    fn build(&mut self, request: &BuildRequest) -> Result<()> {
        let package = request.package();

        self.add_source_repository()?;

        self.step(self.chroot("apt-update", ["apt-get", "update"]), Policy::Tolerated)?;
        let mut toolchain = vec!["apt-get", "-y", "install"];
        toolchain.extend_from_slice(TOOLCHAIN_PACKAGES);
        self.step(self.chroot("toolchain", toolchain), Policy::Tolerated)?;
        self.step(
            self.chroot("build-dep", ["apt-get", "-y", "build-dep", package]),
            Policy::Tolerated,
        )?;

        self.env
            .push(("DEB_BUILD_OPTIONS".into(), self.settings.build_options.clone()));

        self.step(
            self.chroot("source", ["apt-get", "source", package]),
            Policy::Tolerated,
        )?;

        if let Some(patch) = request.patch() {
            patch::apply(self, patch)?;
        }

        self.step(
            self.chroot("compile", ["apt-get", "-y", "--compile", "source", package]),
            Policy::Fatal,
        )
    }

    /// Append the `deb-src` line. Repeated runs append it again.
    fn add_source_repository(&self) -> Result<()> {
        let path = self.handle.merged().join(SOURCES_LIST);
        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut file = OpenOptions::new().append(true).create(true).open(&path)?;
            writeln!(file, "{}", self.settings.deb_src)
        };
        write().map_err(|source| BuildError::SourceConfig {
            path: path.clone(),
            source,
        })?;
        info!(line = %self.settings.deb_src, "added source repository");
        Ok(())
    }

    fn chroot<I, S>(&self, tag: &str, argv: I) -> ExternalCommand
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ExternalCommand::chroot(tag, self.handle.merged(), argv).with_env(&self.env)
    }

    /// Run one command under `policy` and record the outcome.
    fn step(&mut self, cmd: ExternalCommand, policy: Policy) -> Result<()> {
        info!(tag = cmd.tag(), "{}", cmd.argv().join(" "));
        match (self.runner.run(&cmd), policy) {
            (Ok(()), _) => {
                self.report.record(&cmd, policy, StepOutcome::Succeeded);
                Ok(())
            }
            (Err(e), Policy::Tolerated) => {
                warn!(tag = cmd.tag(), error = %e, "command failed, continuing");
                let reason = e.to_string();
                self.report
                    .record(&cmd, policy, StepOutcome::Tolerated { reason });
                Ok(())
            }
            (Err(e), Policy::Fatal) => {
                let reason = e.to_string();
                self.report.record(&cmd, policy, StepOutcome::Failed { reason });
                Err(e)
            }
        }
    }
}
