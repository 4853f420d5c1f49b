//! Shared test utilities for pkgbuild tests.
//!
//! Builds run against a temporary root with a recording mounter and a
//! scripted command runner, so no privileges or network are needed. The
//! mounter never actually stacks an overlay, which means the merged view
//! and the base root are the same directory here; the runner stands in for
//! the overlay by dropping compiled packages into the upper layer.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;

use pkgbuild::build::{
    BuildReport, BuildRequest, BuildSettings, CommandRunner, ExternalCommand, Orchestrator,
};
use pkgbuild::error::{BuildError, Result};
use pkgbuild::overlay::{Mounter, OverlayManager, OverlaySpec, ScratchDirs, UnmountMode};

/// Package file the scripted compile step produces.
pub const BUILT_DEB: &str = "stress_1.0.4-6_amd64.deb";

/// Ordered log of mount operations and commands.
pub type EventLog = Rc<RefCell<Vec<String>>>;

/// Test environment with a temporary root and scratch directory.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    /// Mock root filesystem
    pub rootfs: PathBuf,
    /// Parent of upper/ and work/
    pub scratch_dir: PathBuf,
    /// Base directory for recipes, patches and kept packages
    pub base_dir: PathBuf,
    pub events: EventLog,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base = temp_dir.path().to_path_buf();

        let rootfs = base.join("rootfs");
        fs::create_dir_all(rootfs.join("etc/apt")).expect("Failed to create rootfs");
        fs::write(
            rootfs.join("etc/apt/sources.list"),
            "deb https://deb.debian.org/debian buster main\n",
        )
        .expect("Failed to create sources.list");

        Self {
            _temp_dir: temp_dir,
            rootfs,
            scratch_dir: base.join("scratch"),
            base_dir: base,
            events: EventLog::default(),
        }
    }

    pub fn scratch(&self) -> ScratchDirs {
        ScratchDirs::under(&self.scratch_dir)
    }

    pub fn manager(&self, mounter: RecordingMounter) -> OverlayManager {
        OverlayManager::new(self.scratch(), Box::new(mounter))
    }

    pub fn mounter(&self) -> RecordingMounter {
        RecordingMounter::new(self.events.clone())
    }

    /// Runner that succeeds at everything and produces [`BUILT_DEB`].
    pub fn runner(&self) -> ScriptedRunner {
        let scratch = self.scratch();
        ScriptedRunner::new(self.events.clone(), &scratch, &self.rootfs)
    }

    pub fn request(&self, package: &str, patch: Option<PathBuf>) -> BuildRequest {
        BuildRequest::new(package, patch, &self.rootfs).expect("valid request")
    }

    /// Run a complete build and hand back both the result and the report.
    pub fn build(
        &self,
        mounter: RecordingMounter,
        runner: &ScriptedRunner,
        settings: BuildSettings,
        request: &BuildRequest,
    ) -> (Result<()>, BuildReport) {
        let manager = self.manager(mounter);
        let orchestrator = Orchestrator::new(&manager, runner, settings);
        let mut report = BuildReport::new(request);
        let result = orchestrator.execute(request, &mut report);
        (result, report)
    }

    /// Write a patch file next to the root and return its path.
    pub fn write_patch(&self, name: &str) -> PathBuf {
        let path = self.base_dir.join("patches").join(name);
        fs::create_dir_all(path.parent().expect("patch has a parent")).expect("mkdir patches");
        fs::write(&path, "--- a/stress.c\n+++ b/stress.c\n").expect("write patch");
        path
    }

    pub fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events.borrow().iter().filter(|e| *e == event).count()
    }

    /// Index of the first event equal to `event`.
    pub fn position(&self, event: &str) -> Option<usize> {
        self.events.borrow().iter().position(|e| e == event)
    }
}

/// Mounter that logs `mount` and `unmount` without touching the kernel.
#[derive(Clone)]
pub struct RecordingMounter {
    events: EventLog,
    pub fail_mount: bool,
    pub fail_unmount: bool,
    pub already_mounted: bool,
}

impl RecordingMounter {
    pub fn new(events: EventLog) -> Self {
        Self {
            events,
            fail_mount: false,
            fail_unmount: false,
            already_mounted: false,
        }
    }

    pub fn failing_mount(mut self) -> Self {
        self.fail_mount = true;
        self
    }

    pub fn failing_unmount(mut self) -> Self {
        self.fail_unmount = true;
        self
    }

    /// Report an overlay as already sitting on the root.
    pub fn already_mounted(mut self) -> Self {
        self.already_mounted = true;
        self
    }
}

impl Mounter for RecordingMounter {
    fn mount(&self, _spec: &OverlaySpec) -> nix::Result<()> {
        self.events.borrow_mut().push("mount".into());
        if self.fail_mount {
            return Err(nix::Error::EPERM);
        }
        Ok(())
    }

    fn unmount(&self, _target: &Path, mode: UnmountMode) -> nix::Result<()> {
        self.events.borrow_mut().push(format!("unmount:{:?}", mode));
        if self.fail_unmount {
            return Err(nix::Error::EBUSY);
        }
        Ok(())
    }

    fn overlay_mounted(&self, _target: &Path) -> std::io::Result<bool> {
        Ok(self.already_mounted)
    }
}

/// Command runner that logs each tag as `run:<tag>` and can fail chosen tags.
///
/// `compile` writes [`BUILT_DEB`] into the upper layer. `install` logs
/// `install-saw-deb` when the package is present in the base root.
pub struct ScriptedRunner {
    events: EventLog,
    upper: PathBuf,
    work: PathBuf,
    jam_teardown_on: Option<String>,
    rootfs: PathBuf,
    failing: HashSet<String>,
    produce: bool,
    pub commands: RefCell<Vec<ExternalCommand>>,
}

impl ScriptedRunner {
    pub fn new(events: EventLog, scratch: &ScratchDirs, rootfs: &Path) -> Self {
        Self {
            events,
            upper: scratch.upper().to_path_buf(),
            work: scratch.work().to_path_buf(),
            jam_teardown_on: None,
            rootfs: rootfs.to_path_buf(),
            failing: HashSet::new(),
            produce: true,
            commands: RefCell::new(Vec::new()),
        }
    }

    pub fn failing(mut self, tag: &str) -> Self {
        self.failing.insert(tag.to_string());
        self
    }

    /// While running `tag`, replace the work directory with a regular file
    /// so the later scratch teardown fails.
    pub fn jamming_teardown_on(mut self, tag: &str) -> Self {
        self.jam_teardown_on = Some(tag.to_string());
        self
    }

    pub fn producing_nothing(mut self) -> Self {
        self.produce = false;
        self
    }

    pub fn command(&self, tag: &str) -> Option<ExternalCommand> {
        self.commands
            .borrow()
            .iter()
            .find(|c| c.tag() == tag)
            .cloned()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, cmd: &ExternalCommand) -> Result<()> {
        self.events.borrow_mut().push(format!("run:{}", cmd.tag()));
        self.commands.borrow_mut().push(cmd.clone());

        if self.jam_teardown_on.as_deref() == Some(cmd.tag()) {
            fs::remove_dir_all(&self.work).expect("remove work dir");
            fs::write(&self.work, b"in the way").expect("replace work dir");
        }

        if self.failing.contains(cmd.tag()) {
            return Err(BuildError::ExternalCommand {
                tag: cmd.tag().to_string(),
                program: cmd.program().to_string(),
                reason: "exit status: 100".into(),
            });
        }

        match cmd.tag() {
            "compile" if self.produce => {
                fs::write(self.upper.join(BUILT_DEB), b"!<arch>\ndebian-binary\n")
                    .expect("write built package");
            }
            "install" if self.rootfs.join(BUILT_DEB).is_file() => {
                self.events.borrow_mut().push("install-saw-deb".into());
            }
            _ => {}
        }
        Ok(())
    }
}

/// `*.deb` files directly under `dir`.
pub fn debs_in(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut found: Vec<String> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".deb"))
        .collect();
    found.sort();
    found
}

/// Assert that a file contains expected content.
pub fn assert_file_contains(path: &Path, expected: &str) {
    let content = fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("Failed to read file {}: {}", path.display(), e));
    assert!(
        content.contains(expected),
        "File {} does not contain expected content.\nExpected to find: {}\nActual content: {}",
        path.display(),
        expected,
        content
    );
}
