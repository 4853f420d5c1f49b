//! External commands and the policy for their failures.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{BuildError, Result};
use crate::process::Cmd;

/// What a failing command means for the rest of the build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    /// Log, record and carry on. Used for index refreshes and dependency
    /// installs, where a partially stale mirror should not block the attempt.
    Tolerated,
    /// Abort the remaining build steps.
    Fatal,
}

/// One external program invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalCommand {
    tag: String,
    argv: Vec<String>,
    env: Vec<(String, String)>,
    chroot: Option<PathBuf>,
}

impl ExternalCommand {
    /// Command run directly on the host.
    pub fn host<I, S>(tag: &str, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tag: tag.to_string(),
            argv: argv.into_iter().map(Into::into).collect(),
            env: Vec::new(),
            chroot: None,
        }
    }

    /// Command run inside `root` as a chroot.
    pub fn chroot<I, S>(tag: &str, root: &Path, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            chroot: Some(root.to_path_buf()),
            ..Self::host(tag, argv)
        }
    }

    pub fn with_env(mut self, env: &[(String, String)]) -> Self {
        self.env.extend(env.iter().cloned());
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    pub fn chroot_dir(&self) -> Option<&Path> {
        self.chroot.as_deref()
    }

    /// Program name, or an empty string for an empty argv.
    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }
}

/// Executes external commands. Only pass/fail is observed.
pub trait CommandRunner {
    fn run(&self, cmd: &ExternalCommand) -> Result<()>;
}

/// Runs commands on the host, wrapping chrooted ones in `chroot(8)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChrootRunner;

impl CommandRunner for ChrootRunner {
    fn run(&self, cmd: &ExternalCommand) -> Result<()> {
        let Some((program, args)) = cmd.argv().split_first() else {
            return Err(BuildError::InvalidRequest(format!(
                "[{}] empty command line",
                cmd.tag()
            )));
        };

        let mut proc = match cmd.chroot_dir() {
            Some(root) => Cmd::new("chroot").arg_path(root).arg(program),
            None => Cmd::new(program),
        };
        proc = proc.args(args);
        for (key, value) in cmd.env() {
            proc = proc.env(key, value);
        }

        debug!(tag = cmd.tag(), argv = ?cmd.argv(), "running");
        let failed = |reason: String| BuildError::ExternalCommand {
            tag: cmd.tag().to_string(),
            program: program.clone(),
            reason,
        };
        let status = proc.run_interactive().map_err(|e| failed(format!("{:#}", e)))?;
        if status.success() {
            return Ok(());
        }
        Err(failed(match status.code() {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        }))
    }
}
