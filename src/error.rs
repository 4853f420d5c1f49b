//! Error types for the package build step.
//!
//! Library code returns [`BuildError`]; the CLI wraps it with `anyhow`
//! context like the rest of the binary.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while building a package inside an overlay.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid build request: {0}")]
    InvalidRequest(String),

    #[error("failed to prepare scratch directory {}: {source}", path.display())]
    ScratchSetup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("root directory {} is not usable: {source}", path.display())]
    RootUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("an overlay is already mounted on {}; run `pkgbuild clean` first", target.display())]
    AlreadyMounted { target: PathBuf },

    #[error("failed to mount overlay on {}: {source}", target.display())]
    Mount {
        target: PathBuf,
        #[source]
        source: nix::Error,
    },

    #[error("failed to unmount overlay on {}: {source}", target.display())]
    Unmount {
        target: PathBuf,
        #[source]
        source: nix::Error,
    },

    #[error("failed to remove scratch directory {}: {source}", path.display())]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to update apt sources at {}: {source}", path.display())]
    SourceConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("patch file not found: {}", path.display())]
    PatchNotFound { path: PathBuf },

    #[error("failed to copy patch {} into the build root: {source}", path.display())]
    PatchCopy {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to apply patch: {}", path.display())]
    PatchApply {
        path: PathBuf,
        #[source]
        source: Box<BuildError>,
    },

    #[error("[{tag}] '{program}' failed: {reason}")]
    ExternalCommand {
        tag: String,
        program: String,
        reason: String,
    },

    #[error("failed to copy artifact {}: {source}", path.display())]
    ArtifactCopy {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BuildError {
    /// Errors raised while releasing resources rather than while building.
    pub fn is_cleanup_phase(&self) -> bool {
        matches!(self, Self::Unmount { .. } | Self::Cleanup { .. })
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;
