//! Propagate built packages out of the upper layer.
//!
//! `apt-get --compile source` runs from `/` in the chroot, so the `.deb`
//! files land at the top of the overlay's upper layer. They are copied
//! through the handle's base view, which writes the real root filesystem
//! rather than the overlay, and must happen before the unmount.

use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use super::{ArtifactRecord, Policy, Session};
use crate::error::{BuildError, Result};

/// File extension of binary packages.
pub const ARTIFACT_EXTENSION: &str = "deb";

/// Binary packages directly under `dir`, sorted by name.
pub fn discover_artifacts(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(io::Error::from)?;
        let path = entry.path();
        if entry.file_type().is_file()
            && path.extension().is_some_and(|ext| ext == ARTIFACT_EXTENSION)
        {
            found.push(path.to_path_buf());
        }
    }
    found.sort();
    Ok(found)
}

fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Copy packages into the base root, install them in the overlay view,
/// fix up dependencies and remove the copies again.
///
/// Install and fixup failures are tolerated. A failed copy is returned
/// after the remaining artifacts were still handled.
pub(super) fn reinstall(session: &mut Session<'_, '_>) -> Result<()> {
    let upper = session.handle.upper().to_path_buf();
    let found = discover_artifacts(&upper).map_err(|source| BuildError::ArtifactCopy {
        path: upper.clone(),
        source,
    })?;
    if found.is_empty() {
        info!("no binary packages produced");
        return Ok(());
    }

    let base = session.handle.base_view();
    let mut first_err = None;
    let mut copied = Vec::new();

    for artifact in &found {
        let name = artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let record = match copy_artifact(artifact, &base.join(&name)) {
            Ok(record) => {
                copied.push(name.clone());
                ArtifactRecord {
                    name,
                    copied: true,
                    ..record
                }
            }
            Err(source) => {
                warn!(artifact = %artifact.display(), error = %source, "failed to copy package into root");
                first_err.get_or_insert(BuildError::ArtifactCopy {
                    path: artifact.clone(),
                    source,
                });
                continue;
            }
        };
        session.report.artifacts.push(record);
    }
    info!(count = copied.len(), "packages copied into base root");

    if let Some(dir) = session.settings.artifact_dir.clone() {
        if let Err(e) = preserve(&found, &dir) {
            warn!(dir = %dir.display(), error = %e, "failed to keep packages");
            first_err.get_or_insert(e);
        } else {
            session.report.preserved_in = Some(dir);
        }
    }

    if !copied.is_empty() {
        let mut dpkg = vec!["dpkg".to_string(), "-i".to_string()];
        dpkg.extend(copied.iter().map(|name| format!("/{}", name)));
        let install = session.chroot("install", dpkg);
        session.step(install, Policy::Tolerated)?;
        let fixup = session.chroot("fixup", ["apt-get", "-y", "-f", "install"]);
        session.step(fixup, Policy::Tolerated)?;
    }

    for name in &copied {
        let path = base.join(name);
        if let Err(e) = fs::remove_file(&path) {
            warn!(package = %name, error = %e, "failed to remove package file from root");
        }
    }

    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn copy_artifact(src: &Path, dest: &Path) -> io::Result<ArtifactRecord> {
    let size = fs::copy(src, dest)?;
    Ok(ArtifactRecord {
        name: String::new(),
        size,
        sha256: sha256_file(dest)?,
        copied: false,
    })
}

fn preserve(found: &[PathBuf], dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|source| BuildError::ArtifactCopy {
        path: dir.to_path_buf(),
        source,
    })?;
    for artifact in found {
        let Some(name) = artifact.file_name() else {
            continue;
        };
        fs::copy(artifact, dir.join(name)).map_err(|source| BuildError::ArtifactCopy {
            path: artifact.clone(),
            source,
        })?;
    }
    info!(dir = %dir.display(), count = found.len(), "packages kept");
    Ok(())
}
