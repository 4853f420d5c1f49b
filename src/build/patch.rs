//! Patch application inside the build root.

use std::fs;
use std::path::Path;
use tracing::info;

use super::{Policy, Session};
use crate::error::{BuildError, Result};

/// Copy `patch` to `/<basename>` in the root and apply it with `patch -p0`
/// from the root directory, where `apt-get source` unpacked the tree.
pub(super) fn apply(session: &mut Session<'_, '_>, patch: &Path) -> Result<()> {
    if !patch.is_file() {
        return Err(BuildError::PatchNotFound {
            path: patch.to_path_buf(),
        });
    }
    let Some(name) = patch.file_name() else {
        return Err(BuildError::PatchNotFound {
            path: patch.to_path_buf(),
        });
    };
    let name = name.to_string_lossy().into_owned();

    let dest = session.handle.merged().join(&name);
    fs::copy(patch, &dest).map_err(|source| BuildError::PatchCopy {
        path: patch.to_path_buf(),
        source,
    })?;
    info!(patch = %patch.display(), dest = %dest.display(), "patch copied into root");

    let in_root = format!("/{}", name);
    let cmd = session.chroot("patch", ["patch", "-p0", "-i", in_root.as_str()]);
    session
        .step(cmd, Policy::Fatal)
        .map_err(|e| BuildError::PatchApply {
            path: patch.to_path_buf(),
            source: Box::new(e),
        })
}
