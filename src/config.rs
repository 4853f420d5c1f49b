//! Configuration management for pkgbuild.
//!
//! Reads configuration from a .env file and environment variables.
//! Environment variables take precedence over the .env file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::build::{BuildSettings, DEFAULT_BUILD_OPTIONS};
use crate::overlay::ScratchDirs;

/// Default Debian mirror for the `deb-src` line.
pub const DEFAULT_MIRROR: &str = "https://deb.debian.org/debian";
/// Default suite for the `deb-src` line.
pub const DEFAULT_CODENAME: &str = "buster";
/// Default host directory for the overlay's upper and work layers.
pub const DEFAULT_SCRATCH_DIR: &str = "/tmp/pkgbuild";

/// pkgbuild configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Build root (PKGBUILD_ROOTDIR); the CLI's --rootdir wins.
    pub rootdir: Option<PathBuf>,
    /// Parent of the upper/ and work/ layers (PKGBUILD_SCRATCH_DIR).
    pub scratch_dir: PathBuf,
    /// Mirror URL (PKGBUILD_MIRROR).
    pub mirror: String,
    /// Suite name (PKGBUILD_CODENAME).
    pub codename: String,
    /// Full `deb-src` line override (PKGBUILD_DEB_SRC).
    pub deb_src_override: Option<String>,
    /// DEB_BUILD_OPTIONS for the build (PKGBUILD_DEB_BUILD_OPTIONS).
    pub build_options: String,
    /// Where built packages are kept on the host (PKGBUILD_ARTIFACT_DIR).
    pub artifact_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `<base_dir>/.env` and the environment.
    pub fn load(base_dir: &Path) -> Self {
        let mut vars = HashMap::new();

        let env_path = base_dir.join(".env");
        if env_path.exists() {
            match dotenvy::from_path_iter(&env_path) {
                Ok(iter) => {
                    for item in iter {
                        match item {
                            Ok((key, value)) => {
                                vars.insert(key, value);
                            }
                            Err(e) => warn!(file = %env_path.display(), error = %e, "skipping malformed .env line"),
                        }
                    }
                }
                Err(e) => warn!(file = %env_path.display(), error = %e, "could not read .env"),
            }
        }

        // Environment variables override .env file
        vars.extend(std::env::vars());

        Self::from_vars(base_dir, &vars)
    }

    /// Build a config from already collected variables.
    pub fn from_vars(base_dir: &Path, vars: &HashMap<String, String>) -> Self {
        let get = |key: &str| vars.get(key).filter(|v| !v.is_empty()).cloned();
        let path = |key: &str| get(key).map(|v| resolve(base_dir, &v));

        Self {
            rootdir: path("PKGBUILD_ROOTDIR"),
            scratch_dir: path("PKGBUILD_SCRATCH_DIR")
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SCRATCH_DIR)),
            mirror: get("PKGBUILD_MIRROR").unwrap_or_else(|| DEFAULT_MIRROR.to_string()),
            codename: get("PKGBUILD_CODENAME").unwrap_or_else(|| DEFAULT_CODENAME.to_string()),
            deb_src_override: get("PKGBUILD_DEB_SRC"),
            build_options: get("PKGBUILD_DEB_BUILD_OPTIONS")
                .unwrap_or_else(|| DEFAULT_BUILD_OPTIONS.to_string()),
            artifact_dir: path("PKGBUILD_ARTIFACT_DIR"),
        }
    }

    /// The `deb-src` line appended to the root's apt sources.
    pub fn deb_src_line(&self) -> String {
        self.deb_src_override
            .clone()
            .unwrap_or_else(|| format!("deb-src {} {} main", self.mirror, self.codename))
    }

    pub fn scratch(&self) -> ScratchDirs {
        ScratchDirs::under(&self.scratch_dir)
    }

    pub fn build_settings(&self) -> BuildSettings {
        BuildSettings {
            deb_src: self.deb_src_line(),
            build_options: self.build_options.clone(),
            artifact_dir: self.artifact_dir.clone(),
        }
    }

    /// Print configuration for debugging.
    pub fn print(&self) {
        let scratch = self.scratch();
        println!("Configuration:");
        match &self.rootdir {
            Some(root) => println!("  PKGBUILD_ROOTDIR: {}", root.display()),
            None => println!("  PKGBUILD_ROOTDIR: (unset, pass --rootdir)"),
        }
        println!("  PKGBUILD_SCRATCH_DIR: {}", self.scratch_dir.display());
        println!("    upper: {}", scratch.upper().display());
        println!("    work:  {}", scratch.work().display());
        println!("  deb-src line: {}", self.deb_src_line());
        println!("  PKGBUILD_DEB_BUILD_OPTIONS: {}", self.build_options);
        match &self.artifact_dir {
            Some(dir) => println!("  PKGBUILD_ARTIFACT_DIR: {}", dir.display()),
            None => println!("  PKGBUILD_ARTIFACT_DIR: (unset, packages are not kept)"),
        }
    }
}

fn resolve(base_dir: &Path, value: &str) -> PathBuf {
    let path = PathBuf::from(value);
    if path.is_absolute() {
        path
    } else {
        base_dir.join(path)
    }
}
