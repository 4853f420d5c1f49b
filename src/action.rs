//! `pkg_build` action definitions.
//!
//! ```yaml
//! - action: pkg_build
//!   package: stress
//!   patch: patches/stress-fix.diff
//! ```
//!
//! `version`, `codename`, `architecture`, `destination`, `install` and
//! `sign_key` are accepted so existing recipes keep parsing, but they do
//! not change the build yet.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::build::BuildRequest;

pub const ACTION_NAME: &str = "pkg_build";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageBuildAction {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub package: String,
    #[serde(default)]
    pub patch: Option<PathBuf>,

    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub codename: Option<String>,
    #[serde(default)]
    pub architecture: Option<String>,
    #[serde(default)]
    pub destination: Option<PathBuf>,
    #[serde(default)]
    pub install: Option<bool>,
    #[serde(default)]
    pub sign_key: Option<String>,
}

impl PackageBuildAction {
    /// Parse a single action or a list of actions from YAML.
    ///
    /// Every entry must be a `pkg_build` action (or leave `action` unset).
    pub fn parse_all(yaml: &str) -> Result<Vec<Self>> {
        let actions = match serde_yaml::from_str::<Vec<Self>>(yaml) {
            Ok(list) => list,
            Err(list_err) => {
                let single = serde_yaml::from_str::<Self>(yaml)
                    .with_context(|| format!("parsing pkg_build action ({})", list_err))?;
                vec![single]
            }
        };

        for action in &actions {
            if let Some(kind) = action.action.as_deref() {
                if kind != ACTION_NAME {
                    bail!("unsupported action '{}', expected '{}'", kind, ACTION_NAME);
                }
            }
        }
        Ok(actions)
    }

    /// Read and parse an action file.
    pub fn load(path: &Path) -> Result<Vec<Self>> {
        let yaml = fs::read_to_string(path)
            .with_context(|| format!("reading action file '{}'", path.display()))?;
        Self::parse_all(&yaml).with_context(|| format!("in '{}'", path.display()))
    }

    /// Names of reserved fields that are set but have no effect.
    pub fn ignored_fields(&self) -> Vec<&'static str> {
        let mut ignored = Vec::new();
        if self.version.is_some() {
            ignored.push("version");
        }
        if self.codename.is_some() {
            ignored.push("codename");
        }
        if self.architecture.is_some() {
            ignored.push("architecture");
        }
        if self.destination.is_some() {
            ignored.push("destination");
        }
        if self.install.is_some() {
            ignored.push("install");
        }
        if self.sign_key.is_some() {
            ignored.push("sign_key");
        }
        ignored
    }

    /// Turn the action into a build request against `rootdir`.
    ///
    /// A relative patch path is taken relative to `recipe_dir`.
    pub fn to_request(&self, rootdir: &Path, recipe_dir: &Path) -> Result<BuildRequest> {
        for field in self.ignored_fields() {
            warn!(package = %self.package, field, "action field is reserved and ignored");
        }

        let patch = self.patch.as_ref().map(|p| {
            if p.is_relative() && !p.as_os_str().is_empty() {
                recipe_dir.join(p)
            } else {
                p.clone()
            }
        });

        BuildRequest::new(self.package.clone(), patch, rootdir)
            .with_context(|| format!("invalid pkg_build action for '{}'", self.package))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_action() {
        let yaml = "action: pkg_build\npackage: stress\n";
        let actions = PackageBuildAction::parse_all(yaml).unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].package, "stress");
        assert_eq!(actions[0].patch, None);
    }

    #[test]
    fn test_parse_action_list() {
        let yaml = r#"
- action: pkg_build
  package: stress
  patch: patches/fix.diff
- action: pkg_build
  package: hello
"#;
        let actions = PackageBuildAction::parse_all(yaml).unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].patch.as_deref(), Some(Path::new("patches/fix.diff")));
        assert_eq!(actions[1].package, "hello");
    }

    #[test]
    fn test_missing_package_is_error() {
        assert!(PackageBuildAction::parse_all("action: pkg_build\npatch: x.diff\n").is_err());
    }

    #[test]
    fn test_other_action_rejected() {
        let err = PackageBuildAction::parse_all("action: apt\npackage: stress\n").unwrap_err();
        assert!(err.to_string().contains("unsupported action"));
    }

    #[test]
    fn test_reserved_fields_parse_but_are_ignored() {
        let yaml = "package: stress\ncodename: buster\ninstall: true\nsign_key: ABCD\n";
        let actions = PackageBuildAction::parse_all(yaml).unwrap();
        assert_eq!(actions[0].ignored_fields(), ["codename", "install", "sign_key"]);
    }

    #[test]
    fn test_relative_patch_resolves_against_recipe_dir() {
        let action = PackageBuildAction {
            package: "stress".into(),
            patch: Some(PathBuf::from("patches/fix.diff")),
            ..Default::default()
        };
        let request = action
            .to_request(Path::new("/srv/rootfs"), Path::new("/recipes"))
            .unwrap();
        assert_eq!(request.patch(), Some(Path::new("/recipes/patches/fix.diff")));
        assert_eq!(request.rootdir(), Path::new("/srv/rootfs"));
    }

    #[test]
    fn test_empty_patch_string_means_none() {
        let actions = PackageBuildAction::parse_all("package: stress\npatch: \"\"\n").unwrap();
        let request = actions[0]
            .to_request(Path::new("/srv/rootfs"), Path::new("/recipes"))
            .unwrap();
        assert_eq!(request.patch(), None);
    }
}
