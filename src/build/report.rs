//! Record of what one build invocation did.

use serde::Serialize;
use std::path::{Path, PathBuf};

use super::command::{ExternalCommand, Policy};
use super::BuildRequest;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StepOutcome {
    Succeeded,
    /// Failed under [`Policy::Tolerated`]; the build went on.
    Tolerated { reason: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub tag: String,
    pub argv: Vec<String>,
    pub policy: Policy,
    pub outcome: StepOutcome,
}

/// A binary package found in the upper layer after compilation.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactRecord {
    pub name: String,
    pub size: u64,
    pub sha256: String,
    /// Copied into the base root before the overlay went away.
    pub copied: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub package: String,
    pub patch: Option<PathBuf>,
    pub rootdir: PathBuf,
    pub steps: Vec<StepRecord>,
    pub artifacts: Vec<ArtifactRecord>,
    pub preserved_in: Option<PathBuf>,
    pub error: Option<String>,
}

impl BuildReport {
    pub fn new(request: &BuildRequest) -> Self {
        Self {
            package: request.package().to_string(),
            patch: request.patch().map(Path::to_path_buf),
            rootdir: request.rootdir().to_path_buf(),
            steps: Vec::new(),
            artifacts: Vec::new(),
            preserved_in: None,
            error: None,
        }
    }

    pub(crate) fn record(&mut self, cmd: &ExternalCommand, policy: Policy, outcome: StepOutcome) {
        self.steps.push(StepRecord {
            tag: cmd.tag().to_string(),
            argv: cmd.argv().to_vec(),
            policy,
            outcome,
        });
    }

    /// Tags of every step that ran, in order.
    pub fn step_tags(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.tag.as_str()).collect()
    }

    pub fn ran(&self, tag: &str) -> bool {
        self.steps.iter().any(|s| s.tag == tag)
    }

    pub fn tolerated_failures(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, StepOutcome::Tolerated { .. }))
            .count()
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}
