//! Project manifest model and validation
//!
//! The manifest is a YAML document (`.project.yml` by convention) declaring
//! the project, a list of reusable actions, and named stages built from
//! ordered steps. It is loaded and validated once, before any execution, and
//! never mutated afterwards.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Manifest file names probed by [`Manifest::find_and_load`], in order.
pub const MANIFEST_FILE_NAMES: &[&str] = &[
    ".project.yml",
    ".project.yaml",
    "project.yml",
    "project.yaml",
    "pre-push.yml",
    "pre-push.yaml",
];

/// Top-level manifest: project metadata, actions, and stages.
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    pub project: Project,

    #[serde(default)]
    pub actions: Vec<Action>,

    #[serde(default)]
    pub stages: HashMap<String, Stage>,
}

/// Project metadata block.
#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    pub name: String,

    #[serde(default)]
    pub modules: Vec<String>,

    #[serde(default, rename = "bin")]
    pub bin_dir: Option<String>,
}

/// A named unit of work: either a shell script (`run`) or a built-in
/// identifier (`uses`). Exactly one of the two must be set.
#[derive(Debug, Clone, Deserialize)]
pub struct Action {
    pub name: String,

    #[serde(default)]
    pub run: Option<String>,

    #[serde(default)]
    pub uses: Option<String>,
}

/// The resolved flavor of an [`Action`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind<'a> {
    Run(&'a str),
    Uses(&'a str),
}

impl Action {
    /// Resolves the action to its kind, enforcing the exactly-one rule.
    pub fn kind(&self) -> Result<ActionKind<'_>> {
        match (self.run.as_deref(), self.uses.as_deref()) {
            (Some(run), None) => Ok(ActionKind::Run(run)),
            (None, Some(uses)) => Ok(ActionKind::Uses(uses)),
            (Some(_), Some(_)) => {
                bail!("action '{}' cannot have both 'run' and 'uses'", self.name)
            }
            (None, None) => {
                bail!("action '{}' must have either 'run' or 'uses'", self.name)
            }
        }
    }
}

/// A named ordered sequence of steps. Step order is the declaration order
/// used for display.
#[derive(Debug, Clone, Deserialize)]
pub struct Stage {
    pub steps: Vec<Step>,
}

/// One stage entry: an action reference plus scheduling metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    pub action: String,

    /// Actions that must complete with non-error status before this step runs.
    #[serde(default)]
    pub require: Vec<String>,

    #[serde(default, alias = "onerror")]
    pub on_error: OnError,

    /// Optional predicate of the form `key == 'literal'`.
    #[serde(default, rename = "if")]
    pub if_cond: Option<String>,

    /// Version kinds this step is restricted to; empty means unrestricted.
    #[serde(default)]
    pub only: Vec<OnlyKind>,
}

/// Failure policy for a step. `stop` fails dependents, `warn` downgrades the
/// step's own error to a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnError {
    #[default]
    Stop,
    Warn,
}

/// The closed set of version kinds accepted in a step's `only` list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnlyKind {
    Release,
    Prerelease,
    Patch,
    Minor,
    Major,
}

impl OnlyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OnlyKind::Release => "release",
            OnlyKind::Prerelease => "prerelease",
            OnlyKind::Patch => "patch",
            OnlyKind::Minor => "minor",
            OnlyKind::Major => "major",
        }
    }
}

impl Manifest {
    /// Loads and validates a manifest from a file path.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest: {}", path.display()))?;
        Self::load_from_str(&content)
            .with_context(|| format!("invalid manifest: {}", path.display()))
    }

    /// Parses and validates a manifest from YAML text.
    pub fn load_from_str(content: &str) -> Result<Self> {
        let manifest: Manifest =
            serde_yml::from_str(content).context("failed to parse YAML manifest")?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Searches `dir` for a manifest file and loads the first match.
    pub fn find_and_load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let path = Self::find_manifest(dir).with_context(|| {
            format!("no manifest file found in {}", dir.display())
        })?;
        Self::load(path)
    }

    /// Returns the path of the first manifest file present in `dir`.
    pub fn find_manifest(dir: &Path) -> Option<PathBuf> {
        MANIFEST_FILE_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
    }

    /// Validates the manifest. Called once at load; no later code path
    /// re-checks these invariants.
    pub fn validate(&self) -> Result<()> {
        if self.project.name.is_empty() {
            bail!("project name is required");
        }

        if self.actions.is_empty() {
            bail!("at least one action is required");
        }

        let mut action_names = HashSet::new();
        for action in &self.actions {
            if action.name.is_empty() {
                bail!("action name is required");
            }
            action.kind()?;
            if !action_names.insert(action.name.as_str()) {
                bail!("duplicate action name: {}", action.name);
            }
        }

        for (stage_name, stage) in &self.stages {
            if stage.steps.is_empty() {
                bail!("stage '{stage_name}' must have at least one step");
            }

            for (i, step) in stage.steps.iter().enumerate() {
                if step.action.is_empty() {
                    bail!("step {} in stage '{stage_name}' must name an action", i + 1);
                }
                if !action_names.contains(step.action.as_str()) {
                    bail!(
                        "step {} in stage '{stage_name}' references unknown action: {}",
                        i + 1,
                        step.action
                    );
                }
            }
        }

        Ok(())
    }

    pub fn get_action(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.name == name)
    }

    pub fn get_stage(&self, name: &str) -> Option<&Stage> {
        self.stages.get(name)
    }
}
