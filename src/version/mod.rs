//! Version detection, tag validation, and version-kind classification
//!
//! The current version is the most recent git tag reachable from HEAD. Pushed
//! tags must satisfy a minimal semantic contract before any stage runs. The
//! version kind drives `only` gating in stage steps.

use crate::git::GitRepo;
use crate::manifest::{Manifest, OnlyKind};
use anyhow::{Result, bail};
use std::fmt;

/// Classification of the current version, exposed to manifests as
/// `version.version-type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionKind {
    Release,
    Prerelease,
    Patch,
    Minor,
    Major,
    Unknown,
}

impl VersionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionKind::Release => "release",
            VersionKind::Prerelease => "prerelease",
            VersionKind::Patch => "patch",
            VersionKind::Minor => "minor",
            VersionKind::Major => "major",
            VersionKind::Unknown => "unknown",
        }
    }

    /// Parses a kind back from its `version.version-type` value.
    pub fn parse(s: &str) -> VersionKind {
        match s {
            "release" => VersionKind::Release,
            "prerelease" => VersionKind::Prerelease,
            "patch" => VersionKind::Patch,
            "minor" => VersionKind::Minor,
            "major" => VersionKind::Major,
            _ => VersionKind::Unknown,
        }
    }

    /// Whether this kind satisfies an `only` entry.
    pub fn matches(&self, only: OnlyKind) -> bool {
        self.as_str() == only.as_str()
    }
}

impl fmt::Display for VersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validates the minimal tag contract: non-empty, leading `v`, at least one
/// digit. Richer semantic-version validation belongs to a version provider.
pub fn validate_tag(tag: &str) -> Result<()> {
    if tag.is_empty() {
        bail!("version cannot be empty");
    }
    if !tag.starts_with('v') {
        bail!("version should start with 'v': {tag}");
    }
    if !tag.chars().any(|c| c.is_ascii_digit()) {
        bail!("version should contain at least one digit: {tag}");
    }
    Ok(())
}

/// Classifies a version string. Prerelease markers win; anything else that
/// looks like a version is a release.
pub fn classify(version: &str) -> VersionKind {
    let lower = version.to_lowercase();
    if lower.contains("alpha") || lower.contains("beta") || lower.contains("rc") {
        VersionKind::Prerelease
    } else {
        VersionKind::Release
    }
}

/// Version information for the current checkout, combined with project
/// metadata from the manifest.
#[derive(Debug, Clone)]
pub struct VersionInfo {
    /// Current tag, when the repository has one.
    pub version: Option<String>,
    /// Current branch, when one can be determined.
    pub branch: Option<String>,
    pub project: String,
    pub modules: Vec<String>,
    pub kind: VersionKind,
}

impl VersionInfo {
    /// Detects version information from the repository; git failures degrade
    /// to `Unknown` rather than aborting the run.
    pub fn detect(manifest: &Manifest) -> Self {
        let repo = GitRepo::discover().ok();
        let version = repo.as_ref().and_then(|r| r.current_tag().ok());
        let branch = repo.as_ref().and_then(|r| r.current_branch().ok());

        let kind = match version.as_deref() {
            Some(v) => classify(v),
            None => VersionKind::Unknown,
        };

        VersionInfo {
            version,
            branch,
            project: manifest.project.name.clone(),
            modules: manifest.project.modules.clone(),
            kind,
        }
    }

    /// The first declared module, when the project declares any.
    pub fn module(&self) -> Option<&str> {
        self.modules.first().map(String::as_str)
    }
}
