//! Git repository plumbing
//!
//! Thin wrappers over the system `git` binary for repository discovery and
//! the handful of read-only queries the hook needs.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::Command;

pub struct GitRepo {
    pub path: PathBuf,
}

impl GitRepo {
    /// Discovers the repository containing the current working directory.
    pub fn discover() -> Result<Self> {
        let output = Command::new("git")
            .args(["rev-parse", "--show-toplevel"])
            .output()
            .context("failed to execute git rev-parse --show-toplevel")?;

        if !output.status.success() {
            return Err(anyhow::anyhow!("not in a git repository"));
        }

        let stdout = String::from_utf8(output.stdout).context("git output is not valid UTF-8")?;

        Ok(GitRepo {
            path: PathBuf::from(stdout.trim()),
        })
    }

    /// Current branch name (`HEAD` when detached).
    pub fn current_branch(&self) -> Result<String> {
        let output = Command::new("git")
            .args(["rev-parse", "--abbrev-ref", "HEAD"])
            .current_dir(&self.path)
            .output()
            .context("failed to execute git rev-parse --abbrev-ref HEAD")?;

        if !output.status.success() {
            return Err(anyhow::anyhow!("failed to get current branch"));
        }

        let stdout = String::from_utf8(output.stdout).context("git output is not valid UTF-8")?;
        Ok(stdout.trim().to_string())
    }

    /// Most recent tag reachable from HEAD, if any.
    pub fn current_tag(&self) -> Result<String> {
        let output = Command::new("git")
            .args(["describe", "--tags", "--abbrev=0"])
            .current_dir(&self.path)
            .output()
            .context("failed to execute git describe --tags")?;

        if !output.status.success() {
            return Err(anyhow::anyhow!("no version tags found"));
        }

        let stdout = String::from_utf8(output.stdout).context("git output is not valid UTF-8")?;
        Ok(stdout.trim().to_string())
    }

    pub fn git_dir(&self) -> PathBuf {
        self.path.join(".git")
    }

    pub fn hooks_dir(&self) -> PathBuf {
        self.git_dir().join("hooks")
    }
}
