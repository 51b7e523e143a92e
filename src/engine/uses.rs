//! Built-in action registry
//!
//! Built-ins are addressed from manifests through `uses:` identifiers. Each
//! runner inspects repository state and reports OK when the tree is clean for
//! its concern, with a copy-pasteable manual-check command on failure.

use super::Outcome;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// One built-in check.
#[async_trait]
pub trait UsesRunner: Send + Sync {
    async fn run(&self, cancel: &CancellationToken) -> Outcome;

    /// Command a user can run by hand to reproduce the check.
    fn repro(&self) -> &'static str;

    /// One-line description for `list-uses`.
    fn describe(&self) -> &'static str;

    fn name(&self) -> &'static str;
}

/// Registry mapping `uses:` identifiers to runners. Consulted at execution
/// dispatch, not at manifest load.
pub struct UsesRegistry {
    runners: BTreeMap<&'static str, Arc<dyn UsesRunner>>,
}

impl UsesRegistry {
    pub fn new() -> Self {
        let mut registry = UsesRegistry {
            runners: BTreeMap::new(),
        };
        registry.register(Arc::new(GitUntracked));
        registry.register(Arc::new(GitUncommitted));
        registry.register(Arc::new(GitModified));
        registry
    }

    pub fn register(&mut self, runner: Arc<dyn UsesRunner>) {
        self.runners.insert(runner.name(), runner);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn UsesRunner>> {
        self.runners.get(name).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn UsesRunner> {
        self.runners.values().map(|r| r.as_ref())
    }
}

impl Default for UsesRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a git query, honoring cancellation by killing the subprocess.
async fn git_output(args: &[&str], cancel: &CancellationToken) -> Result<std::process::Output, String> {
    let mut command = Command::new("git");
    command
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command
        .spawn()
        .map_err(|e| format!("failed to spawn git: {e}"))?;

    tokio::select! {
        output = child.wait_with_output() => {
            output.map_err(|e| format!("failed to run git: {e}"))
        }
        _ = cancel.cancelled() => Err("cancelled".to_string()),
    }
}

/// `git@untracked`: fails when `git status --porcelain` reports `??` entries.
struct GitUntracked;

#[async_trait]
impl UsesRunner for GitUntracked {
    async fn run(&self, cancel: &CancellationToken) -> Outcome {
        let output = match git_output(&["status", "--porcelain"], cancel).await {
            Ok(output) => output,
            Err(e) => return Outcome::error(format!("failed to check git status: {e}")),
        };

        if !output.status.success() {
            return Outcome::error("failed to check git status");
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let untracked = stdout.lines().filter(|line| line.starts_with("??")).count();

        if untracked > 0 {
            Outcome::error("untracked files found, to manually check run:\n     git status")
        } else {
            Outcome::ok("no untracked files found")
        }
    }

    fn repro(&self) -> &'static str {
        "git status --porcelain"
    }

    fn describe(&self) -> &'static str {
        "Check for untracked files"
    }

    fn name(&self) -> &'static str {
        "git@untracked"
    }
}

/// `git@uncommitted`: fails when the index or working tree carries changes.
struct GitUncommitted;

#[async_trait]
impl UsesRunner for GitUncommitted {
    async fn run(&self, cancel: &CancellationToken) -> Outcome {
        let output = match git_output(&["status", "--porcelain"], cancel).await {
            Ok(output) => output,
            Err(e) => return Outcome::error(format!("failed to check git status: {e}")),
        };

        if !output.status.success() {
            return Outcome::error("failed to check git status");
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let uncommitted = stdout
            .lines()
            .filter(|line| {
                let bytes = line.as_bytes();
                bytes.len() >= 2
                    && ((bytes[0] != b' ' && bytes[0] != b'?')
                        || (bytes[1] != b' ' && bytes[1] != b'?'))
            })
            .count();

        if uncommitted > 0 {
            Outcome::error("uncommitted changes found, to manually check run:\n     git status")
        } else {
            Outcome::ok("no uncommitted changes found")
        }
    }

    fn repro(&self) -> &'static str {
        "git status --porcelain"
    }

    fn describe(&self) -> &'static str {
        "Check for uncommitted changes"
    }

    fn name(&self) -> &'static str {
        "git@uncommitted"
    }
}

/// `git@modified`: fails when the working tree differs from HEAD.
struct GitModified;

#[async_trait]
impl UsesRunner for GitModified {
    async fn run(&self, cancel: &CancellationToken) -> Outcome {
        let output = match git_output(&["diff", "--quiet", "HEAD"], cancel).await {
            Ok(output) => output,
            Err(e) => return Outcome::error(format!("failed to check git diff: {e}")),
        };

        if output.status.success() {
            Outcome::ok("working tree matches HEAD")
        } else {
            Outcome::error("working tree differs from HEAD, to manually check run:\n     git diff")
        }
    }

    fn repro(&self) -> &'static str {
        "git diff --quiet HEAD"
    }

    fn describe(&self) -> &'static str {
        "Check if working tree differs from HEAD"
    }

    fn name(&self) -> &'static str {
        "git@modified"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_contains_git_builtins() {
        let registry = UsesRegistry::new();
        assert!(registry.get("git@untracked").is_some());
        assert!(registry.get("git@uncommitted").is_some());
        assert!(registry.get("git@modified").is_some());
        assert!(registry.get("git@unknown").is_none());
    }

    #[test]
    fn registry_lists_runners_with_descriptions() {
        let registry = UsesRegistry::new();
        let listed: Vec<_> = registry.iter().map(|r| r.name()).collect();
        assert_eq!(listed.len(), 3);
        assert!(registry.iter().all(|r| !r.describe().is_empty()));
        assert!(registry.iter().all(|r| !r.repro().is_empty()));
    }
}
