//! # pre-push - Git pre-push hook runner with a DAG executor
//!
//! pre-push is a configurable Git pre-push hook runner. A YAML manifest
//! declares reusable actions and ordered stages; the engine executes a stage
//! as a dependency-ordered, partially-parallel graph of shell and built-in
//! checks, streams results in declaration order, and decides whether a push
//! may proceed.
//!
//! ## Quick Start
//!
//! ```bash
//! # Install the hook into the current repository
//! pre-push install
//!
//! # Try the configured checks without pushing
//! pre-push test
//!
//! # See what built-in checks are available
//! pre-push list-uses
//! ```
//!
//! ## Configuration
//!
//! Configuration lives in `.project.yml` at the repository root:
//!
//! ```yaml
//! project:
//!   name: my-project
//!   modules: [my-project]
//!
//! actions:
//!   - name: git-untracked
//!     uses: git@untracked
//!   - name: run-tests
//!     run: |
//!       cargo test
//!
//! stages:
//!   pre-push:
//!     steps:
//!       - action: git-untracked
//!       - action: run-tests
//!         require: [git-untracked]
//!         on_error: warn
//! ```
//!
//! Steps may gate on `if: "branch == 'main'"` predicates and
//! `only: [release, prerelease]` version kinds, and shell actions may
//! interpolate `${{ tag }}`-style variables from the push context.
//!
//! ## Library Usage
//!
//! The engine is usable without the CLI. Hosts provide a manifest, a frozen
//! variable context, and optionally their own [`engine::ActionRunner`]:
//!
//! ```rust,no_run
//! use pre_push::cli::output::Reporter;
//! use pre_push::engine::{DefaultRunner, Scheduler};
//! use pre_push::manifest::Manifest;
//! use pre_push::vars::VarContext;
//! use pre_push::version::VersionInfo;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let manifest = Manifest::load(".project.yml")?;
//! let info = VersionInfo::detect(&manifest);
//! let ctx = VarContext::collect(&info, None);
//! let reporter = Arc::new(Reporter::new(0, false));
//! let runner = Arc::new(DefaultRunner::with_reporter(Arc::clone(&reporter)));
//!
//! let scheduler = Scheduler::new(&manifest, &ctx, runner, reporter);
//! let run = scheduler.run_stage("pre-push", &CancellationToken::new()).await?;
//! std::process::exit(run.status.exit_code());
//! # }
//! ```

pub mod cli;
pub mod engine;
pub mod git;
pub mod hook;
pub mod manifest;
pub mod vars;
pub mod version;

pub use engine::{
    ActionRunner, DefaultRunner, Outcome, Scheduler, StageRun, StageStatus, Status, StepResult,
    UsesRegistry,
};
pub use manifest::Manifest;
pub use vars::VarContext;

/// Result type alias for pre-push operations
pub type Result<T> = anyhow::Result<T>;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");

/// Registered built-in action identifiers with their one-line descriptions.
pub fn list_builtins() -> Vec<(&'static str, &'static str)> {
    UsesRegistry::new()
        .iter()
        .map(|runner| (runner.name(), runner.describe()))
        .collect()
}
