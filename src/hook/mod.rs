//! Git hook entry point and push classification
//!
//! When Git invokes the binary as a pre-push hook it passes the remote name
//! and URL as arguments and streams ref lines on stdin. The classifier
//! short-circuits delete pushes, validates pushed tags, and skips the stage
//! for pushes of refs other than the current checkout before the engine runs.

pub mod installer;

use crate::cli::output::Reporter;
use crate::engine::{DefaultRunner, Scheduler};
use crate::git::GitRepo;
use crate::manifest::Manifest;
use crate::vars::VarContext;
use crate::version::{self, VersionInfo};
use anyhow::{Context, Result, anyhow, bail};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_util::sync::CancellationToken;

const ZERO_SHA: &str = "0000000000000000000000000000000000000000";
const TAG_PREFIX: &str = "refs/tags/";
const BRANCH_PREFIX: &str = "refs/heads/";

/// One ref line from Git's pre-push stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRef {
    pub local_ref: String,
    pub local_sha: String,
    pub remote_ref: String,
    pub remote_sha: String,
    pub is_delete: bool,
    pub is_tag: bool,
    pub is_branch: bool,
}

/// Parses a ref line: `<local_ref> <local_sha> <remote_ref> <remote_sha>`.
/// A forty-zero local SHA marks a delete.
pub fn parse_push_ref(line: &str) -> Result<PushRef> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 4 {
        bail!("invalid git ref format, expected 4 fields, got {}", fields.len());
    }

    let local_ref = fields[0].to_string();
    Ok(PushRef {
        is_delete: fields[1] == ZERO_SHA,
        is_tag: local_ref.starts_with(TAG_PREFIX),
        is_branch: local_ref.starts_with(BRANCH_PREFIX),
        local_sha: fields[1].to_string(),
        remote_ref: fields[2].to_string(),
        remote_sha: fields[3].to_string(),
        local_ref,
    })
}

/// Everything known about the push being validated.
#[derive(Debug, Clone, Default)]
pub struct PushContext {
    pub remote_name: String,
    pub remote_url: String,
    pub refs: Vec<PushRef>,
    pub tags: Vec<String>,
    pub branches: Vec<String>,
    pub is_delete: bool,
}

impl PushContext {
    pub fn new(remote_name: String, remote_url: String, refs: Vec<PushRef>) -> Self {
        let mut tags = Vec::new();
        let mut branches = Vec::new();
        let mut is_delete = false;

        for push_ref in &refs {
            if push_ref.is_delete {
                is_delete = true;
            }
            if let Some(tag) = push_ref.local_ref.strip_prefix(TAG_PREFIX) {
                tags.push(tag.to_string());
            } else if let Some(branch) = push_ref.local_ref.strip_prefix(BRANCH_PREFIX) {
                branches.push(branch.to_string());
            }
        }

        PushContext {
            remote_name,
            remote_url,
            refs,
            tags,
            branches,
            is_delete,
        }
    }
}

/// What the classifier decided to do with a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushDecision {
    /// Delete pushes are never checked.
    SkipDelete,
    /// The push targets a tag or branch other than the current checkout.
    SkipNotCurrent,
    Run,
}

/// Applies the decision rules in order: delete, tag semantics, current-ref
/// match. Invalid tag semantics abort with an error before any stage work.
pub fn classify(
    push: &PushContext,
    current_branch: Option<&str>,
    current_tag: Option<&str>,
) -> Result<PushDecision> {
    if push.is_delete {
        return Ok(PushDecision::SkipDelete);
    }

    for tag in &push.tags {
        version::validate_tag(tag)
            .with_context(|| format!("invalid tag semantics for {tag}"))?;
    }

    // Only skip when the current branch and tag are both known; failing to
    // resolve either means the check applies.
    if let (Some(branch), Some(tag)) = (current_branch, current_tag) {
        if push.tags.iter().any(|t| t != tag) || push.branches.iter().any(|b| b != branch) {
            return Ok(PushDecision::SkipNotCurrent);
        }
    }

    Ok(PushDecision::Run)
}

/// Reads and parses the ref lines Git streams on stdin. Blank lines are
/// ignored; malformed lines are errors.
pub async fn read_push_refs<R: AsyncRead + Unpin>(input: R) -> Result<Vec<PushRef>> {
    let mut lines = BufReader::new(input).lines();
    let mut refs = Vec::new();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let push_ref = parse_push_ref(&line)
            .with_context(|| format!("failed to parse git ref line {line:?}"))?;
        refs.push(push_ref);
    }

    Ok(refs)
}

/// Detects a Git hook invocation: stdin is not a terminal and the first
/// argument is not a known subcommand or flag. Argument parsing alone is not
/// enough, since Git passes the remote name positionally.
pub fn is_git_hook() -> bool {
    let mut args = std::env::args().skip(1);
    if let Some(first) = args.next() {
        let known = matches!(
            first.as_str(),
            "test"
                | "list-uses"
                | "install"
                | "-h"
                | "--help"
                | "-v"
                | "--verbose"
                | "-V"
                | "--version"
                | "-d"
                | "--debug"
        );
        if known {
            return false;
        }
    }

    !atty::is(atty::Stream::Stdin)
}

/// Hook-mode entry point: classify the push, then run the `pre-push` stage.
/// Returns the process exit code.
pub async fn run(cli_version: &str) -> Result<i32> {
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let refs = read_push_refs(tokio::io::stdin())
        .await
        .context("failed to read git refs")?;
    if refs.is_empty() {
        return Ok(0);
    }

    let args: Vec<String> = std::env::args().collect();
    let remote_name = args
        .get(1)
        .cloned()
        .ok_or_else(|| anyhow!("insufficient arguments for git hook"))?;
    let remote_url = args.get(2).cloned().unwrap_or_default();
    let push = PushContext::new(remote_name, remote_url, refs);

    let repo = GitRepo::discover()?;
    let current_branch = repo.current_branch().ok();
    let current_tag = repo.current_tag().ok();

    match classify(&push, current_branch.as_deref(), current_tag.as_deref())? {
        PushDecision::SkipDelete => {
            eprintln!("delete operation detected, skipping pre-push checks");
            return Ok(0);
        }
        PushDecision::SkipNotCurrent => {
            eprintln!("pushing tag or branch that is not current, skipping pre-push stage");
            return Ok(0);
        }
        PushDecision::Run => {}
    }

    let manifest = Manifest::find_and_load(&repo.path)?;

    let verbose = crate::cli::verbose_level(0);
    let debug = crate::cli::debug_enabled(false);
    let reporter = Arc::new(Reporter::new(verbose, debug));
    reporter.debug(&format!("push context: {push:?}"));

    let info = VersionInfo::detect(&manifest);
    let ctx = VarContext::collect(&info, Some(&push));
    let runner = Arc::new(DefaultRunner::with_reporter(Arc::clone(&reporter)));
    let scheduler = Scheduler::new(&manifest, &ctx, runner, Arc::clone(&reporter));

    reporter.cli_header(crate::PKG_NAME, cli_version);
    reporter.project_check(
        &manifest.project.name,
        info.version.as_deref().unwrap_or("unknown"),
    );

    let run = scheduler.run_stage("pre-push", &cancel).await?;
    Ok(run.status.exit_code())
}
