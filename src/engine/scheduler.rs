//! Concurrent streaming scheduler
//!
//! Executes the ready set of a stage graph in parallel, one tokio task per
//! executing node, collecting completions over a channel. Results arrive out
//! of order; status lines are emitted in strict declaration order by
//! advancing a display cursor over the longest completed prefix. A failed
//! `stop` step marks its dependents SKIPPED transitively while independent
//! branches keep running.

use super::graph::Graph;
use super::runner::ActionRunner;
use super::{Outcome, StageStatus, Status, StepResult};
use crate::cli::output::Reporter;
use crate::manifest::{Manifest, OnError};
use crate::vars::VarContext;
use anyhow::{Context, Result, anyhow};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Everything a finished stage run surrenders to the caller: per-step results
/// in declaration order, the aggregate status, and the wall-clock duration.
#[derive(Debug)]
pub struct StageRun {
    pub results: Vec<StepResult>,
    pub status: StageStatus,
    pub duration: Duration,
}

pub struct Scheduler<'a> {
    manifest: &'a Manifest,
    ctx: &'a VarContext,
    runner: Arc<dyn ActionRunner>,
    reporter: Arc<Reporter>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Pending,
    Executing,
    Completed,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        manifest: &'a Manifest,
        ctx: &'a VarContext,
        runner: Arc<dyn ActionRunner>,
        reporter: Arc<Reporter>,
    ) -> Self {
        Scheduler {
            manifest,
            ctx,
            runner,
            reporter,
        }
    }

    /// Runs a stage to completion. Fails before any step executes when the
    /// stage is unknown or its graph is invalid.
    pub async fn run_stage(&self, stage_name: &str, cancel: &CancellationToken) -> Result<StageRun> {
        let stage = self
            .manifest
            .get_stage(stage_name)
            .ok_or_else(|| anyhow!("stage not found: {stage_name}"))?;
        let graph = Graph::build(stage, self.manifest)
            .with_context(|| format!("failed to build execution graph for stage '{stage_name}'"))?;

        self.reporter.stage_header(stage_name);
        let started = Instant::now();
        let results = self.execute(&graph, cancel).await;
        let duration = started.elapsed();

        let mut status = StageStatus::aggregate(&results);
        if cancel.is_cancelled() {
            status = StageStatus::Error;
        }

        self.reporter.stage_result(stage_name, status, duration);
        self.reporter.summary(&results);

        Ok(StageRun {
            results,
            status,
            duration,
        })
    }

    /// Runs one named action outside any stage and prints its status line.
    pub async fn run_action(&self, action_name: &str, cancel: &CancellationToken) -> Result<StepResult> {
        let action = self
            .manifest
            .get_action(action_name)
            .ok_or_else(|| anyhow!("action not found: {action_name}"))?;

        let started = Instant::now();
        let outcome = self.runner.run(action, self.ctx, cancel).await;
        let result = StepResult {
            name: action_name.to_string(),
            status: outcome.status,
            message: outcome.message,
            duration: started.elapsed(),
        };
        self.reporter.step_status(&result);
        Ok(result)
    }

    async fn execute(&self, graph: &Graph<'_>, cancel: &CancellationToken) -> Vec<StepResult> {
        let n = graph.len();
        if n == 0 {
            return Vec::new();
        }

        let mut state = vec![NodeState::Pending; n];
        let mut failed = vec![false; n];
        let mut results: Vec<Option<StepResult>> = (0..n).map(|_| None).collect();
        let mut next_display = 0usize;
        let mut outstanding = 0usize;

        let (tx, mut rx) = mpsc::unbounded_channel::<(usize, Outcome, Duration)>();
        let ctx = Arc::new(self.ctx.clone());
        let version_kind = self.ctx.version_kind();

        loop {
            if cancel.is_cancelled() {
                // No new work after cancellation; pending nodes drain as
                // errors so every step still yields exactly one result.
                for i in 0..n {
                    if state[i] == NodeState::Pending {
                        self.complete(
                            graph,
                            i,
                            Outcome::error("cancelled"),
                            Duration::ZERO,
                            &mut state,
                            &mut failed,
                            &mut results,
                            &mut next_display,
                        );
                    }
                }
            } else {
                // Spawn (or synchronously finish) every ready node. A pass
                // can unlock later nodes, so repeat until a fixpoint.
                loop {
                    let mut progressed = false;

                    for i in 0..n {
                        if state[i] != NodeState::Pending {
                            continue;
                        }
                        let node = &graph.nodes[i];
                        if !node
                            .requires
                            .iter()
                            .all(|&r| state[r] == NodeState::Completed)
                        {
                            continue;
                        }

                        progressed = true;
                        state[i] = NodeState::Executing;

                        if node.requires.iter().any(|&r| failed[r]) {
                            self.complete(
                                graph,
                                i,
                                Outcome::skipped("skipped (dependency failed)"),
                                Duration::ZERO,
                                &mut state,
                                &mut failed,
                                &mut results,
                                &mut next_display,
                            );
                            // Skip caused by a failure keeps propagating.
                            failed[i] = true;
                            continue;
                        }

                        if let Some(cond) = &node.step.if_cond {
                            if !self.ctx.evaluate(cond) {
                                self.complete(
                                    graph,
                                    i,
                                    Outcome::skipped(format!(
                                        "skipped (condition not met: {cond})"
                                    )),
                                    Duration::ZERO,
                                    &mut state,
                                    &mut failed,
                                    &mut results,
                                    &mut next_display,
                                );
                                continue;
                            }
                        }

                        if !node.step.only.is_empty()
                            && !node.step.only.iter().any(|&o| version_kind.matches(o))
                        {
                            let wanted = node
                                .step
                                .only
                                .iter()
                                .map(|o| o.as_str())
                                .collect::<Vec<_>>()
                                .join("|");
                            self.complete(
                                graph,
                                i,
                                Outcome::skipped(format!("skipped (requires {wanted} version)")),
                                Duration::ZERO,
                                &mut state,
                                &mut failed,
                                &mut results,
                                &mut next_display,
                            );
                            continue;
                        }

                        tracing::debug!(step = node.name, "spawning step");
                        outstanding += 1;
                        let action = node.action.clone();
                        let tx = tx.clone();
                        let runner = Arc::clone(&self.runner);
                        let ctx = Arc::clone(&ctx);
                        let cancel = cancel.clone();
                        tokio::spawn(async move {
                            let started = Instant::now();
                            let outcome = runner.run(&action, &ctx, &cancel).await;
                            let _ = tx.send((i, outcome, started.elapsed()));
                        });
                    }

                    if !progressed {
                        break;
                    }
                }
            }

            if state.iter().all(|&s| s == NodeState::Completed) {
                break;
            }
            if outstanding == 0 {
                // Unreachable with an acyclic graph; bail out rather than
                // await a completion that cannot arrive.
                break;
            }

            // Wait for at least one completion, then drain whatever else is
            // already queued before recomputing the ready set.
            let Some((i, outcome, duration)) = rx.recv().await else {
                break;
            };
            outstanding -= 1;
            self.complete(
                graph,
                i,
                outcome,
                duration,
                &mut state,
                &mut failed,
                &mut results,
                &mut next_display,
            );
            while let Ok((i, outcome, duration)) = rx.try_recv() {
                outstanding -= 1;
                self.complete(
                    graph,
                    i,
                    outcome,
                    duration,
                    &mut state,
                    &mut failed,
                    &mut results,
                    &mut next_display,
                );
            }
        }

        results
            .into_iter()
            .enumerate()
            .map(|(i, result)| {
                result.unwrap_or_else(|| StepResult {
                    name: graph.nodes[i].name.to_string(),
                    status: Status::Error,
                    message: "step did not complete".to_string(),
                    duration: Duration::ZERO,
                })
            })
            .collect()
    }

    /// Records a node's result, applying the step's `on_error` policy, and
    /// advances the display cursor over the completed prefix.
    #[allow(clippy::too_many_arguments)]
    fn complete(
        &self,
        graph: &Graph<'_>,
        i: usize,
        outcome: Outcome,
        duration: Duration,
        state: &mut [NodeState],
        failed: &mut [bool],
        results: &mut [Option<StepResult>],
        next_display: &mut usize,
    ) {
        let node = &graph.nodes[i];

        let mut status = outcome.status;
        if status == Status::Error && node.step.on_error == OnError::Warn {
            status = Status::Warn;
        }
        if status == Status::Error {
            failed[i] = true;
        }

        state[i] = NodeState::Completed;
        results[i] = Some(StepResult {
            name: node.name.to_string(),
            status,
            message: outcome.message,
            duration,
        });

        while *next_display < results.len() {
            match &results[*next_display] {
                Some(result) => {
                    self.reporter.step_status(result);
                    *next_display += 1;
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::output::test_support::SharedSink;
    use crate::manifest::Action;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Runner with a scripted status and delay per action name.
    struct Scripted {
        plan: HashMap<String, (Status, u64)>,
    }

    impl Scripted {
        fn new(plan: &[(&str, Status, u64)]) -> Self {
            Scripted {
                plan: plan
                    .iter()
                    .map(|(name, status, delay)| (name.to_string(), (*status, *delay)))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl ActionRunner for Scripted {
        async fn run(
            &self,
            action: &Action,
            _ctx: &VarContext,
            _cancel: &CancellationToken,
        ) -> Outcome {
            let (status, delay) = self
                .plan
                .get(&action.name)
                .copied()
                .unwrap_or((Status::Ok, 0));
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            match status {
                Status::Ok => Outcome::ok("executed successfully"),
                Status::Warn => Outcome::warn("warned"),
                Status::Error => Outcome::error("failed"),
                Status::Skipped => Outcome::skipped("skipped"),
            }
        }
    }

    async fn run(
        yaml: &str,
        plan: &[(&str, Status, u64)],
        ctx: VarContext,
    ) -> (StageRun, Vec<String>) {
        run_with_cancel(yaml, plan, ctx, &CancellationToken::new()).await
    }

    async fn run_with_cancel(
        yaml: &str,
        plan: &[(&str, Status, u64)],
        ctx: VarContext,
        cancel: &CancellationToken,
    ) -> (StageRun, Vec<String>) {
        let manifest = Manifest::load_from_str(yaml).unwrap();
        let sink = SharedSink::new();
        let reporter = Arc::new(Reporter::with_writer(0, false, Box::new(sink.clone())));
        let runner = Arc::new(Scripted::new(plan));
        let scheduler = Scheduler::new(&manifest, &ctx, runner, reporter);

        let run = scheduler.run_stage("pre-push", cancel).await.unwrap();

        // Step lines look like "{glyph} {name}: {message}"; filter the sink
        // down to the emitted step names in order.
        let step_names: Vec<String> = manifest.get_stage("pre-push").unwrap().steps
            .iter()
            .map(|s| s.action.clone())
            .collect();
        let emitted = sink
            .lines()
            .into_iter()
            .filter_map(|line| {
                let head = line.split_once(": ").map(|(head, _)| head)?;
                let name = head.split_whitespace().last()?.to_string();
                step_names.contains(&name).then_some(name)
            })
            .collect();

        (run, emitted)
    }

    const LINEAR: &str = r#"
project: { name: p }
actions:
  - { name: a, run: "true" }
  - { name: b, run: "true" }
  - { name: c, run: "true" }
stages:
  pre-push:
    steps:
      - action: a
      - action: b
        require: [a]
      - action: c
        require: [b]
"#;

    #[tokio::test]
    async fn linear_chain_all_ok() {
        let plan = [("a", Status::Ok, 0), ("b", Status::Ok, 0), ("c", Status::Ok, 0)];
        let (run, emitted) = run(LINEAR, &plan, VarContext::default()).await;

        assert_eq!(emitted, ["a", "b", "c"]);
        assert!(run.results.iter().all(|r| r.status == Status::Ok));
        assert_eq!(run.status, StageStatus::Ok);
    }

    const INDEPENDENT: &str = r#"
project: { name: p }
actions:
  - { name: a, run: "false" }
  - { name: b, run: "true" }
  - { name: c, run: "true" }
stages:
  pre-push:
    steps:
      - action: a
      - action: b
      - action: c
"#;

    #[tokio::test]
    async fn independent_failure_continues() {
        let plan = [("a", Status::Error, 0), ("b", Status::Ok, 0), ("c", Status::Ok, 0)];
        let (run, emitted) = run(INDEPENDENT, &plan, VarContext::default()).await;

        assert_eq!(emitted, ["a", "b", "c"]);
        let statuses: Vec<_> = run.results.iter().map(|r| r.status).collect();
        assert_eq!(statuses, [Status::Error, Status::Ok, Status::Ok]);
        assert_eq!(run.status, StageStatus::Error);
        assert_eq!(run.status.exit_code(), 1);
    }

    const FAN_OUT: &str = r#"
project: { name: p }
actions:
  - { name: a, run: "false" }
  - { name: b, run: "true" }
  - { name: c, run: "true" }
stages:
  pre-push:
    steps:
      - action: a
      - action: b
        require: [a]
      - action: c
        require: [a]
"#;

    #[tokio::test]
    async fn failure_skips_dependents() {
        let plan = [("a", Status::Error, 0)];
        let (run, emitted) = run(FAN_OUT, &plan, VarContext::default()).await;

        assert_eq!(emitted, ["a", "b", "c"]);
        let statuses: Vec<_> = run.results.iter().map(|r| r.status).collect();
        assert_eq!(statuses, [Status::Error, Status::Skipped, Status::Skipped]);
        assert_eq!(run.results[1].message, "skipped (dependency failed)");
        assert_eq!(run.status, StageStatus::Error);
    }

    #[tokio::test]
    async fn skip_propagation_is_transitive() {
        let plan = [("a", Status::Error, 0)];
        let (run, _) = run(LINEAR, &plan, VarContext::default()).await;

        let statuses: Vec<_> = run.results.iter().map(|r| r.status).collect();
        assert_eq!(statuses, [Status::Error, Status::Skipped, Status::Skipped]);
    }

    const WARN_POLICY: &str = r#"
project: { name: p }
actions:
  - { name: a, run: "false" }
  - { name: b, run: "true" }
stages:
  pre-push:
    steps:
      - action: a
        on_error: warn
      - action: b
        require: [a]
"#;

    #[tokio::test]
    async fn warn_policy_does_not_propagate() {
        let plan = [("a", Status::Error, 0), ("b", Status::Ok, 0)];
        let (run, _) = run(WARN_POLICY, &plan, VarContext::default()).await;

        let statuses: Vec<_> = run.results.iter().map(|r| r.status).collect();
        assert_eq!(statuses, [Status::Warn, Status::Ok]);
        assert_eq!(run.status, StageStatus::Warn);
        assert_eq!(run.status.exit_code(), 0);
    }

    #[tokio::test]
    async fn warn_status_from_runner_does_not_propagate() {
        let plan = [("a", Status::Warn, 0), ("b", Status::Ok, 0), ("c", Status::Ok, 0)];
        let (run, _) = run(LINEAR, &plan, VarContext::default()).await;

        let statuses: Vec<_> = run.results.iter().map(|r| r.status).collect();
        assert_eq!(statuses, [Status::Warn, Status::Ok, Status::Ok]);
    }

    const ONLY_RELEASE: &str = r#"
project: { name: p }
actions:
  - { name: a, run: "true" }
stages:
  pre-push:
    steps:
      - action: a
        only: [release]
"#;

    #[tokio::test]
    async fn only_gate_skips_on_other_version_kind() {
        let ctx = VarContext::from_pairs([("version.version-type", "prerelease")]);
        let (run, _) = run(ONLY_RELEASE, &[], ctx).await;

        assert_eq!(run.results[0].status, Status::Skipped);
        assert!(run.results[0].message.contains("release"));
        assert_eq!(run.status, StageStatus::Ok);
    }

    #[tokio::test]
    async fn only_gate_passes_on_matching_version_kind() {
        let ctx = VarContext::from_pairs([("version.version-type", "release")]);
        let (run, _) = run(ONLY_RELEASE, &[], ctx).await;

        assert_eq!(run.results[0].status, Status::Ok);
        assert_eq!(run.status, StageStatus::Ok);
    }

    const IF_GATED: &str = r#"
project: { name: p }
actions:
  - { name: a, run: "true" }
  - { name: b, run: "true" }
stages:
  pre-push:
    steps:
      - action: a
        if: "branch == 'main'"
      - action: b
        require: [a]
"#;

    #[tokio::test]
    async fn if_gate_skips_without_failing_dependents() {
        let ctx = VarContext::from_pairs([("branch", "develop")]);
        let (run, _) = run(IF_GATED, &[], ctx).await;

        let statuses: Vec<_> = run.results.iter().map(|r| r.status).collect();
        assert_eq!(statuses, [Status::Skipped, Status::Ok]);
        assert!(run.results[0].message.contains("condition not met"));
    }

    const PARALLEL: &str = r#"
project: { name: p }
actions:
  - { name: slow, run: "true" }
  - { name: fast, run: "true" }
stages:
  pre-push:
    steps:
      - action: slow
      - action: fast
"#;

    #[tokio::test]
    async fn out_of_order_completion_is_displayed_in_declaration_order() {
        // `fast` finishes first; its line must still come after `slow`'s.
        let plan = [("slow", Status::Ok, 80), ("fast", Status::Ok, 1)];
        let (run, emitted) = run(PARALLEL, &plan, VarContext::default()).await;

        assert_eq!(emitted, ["slow", "fast"]);
        assert_eq!(run.results.len(), 2);
    }

    #[tokio::test]
    async fn every_step_yields_exactly_one_result() {
        let plan = [("a", Status::Error, 5), ("b", Status::Ok, 1), ("c", Status::Ok, 10)];
        let (run, _) = run(INDEPENDENT, &plan, VarContext::default()).await;

        let mut names: Vec<_> = run.results.iter().map(|r| r.name.clone()).collect();
        names.sort();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn pre_cancelled_run_errors_every_step() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (run, _) =
            run_with_cancel(LINEAR, &[], VarContext::default(), &cancel).await;

        assert!(run.results.iter().all(|r| r.status == Status::Error));
        assert_eq!(run.status, StageStatus::Error);
    }

    #[tokio::test]
    async fn cycle_aborts_before_any_step() {
        let yaml = r#"
project: { name: p }
actions:
  - { name: a, run: "true" }
  - { name: b, run: "true" }
stages:
  pre-push:
    steps:
      - action: a
        require: [b]
      - action: b
        require: [a]
"#;
        let manifest = Manifest::load_from_str(yaml).unwrap();
        let ctx = VarContext::default();
        let sink = SharedSink::new();
        let reporter = Arc::new(Reporter::with_writer(0, false, Box::new(sink.clone())));
        let scheduler = Scheduler::new(&manifest, &ctx, Arc::new(Scripted::new(&[])), reporter);

        let err = scheduler
            .run_stage("pre-push", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("circular dependency"), "{err:#}");
        assert!(sink.lines().iter().all(|l| !l.contains("executed")));
    }

    #[tokio::test]
    async fn unknown_stage_is_an_error() {
        let manifest = Manifest::load_from_str(LINEAR).unwrap();
        let ctx = VarContext::default();
        let reporter = Arc::new(Reporter::with_writer(0, false, Box::new(std::io::sink())));
        let scheduler = Scheduler::new(&manifest, &ctx, Arc::new(Scripted::new(&[])), reporter);

        let err = scheduler
            .run_stage("deploy", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("stage not found"));
    }
}
