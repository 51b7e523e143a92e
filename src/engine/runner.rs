//! Action runner seam
//!
//! The scheduler executes every node through [`ActionRunner`], so a host can
//! substitute its own runner. [`DefaultRunner`] interpolates and executes
//! shell actions via `sh -c` and dispatches `uses:` identifiers through the
//! built-in registry.

use super::uses::UsesRegistry;
use super::Outcome;
use crate::cli::output::Reporter;
use crate::manifest::{Action, ActionKind};
use crate::vars::VarContext;
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Executes one action and reports its outcome. Implementations must honor
/// cancellation by terminating any subprocess they started.
#[async_trait]
pub trait ActionRunner: Send + Sync {
    async fn run(&self, action: &Action, ctx: &VarContext, cancel: &CancellationToken) -> Outcome;
}

pub struct DefaultRunner {
    registry: UsesRegistry,
    reporter: Option<Arc<Reporter>>,
}

impl DefaultRunner {
    pub fn new() -> Self {
        DefaultRunner {
            registry: UsesRegistry::new(),
            reporter: None,
        }
    }

    /// Attaches a reporter for verbose command and output echoing.
    pub fn with_reporter(reporter: Arc<Reporter>) -> Self {
        DefaultRunner {
            registry: UsesRegistry::new(),
            reporter: Some(reporter),
        }
    }

    pub fn registry(&self) -> &UsesRegistry {
        &self.registry
    }

    async fn run_shell(
        &self,
        script: &str,
        ctx: &VarContext,
        cancel: &CancellationToken,
    ) -> Outcome {
        let script = match ctx.interpolate(script) {
            Ok(script) => script,
            Err(e) => return Outcome::error(e.to_string()),
        };

        if let Some(reporter) = &self.reporter {
            reporter.command(&script);
        }

        let mut command = Command::new("sh");
        command
            .args(["-c", &script])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => return Outcome::error(format!("failed to spawn shell: {e}")),
        };

        let output = tokio::select! {
            output = child.wait_with_output() => match output {
                Ok(output) => output,
                Err(e) => return Outcome::error(format!("failed to run command: {e}")),
            },
            _ = cancel.cancelled() => return Outcome::error("cancelled"),
        };

        if let Some(reporter) = &self.reporter {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            reporter.command_output(&combined);
        }

        if output.status.success() {
            Outcome::ok("executed successfully")
        } else {
            Outcome::error(format!("command failed, to debug run:\n     {script}"))
        }
    }

    async fn run_uses(&self, id: &str, cancel: &CancellationToken) -> Outcome {
        match self.registry.get(id) {
            Some(runner) => runner.run(cancel).await,
            None => Outcome::error(format!("unknown built-in action: {id}")),
        }
    }
}

impl Default for DefaultRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ActionRunner for DefaultRunner {
    async fn run(&self, action: &Action, ctx: &VarContext, cancel: &CancellationToken) -> Outcome {
        match action.kind() {
            Ok(ActionKind::Run(script)) => self.run_shell(script, ctx, cancel).await,
            Ok(ActionKind::Uses(id)) => self.run_uses(id, cancel).await,
            Err(e) => Outcome::error(e.to_string()),
        }
    }
}
