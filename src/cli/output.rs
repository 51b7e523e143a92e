//! Line-oriented reporter
//!
//! The engine's output contract: a header line, a project "checking" line,
//! one status line per step in declaration order, a stage result line, and a
//! final summary. Styling is console-based with ASCII fallbacks; diagnostics
//! go to stderr.

use crate::engine::{StageStatus, Status, StepResult};
use console::{Emoji, style};
use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

const OK: Emoji = Emoji("✔", "+");
const WARN: Emoji = Emoji("⚠", "!");
const ERROR: Emoji = Emoji("✖", "x");
const SKIPPED: Emoji = Emoji("◌", "-");
const STAGE: Emoji = Emoji("🚀", ">>");
const CHECKING: Emoji = Emoji("🔍", "::");
const SUMMARY: Emoji = Emoji("📊", "##");

pub struct Reporter {
    verbose: u8,
    debug: bool,
    out: Mutex<Box<dyn Write + Send>>,
}

impl Reporter {
    pub fn new(verbose: u8, debug: bool) -> Self {
        Self::with_writer(verbose, debug, Box::new(std::io::stdout()))
    }

    /// Builds a reporter over an arbitrary writer. Used by tests to capture
    /// emission order.
    pub fn with_writer(verbose: u8, debug: bool, writer: Box<dyn Write + Send>) -> Self {
        Reporter {
            verbose,
            debug,
            out: Mutex::new(writer),
        }
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose > 0
    }

    pub fn verbose_level(&self) -> u8 {
        self.verbose
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    fn writeln(&self, line: String) {
        let Ok(mut out) = self.out.lock() else {
            return;
        };
        let _ = writeln!(out, "{line}");
        let _ = out.flush();
    }

    /// Header line: binary name and version.
    pub fn cli_header(&self, name: &str, version: &str) {
        self.writeln(format!(
            "{} {}",
            style(name).cyan().bold(),
            style(version).dim()
        ));
    }

    /// Checking line: project name and project version.
    pub fn project_check(&self, project: &str, version: &str) {
        self.writeln(format!(
            "{CHECKING} checking {} {}",
            style(project).bold(),
            style(version).dim()
        ));
    }

    pub fn stage_header(&self, stage: &str) {
        self.writeln(format!("{STAGE} {}", style(format!("running stage: {stage}")).cyan()));
    }

    /// One status line per step, in declaration order.
    pub fn step_status(&self, result: &StepResult) {
        let line = match result.status {
            Status::Ok => format!(
                "{} {}: {}",
                style(OK).green().bold(),
                result.name,
                result.message
            ),
            Status::Warn => format!(
                "{} {}: {}",
                style(WARN).yellow().bold(),
                result.name,
                style(&result.message).yellow()
            ),
            Status::Error => format!(
                "{} {}: {}",
                style(ERROR).red().bold(),
                result.name,
                style(&result.message).red()
            ),
            Status::Skipped => format!(
                "{} {}: {}",
                style(SKIPPED).dim(),
                result.name,
                style(&result.message).dim()
            ),
        };
        self.writeln(line);
    }

    pub fn stage_result(&self, stage: &str, status: StageStatus, duration: Duration) {
        if status.is_success() {
            self.writeln(format!(
                "{} stage '{stage}' completed in {duration:.2?}",
                style(OK).green().bold()
            ));
        } else {
            self.writeln(format!(
                "{} stage '{stage}' failed after {duration:.2?}",
                style(ERROR).red().bold()
            ));
        }
    }

    /// Final summary: per-status counts and an aggregate verdict.
    pub fn summary(&self, results: &[StepResult]) {
        let count = |status: Status| results.iter().filter(|r| r.status == status).count();
        let (ok, warn, error, skipped) = (
            count(Status::Ok),
            count(Status::Warn),
            count(Status::Error),
            count(Status::Skipped),
        );

        self.writeln(format!("{SUMMARY} summary:"));
        self.writeln(format!("   {} OK: {ok}", style(OK).green()));
        self.writeln(format!("   {} WARN: {warn}", style(WARN).yellow()));
        self.writeln(format!("   {} ERROR: {error}", style(ERROR).red()));
        self.writeln(format!("   {} SKIPPED: {skipped}", style(SKIPPED).dim()));

        if error > 0 {
            self.writeln(format!(
                "{}",
                style("some checks failed, fix the issues above before pushing").red()
            ));
        } else if warn > 0 {
            self.writeln(format!(
                "{}",
                style("some checks produced warnings, review the output above").yellow()
            ));
        } else {
            self.writeln(format!("{}", style("all checks passed").green()));
        }
    }

    /// Echoes a command about to run. Verbose mode only.
    pub fn command(&self, command: &str) {
        if self.is_verbose() {
            self.writeln(format!("{} {command}", style("running:").dim()));
        }
    }

    /// Echoes captured command output. Verbose mode only.
    pub fn command_output(&self, output: &str) {
        if self.is_verbose() && !output.is_empty() {
            self.writeln(format!("{}\n{output}", style("output:").dim()));
        }
    }

    pub fn info(&self, message: &str) {
        self.writeln(format!("{} {message}", style("ℹ").blue().bold()));
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {message}", style(ERROR).red().bold());
    }

    /// Diagnostic line to stderr, only when debug is enabled.
    pub fn debug(&self, message: &str) {
        if self.debug {
            eprintln!("DEBUG: {message}");
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::SharedSink;
    use super::*;

    fn result(name: &str, status: Status) -> StepResult {
        StepResult {
            name: name.to_string(),
            status,
            message: "msg".to_string(),
            duration: Duration::ZERO,
        }
    }

    #[test]
    fn step_lines_carry_name_and_message() {
        let sink = SharedSink::new();
        let reporter = Reporter::with_writer(0, false, Box::new(sink.clone()));
        reporter.step_status(&result("check-fmt", Status::Ok));

        let lines = sink.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("check-fmt: msg"), "{}", lines[0]);
    }

    #[test]
    fn summary_counts_every_status() {
        let sink = SharedSink::new();
        let reporter = Reporter::with_writer(0, false, Box::new(sink.clone()));
        reporter.summary(&[
            result("a", Status::Ok),
            result("b", Status::Warn),
            result("c", Status::Error),
            result("d", Status::Skipped),
        ]);

        let text = sink.lines().join("\n");
        assert!(text.contains("OK: 1"));
        assert!(text.contains("WARN: 1"));
        assert!(text.contains("ERROR: 1"));
        assert!(text.contains("SKIPPED: 1"));
        assert!(text.contains("some checks failed"));
    }

    #[test]
    fn command_echo_requires_verbose() {
        let sink = SharedSink::new();
        let reporter = Reporter::with_writer(0, false, Box::new(sink.clone()));
        reporter.command("echo hidden");
        assert!(sink.lines().is_empty());

        let sink = SharedSink::new();
        let reporter = Reporter::with_writer(1, false, Box::new(sink.clone()));
        reporter.command("echo shown");
        assert_eq!(sink.lines().len(), 1);
    }
}
