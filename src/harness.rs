//! Top-level driver.
//!
//! A [`Harness`] runs its groups strictly one after another against a single
//! shared [`Report`], then folds the group verdicts into one boolean. Every
//! group runs, even after an earlier one failed.
//!
//! An optional [`BuildStep`] runs first, on the host even when a container
//! wrapper is configured. Its failure is fatal: the harness returns
//! [`HarnessError::Build`] and no test is executed.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::check::{Test, TestGroup};
use crate::format::truncate_lines;
use crate::process::{Command, ProcessRunner};
use crate::report::{Report, summary_banner};

/// Errors that stop a harness run before any test executes.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// The build command could not be started or exited non-zero.
    #[error("Build failed: {0}")]
    Build(String),

    /// The build ran but an expected artifact is missing.
    #[error("Build artifact missing: {}", .0.display())]
    MissingArtifact(PathBuf),
}

/// A command that produces the artifacts the tests need.
#[derive(Debug, Clone)]
pub struct BuildStep {
    /// Command to run.
    pub command: Command,

    /// Paths, relative to the working directory, that must exist afterwards.
    pub artifacts: Vec<PathBuf>,
}

impl BuildStep {
    /// Runs the build and checks its artifacts.
    pub async fn run(&self, runner: &ProcessRunner) -> Result<(), HarnessError> {
        info!("Building with: {}", self.command.to_shell_string());
        let result = runner.execute(&self.command).await;

        if let Some(error) = result.launch_error {
            return Err(HarnessError::Build(error));
        }

        if !result.success() {
            return Err(HarnessError::Build(format!(
                "`{}` exited with {}\n\tstdout: {}\n\tstderr: {}",
                self.command.to_shell_string(),
                result.exit_code.unwrap_or(-1),
                truncate_lines(&result.stdout, Some(50)),
                truncate_lines(&result.stderr, Some(50)),
            )));
        }

        for artifact in &self.artifacts {
            let path = runner.working_dir().join(artifact);
            if !path.exists() {
                return Err(HarnessError::MissingArtifact(path));
            }
        }

        Ok(())
    }
}

/// The result of a complete harness run.
#[derive(Debug, Clone)]
pub struct HarnessOutcome {
    /// `true` iff every top-level group passed.
    pub passed: bool,

    /// Every completed test, in execution order.
    pub report: Report,

    /// Wall-clock duration of the run.
    pub duration: Duration,
}

impl HarnessOutcome {
    /// The full report text followed by the pass/fail banner.
    ///
    /// Together with [`passed`](Self::passed) this is the `(bool, text)`
    /// pair handed to grading platforms. It contains no timing data, so the
    /// same test definitions and program behaviour always produce the same
    /// text.
    pub fn summary(&self) -> String {
        format!("{}{}", self.report.to_text(), summary_banner(self.passed))
    }

    /// Process exit code: 0 when everything passed, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.passed { 0 } else { 1 }
    }
}

/// Drives a fixed sequence of test groups.
///
/// # Example
///
/// ```no_run
/// use proctest::check::{ProcessTest, TestGroup};
/// use proctest::harness::Harness;
/// use proctest::process::{Command, ProcessRunner};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let harness = Harness::new(ProcessRunner::in_current_dir()).group(
///         TestGroup::named("local")
///             .with_test(ProcessTest::output(Command::new("echo").arg("hello"), "hello")),
///     );
///
///     let outcome = harness.run().await?;
///     println!("{}", outcome.summary());
///     std::process::exit(outcome.exit_code());
/// }
/// ```
pub struct Harness {
    runner: ProcessRunner,
    build: Option<BuildStep>,
    groups: Vec<TestGroup>,
}

impl Harness {
    /// Creates a harness that runs every command through `runner`.
    pub fn new(runner: ProcessRunner) -> Self {
        Self {
            runner,
            build: None,
            groups: Vec::new(),
        }
    }

    /// Runs `build` before any test.
    pub fn with_build(mut self, build: BuildStep) -> Self {
        self.build = Some(build);
        self
    }

    /// Appends a top-level group.
    pub fn group(mut self, group: TestGroup) -> Self {
        self.groups.push(group);
        self
    }

    /// The runner shared by every test.
    pub fn runner(&self) -> &ProcessRunner {
        &self.runner
    }

    /// Runs the build step, then every group in order.
    pub async fn run(mut self) -> Result<HarnessOutcome, HarnessError> {
        let start = Instant::now();

        if let Some(build) = &self.build {
            build.run(&self.runner.host()).await?;
        }

        let mut report = Report::new();
        let mut passed = true;

        for group in &mut self.groups {
            group.run(&self.runner, &mut report).await;
            let group_passed = group.verdict();
            if !group_passed {
                warn!("{}", group.describe());
            }
            passed &= group_passed;
        }

        info!(
            "Harness finished: {} passed, {} failed",
            report.passed(),
            report.failed()
        );

        Ok(HarnessOutcome {
            passed,
            report,
            duration: start.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::ProcessTest;

    fn runner() -> ProcessRunner {
        ProcessRunner::new(std::env::temp_dir())
    }

    #[tokio::test]
    async fn test_all_groups_run_and_verdict_is_and() {
        let harness = Harness::new(runner())
            .group(
                TestGroup::named("first")
                    .with_test(ProcessTest::exit_code(Command::new("false"), 0)),
            )
            .group(
                TestGroup::named("second")
                    .with_test(ProcessTest::output(Command::new("echo").arg("ok"), "ok")),
            );

        let outcome = harness.run().await.unwrap();

        assert!(!outcome.passed);
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(outcome.report.len(), 2);
        assert!(!outcome.report.entries()[0].passed);
        assert!(outcome.report.entries()[1].passed);
    }

    #[tokio::test]
    async fn test_no_groups_passes() {
        let outcome = Harness::new(runner()).run().await.unwrap();

        assert!(outcome.passed);
        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(
            outcome.summary(),
            "\n======\nAll tests passed :)\n======"
        );
    }

    #[tokio::test]
    async fn test_summary_is_deterministic() {
        let make = || {
            Harness::new(runner()).group(
                TestGroup::named("g")
                    .with_test(ProcessTest::output(Command::new("echo").arg("a"), "a"))
                    .with_test(ProcessTest::output(Command::new("echo").arg("b"), "c")),
            )
        };

        let first = make().run().await.unwrap();
        let second = make().run().await.unwrap();

        assert_eq!(first.summary(), second.summary());
        assert!(first.summary().ends_with("At least one test failed :(\n======"));
    }

    #[tokio::test]
    async fn test_build_failure_is_fatal() {
        let harness = Harness::new(runner())
            .with_build(BuildStep {
                command: Command::new("sh").args(["-c", "echo broken >&2; exit 1"]),
                artifacts: Vec::new(),
            })
            .group(TestGroup::new().with_test(ProcessTest::exit_code(Command::new("true"), 0)));

        let err = harness.run().await.err().expect("build should fail");
        assert!(matches!(&err, HarnessError::Build(msg) if msg.contains("broken")));
    }

    #[tokio::test]
    async fn test_build_missing_binary_is_fatal() {
        let harness = Harness::new(runner()).with_build(BuildStep {
            command: Command::new("/no/such/gradlew"),
            artifacts: Vec::new(),
        });

        assert!(matches!(harness.run().await, Err(HarnessError::Build(_))));
    }

    #[tokio::test]
    async fn test_build_checks_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::new(dir.path());

        let build = BuildStep {
            command: Command::new("touch").arg("app.jar"),
            artifacts: vec![PathBuf::from("app.jar")],
        };
        assert!(build.run(&runner).await.is_ok());

        let build = BuildStep {
            command: Command::new("true"),
            artifacts: vec![PathBuf::from("missing.jar")],
        };
        assert!(matches!(
            build.run(&runner).await,
            Err(HarnessError::MissingArtifact(_))
        ));
    }
}
