//! Tests and their evaluation.
//!
//! # Architecture
//!
//! Every test implements [`Test`]: run itself, then report a verdict and a
//! description. There are two implementations:
//!
//! - [`ProcessTest`] - a leaf that runs one command and checks it against an
//!   [`Expectation`], optionally with background processes alive for the
//!   duration of the run
//! - [`TestGroup`] - an ordered composite whose verdict is the logical AND
//!   of its members
//!
//! ```text
//! Harness ──► TestGroup ──► TestGroup ──► ProcessTest ──► ProcessRunner
//!                 │                            │
//!                 └──────────► ProcessTest     └─► BackgroundSet
//!
//!   results flow back up as (verdict, description) entries in a Report
//! ```
//!
//! # Leaf Variants
//!
//! | Constructor | Checks |
//! |-------------|--------|
//! | [`ProcessTest::exit_code`] | exit code equals the expected code |
//! | [`ProcessTest::output`] | trimmed stdout equals the expected string |
//! | [`ProcessTest::with_background`] | same as output, with auxiliary processes |

pub mod group;

use std::time::Instant;

use async_trait::async_trait;
use tracing::info;

use crate::format::{format_call, quote, truncate_lines};
use crate::process::{BackgroundSet, Command, DrainedOutput, ProcessResult, ProcessRunner, WarmUp};
use crate::report::Report;

pub use group::TestGroup;

/// The unit of evaluation.
///
/// A test's verdict is only meaningful after [`run`](Self::run) completed.
/// Running a test again replaces everything captured by the previous run.
#[async_trait]
pub trait Test: Send {
    /// Runs the test, recording its outcome into `report`.
    ///
    /// Leaf tests record exactly one entry per run. Composite tests let
    /// their members record their own entries.
    async fn run(&mut self, runner: &ProcessRunner, report: &mut Report);

    /// Human-readable description of the last run.
    fn describe(&self) -> String;

    /// Whether the last run passed.
    fn verdict(&self) -> bool;
}

/// What a [`ProcessTest`] compares its result against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    /// The process must exit with exactly this code.
    ExitCode(i32),

    /// Standard output, with surrounding whitespace trimmed, must equal
    /// this string exactly. Stored already trimmed.
    Output(String),
}

impl Expectation {
    /// Output expectation; surrounding whitespace is trimmed once here.
    pub fn output(expected: impl AsRef<str>) -> Self {
        Expectation::Output(expected.as_ref().trim().to_string())
    }

    /// Evaluates a captured result against this expectation.
    ///
    /// A process that never started never satisfies an expectation.
    pub fn matches(&self, result: &ProcessResult) -> bool {
        if !result.launched() {
            return false;
        }

        match self {
            Expectation::ExitCode(expected) => result.exit_code == Some(*expected),
            Expectation::Output(expected) => result.stdout.trim() == expected,
        }
    }
}

/// Which captured streams appear in descriptions, and how much of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayOptions {
    /// Append captured stdout to exit-code descriptions.
    pub show_stdout: bool,

    /// Include captured stderr in descriptions.
    pub show_stderr: bool,

    /// Maximum number of lines of captured text shown per stream.
    ///
    /// `None` shows everything. Never affects the verdict.
    pub truncate_lines: Option<usize>,
}

/// Everything captured by one run of a [`ProcessTest`].
#[derive(Debug, Clone)]
struct Outcome {
    result: ProcessResult,
    background_failures: Vec<String>,
    background: Vec<DrainedOutput>,
}

/// A leaf test backed by one command.
///
/// Behaviour is composed from an [`Expectation`] strategy and an optional
/// list of background commands rather than a type hierarchy.
///
/// # Example
///
/// ```no_run
/// use proctest::check::{ProcessTest, Test};
/// use proctest::process::{Command, ProcessRunner};
/// use proctest::report::Report;
///
/// #[tokio::main]
/// async fn main() {
///     let runner = ProcessRunner::in_current_dir();
///     let mut report = Report::new();
///
///     let mut test = ProcessTest::output(Command::new("echo").arg("hello"), "hello");
///     test.run(&runner, &mut report).await;
///     assert!(test.verdict());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ProcessTest {
    command: Command,
    expectation: Expectation,
    background: Vec<Command>,
    name: Option<String>,
    display: DisplayOptions,
    warmup: WarmUp,
    outcome: Option<Outcome>,
}

impl ProcessTest {
    /// A test that passes when `command` exits with `expected`.
    pub fn exit_code(command: Command, expected: i32) -> Self {
        Self::new(command, Expectation::ExitCode(expected))
    }

    /// A test that passes when `command` prints `expected`.
    ///
    /// Both sides are compared after trimming surrounding whitespace;
    /// internal whitespace and line breaks are significant.
    pub fn output(command: Command, expected: impl AsRef<str>) -> Self {
        Self::new(command, Expectation::output(expected))
    }

    /// A test with an explicit expectation strategy.
    pub fn new(command: Command, expectation: Expectation) -> Self {
        Self {
            command,
            expectation,
            background: Vec::new(),
            name: None,
            display: DisplayOptions::default(),
            warmup: WarmUp::default(),
            outcome: None,
        }
    }

    /// Sets the display name used in place of the command line.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Starts `commands` in the background around every run.
    pub fn with_background(mut self, commands: impl IntoIterator<Item = Command>) -> Self {
        self.background.extend(commands);
        self
    }

    /// Sets how captured text is displayed.
    pub fn with_display(mut self, display: DisplayOptions) -> Self {
        self.display = display;
        self
    }

    /// Sets the warm-up policy used after starting background processes.
    pub fn with_warmup(mut self, warmup: WarmUp) -> Self {
        self.warmup = warmup;
        self
    }

    /// The primary command.
    pub fn command(&self) -> &Command {
        &self.command
    }

    /// The expectation strategy.
    pub fn expectation(&self) -> &Expectation {
        &self.expectation
    }

    /// The background commands, in declaration order.
    pub fn background(&self) -> &[Command] {
        &self.background
    }

    /// Name shown in reports: the explicit name, or the command line.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format_call(&self.command))
    }

    /// The captured result of the last run.
    pub fn result(&self) -> Option<&ProcessResult> {
        self.outcome.as_ref().map(|o| &o.result)
    }

    /// What was drained from each background process in the last run.
    pub fn background_outcomes(&self) -> &[DrainedOutput] {
        self.outcome
            .as_ref()
            .map(|o| o.background.as_slice())
            .unwrap_or(&[])
    }

    /// Runs the primary command, with background processes around it.
    ///
    /// Background processes are killed and drained after the primary
    /// command returns, whatever its outcome.
    async fn capture(&self, runner: &ProcessRunner) -> Outcome {
        if self.background.is_empty() {
            return Outcome {
                result: runner.execute(&self.command).await,
                background_failures: Vec::new(),
                background: Vec::new(),
            };
        }

        let mut background = BackgroundSet::start(runner, &self.background);
        self.warmup.wait().await;

        info!("Running solution: {}", self.display_name());
        let result = runner.execute(&self.command).await;
        info!("Solution finished.");

        let drained = background.shutdown().await;
        Outcome {
            result,
            background_failures: background.failures().to_vec(),
            background: drained,
        }
    }

    fn describe_exit_code(&self, expected: i32, outcome: &Outcome) -> String {
        let result = &outcome.result;
        let observed = match (&result.launch_error, result.exit_code) {
            (Some(error), _) => quote(error),
            (None, Some(code)) => code.to_string(),
            (None, None) => "nothing".to_string(),
        };

        let mut text = format!(
            "$ {} #- exited with {} (expected {})",
            format_call(&self.command),
            observed,
            expected
        );

        if self.display.show_stdout && !result.stdout.is_empty() {
            text.push('\n');
            text.push_str(&truncate_lines(&result.stdout, self.display.truncate_lines));
        }
        if self.display.show_stderr && !result.stderr.is_empty() {
            text.push('\n');
            text.push_str(&truncate_lines(&result.stderr, self.display.truncate_lines));
        }

        text
    }

    fn describe_output(&self, expected: &str, outcome: &Outcome) -> String {
        let result = &outcome.result;
        let title = match &self.name {
            Some(name) => name.clone(),
            None => format!("$ {}", format_call(&self.command)),
        };

        let mut text = format!("{}\n", title);

        if self.display.show_stderr && !result.stderr.is_empty() {
            text.push_str(&truncate_lines(&result.stderr, self.display.truncate_lines));
            text.push('\n');
        }

        match &result.launch_error {
            None => text.push_str(&format!("received: {}", quote(result.stdout.trim()))),
            Some(error) => text.push_str(error),
        }

        let tag = if self.expectation.matches(result) {
            "passed :)"
        } else {
            "failed :("
        };
        text.push_str(&format!(
            "\nexpected: {}\n--> This test {}",
            quote(expected),
            tag
        ));

        text
    }
}

#[async_trait]
impl Test for ProcessTest {
    async fn run(&mut self, runner: &ProcessRunner, report: &mut Report) {
        let start = Instant::now();
        self.outcome = None;

        let outcome = self.capture(runner).await;
        self.outcome = Some(outcome);

        report.record(
            self.verdict(),
            self.display_name(),
            self.describe(),
            start.elapsed(),
        );
    }

    fn describe(&self) -> String {
        let Some(outcome) = &self.outcome else {
            return format!("{} (not run)", self.display_name());
        };

        let mut text = match &self.expectation {
            Expectation::ExitCode(expected) => self.describe_exit_code(*expected, outcome),
            Expectation::Output(expected) => self.describe_output(expected, outcome),
        };

        for failure in &outcome.background_failures {
            text.push_str(&format!("\nbackground job failed to start: {}", failure));
        }

        text
    }

    fn verdict(&self) -> bool {
        self.outcome
            .as_ref()
            .is_some_and(|o| self.expectation.matches(&o.result))
    }
}
