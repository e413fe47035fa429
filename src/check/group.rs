//! Composite tests.

use async_trait::async_trait;
use tracing::info;

use super::Test;
use crate::process::ProcessRunner;
use crate::report::Report;

/// An ordered collection of tests that reports as a single test.
///
/// Every member runs, in declaration order, even after an earlier member
/// failed, so the report collects all diagnostics. The group's verdict is
/// the logical AND of its members' verdicts; an empty group passes.
///
/// Groups nest: a member may itself be a `TestGroup`.
///
/// # Example
///
/// ```no_run
/// use proctest::check::{ProcessTest, Test, TestGroup};
/// use proctest::process::{Command, ProcessRunner};
/// use proctest::report::Report;
///
/// # async fn example() {
/// let mut group = TestGroup::named("smoke")
///     .with_test(ProcessTest::exit_code(Command::new("true"), 0))
///     .with_test(ProcessTest::output(Command::new("echo").arg("hi"), "hi"));
///
/// let mut report = Report::new();
/// group.run(&ProcessRunner::in_current_dir(), &mut report).await;
/// assert_eq!(report.len(), 2);
/// # }
/// ```
#[derive(Default)]
pub struct TestGroup {
    name: Option<String>,
    tests: Vec<Box<dyn Test>>,
}

impl TestGroup {
    /// Creates an unnamed, empty group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty group with a name.
    ///
    /// The name is attributed to every entry the members record.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            tests: Vec::new(),
        }
    }

    /// Appends a member test.
    pub fn with_test<T: Test + 'static>(mut self, test: T) -> Self {
        self.tests.push(Box::new(test));
        self
    }

    /// Appends an already boxed member test.
    pub fn push(&mut self, test: Box<dyn Test>) {
        self.tests.push(test);
    }

    /// The group name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Number of direct members.
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    /// Returns `true` if the group has no members.
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}

#[async_trait]
impl Test for TestGroup {
    async fn run(&mut self, runner: &ProcessRunner, report: &mut Report) {
        if let Some(name) = &self.name {
            info!("Running group {} ({} tests)", name, self.tests.len());
            report.enter_group(name.clone());
        }

        for test in &mut self.tests {
            test.run(runner, report).await;
        }

        if self.name.is_some() {
            report.leave_group();
        }
    }

    fn describe(&self) -> String {
        let passed = self.tests.iter().filter(|t| t.verdict()).count();
        format!(
            "{}: {}/{} passed",
            self.name.as_deref().unwrap_or("group"),
            passed,
            self.tests.len()
        )
    }

    fn verdict(&self) -> bool {
        self.tests.iter().all(|t| t.verdict())
    }
}
