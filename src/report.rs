//! Report accumulation and rendering.
//!
//! A [`Report`] is an ordered log of `(verdict, message)` entries. Each leaf
//! test appends exactly one entry when it finishes running. Entries are
//! never reordered or deduplicated.
//!
//! The report is passed explicitly into every test run; there is no global
//! log.

pub mod junit;

use std::io::{self, Write};
use std::time::Duration;

pub use junit::write_junit;

/// One completed test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    /// Whether the test passed.
    pub passed: bool,

    /// Short identifier: the test name, or its command line.
    pub name: String,

    /// Full human-readable description of the run.
    pub message: String,

    /// Names of the enclosing groups joined with `/`, outermost first.
    pub group: Option<String>,

    /// Time the test took, including background setup and teardown.
    pub duration: Duration,
}

/// Ordered log of completed tests.
#[derive(Debug, Clone, Default)]
pub struct Report {
    entries: Vec<ReportEntry>,
    groups: Vec<String>,
}

impl Report {
    /// Creates an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry, attributing it to the currently open groups.
    pub fn record(
        &mut self,
        passed: bool,
        name: impl Into<String>,
        message: impl Into<String>,
        duration: Duration,
    ) {
        let group = if self.groups.is_empty() {
            None
        } else {
            Some(self.groups.join("/"))
        };

        self.entries.push(ReportEntry {
            passed,
            name: name.into(),
            message: message.into(),
            group,
            duration,
        });
    }

    /// Marks the start of a named group; entries recorded until the
    /// matching [`leave_group`](Self::leave_group) belong to it.
    pub fn enter_group(&mut self, name: impl Into<String>) {
        self.groups.push(name.into());
    }

    /// Closes the innermost open group.
    pub fn leave_group(&mut self) {
        self.groups.pop();
    }

    /// All entries in the order they were recorded.
    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    /// Number of recorded entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of passing entries.
    pub fn passed(&self) -> usize {
        self.entries.iter().filter(|e| e.passed).count()
    }

    /// Number of failing entries.
    pub fn failed(&self) -> usize {
        self.entries.iter().filter(|e| !e.passed).count()
    }

    /// Writes each message to `passing` or `failing` by its verdict.
    ///
    /// Order within each destination matches recording order.
    pub fn render<P: Write, F: Write>(&self, passing: &mut P, failing: &mut F) -> io::Result<()> {
        for entry in &self.entries {
            if entry.passed {
                writeln!(passing, "{}", entry.message)?;
                passing.flush()?;
            } else {
                writeln!(failing, "{}", entry.message)?;
                failing.flush()?;
            }
        }
        Ok(())
    }

    /// All messages joined by newlines, in recording order.
    pub fn to_text(&self) -> String {
        self.entries
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Closing banner for a run.
pub fn summary_banner(passed: bool) -> &'static str {
    if passed {
        "\n======\nAll tests passed :)\n======"
    } else {
        "\n======\nAt least one test failed :(\n======"
    }
}

/// Prints the final counts to the console with colour.
pub fn print_summary(report: &Report, passed: bool, duration: Duration) {
    println!();
    println!("Summary:");
    println!("  Total:   {}", report.len());
    println!("  Passed:  {}", console::style(report.passed()).green());
    println!("  Failed:  {}", console::style(report.failed()).red());
    println!("  Duration: {:?}", duration);

    println!();
    if passed {
        println!("{}", console::style("All tests passed :)").green().bold());
    } else {
        println!(
            "{}",
            console::style("At least one test failed :(").red().bold()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Report {
        let mut report = Report::new();
        report.record(true, "a", "first ok", Duration::ZERO);
        report.record(false, "b", "second bad", Duration::ZERO);
        report.record(true, "c", "third ok", Duration::ZERO);
        report.record(false, "d", "fourth bad", Duration::ZERO);
        report
    }

    #[test]
    fn test_render_splits_by_verdict_preserving_order() {
        let report = sample();
        let mut out = Vec::new();
        let mut err = Vec::new();
        report.render(&mut out, &mut err).unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "first ok\nthird ok\n");
        assert_eq!(String::from_utf8(err).unwrap(), "second bad\nfourth bad\n");
    }

    #[test]
    fn test_to_text_keeps_recording_order() {
        assert_eq!(
            sample().to_text(),
            "first ok\nsecond bad\nthird ok\nfourth bad"
        );
    }

    #[test]
    fn test_counts() {
        let report = sample();
        assert_eq!(report.len(), 4);
        assert_eq!(report.passed(), 2);
        assert_eq!(report.failed(), 2);
    }

    #[test]
    fn test_duplicate_entries_are_kept() {
        let mut report = Report::new();
        report.record(true, "same", "same", Duration::ZERO);
        report.record(true, "same", "same", Duration::ZERO);
        assert_eq!(report.len(), 2);
    }

    #[test]
    fn test_group_attribution() {
        let mut report = Report::new();
        report.record(true, "top", "top", Duration::ZERO);
        report.enter_group("local");
        report.enter_group("small");
        report.record(true, "inner", "inner", Duration::ZERO);
        report.leave_group();
        report.record(true, "outer", "outer", Duration::ZERO);
        report.leave_group();

        let groups: Vec<_> = report.entries().iter().map(|e| e.group.clone()).collect();
        assert_eq!(
            groups,
            vec![
                None,
                Some("local/small".to_string()),
                Some("local".to_string())
            ]
        );
    }

    #[test]
    fn test_summary_banner() {
        assert!(summary_banner(true).contains("All tests passed :)"));
        assert!(summary_banner(false).contains("At least one test failed :("));
    }
}
