//! JUnit XML export of a [`Report`].
//!
//! Grading platforms and CI systems understand JUnit XML, so a finished
//! report can be written out in that format next to the plain-text log.
//! Each group becomes a `<testsuite>`; entries outside any group land in a
//! suite named after the harness.
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <testsuites name="proctest" tests="2" failures="1" time="1.234">
//!   <testsuite name="local" tests="2" failures="1" timestamp="...">
//!     <testcase classname="local" name="small1" time="0.100"/>
//!     <testcase classname="local" name="small2" time="0.150">
//!       <failure message="test failed">small2
//! received: "nope"
//! expected: "ok"
//! --> This test failed :(</failure>
//!     </testcase>
//!   </testsuite>
//! </testsuites>
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use super::{Report, ReportEntry};

/// Renders `report` as a JUnit XML document.
pub fn generate_xml(report: &Report, suite_name: &str, duration: Duration) -> anyhow::Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut testsuites = BytesStart::new("testsuites");
    testsuites.push_attribute(("name", suite_name));
    testsuites.push_attribute(("tests", report.len().to_string().as_str()));
    testsuites.push_attribute(("failures", report.failed().to_string().as_str()));
    testsuites.push_attribute(("time", format!("{:.3}", duration.as_secs_f64()).as_str()));
    writer.write_event(Event::Start(testsuites))?;

    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string();
    for (name, entries) in suites(report, suite_name) {
        let failures = entries.iter().filter(|e| !e.passed).count();
        let time: Duration = entries.iter().map(|e| e.duration).sum();

        let mut testsuite = BytesStart::new("testsuite");
        testsuite.push_attribute(("name", name.as_str()));
        testsuite.push_attribute(("tests", entries.len().to_string().as_str()));
        testsuite.push_attribute(("failures", failures.to_string().as_str()));
        testsuite.push_attribute(("errors", "0"));
        testsuite.push_attribute(("time", format!("{:.3}", time.as_secs_f64()).as_str()));
        testsuite.push_attribute(("timestamp", timestamp.as_str()));
        writer.write_event(Event::Start(testsuite))?;

        for entry in entries {
            write_testcase(&mut writer, &name, entry)?;
        }

        writer.write_event(Event::End(BytesEnd::new("testsuite")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("testsuites")))?;

    let xml = String::from_utf8(writer.into_inner())?;
    Ok(xml)
}

/// Writes the JUnit XML for `report` to `path`, creating parent directories.
pub fn write_junit(
    report: &Report,
    path: &Path,
    suite_name: &str,
    duration: Duration,
) -> anyhow::Result<()> {
    let xml = generate_xml(report, suite_name, duration)?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    std::fs::write(path, xml)
        .with_context(|| format!("Failed to write JUnit XML to {}", path.display()))?;
    tracing::info!("JUnit XML written to: {}", path.display());
    Ok(())
}

/// Groups entries into suites, keeping first-appearance order.
fn suites<'a>(report: &'a Report, default_name: &str) -> Vec<(String, Vec<&'a ReportEntry>)> {
    let mut suites: Vec<(String, Vec<&ReportEntry>)> = Vec::new();

    for entry in report.entries() {
        let name = entry.group.as_deref().unwrap_or(default_name);
        match suites.iter_mut().find(|(n, _)| n == name) {
            Some((_, entries)) => entries.push(entry),
            None => suites.push((name.to_string(), vec![entry])),
        }
    }

    suites
}

fn write_testcase<W: std::io::Write>(
    writer: &mut Writer<W>,
    classname: &str,
    entry: &ReportEntry,
) -> anyhow::Result<()> {
    let mut testcase = BytesStart::new("testcase");
    testcase.push_attribute(("classname", classname));
    testcase.push_attribute(("name", strip_invalid(&entry.name).as_str()));
    testcase.push_attribute((
        "time",
        format!("{:.3}", entry.duration.as_secs_f64()).as_str(),
    ));

    if entry.passed {
        writer.write_event(Event::Empty(testcase))?;
        return Ok(());
    }

    writer.write_event(Event::Start(testcase))?;

    let mut failure = BytesStart::new("failure");
    failure.push_attribute(("message", "test failed"));
    writer.write_event(Event::Start(failure))?;
    writer.write_event(Event::Text(BytesText::new(&strip_invalid(&entry.message))))?;
    writer.write_event(Event::End(BytesEnd::new("failure")))?;

    writer.write_event(Event::End(BytesEnd::new("testcase")))?;
    Ok(())
}

/// Removes characters that are not allowed in XML 1.0 documents.
///
/// Escaping of `<`, `&` and quotes is done by quick-xml itself.
fn strip_invalid(s: &str) -> String {
    s.chars()
        .filter(|c| matches!(c, '\t' | '\n' | '\r' | ' '..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Report {
        let mut report = Report::new();
        report.record(true, "top", "$ true", Duration::from_millis(5));
        report.enter_group("local");
        report.record(true, "small1", "small1 ok", Duration::from_millis(100));
        report.record(
            false,
            "small2",
            "small2\nreceived: \"<nope>\"\nexpected: \"ok\"",
            Duration::from_millis(150),
        );
        report.leave_group();
        report
    }

    #[test]
    fn test_generate_xml_structure() {
        let xml = generate_xml(&sample(), "proctest", Duration::from_secs(1)).unwrap();

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<testsuites name=\"proctest\" tests=\"3\" failures=\"1\""));
        assert!(xml.contains("<testsuite name=\"proctest\" tests=\"1\" failures=\"0\""));
        assert!(xml.contains("<testsuite name=\"local\" tests=\"2\" failures=\"1\""));
        assert!(xml.contains("<testcase classname=\"local\" name=\"small1\" time=\"0.100\"/>"));
        assert!(xml.contains("<failure message=\"test failed\">"));
    }

    #[test]
    fn test_generate_xml_escapes_text() {
        let xml = generate_xml(&sample(), "proctest", Duration::ZERO).unwrap();
        assert!(xml.contains("&lt;nope&gt;"));
        assert!(!xml.contains("<nope>"));
    }

    #[test]
    fn test_strip_invalid() {
        assert_eq!(strip_invalid("ok\u{0}\u{1}\tdone"), "ok\tdone");
    }

    #[test]
    fn test_write_junit_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results/nested/junit.xml");

        write_junit(&sample(), &path, "proctest", Duration::ZERO).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("<testsuites"));
    }
}
