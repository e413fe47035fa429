//! Display helpers shared by test descriptions.
//!
//! Nothing in here influences a verdict. These functions only shape the
//! diagnostic text that ends up in the [`Report`](crate::report::Report).

use crate::process::Command;

/// Marker appended after text that was cut short by [`truncate_lines`].
pub const TRUNCATION_MARKER: &str = "[OUTPUT TRUNCATED]";

/// Limits `text` to its first `max_lines` lines.
///
/// Lines are split on `\n`. When the text has more lines than the limit,
/// the first `max_lines` lines are kept, followed by an empty line and
/// [`TRUNCATION_MARKER`]. Text within the limit (or with no limit) is
/// returned unchanged.
///
/// # Example
///
/// ```
/// use proctest::format::truncate_lines;
///
/// assert_eq!(truncate_lines("a\nb\nc", Some(2)), "a\nb\n\n[OUTPUT TRUNCATED]");
/// assert_eq!(truncate_lines("a\nb", Some(2)), "a\nb");
/// assert_eq!(truncate_lines("a\nb\nc", None), "a\nb\nc");
/// ```
pub fn truncate_lines(text: &str, max_lines: Option<usize>) -> String {
    let Some(max) = max_lines else {
        return text.to_string();
    };

    let lines: Vec<&str> = text.split('\n').collect();
    if lines.len() <= max {
        return text.to_string();
    }

    let mut kept: Vec<&str> = lines[..max].to_vec();
    kept.push("");
    kept.push(TRUNCATION_MARKER);
    kept.join("\n")
}

/// Renders a string as a quoted, escaped literal.
///
/// Newlines, tabs, quotes and control characters are escaped so that
/// whitespace differences between received and expected output are
/// visible in the report.
pub fn quote(text: &str) -> String {
    format!("{:?}", text)
}

/// Renders the invocation of `cmd` the way a user would type it.
///
/// Commands that feed text to standard input are shown as a pipeline:
/// `echo -ne "<input>" | <command line>`.
pub fn format_call(cmd: &Command) -> String {
    match cmd.input.as_deref() {
        Some(input) if !input.is_empty() => {
            format!("echo -ne {} | {}", quote(input), cmd.to_shell_string())
        }
        _ => cmd.to_shell_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_over_limit() {
        let text = "one\ntwo\nthree\nfour";
        assert_eq!(
            truncate_lines(text, Some(2)),
            "one\ntwo\n\n[OUTPUT TRUNCATED]"
        );
    }

    #[test]
    fn test_truncate_at_limit_is_unchanged() {
        let text = "one\ntwo\nthree";
        assert_eq!(truncate_lines(text, Some(3)), text);
        assert_eq!(truncate_lines(text, Some(10)), text);
    }

    #[test]
    fn test_truncate_trailing_newline_counts_as_line() {
        // "a\nb\n" splits into ["a", "b", ""]
        assert_eq!(
            truncate_lines("a\nb\n", Some(2)),
            "a\nb\n\n[OUTPUT TRUNCATED]"
        );
    }

    #[test]
    fn test_truncate_zero_lines() {
        assert_eq!(truncate_lines("a", Some(0)), "\n[OUTPUT TRUNCATED]");
    }

    #[test]
    fn test_quote_escapes_whitespace() {
        assert_eq!(quote("hello"), "\"hello\"");
        assert_eq!(quote("a\nb\t\"c\""), "\"a\\nb\\t\\\"c\\\"\"");
    }

    #[test]
    fn test_format_call_plain() {
        let cmd = Command::new("echo").arg("hello world");
        assert_eq!(format_call(&cmd), "echo 'hello world'");
    }

    #[test]
    fn test_format_call_with_input() {
        let cmd = Command::new("cat").input("x\ny");
        assert_eq!(format_call(&cmd), "echo -ne \"x\\ny\" | cat");
    }

    #[test]
    fn test_format_call_with_empty_input() {
        let cmd = Command::new("cat").input("");
        assert_eq!(format_call(&cmd), "cat");
    }
}
