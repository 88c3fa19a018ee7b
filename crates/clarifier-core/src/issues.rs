//! Numbered-list parsing for generated issues.
//!
//! The issue generator is asked for a numbered list. Its reply is parsed
//! permissively: anything of the form `<digits>.<text>` on a line yields an
//! issue, every other line is dropped without complaint.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// `1. Issue`, `12.Issue`, `- 3. Issue`; `.` stops at the line end.
    static ref NUMBERED_ITEM: Regex = Regex::new(r"\d+\.\s*(.*)").unwrap();
}

/// Extract issues from a numbered list.
///
/// Captures are trimmed, empty captures are dropped and repeated issues keep
/// only their first occurrence.
pub fn parse_numbered_list(text: &str) -> Vec<String> {
    let mut issues: Vec<String> = Vec::new();

    for captures in NUMBERED_ITEM.captures_iter(text) {
        let issue = captures
            .get(1)
            .map(|m| m.as_str().trim())
            .unwrap_or_default();

        if issue.is_empty() || issues.iter().any(|existing| existing == issue) {
            continue;
        }
        issues.push(issue.to_string());
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_unnumbered_line_dropped() {
        let parsed = parse_numbered_list("1. Low funding\n2. Staff turnover\nnotes: ignore this");
        assert_eq!(parsed, vec!["Low funding", "Staff turnover"]);
    }

    #[test]
    fn test_preamble_and_blank_lines_dropped() {
        let reply = "Here are the issues:\n\n1. Curriculum relevance\n\n2.   Class size \r\n3.\n";
        assert_eq!(
            parse_numbered_list(reply),
            vec!["Curriculum relevance", "Class size"]
        );
    }

    #[test]
    fn test_no_space_after_period() {
        assert_eq!(parse_numbered_list("10.Teacher workload"), vec!["Teacher workload"]);
    }

    #[test]
    fn test_duplicates_keep_first() {
        let parsed = parse_numbered_list("1. Funding\n2. Funding\n3. Morale");
        assert_eq!(parsed, vec!["Funding", "Morale"]);
    }

    #[test]
    fn test_twelve_items() {
        let reply: String = (1..=12)
            .map(|n| format!("{}. Issue number {}\n", n, n))
            .collect();
        let parsed = parse_numbered_list(&reply);
        assert_eq!(parsed.len(), 12);
        assert_eq!(parsed[11], "Issue number 12");
    }

    #[test]
    fn test_empty_reply() {
        assert!(parse_numbered_list("").is_empty());
        assert!(parse_numbered_list("No list at all").is_empty());
    }
}
