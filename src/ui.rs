//! ui
//!
//! Output formatting and display.
//!
//! # Design
//!
//! Tables go to stdout, diagnostics to stderr. Formatting lives here so
//! command handlers only decide what to show, never how.

use std::fmt::Display;

use crate::backend::{Check, Patch, Project};

/// Output verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Quiet mode - minimal output
    Quiet,
    /// Normal mode - standard output
    Normal,
    /// Debug mode - verbose output
    Debug,
}

impl Verbosity {
    /// Create verbosity from flags.
    pub fn from_flags(quiet: bool, debug: bool) -> Self {
        if quiet {
            Verbosity::Quiet
        } else if debug {
            Verbosity::Debug
        } else {
            Verbosity::Normal
        }
    }
}

/// Print a message (respects quiet mode).
pub fn print(message: impl Display, verbosity: Verbosity) {
    if verbosity != Verbosity::Quiet {
        println!("{}", message);
    }
}

/// Print a debug message (only in debug mode).
pub fn debug(message: impl Display, verbosity: Verbosity) {
    if verbosity == Verbosity::Debug {
        eprintln!("[debug] {}", message);
    }
}

/// Print an error message (always shown).
pub fn error(message: impl Display) {
    eprintln!("error: {}", message);
}

/// Print a warning message (respects quiet mode).
pub fn warn(message: impl Display, verbosity: Verbosity) {
    if verbosity != Verbosity::Quiet {
        eprintln!("warning: {}", message);
    }
}

/// Header row for the patch listing table.
pub fn patch_table_header() -> String {
    format!(
        "{:<7} {:<12} {}\n{:<7} {:<12} {}",
        "ID", "State", "Name", "--", "-----", "----"
    )
}

/// One row of the patch listing table.
pub fn patch_table_row(patch: &Patch) -> String {
    format!("{:<7} {:<12} {}", patch.id, patch.state, patch.name)
}

/// Detailed key/value view of a single patch.
pub fn patch_detail(patch: &Patch) -> String {
    let title = format!("Information for patch id {}", patch.id);
    let mut out = format!("{title}\n{}\n", "-".repeat(title.len()));
    let fields: &[(&str, String)] = &[
        ("archived", patch.archived.to_string()),
        ("commit_ref", patch.commit_ref.clone().unwrap_or_default()),
        ("date", patch.date.clone()),
        ("delegate", patch.delegate.clone()),
        ("filename", patch.filename.clone()),
        ("hash", patch.hash.clone().unwrap_or_default()),
        ("id", patch.id.to_string()),
        ("msgid", patch.msgid.clone()),
        ("name", patch.name.clone()),
        ("project", patch.project.clone()),
        ("state", patch.state.clone()),
        ("submitter", patch.submitter.clone()),
    ];
    for (key, value) in fields {
        if value.is_empty() {
            out.push_str(&format!("- {key:<14}:\n"));
        } else {
            out.push_str(&format!("- {key:<14}: {value}\n"));
        }
    }
    out
}

/// Expand a `%{field}` format string for one patch.
///
/// Unknown field names expand to the empty string. `%{_msgid_}` is the
/// Message-Id with its angle brackets stripped, handy for fetching from
/// mail archives.
pub fn patch_format(patch: &Patch, format_str: &str) -> String {
    let mut out = String::with_capacity(format_str.len());
    let mut rest = format_str;
    while let Some(start) = rest.find("%{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                out.push_str(&patch_field(patch, &after[..end]));
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn patch_field(patch: &Patch, name: &str) -> String {
    match name {
        "id" => patch.id.to_string(),
        "name" => patch.name.clone(),
        "project" => patch.project.clone(),
        "state" => patch.state.clone(),
        "submitter" => patch.submitter.clone(),
        "delegate" => patch.delegate.clone(),
        "date" => patch.date.clone(),
        "msgid" => patch.msgid.clone(),
        "_msgid_" => patch.msgid.trim_matches(['<', '>']).to_string(),
        "archived" => patch.archived.to_string(),
        "commit_ref" => patch.commit_ref.clone().unwrap_or_default(),
        "hash" => patch.hash.clone().unwrap_or_default(),
        "filename" => patch.filename.clone(),
        _ => String::new(),
    }
}

/// One line per check result.
pub fn check_row(check: &Check) -> String {
    let target = check.target_url.as_deref().unwrap_or("-");
    format!(
        "{:<7} {:<8} {:<24} {} {}",
        check.id, check.state, check.context, check.description, target
    )
}

/// Header row for the project listing table.
pub fn project_table_header() -> String {
    format!(
        "{:<7} {:<24} {}\n{:<7} {:<24} {}",
        "ID", "Name", "Description", "--", "----", "-----------"
    )
}

/// One row of the project listing table.
pub fn project_table_row(project: &Project) -> String {
    format!(
        "{:<7} {:<24} {}",
        project.id, project.linkname, project.name
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Patch {
        Patch {
            id: 1157169,
            name: "[v2] mm: fix the thing".to_string(),
            project: "alpha".to_string(),
            state: "Under Review".to_string(),
            submitter: "Jane Doe <jane@example.com>".to_string(),
            delegate: String::new(),
            date: "2024-01-01T00:00:00".to_string(),
            msgid: "<a@b.example.com>".to_string(),
            archived: false,
            commit_ref: None,
            hash: None,
            filename: "v2-mm-fix-the-thing.patch".to_string(),
        }
    }

    #[test]
    fn table_row_pads_columns() {
        let row = patch_table_row(&sample());
        assert_eq!(row, "1157169 Under Review [v2] mm: fix the thing");
    }

    #[test]
    fn format_expands_fields() {
        let out = patch_format(&sample(), "%{id}: %{name} [%{state}]");
        assert_eq!(out, "1157169: [v2] mm: fix the thing [Under Review]");
    }

    #[test]
    fn format_strips_msgid_brackets() {
        let out = patch_format(&sample(), "https://lore.example.com/%{_msgid_}/");
        assert_eq!(out, "https://lore.example.com/a@b.example.com/");
    }

    #[test]
    fn format_leaves_unknown_fields_empty() {
        assert_eq!(patch_format(&sample(), "x%{nope}y"), "xy");
    }

    #[test]
    fn format_keeps_unterminated_braces_literal() {
        assert_eq!(patch_format(&sample(), "a%{id"), "a%{id");
    }

    #[test]
    fn detail_skips_value_for_empty_fields() {
        let out = patch_detail(&sample());
        assert!(out.contains("- delegate      :\n"));
        assert!(out.contains("- state         : Under Review\n"));
    }

    #[test]
    fn verbosity_from_flags() {
        assert_eq!(Verbosity::from_flags(true, false), Verbosity::Quiet);
        assert_eq!(Verbosity::from_flags(false, true), Verbosity::Debug);
        assert_eq!(Verbosity::from_flags(false, false), Verbosity::Normal);
    }
}
