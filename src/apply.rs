//! apply
//!
//! Feeds patch content to an external apply command.
//!
//! # Design
//!
//! The applier never interprets diffs itself. Its job is to build the
//! exact byte stream handed to the external command (`git am` by default)
//! and to report that command's verdict. Trailer insertion happens here,
//! locally, so the result is identical whichever backend fetched the
//! patch:
//!
//! - `Signed-off-by:` is derived from the committer identity
//! - `Message-Id:` is carried over from the patch metadata
//!
//! Both are inserted at the end of the commit message, before the `---`
//! separator or the first diff line, and never duplicated. Three-way
//! merging is passed through as a flag; conflict resolution stays with
//! the external tool.

use std::io::Write as _;
use std::process::{Command, Stdio};

use thiserror::Error;

/// Errors from patch application.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// The apply command could not be started.
    #[error("failed to run '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The apply command exited non-zero. Not retried; a failed apply
    /// usually needs manual conflict resolution.
    #[error("'{command}' exited with status {exit_code}: {stderr_excerpt}")]
    Failed {
        command: String,
        exit_code: i32,
        stderr_excerpt: String,
    },

    /// Signoff was requested but no committer identity could be found.
    #[error(
        "cannot determine committer identity for Signed-off-by; \
         set GIT_COMMITTER_NAME and GIT_COMMITTER_EMAIL or configure git"
    )]
    NoIdentity,
}

/// Flags controlling how a patch is prepared and applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Append a `Signed-off-by:` trailer for the local committer.
    pub signoff: bool,
    /// Ask the apply command for a three-way merge on conflict.
    pub three_way: bool,
    /// Insert the patch's `Message-Id:` as a trailer.
    pub add_msgid: bool,
    /// The Message-Id to record, angle brackets included.
    pub message_id: Option<String>,
}

/// Outcome of a successful apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyResult {
    /// The command line that ran.
    pub command: String,
}

/// Runs an external command with a prepared mbox on stdin.
#[derive(Debug, Clone)]
pub struct Applier {
    program: String,
    args: Vec<String>,
    three_way_flag: Option<String>,
}

/// Cap on how much stderr is carried into an error message.
const STDERR_EXCERPT_LIMIT: usize = 1024;

impl Applier {
    /// The default applier: `git am`, with `-3` for three-way merges.
    pub fn git_am() -> Self {
        Self {
            program: "git".to_string(),
            args: vec!["am".to_string()],
            three_way_flag: Some("-3".to_string()),
        }
    }

    /// An applier for an arbitrary command line, e.g. `patch -p1`.
    ///
    /// Such commands get the same byte stream but no three-way flag.
    pub fn custom(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            three_way_flag: None,
        }
    }

    fn command_line(&self, options: &ApplyOptions) -> Vec<String> {
        let mut line = Vec::with_capacity(self.args.len() + 2);
        line.push(self.program.clone());
        line.extend(self.args.iter().cloned());
        if options.three_way {
            if let Some(flag) = &self.three_way_flag {
                line.push(flag.clone());
            }
        }
        line
    }

    /// Prepare the mbox per `options` and pipe it to the command.
    pub fn apply(&self, mbox: &[u8], options: &ApplyOptions) -> Result<ApplyResult, ApplyError> {
        let prepared = prepare_mbox(mbox, options)?;
        let line = self.command_line(options);
        let display = line.join(" ");

        let mut child = Command::new(&line[0])
            .args(&line[1..])
            .stdin(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ApplyError::Spawn {
                command: display.clone(),
                source,
            })?;

        // stdin is always piped above. A command may exit before reading
        // all of its input; the resulting broken pipe is not an error in
        // itself, the child's exit status is the verdict that matters.
        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(&prepared) {
                Ok(()) => {}
                Err(source) if source.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(source) => {
                    return Err(ApplyError::Spawn {
                        command: display,
                        source,
                    });
                }
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|source| ApplyError::Spawn {
                command: display.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ApplyError::Failed {
                command: display,
                exit_code: output.status.code().unwrap_or(-1),
                stderr_excerpt: excerpt(&stderr),
            });
        }

        Ok(ApplyResult { command: display })
    }
}

fn excerpt(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.len() <= STDERR_EXCERPT_LIMIT {
        return trimmed.to_string();
    }
    let mut end = STDERR_EXCERPT_LIMIT;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}

/// Build the byte stream for the apply command.
///
/// Trailers go at the end of the commit message, which in mbox form ends
/// at the `---` separator or at the first diff line, whichever comes
/// first. Existing trailers are left alone.
fn prepare_mbox(mbox: &[u8], options: &ApplyOptions) -> Result<Vec<u8>, ApplyError> {
    let mut trailers = Vec::new();
    let text = String::from_utf8_lossy(mbox);

    if options.signoff {
        let ident = committer_ident().ok_or(ApplyError::NoIdentity)?;
        let trailer = format!("Signed-off-by: {ident}");
        if !has_trailer(&text, &trailer) {
            trailers.push(trailer);
        }
    }
    if options.add_msgid {
        if let Some(msgid) = &options.message_id {
            let msgid = ensure_angle_brackets(msgid);
            let trailer = format!("Message-Id: {msgid}");
            if !has_trailer(&text, &trailer) {
                trailers.push(trailer);
            }
        }
    }

    if trailers.is_empty() {
        return Ok(mbox.to_vec());
    }

    let insert_at = message_end(&text);
    let mut out = String::with_capacity(text.len() + 128);
    out.push_str(&text[..insert_at]);
    for trailer in &trailers {
        out.push_str(trailer);
        out.push('\n');
    }
    out.push_str(&text[insert_at..]);
    Ok(out.into_bytes())
}

/// Byte offset where the commit message ends and the diff begins.
fn message_end(text: &str) -> usize {
    let mut offset = 0;
    let mut in_headers = true;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if in_headers {
            if trimmed.is_empty() {
                in_headers = false;
            }
        } else if trimmed == "---" || is_diff_start(trimmed) {
            return offset;
        }
        offset += line.len();
    }
    offset
}

fn is_diff_start(line: &str) -> bool {
    line.starts_with("diff -")
        || line.starts_with("diff --git ")
        || line.starts_with("Index: ")
        || line.starts_with("--- ")
}

fn has_trailer(text: &str, trailer: &str) -> bool {
    text.lines()
        .any(|line| line.trim().eq_ignore_ascii_case(trailer))
}

fn ensure_angle_brackets(msgid: &str) -> String {
    let bare = msgid.trim_matches(['<', '>']);
    format!("<{bare}>")
}

/// The committer's "Name <email>", from the environment or from git.
fn committer_ident() -> Option<String> {
    if let (Ok(name), Ok(email)) = (
        std::env::var("GIT_COMMITTER_NAME"),
        std::env::var("GIT_COMMITTER_EMAIL"),
    ) {
        if !name.is_empty() && !email.is_empty() {
            return Some(format!("{name} <{email}>"));
        }
    }

    let output = Command::new("git")
        .args(["var", "GIT_COMMITTER_IDENT"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let ident = String::from_utf8_lossy(&output.stdout);
    // "Name <email> timestamp offset" -> "Name <email>"
    let end = ident.find('>')?;
    Some(ident[..=end].trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MBOX: &str = "\
From: Jane Doe <jane@example.com>\n\
Subject: [PATCH] mm: fix the thing\n\
\n\
Fix the thing that was broken.\n\
\n\
---\n\
 a.c | 2 +-\n\
 1 file changed, 1 insertion(+), 1 deletion(-)\n\
\n\
diff --git a/a.c b/a.c\n\
--- a/a.c\n\
+++ b/a.c\n";

    fn prepared(mbox: &str, options: &ApplyOptions) -> String {
        String::from_utf8(prepare_mbox(mbox.as_bytes(), options).unwrap()).unwrap()
    }

    #[test]
    fn no_options_passes_through_unchanged() {
        let out = prepare_mbox(MBOX.as_bytes(), &ApplyOptions::default()).unwrap();
        assert_eq!(out, MBOX.as_bytes());
    }

    #[test]
    fn msgid_trailer_goes_before_separator() {
        let options = ApplyOptions {
            add_msgid: true,
            message_id: Some("<id@example.com>".to_string()),
            ..ApplyOptions::default()
        };
        let out = prepared(MBOX, &options);
        let msg_part = out.split("---").next().unwrap();
        assert!(msg_part.contains("Message-Id: <id@example.com>"));
        // The diff half is untouched.
        assert!(out.ends_with("+++ b/a.c\n"));
    }

    #[test]
    fn msgid_gains_angle_brackets() {
        let options = ApplyOptions {
            add_msgid: true,
            message_id: Some("bare@example.com".to_string()),
            ..ApplyOptions::default()
        };
        let out = prepared(MBOX, &options);
        assert!(out.contains("Message-Id: <bare@example.com>"));
    }

    #[test]
    fn existing_trailer_is_not_duplicated() {
        let mbox = MBOX.replace(
            "Fix the thing that was broken.\n",
            "Fix the thing that was broken.\n\nMessage-Id: <id@example.com>\n",
        );
        let options = ApplyOptions {
            add_msgid: true,
            message_id: Some("<id@example.com>".to_string()),
            ..ApplyOptions::default()
        };
        let out = prepared(&mbox, &options);
        assert_eq!(out.matches("Message-Id:").count(), 1);
    }

    #[test]
    fn signoff_precedes_msgid() {
        std::env::set_var("GIT_COMMITTER_NAME", "Test Committer");
        std::env::set_var("GIT_COMMITTER_EMAIL", "tc@example.com");
        let options = ApplyOptions {
            signoff: true,
            add_msgid: true,
            message_id: Some("<id@example.com>".to_string()),
            ..ApplyOptions::default()
        };
        let out = prepared(MBOX, &options);
        let signoff = out.find("Signed-off-by: Test Committer <tc@example.com>");
        let msgid = out.find("Message-Id: <id@example.com>");
        assert!(signoff.unwrap() < msgid.unwrap());
        assert_eq!(out.matches("Signed-off-by:").count(), 1);
        assert_eq!(out.matches("Message-Id:").count(), 1);
    }

    #[test]
    fn trailers_land_before_bare_diff_without_separator() {
        let mbox = "\
From: Jane Doe <jane@example.com>\n\
Subject: [PATCH] no separator\n\
\n\
Body text.\n\
\n\
diff --git a/a.c b/a.c\n\
--- a/a.c\n\
+++ b/a.c\n";
        let options = ApplyOptions {
            add_msgid: true,
            message_id: Some("<x@y>".to_string()),
            ..ApplyOptions::default()
        };
        let out = prepared(mbox, &options);
        assert!(out.find("Message-Id:").unwrap() < out.find("diff --git").unwrap());
    }

    #[test]
    fn three_way_adds_flag_for_git_am_only() {
        let options = ApplyOptions {
            three_way: true,
            ..ApplyOptions::default()
        };
        assert_eq!(
            Applier::git_am().command_line(&options),
            vec!["git", "am", "-3"]
        );
        assert_eq!(
            Applier::custom("patch", &["-p1"]).command_line(&options),
            vec!["patch", "-p1"]
        );
    }

    #[test]
    fn failed_command_reports_exit_code() {
        let applier = Applier::custom("false", &[]);
        let err = applier
            .apply(b"anything", &ApplyOptions::default())
            .unwrap_err();
        match err {
            ApplyError::Failed { exit_code, .. } => assert_eq!(exit_code, 1),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn large_input_to_nonreading_command_reports_exit_code() {
        // `false` exits without draining stdin; writing more than a pipe
        // buffer must still surface the exit status, not the broken pipe.
        let applier = Applier::custom("false", &[]);
        let big = vec![b'x'; 1 << 20];
        let err = applier.apply(&big, &ApplyOptions::default()).unwrap_err();
        match err {
            ApplyError::Failed { exit_code, .. } => assert_eq!(exit_code, 1),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_command_is_a_spawn_error() {
        let applier = Applier::custom("definitely-not-a-real-command", &[]);
        let err = applier
            .apply(b"anything", &ApplyOptions::default())
            .unwrap_err();
        assert!(matches!(err, ApplyError::Spawn { .. }));
    }

    #[test]
    fn successful_command_returns_its_command_line() {
        let applier = Applier::custom("cat", &[]);
        let result = applier.apply(MBOX.as_bytes(), &ApplyOptions::default());
        assert_eq!(result.unwrap().command, "cat");
    }

    #[test]
    fn excerpt_truncates_long_stderr() {
        let long = "x".repeat(4096);
        let short = excerpt(&long);
        assert!(short.len() <= STDERR_EXCERPT_LIMIT + 3);
        assert!(short.ends_with("..."));
    }
}
