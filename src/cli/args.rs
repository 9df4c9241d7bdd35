//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--config <path>` / `-c`: Use a config file other than `~/.pwclientrc`
//! - `--project <name>` / `-p`: Operate on this project instead of the default
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Minimal output

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// pwclient - a command-line client for Patchwork patch tracking
#[derive(Parser, Debug)]
#[command(name = "pwclient")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Use this config file instead of ~/.pwclientrc
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Project to operate on (defaults to the configured default)
    #[arg(short, long, global = true, value_name = "NAME")]
    pub project: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List patches, optionally filtered
    #[command(
        name = "list",
        long_about = "List patches for a project.\n\n\
            With no filters, lists every patch the server will return for the \
            project. Filters combine with AND semantics. A state, submitter, or \
            delegate the server does not know matches nothing and produces an \
            empty listing, not an error.",
        after_help = "\
EXAMPLES:
    # All patches awaiting review
    pwclient list --state new

    # Patches from one submitter, newest subset only
    pwclient list --submitter jane@example.com --limit 20

    # Custom output, one lore URL per patch
    pwclient list --format 'https://lore.example.org/%{_msgid_}/'"
    )]
    List {
        /// Only patches whose name contains this string
        name: Option<String>,

        /// Filter by state name (e.g. new, under-review, accepted)
        #[arg(short, long)]
        state: Option<String>,

        /// Filter by submitter name or email fragment
        #[arg(short = 'w', long)]
        submitter: Option<String>,

        /// Filter by delegate name
        #[arg(short, long)]
        delegate: Option<String>,

        /// Filter by archived state
        #[arg(short, long, value_name = "yes|no")]
        archived: Option<String>,

        /// Filter by exact Message-Id
        #[arg(short, long)]
        msgid: Option<String>,

        /// Only patches dated at or after this timestamp
        #[arg(long, value_name = "TIMESTAMP")]
        since: Option<String>,

        /// Stop after this many patches
        #[arg(short = 'n', long, value_name = "COUNT")]
        limit: Option<usize>,

        /// Per-patch format string with %{field} placeholders
        #[arg(short, long, value_name = "FMT")]
        format: Option<String>,
    },

    /// Show detailed information about a patch
    #[command(name = "info")]
    Info {
        /// Patch id
        id: u64,
    },

    /// Download a patch mbox to a file
    #[command(name = "get")]
    Get {
        /// Patch id
        id: u64,
    },

    /// Print a patch mbox to stdout (or $PAGER)
    #[command(name = "view")]
    View {
        /// Patch ids
        #[arg(required = true)]
        ids: Vec<u64>,
    },

    /// Apply a patch to the current directory using 'patch -p1'
    #[command(name = "apply")]
    Apply {
        /// Patch ids, applied in order
        #[arg(required = true)]
        ids: Vec<u64>,
    },

    /// Apply a patch with 'git am'
    #[command(
        name = "git-am",
        long_about = "Apply patches with 'git am', creating commits.\n\n\
            Signoff, three-way merge, and Message-Id trailers can be enabled \
            per invocation with flags, per project, or globally in \
            ~/.pwclientrc. A flag always wins over configuration.",
        after_help = "\
EXAMPLES:
    # Apply with your Signed-off-by
    pwclient git-am --signoff 1157169

    # Apply a series in order, falling back to three-way merge
    pwclient git-am -3 1157169 1157170 1157171"
    )]
    GitAm {
        /// Patch ids, applied in order
        #[arg(required = true)]
        ids: Vec<u64>,

        /// Add a Signed-off-by trailer
        #[arg(short, long)]
        signoff: bool,

        /// Attempt a three-way merge on conflict
        #[arg(short = '3', long = "3way")]
        three_way: bool,

        /// Add a Message-Id trailer
        #[arg(short, long)]
        msgid: bool,
    },

    /// Update patch state, archived flag, or commit reference
    #[command(
        name = "update",
        long_about = "Update one or more patches on the server.\n\n\
            Requires authentication. At least one of --state or --archived must \
            be given. --commit-ref only makes sense for a single patch and is \
            rejected when several ids are listed."
    )]
    Update {
        /// Patch ids
        #[arg(required = true)]
        ids: Vec<u64>,

        /// New state name
        #[arg(short, long)]
        state: Option<String>,

        /// New archived flag
        #[arg(short, long, value_name = "yes|no")]
        archived: Option<String>,

        /// Commit reference to record (single patch only)
        #[arg(long, value_name = "SHA")]
        commit_ref: Option<String>,

        /// Reassign the delegate
        #[arg(short, long)]
        delegate: Option<String>,
    },

    /// List projects available on the server
    #[command(name = "projects")]
    Projects,

    /// List check results for a patch
    #[command(name = "check-list")]
    CheckList {
        /// Patch id
        id: u64,
    },

    /// Post a check result for a patch
    #[command(name = "check-create")]
    CheckCreate {
        /// Patch id
        id: u64,

        /// Context label, e.g. a CI job name
        #[arg(long)]
        context: String,

        /// Check state: pending, success, warning, or fail
        #[arg(short, long)]
        state: String,

        /// Link to the full result
        #[arg(short, long)]
        target_url: Option<String>,

        /// Human-readable description
        #[arg(short, long, default_value = "")]
        description: String,
    },
}
