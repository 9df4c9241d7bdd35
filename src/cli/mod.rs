//! cli
//!
//! Command-line interface layer for pwclient.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Delegate to command handlers
//! - Does NOT speak any wire protocol directly
//!
//! # Architecture
//!
//! The CLI layer is thin. It parses arguments via clap and dispatches to
//! command handlers, which reach the remote service only through the
//! [`crate::backend`] abstraction.

pub mod args;
pub mod commands;

pub use args::Cli;

use anyhow::Result;

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub async fn run() -> Result<()> {
    let cli = Cli::parse_args();
    commands::dispatch(cli).await
}
