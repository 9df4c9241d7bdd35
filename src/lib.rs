//! pwclient - A command-line client for Patchwork
//!
//! pwclient is a single-binary tool for querying, filtering, and mutating
//! patches tracked by a remote [Patchwork](https://patchwork.readthedocs.io/)
//! instance, and for applying selected patches to a local checkout.
//!
//! # Architecture
//!
//! The codebase follows a strict layered architecture:
//!
//! - [`cli`] - Command-line interface layer (parses args, delegates to commands)
//! - [`config`] - `.pwclientrc` loading, validation, migration, and resolution
//! - [`backend`] - Protocol-agnostic client over two wire protocols
//!   (REST and XML-RPC), selected per project
//! - [`apply`] - Builds the mbox byte stream and pipes it to an external
//!   VCS apply command
//! - [`ui`] - User interaction utilities
//!
//! # Correctness Invariants
//!
//! pwclient maintains the following invariants:
//!
//! 1. Both backends surface the same error kinds for the same abstract
//!    failure; callers never observe which wire protocol is in use
//! 2. Configuration errors are detected before any network I/O
//! 3. The on-disk config file is only rewritten by an explicit save, and
//!    always via an atomic replace

pub mod apply;
pub mod backend;
pub mod cli;
pub mod config;
pub mod ui;
