//! backend
//!
//! Protocol abstraction for Patchwork servers.
//!
//! # Architecture
//!
//! The [`Backend`] trait defines the operations the rest of the crate can
//! perform against a remote instance. Commands obtain one through the
//! [`create_backend`] factory rather than importing a protocol
//! implementation directly, so REST and XML-RPC stay interchangeable.
//!
//! Both implementations map remote failures onto the same
//! [`BackendError`] taxonomy; callers match on error kinds, never on
//! protocol details.
//!
//! # Modules
//!
//! - `traits`: the `Backend` trait, data model, and error taxonomy
//! - [`rest`]: REST implementation (JSON over HTTP)
//! - [`xmlrpc`]: legacy XML-RPC implementation
//! - `factory`: protocol selection and construction
//!
//! # Example
//!
//! ```ignore
//! use pwclient::backend::{create_backend, Credentials, ListFilter};
//!
//! let backend = create_backend(
//!     "https://patchwork.example.com/api/1.2",
//!     None, // infer the protocol from the URL
//!     &Credentials::default(),
//! )?;
//!
//! let mut patches = backend
//!     .list_patches(ListFilter {
//!         state: Some("new".to_string()),
//!         ..ListFilter::default()
//!     })
//!     .await?;
//! while let Some(patch) = patches.try_next().await? {
//!     println!("{} {}", patch.id, patch.name);
//! }
//! ```

mod factory;
pub mod rest;
mod traits;
pub mod xmlrpc;

pub use factory::{create_backend, BackendKind, Credentials, Selector, SelectorError};
pub use traits::*;
