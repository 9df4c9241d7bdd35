//! backend::factory
//!
//! Backend selection and creation.
//!
//! # Design
//!
//! This module is the single place where a project's settings turn into a
//! live [`Backend`]. Commands call [`create_backend`] instead of importing
//! a protocol implementation directly, so the rest of the crate never
//! depends on which wire format a project speaks.
//!
//! # Protocol Detection
//!
//! An explicit `backend` setting always wins. Without one, the kind is
//! inferred from the endpoint URL's path segments:
//! - a segment equal to `xmlrpc` → [`BackendKind::XmlRpc`]
//! - a segment equal to `api` → [`BackendKind::Rest`]
//!
//! A URL matching neither rule is an error rather than a guess; the user
//! is asked to set `backend` explicitly.
//!
//! # Credential Validation
//!
//! Credential problems are caught here, before any connection is made:
//! a token on an XML-RPC backend, a username without a password (or the
//! reverse), or a token combined with a basic-auth pair all fail at
//! construction time.

use thiserror::Error;

use super::rest::{RestAuth, RestBackend};
use super::traits::Backend;
use super::xmlrpc::XmlRpcBackend;

/// Supported backend protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// REST API (JSON over HTTP, `/api` endpoints).
    Rest,
    /// Legacy XML-RPC API (`/xmlrpc` endpoints).
    XmlRpc,
}

impl BackendKind {
    /// All supported kinds.
    pub fn all() -> &'static [BackendKind] {
        &[BackendKind::Rest, BackendKind::XmlRpc]
    }

    /// The kind's name as used in configuration files.
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Rest => "rest",
            BackendKind::XmlRpc => "xmlrpc",
        }
    }

    /// Parse a configuration value.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "rest" => Some(BackendKind::Rest),
            "xmlrpc" => Some(BackendKind::XmlRpc),
            _ => None,
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Errors from backend selection and construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    /// The URL matched no inference rule and no explicit kind was given.
    #[error(
        "cannot tell which protocol '{0}' speaks; \
         set 'backend = rest' or 'backend = xmlrpc' for this project"
    )]
    Ambiguous(String),

    /// An API token was supplied for a protocol that cannot carry one.
    #[error("the {0} backend does not support API tokens; use username and password")]
    TokenUnsupported(BackendKind),

    /// Exactly one half of a basic-auth pair was supplied.
    #[error("both username and password are required for basic authentication")]
    IncompleteCredentials,

    /// Both a token and a basic-auth pair were supplied.
    #[error("token and username/password are mutually exclusive; configure one or the other")]
    ConflictingCredentials,
}

/// Credentials as they come out of configuration, unvalidated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
}

impl Credentials {
    fn validate(&self, kind: BackendKind) -> Result<(), SelectorError> {
        if self.token.is_some() && (self.username.is_some() || self.password.is_some()) {
            return Err(SelectorError::ConflictingCredentials);
        }
        if self.username.is_some() != self.password.is_some() {
            return Err(SelectorError::IncompleteCredentials);
        }
        if self.token.is_some() && kind == BackendKind::XmlRpc {
            return Err(SelectorError::TokenUnsupported(kind));
        }
        Ok(())
    }

    fn basic_pair(&self) -> Option<(String, String)> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some((username.clone(), password.clone())),
            _ => None,
        }
    }
}

/// URL-based backend inference with configurable rules.
///
/// Each rule maps a path segment to a kind; rules are tried in order.
#[derive(Debug, Clone)]
pub struct Selector {
    rules: Vec<(&'static str, BackendKind)>,
}

impl Default for Selector {
    fn default() -> Self {
        Self {
            rules: vec![("xmlrpc", BackendKind::XmlRpc), ("api", BackendKind::Rest)],
        }
    }
}

impl Selector {
    /// A selector with custom inference rules.
    pub fn with_rules(rules: Vec<(&'static str, BackendKind)>) -> Self {
        Self { rules }
    }

    /// Infer the kind from the URL's path segments, if any rule matches.
    pub fn infer(&self, url: &str) -> Option<BackendKind> {
        let path = url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(url);
        let segments: Vec<&str> = path
            .split('/')
            .skip(1) // host
            .filter(|segment| !segment.is_empty())
            .collect();
        for (segment_rule, kind) in &self.rules {
            if segments.iter().any(|segment| segment == segment_rule) {
                return Some(*kind);
            }
        }
        None
    }

    /// Resolve the kind: an explicit setting wins, then inference.
    pub fn select(
        &self,
        url: &str,
        explicit: Option<BackendKind>,
    ) -> Result<BackendKind, SelectorError> {
        if let Some(kind) = explicit {
            return Ok(kind);
        }
        self.infer(url)
            .ok_or_else(|| SelectorError::Ambiguous(url.to_string()))
    }

    /// Select, validate, and construct a backend. Performs no I/O.
    pub fn build(
        &self,
        url: &str,
        explicit: Option<BackendKind>,
        credentials: &Credentials,
    ) -> Result<Box<dyn Backend>, SelectorError> {
        let kind = self.select(url, explicit)?;
        credentials.validate(kind)?;

        Ok(match kind {
            BackendKind::Rest => {
                let auth = if let Some(token) = &credentials.token {
                    Some(RestAuth::Token(token.clone()))
                } else {
                    credentials
                        .basic_pair()
                        .map(|(username, password)| RestAuth::Basic { username, password })
                };
                Box::new(RestBackend::new(url, auth))
            }
            BackendKind::XmlRpc => {
                Box::new(XmlRpcBackend::new(url, credentials.basic_pair()))
            }
        })
    }
}

/// Create a backend using the default inference rules.
///
/// This is the primary entry point for commands.
pub fn create_backend(
    url: &str,
    explicit: Option<BackendKind>,
    credentials: &Credentials,
) -> Result<Box<dyn Backend>, SelectorError> {
    Selector::default().build(url, explicit, credentials)
}
