//! backend::traits
//!
//! The protocol-agnostic backend contract and its data model.
//!
//! # Design
//!
//! The `Backend` trait is async because every operation involves network
//! I/O. Both implementations (REST and XML-RPC) must be interchangeable
//! from the caller's perspective: the same abstract failure produces the
//! same [`BackendError`] kind from either, differing only in message
//! detail. Callers hold only `Box<dyn Backend>`.
//!
//! Listing returns a [`Patches`] sequence that hides the wire-level paging
//! mechanism: REST follows `Link` headers one page at a time, XML-RPC
//! fetches a bulk result and slices it client-side. The sequence is
//! forward-only and non-restartable, and abandoning it early issues no
//! further page requests.

use std::collections::VecDeque;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from backend operations.
///
/// Error kinds are shared between the REST and XML-RPC implementations so
/// that callers never need to know which protocol is in use.
/// [`BackendError::Transient`] is the only kind eligible for
/// caller-initiated retry.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// The operation requires credentials but none are configured.
    /// Raised before any network I/O.
    #[error("authentication required")]
    AuthRequired,

    /// The remote rejected the configured credentials.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The credentials are valid but lack the needed privilege.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The remote reports no patch with this id.
    #[error("patch {0} not found")]
    PatchNotFound(u64),

    /// The patch exists but has no retrievable content.
    #[error("no content available for patch {0}")]
    DiffUnavailable(u64),

    /// A possibly-transient remote or network fault (HTTP 5xx, connection
    /// failure). Safe to retry with backoff.
    #[error("transient backend error: {0}")]
    Transient(String),

    /// Any other remote rejection (validation failure, unmapped fault).
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code, or XML-RPC fault code.
        status: u16,
        /// Error detail from the remote.
        message: String,
    },

    /// The response could not be parsed. Not retryable.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// A patch tracked by the remote service.
///
/// Transient: fetched fresh per request, never cached across invocations.
/// The patch content itself is fetched lazily via
/// [`Backend::get_mbox`] / [`Backend::get_diff`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Patch {
    /// Remote-assigned id, unique within an instance.
    pub id: u64,
    /// Subject line.
    pub name: String,
    /// Project the patch belongs to.
    pub project: String,
    /// State name (e.g. "New", "Accepted").
    pub state: String,
    /// Submitter, "Name <email>" where both are known.
    pub submitter: String,
    /// Delegate username, empty when unassigned.
    pub delegate: String,
    /// Submission timestamp as reported by the remote.
    pub date: String,
    /// Message-Id of the originating mail, including angle brackets.
    pub msgid: String,
    /// Whether the patch has been archived.
    pub archived: bool,
    /// Commit reference recorded against the patch, if any.
    pub commit_ref: Option<String>,
    /// Patchwork content hash, if exposed.
    pub hash: Option<String>,
    /// Server-suggested filename for saving.
    pub filename: String,
}

/// State of a check result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    Pending,
    Success,
    Warning,
    Fail,
}

impl CheckState {
    /// The wire name of this state.
    pub fn name(&self) -> &'static str {
        match self {
            CheckState::Pending => "pending",
            CheckState::Success => "success",
            CheckState::Warning => "warning",
            CheckState::Fail => "fail",
        }
    }

    /// Parse a wire name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(CheckState::Pending),
            "success" => Some(CheckState::Success),
            "warning" => Some(CheckState::Warning),
            "fail" => Some(CheckState::Fail),
            _ => None,
        }
    }
}

impl std::fmt::Display for CheckState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A check result attached to a patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    /// Remote-assigned check id.
    pub id: u64,
    /// The patch the check belongs to.
    pub patch_id: u64,
    /// Context label (e.g. a CI job name).
    pub context: String,
    /// Outcome.
    pub state: CheckState,
    /// Human-readable detail.
    pub description: String,
    /// Link to the full result, if any.
    pub target_url: Option<String>,
    /// User that posted the check.
    pub user: String,
    /// Timestamp as reported by the remote.
    pub date: String,
}

/// A check result to be posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRequest {
    /// Context label.
    pub context: String,
    /// Outcome.
    pub state: CheckState,
    /// Human-readable detail.
    pub description: String,
    /// Link to the full result, if any.
    pub target_url: Option<String>,
}

/// A project hosted on the remote instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    /// Remote-assigned id.
    pub id: u64,
    /// Short name used in URLs and config sections.
    pub linkname: String,
    /// Descriptive name.
    pub name: String,
}

/// Filters for [`Backend::list_patches`].
///
/// Every field is optional; an empty filter lists everything the remote
/// will serve.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    /// Project linkname.
    pub project: Option<String>,
    /// State name. A name the remote does not know matches nothing.
    pub state: Option<String>,
    /// Submitter name or email fragment.
    pub submitter: Option<String>,
    /// Delegate name fragment.
    pub delegate: Option<String>,
    /// Only patches dated at or after this timestamp.
    pub since: Option<String>,
    /// Archived state.
    pub archived: Option<bool>,
    /// Exact Message-Id.
    pub msgid: Option<String>,
    /// Substring of the patch name.
    pub name: Option<String>,
    /// Stop after this many patches.
    pub limit: Option<usize>,
}

/// Fields to change in [`Backend::update_patch`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchUpdate {
    /// New state name.
    pub state: Option<String>,
    /// New archived flag.
    pub archived: Option<bool>,
    /// Commit reference to record.
    pub commit_ref: Option<String>,
    /// New delegate.
    pub delegate: Option<String>,
}

impl PatchUpdate {
    /// Whether the update changes anything.
    pub fn is_empty(&self) -> bool {
        self.state.is_none()
            && self.archived.is_none()
            && self.commit_ref.is_none()
            && self.delegate.is_none()
    }
}

/// A source of patch pages, one wire request per call.
///
/// Implemented per backend; callers consume pages through [`Patches`].
#[async_trait]
pub trait PatchPager: Send {
    /// Fetch the next page. An empty vector means the sequence is
    /// exhausted and no further requests will be issued.
    async fn next_page(&mut self) -> Result<Vec<Patch>, BackendError>;
}

/// A lazy, forward-only sequence of patches.
///
/// Additional network requests are issued only as the sequence is
/// consumed; dropping it early issues none.
pub struct Patches {
    buffer: VecDeque<Patch>,
    pager: Option<Box<dyn PatchPager>>,
    remaining: Option<usize>,
}

impl Patches {
    /// A sequence backed by a pager, optionally truncated to `limit`.
    pub fn new(pager: Box<dyn PatchPager>, limit: Option<usize>) -> Self {
        Self {
            buffer: VecDeque::new(),
            pager: Some(pager),
            remaining: limit,
        }
    }

    /// An empty sequence. Used when a filter is known to match nothing.
    pub fn empty() -> Self {
        Self {
            buffer: VecDeque::new(),
            pager: None,
            remaining: None,
        }
    }

    /// Pull the next patch, fetching another page if the buffer is empty.
    pub async fn try_next(&mut self) -> Result<Option<Patch>, BackendError> {
        if self.remaining == Some(0) {
            return Ok(None);
        }

        while self.buffer.is_empty() {
            let Some(pager) = self.pager.as_mut() else {
                return Ok(None);
            };
            let page = pager.next_page().await?;
            if page.is_empty() {
                self.pager = None;
                return Ok(None);
            }
            self.buffer.extend(page);
        }

        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
            if *remaining == 0 {
                // Drop the pager so no further requests can be issued.
                self.pager = None;
            }
        }
        Ok(self.buffer.pop_front())
    }

    /// Drain the whole sequence into a vector.
    pub async fn collect_all(mut self) -> Result<Vec<Patch>, BackendError> {
        let mut patches = Vec::new();
        while let Some(patch) = self.try_next().await? {
            patches.push(patch);
        }
        Ok(patches)
    }
}

impl std::fmt::Debug for Patches {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Patches")
            .field("buffered", &self.buffer.len())
            .field("exhausted", &self.pager.is_none())
            .field("remaining", &self.remaining)
            .finish()
    }
}

/// The protocol-agnostic backend contract.
///
/// Connection parameters are bound at construction time; no connection is
/// established until the first request. Operations are issued one at a
/// time: each call performs one (or for listing, a bounded series of)
/// blocking round trips and returns before the next is issued.
#[async_trait]
pub trait Backend: Send + Sync {
    /// The backend name ("rest" or "xmlrpc").
    fn name(&self) -> &'static str;

    /// List patches matching `filter` as a lazy sequence.
    ///
    /// A filter that matches nothing yields an empty sequence, not an
    /// error.
    async fn list_patches(&self, filter: ListFilter) -> Result<Patches, BackendError>;

    /// Fetch one patch by id.
    async fn get_patch(&self, id: u64) -> Result<Patch, BackendError>;

    /// Fetch the patch as an mbox-formatted message, suitable for `git am`.
    async fn get_mbox(&self, id: u64) -> Result<Vec<u8>, BackendError>;

    /// Fetch the raw diff content.
    async fn get_diff(&self, id: u64) -> Result<Vec<u8>, BackendError>;

    /// Mutate a patch. Requires configured credentials.
    async fn update_patch(&self, id: u64, update: PatchUpdate) -> Result<Patch, BackendError>;

    /// List check results for a patch.
    async fn list_checks(&self, patch_id: u64) -> Result<Vec<Check>, BackendError>;

    /// Post a check result. Requires configured credentials.
    async fn create_check(
        &self,
        patch_id: u64,
        check: CheckRequest,
    ) -> Result<Check, BackendError>;

    /// List the projects hosted on the instance.
    async fn list_projects(&self) -> Result<Vec<Project>, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedPager {
        pages: VecDeque<Vec<Patch>>,
    }

    #[async_trait]
    impl PatchPager for FixedPager {
        async fn next_page(&mut self) -> Result<Vec<Patch>, BackendError> {
            Ok(self.pages.pop_front().unwrap_or_default())
        }
    }

    fn patch(id: u64) -> Patch {
        Patch {
            id,
            name: format!("patch {id}"),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn patches_drains_pages_in_order() {
        let pager = FixedPager {
            pages: VecDeque::from(vec![vec![patch(1), patch(2)], vec![patch(3)]]),
        };
        let seq = Patches::new(Box::new(pager), None);
        let ids: Vec<u64> = seq
            .collect_all()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn patches_limit_stops_paging() {
        let pager = FixedPager {
            pages: VecDeque::from(vec![vec![patch(1), patch(2)], vec![patch(3)]]),
        };
        let mut seq = Patches::new(Box::new(pager), Some(2));
        assert_eq!(seq.try_next().await.unwrap().unwrap().id, 1);
        assert_eq!(seq.try_next().await.unwrap().unwrap().id, 2);
        // Limit reached; the second page must never be requested.
        assert!(seq.try_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_sequence_yields_nothing() {
        let mut seq = Patches::empty();
        assert!(seq.try_next().await.unwrap().is_none());
    }

    #[test]
    fn check_state_round_trips() {
        for state in [
            CheckState::Pending,
            CheckState::Success,
            CheckState::Warning,
            CheckState::Fail,
        ] {
            assert_eq!(CheckState::parse(state.name()), Some(state));
        }
        assert_eq!(CheckState::parse("unknown"), None);
    }

    #[test]
    fn patch_update_is_empty() {
        assert!(PatchUpdate::default().is_empty());
        assert!(!PatchUpdate {
            state: Some("accepted".to_string()),
            ..Default::default()
        }
        .is_empty());
    }

    #[test]
    fn backend_error_display() {
        assert_eq!(
            format!("{}", BackendError::AuthRequired),
            "authentication required"
        );
        assert_eq!(
            format!("{}", BackendError::PatchNotFound(7)),
            "patch 7 not found"
        );
        assert_eq!(
            format!(
                "{}",
                BackendError::Api {
                    status: 400,
                    message: "invalid state".into()
                }
            ),
            "API error: 400 - invalid state"
        );
    }
}
