//! backend::rest
//!
//! REST (HTTP+JSON) backend implementation.
//!
//! # Design
//!
//! Wraps the Patchwork REST API rooted at a configured base URL (typically
//! ending in `/api`). Responses are deserialized with serde and trimmed
//! down to the protocol-agnostic types in [`backend::traits`], so the two
//! wire protocols stay interchangeable.
//!
//! # Pagination
//!
//! List endpoints paginate via the `Link` response header. The pager
//! follows `rel="next"` URLs one page at a time as the [`Patches`]
//! sequence is consumed; an abandoned sequence fetches nothing further.
//!
//! # Authentication
//!
//! Either an API token (`Authorization: Token ...`) or HTTP basic auth.
//! Operations that mutate remote state fail with
//! [`BackendError::AuthRequired`] before any network I/O when no
//! credentials are configured.
//!
//! [`backend::traits`]: super::traits

use async_trait::async_trait;
use reqwest::header::{HeaderMap, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;

use super::traits::{
    Backend, BackendError, Check, CheckRequest, CheckState, ListFilter, Patch, PatchPager,
    PatchUpdate, Patches, Project,
};

/// User-Agent header value for API requests.
const USER_AGENT_VALUE: &str = concat!("pwclient/", env!("CARGO_PKG_VERSION"));

/// REST authentication modes.
#[derive(Debug, Clone)]
pub enum RestAuth {
    /// API token, sent as `Authorization: Token <token>`.
    Token(String),
    /// HTTP basic authentication.
    Basic { username: String, password: String },
}

/// REST backend implementation.
#[derive(Clone)]
pub struct RestBackend {
    client: Client,
    api_base: String,
    auth: Option<RestAuth>,
}

impl std::fmt::Debug for RestBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestBackend")
            .field("api_base", &self.api_base)
            .field("has_auth", &self.auth.is_some())
            .finish()
    }
}

impl RestBackend {
    /// Create a backend for the given instance URL.
    ///
    /// The URL is normalized: a trailing slash is trimmed and a legacy
    /// `/xmlrpc` path is rewritten to `/api`, matching what users have in
    /// old config files. No connection is made until the first request.
    pub fn new(url: &str, auth: Option<RestAuth>) -> Self {
        Self {
            client: Client::new(),
            api_base: normalize_api_base(url),
            auth,
        }
    }

    /// The normalized API base URL.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let req = self
            .client
            .request(method, url)
            .header(USER_AGENT, USER_AGENT_VALUE);
        match &self.auth {
            Some(RestAuth::Token(token)) => req.header(AUTHORIZATION, format!("Token {token}")),
            Some(RestAuth::Basic { username, password }) => {
                req.basic_auth(username, Some(password))
            }
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response, BackendError> {
        req.send()
            .await
            .map_err(|err| BackendError::Transient(err.to_string()))
    }

    /// Map a non-success response onto the shared error taxonomy.
    ///
    /// `not_found` supplies the patch id to report for a 404; `None` means
    /// a 404 from this endpoint is an ordinary API error.
    async fn error_from_response(
        &self,
        response: Response,
        not_found: Option<u64>,
    ) -> BackendError {
        let status = response.status();
        let message = error_detail(response).await;

        match status {
            StatusCode::NOT_FOUND => match not_found {
                Some(id) => BackendError::PatchNotFound(id),
                None => BackendError::Api {
                    status: status.as_u16(),
                    message,
                },
            },
            StatusCode::UNAUTHORIZED => {
                if self.auth.is_none() {
                    BackendError::AuthRequired
                } else {
                    BackendError::AuthFailed(message)
                }
            }
            StatusCode::FORBIDDEN => BackendError::PermissionDenied(message),
            StatusCode::TOO_MANY_REQUESTS => BackendError::Transient(message),
            _ if status.is_server_error() => {
                BackendError::Transient(format!("{}: {}", status.as_u16(), message))
            }
            _ => BackendError::Api {
                status: status.as_u16(),
                message,
            },
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        not_found: Option<u64>,
    ) -> Result<T, BackendError> {
        let response = self.send(self.request(Method::GET, url)).await?;
        if !response.status().is_success() {
            return Err(self.error_from_response(response, not_found).await);
        }
        response
            .json()
            .await
            .map_err(|err| BackendError::Protocol(err.to_string()))
    }

    async fn patch_detail(&self, id: u64) -> Result<RestPatch, BackendError> {
        let url = format!("{}/patches/{}/", self.api_base, id);
        self.get_json(&url, Some(id)).await
    }

    fn require_auth(&self) -> Result<(), BackendError> {
        if self.auth.is_none() {
            return Err(BackendError::AuthRequired);
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for RestBackend {
    fn name(&self) -> &'static str {
        "rest"
    }

    async fn list_patches(&self, filter: ListFilter) -> Result<Patches, BackendError> {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(project) = &filter.project {
            params.push(("project", project.clone()));
        }
        if let Some(state) = &filter.state {
            params.push(("state", slugify(state)));
        }
        if let Some(submitter) = &filter.submitter {
            params.push(("submitter", submitter.clone()));
        }
        if let Some(delegate) = &filter.delegate {
            params.push(("delegate", delegate.clone()));
        }
        if let Some(since) = &filter.since {
            params.push(("since", since.clone()));
        }
        if let Some(archived) = filter.archived {
            params.push(("archived", archived.to_string()));
        }
        if let Some(msgid) = &filter.msgid {
            params.push(("msgid", msgid.trim_matches(['<', '>']).to_string()));
        }
        if let Some(name) = &filter.name {
            params.push(("q", name.clone()));
        }

        let url = Url::parse_with_params(&format!("{}/patches/", self.api_base), &params)
            .map_err(|err| BackendError::Protocol(format!("invalid request URL: {err}")))?;

        let pager = RestPager {
            backend: self.clone(),
            next: Some(url.to_string()),
        };
        Ok(Patches::new(Box::new(pager), filter.limit))
    }

    async fn get_patch(&self, id: u64) -> Result<Patch, BackendError> {
        Ok(self.patch_detail(id).await?.into())
    }

    async fn get_mbox(&self, id: u64) -> Result<Vec<u8>, BackendError> {
        let detail = self.patch_detail(id).await?;
        let mbox_url = detail
            .mbox
            .filter(|url| !url.is_empty())
            .ok_or(BackendError::DiffUnavailable(id))?;

        let response = self.send(self.request(Method::GET, &mbox_url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(BackendError::DiffUnavailable(id));
        }
        if !response.status().is_success() {
            return Err(self.error_from_response(response, Some(id)).await);
        }
        response
            .bytes()
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(|err| BackendError::Transient(err.to_string()))
    }

    async fn get_diff(&self, id: u64) -> Result<Vec<u8>, BackendError> {
        let detail = self.patch_detail(id).await?;
        detail
            .diff
            .filter(|diff| !diff.is_empty())
            .map(String::into_bytes)
            .ok_or(BackendError::DiffUnavailable(id))
    }

    async fn update_patch(&self, id: u64, update: PatchUpdate) -> Result<Patch, BackendError> {
        self.require_auth()?;

        let mut body = serde_json::Map::new();
        if let Some(state) = &update.state {
            body.insert("state".into(), slugify(state).into());
        }
        if let Some(archived) = update.archived {
            body.insert("archived".into(), archived.into());
        }
        if let Some(commit_ref) = &update.commit_ref {
            body.insert("commit_ref".into(), commit_ref.clone().into());
        }
        if let Some(delegate) = &update.delegate {
            body.insert("delegate".into(), delegate.clone().into());
        }

        let url = format!("{}/patches/{}/", self.api_base, id);
        let response = self
            .send(self.request(Method::PATCH, &url).json(&body))
            .await?;
        if !response.status().is_success() {
            return Err(self.error_from_response(response, Some(id)).await);
        }
        let patch: RestPatch = response
            .json()
            .await
            .map_err(|err| BackendError::Protocol(err.to_string()))?;
        Ok(patch.into())
    }

    async fn list_checks(&self, patch_id: u64) -> Result<Vec<Check>, BackendError> {
        let url = format!("{}/patches/{}/checks/", self.api_base, patch_id);
        let checks: Vec<RestCheck> = self.get_json(&url, Some(patch_id)).await?;
        checks
            .into_iter()
            .map(|check| check.into_check(patch_id))
            .collect()
    }

    async fn create_check(
        &self,
        patch_id: u64,
        check: CheckRequest,
    ) -> Result<Check, BackendError> {
        self.require_auth()?;

        let body = serde_json::json!({
            "context": check.context,
            "state": check.state.name(),
            "target_url": check.target_url.unwrap_or_default(),
            "description": check.description,
        });

        let url = format!("{}/patches/{}/checks/", self.api_base, patch_id);
        let response = self
            .send(self.request(Method::POST, &url).json(&body))
            .await?;
        if !response.status().is_success() {
            return Err(self.error_from_response(response, Some(patch_id)).await);
        }
        let check: RestCheck = response
            .json()
            .await
            .map_err(|err| BackendError::Protocol(err.to_string()))?;
        check.into_check(patch_id)
    }

    async fn list_projects(&self) -> Result<Vec<Project>, BackendError> {
        let url = format!("{}/projects/", self.api_base);
        let projects: Vec<RestProject> = self.get_json(&url, None).await?;
        Ok(projects.into_iter().map(Into::into).collect())
    }
}

/// Pager that follows `Link: <...>; rel="next"` headers.
struct RestPager {
    backend: RestBackend,
    next: Option<String>,
}

#[async_trait]
impl PatchPager for RestPager {
    async fn next_page(&mut self) -> Result<Vec<Patch>, BackendError> {
        let Some(url) = self.next.take() else {
            return Ok(Vec::new());
        };

        let response = self
            .backend
            .send(self.backend.request(Method::GET, &url))
            .await?;
        if !response.status().is_success() {
            return Err(self.backend.error_from_response(response, None).await);
        }

        self.next = parse_link_next(response.headers());
        let page: Vec<RestPatch> = response
            .json()
            .await
            .map_err(|err| BackendError::Protocol(err.to_string()))?;
        Ok(page.into_iter().map(Into::into).collect())
    }
}

/// Extract the `rel="next"` URL from a `Link` header, if present.
fn parse_link_next(headers: &HeaderMap) -> Option<String> {
    let link = headers.get("link")?.to_str().ok()?;
    for part in link.split(',') {
        let part = part.trim();
        if !part.contains("rel=\"next\"") {
            continue;
        }
        let start = part.find('<')?;
        let end = part.find('>')?;
        return Some(part[start + 1..end].to_string());
    }
    None
}

/// Normalize a configured URL into the REST API base.
fn normalize_api_base(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    if let Some(root) = trimmed.strip_suffix("/xmlrpc") {
        return format!("{root}/api");
    }
    trimmed.to_string()
}

/// Slugify a state name the way the API expects ("Under Review" ->
/// "under-review").
fn slugify(state: &str) -> String {
    state.to_lowercase().replace(' ', "-")
}

async fn error_detail(response: Response) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        detail: String,
    }

    let raw = match response.text().await {
        Ok(raw) => raw,
        Err(_) => return "unknown error".to_string(),
    };
    if let Ok(body) = serde_json::from_str::<ErrorBody>(&raw) {
        return body.detail;
    }
    if raw.is_empty() {
        return "unknown error".to_string();
    }
    let mut excerpt: String = raw.chars().take(200).collect();
    if excerpt.len() < raw.len() {
        excerpt.push('…');
    }
    excerpt
}

// Wire types, trimmed down to what the protocol-agnostic model needs.

#[derive(Debug, Deserialize)]
struct RestPerson {
    name: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RestUser {
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RestProjectRef {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RestPatch {
    id: u64,
    date: String,
    name: String,
    msgid: String,
    state: String,
    archived: bool,
    project: RestProjectRef,
    submitter: Option<RestPerson>,
    delegate: Option<RestUser>,
    commit_ref: Option<String>,
    hash: Option<String>,
    filename: Option<String>,
    mbox: Option<String>,
    diff: Option<String>,
}

impl From<RestPatch> for Patch {
    fn from(obj: RestPatch) -> Self {
        let submitter = match obj.submitter {
            Some(RestPerson {
                name: Some(name),
                email: Some(email),
            }) => format!("{name} <{email}>"),
            Some(RestPerson {
                name: None,
                email: Some(email),
            }) => email,
            Some(RestPerson { name: Some(name), .. }) => name,
            _ => String::new(),
        };
        Patch {
            id: obj.id,
            name: obj.name,
            project: obj.project.name,
            state: obj.state,
            submitter,
            delegate: obj
                .delegate
                .and_then(|user| user.username)
                .unwrap_or_default(),
            date: obj.date,
            msgid: obj.msgid,
            archived: obj.archived,
            commit_ref: obj.commit_ref.filter(|s| !s.is_empty()),
            hash: obj.hash.filter(|s| !s.is_empty()),
            filename: obj.filename.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RestCheck {
    id: u64,
    date: String,
    context: String,
    state: String,
    description: Option<String>,
    target_url: Option<String>,
    user: Option<RestUser>,
}

impl RestCheck {
    fn into_check(self, patch_id: u64) -> Result<Check, BackendError> {
        let state = CheckState::parse(&self.state)
            .ok_or_else(|| BackendError::Protocol(format!("unknown check state '{}'", self.state)))?;
        Ok(Check {
            id: self.id,
            patch_id,
            context: self.context,
            state,
            description: self.description.unwrap_or_default(),
            target_url: self.target_url.filter(|url| !url.is_empty()),
            user: self
                .user
                .and_then(|user| user.username)
                .unwrap_or_default(),
            date: self.date,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RestProject {
    id: u64,
    name: String,
    #[serde(alias = "linkname")]
    link_name: Option<String>,
}

impl From<RestProject> for Project {
    fn from(obj: RestProject) -> Self {
        Project {
            id: obj.id,
            linkname: obj.link_name.unwrap_or_else(|| obj.name.clone()),
            name: obj.name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_keeps_api_path() {
        assert_eq!(
            normalize_api_base("https://example.com/api/"),
            "https://example.com/api"
        );
    }

    #[test]
    fn normalize_rewrites_xmlrpc_path() {
        assert_eq!(
            normalize_api_base("https://example.com/xmlrpc/"),
            "https://example.com/api"
        );
    }

    #[test]
    fn slugify_states() {
        assert_eq!(slugify("Under Review"), "under-review");
        assert_eq!(slugify("New"), "new");
    }

    #[test]
    fn parse_link_next_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "link",
            "<https://example.com/api/patches/?page=3>; rel=\"next\", \
             <https://example.com/api/patches/?page=1>; rel=\"prev\""
                .parse()
                .unwrap(),
        );
        assert_eq!(
            parse_link_next(&headers).as_deref(),
            Some("https://example.com/api/patches/?page=3")
        );
    }

    #[test]
    fn parse_link_next_absent() {
        assert_eq!(parse_link_next(&HeaderMap::new()), None);
        let mut headers = HeaderMap::new();
        headers.insert(
            "link",
            "<https://example.com/api/patches/?page=1>; rel=\"prev\""
                .parse()
                .unwrap(),
        );
        assert_eq!(parse_link_next(&headers), None);
    }

    #[test]
    fn rest_patch_formats_submitter() {
        let patch: Patch = RestPatch {
            id: 1,
            date: "2024-01-01T00:00:00".into(),
            name: "test".into(),
            msgid: "<a@b>".into(),
            state: "new".into(),
            archived: false,
            project: RestProjectRef { name: "alpha".into() },
            submitter: Some(RestPerson {
                name: Some("Jane Doe".into()),
                email: Some("jane@example.com".into()),
            }),
            delegate: None,
            commit_ref: None,
            hash: None,
            filename: None,
            mbox: None,
            diff: None,
        }
        .into();
        assert_eq!(patch.submitter, "Jane Doe <jane@example.com>");
        assert_eq!(patch.delegate, "");
    }
}
