//! backend::xmlrpc
//!
//! XML-RPC backend implementation.
//!
//! # Design
//!
//! Wraps the legacy Patchwork XML-RPC API (endpoint typically ending in
//! `/xmlrpc`). Requests are `methodCall` envelopes POSTed over HTTP; the
//! wire codec lives in [`wire`].
//!
//! The XML-RPC API filters by numeric ids rather than names, so state,
//! project, submitter, and delegate filters are resolved through extra
//! lookup calls (`state_list`, `project_list`, `person_list`) before the
//! patch query itself, mirroring what the service's own tooling does. A
//! filter name that resolves to nothing yields an empty sequence.
//!
//! Listing is a bulk operation on this protocol: the whole result arrives
//! in one response and is sliced client-side behind the [`Patches`]
//! sequence.
//!
//! # Authentication
//!
//! Basic auth only, carried on the HTTP layer. API tokens are rejected at
//! construction time by the selector, never here.

pub mod wire;

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, StatusCode};

use super::traits::{
    Backend, BackendError, Check, CheckRequest, CheckState, ListFilter, Patch, PatchPager,
    PatchUpdate, Patches, Project,
};
use wire::{Fault, Value, WireError};

/// User-Agent header value for API requests.
const USER_AGENT_VALUE: &str = concat!("pwclient/", env!("CARGO_PKG_VERSION"));

/// XML-RPC backend implementation.
#[derive(Clone)]
pub struct XmlRpcBackend {
    client: Client,
    url: String,
    credentials: Option<(String, String)>,
}

impl std::fmt::Debug for XmlRpcBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmlRpcBackend")
            .field("url", &self.url)
            .field("has_credentials", &self.credentials.is_some())
            .finish()
    }
}

impl XmlRpcBackend {
    /// Create a backend for the given endpoint URL.
    ///
    /// No connection is made until the first request.
    pub fn new(url: &str, credentials: Option<(String, String)>) -> Self {
        Self {
            client: Client::new(),
            url: url.trim_end_matches('/').to_string(),
            credentials,
        }
    }

    /// The endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Issue one method call and parse the response value.
    async fn call(&self, method: &str, params: &[Value]) -> Result<Value, BackendError> {
        let body = wire::method_call(method, params);

        let mut req = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "text/xml")
            .header(USER_AGENT, USER_AGENT_VALUE)
            .body(body);
        if let Some((username, password)) = &self.credentials {
            req = req.basic_auth(username, Some(password));
        }

        let response = req
            .send()
            .await
            .map_err(|err| BackendError::Transient(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(match status {
                StatusCode::UNAUTHORIZED => {
                    if self.credentials.is_none() {
                        BackendError::AuthRequired
                    } else {
                        BackendError::AuthFailed("invalid username or password".to_string())
                    }
                }
                StatusCode::FORBIDDEN => {
                    BackendError::PermissionDenied(format!("{method} refused"))
                }
                _ if status.is_server_error() => {
                    BackendError::Transient(format!("{}: {method} failed", status.as_u16()))
                }
                _ => BackendError::Api {
                    status: status.as_u16(),
                    message: format!("{method} failed"),
                },
            });
        }

        let text = response
            .text()
            .await
            .map_err(|err| BackendError::Transient(err.to_string()))?;
        wire::parse_response(&text).map_err(|err| match err {
            WireError::Fault(fault) => map_fault(fault),
            WireError::Malformed(message) => BackendError::Protocol(message),
        })
    }

    fn require_auth(&self) -> Result<(), BackendError> {
        if self.credentials.is_none() {
            return Err(BackendError::AuthRequired);
        }
        Ok(())
    }

    /// Resolve a state name prefix to its id. `Ok(None)` means no state
    /// matched.
    async fn state_id_by_name(&self, name: &str) -> Result<Option<i64>, BackendError> {
        if name.is_empty() {
            return Ok(None);
        }
        let states = self
            .call("state_list", &[name.into(), Value::Int(0)])
            .await?;
        let states = as_array(&states)?;
        for state in states {
            let members = as_struct(state)?;
            let state_name = get_str(members, "name");
            if state_name.to_lowercase().starts_with(&name.to_lowercase()) {
                return Ok(members.get("id").and_then(Value::as_int));
            }
        }
        Ok(None)
    }

    /// Resolve a project linkname to its id. `Ok(None)` means no match.
    async fn project_id_by_name(&self, linkname: &str) -> Result<Option<i64>, BackendError> {
        if linkname.is_empty() {
            return Ok(None);
        }
        let projects = self
            .call("project_list", &[linkname.into(), Value::Int(0)])
            .await?;
        for project in as_array(&projects)? {
            let members = as_struct(project)?;
            if get_str(members, "linkname") == linkname {
                return Ok(members.get("id").and_then(Value::as_int));
            }
        }
        Ok(None)
    }

    /// Resolve a partial person name or email to matching ids.
    async fn person_ids_by_name(&self, name: &str) -> Result<Vec<i64>, BackendError> {
        if name.is_empty() {
            return Ok(Vec::new());
        }
        let people = self
            .call("person_list", &[name.into(), Value::Int(0)])
            .await?;
        let mut ids = Vec::new();
        for person in as_array(&people)? {
            if let Some(id) = as_struct(person)?.get("id").and_then(Value::as_int) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    async fn fetch_filtered(&self, filter: &ListFilter) -> Result<Vec<Patch>, BackendError> {
        let mut params = BTreeMap::new();

        if let Some(limit) = filter.limit {
            params.insert("max_count".to_string(), Value::Int(limit as i64));
        }
        if let Some(archived) = filter.archived {
            params.insert("archived".to_string(), Value::Bool(archived));
        }
        if let Some(msgid) = &filter.msgid {
            params.insert("msgid".to_string(), msgid.as_str().into());
        }
        if let Some(name) = &filter.name {
            params.insert("name__icontains".to_string(), name.as_str().into());
        }

        if let Some(state) = &filter.state {
            match self.state_id_by_name(state).await? {
                Some(id) => {
                    params.insert("state_id".to_string(), Value::Int(id));
                }
                // A state the remote does not know matches nothing.
                None => return Ok(Vec::new()),
            }
        }

        if let Some(project) = &filter.project {
            match self.project_id_by_name(project).await? {
                Some(id) => {
                    params.insert("project_id".to_string(), Value::Int(id));
                }
                None => return Ok(Vec::new()),
            }
        }

        // Submitter and delegate are partial-name matches resolved to
        // person ids, one patch query per id. Submitter wins when both
        // are given.
        let person_key_and_ids = if let Some(submitter) = &filter.submitter {
            Some(("submitter_id", self.person_ids_by_name(submitter).await?))
        } else if let Some(delegate) = &filter.delegate {
            Some(("delegate_id", self.person_ids_by_name(delegate).await?))
        } else {
            None
        };

        let mut patches = Vec::new();
        match person_key_and_ids {
            Some((_, ids)) if ids.is_empty() => {}
            Some((key, ids)) => {
                for id in ids {
                    let mut params = params.clone();
                    params.insert(key.to_string(), Value::Int(id));
                    patches.extend(self.patch_list_call(params).await?);
                }
            }
            None => {
                patches.extend(self.patch_list_call(params).await?);
            }
        }

        // The protocol has no server-side 'since'; slice client-side.
        if let Some(since) = &filter.since {
            patches.retain(|patch| patch.date.as_str() >= since.as_str());
        }

        Ok(patches)
    }

    async fn patch_list_call(
        &self,
        params: BTreeMap<String, Value>,
    ) -> Result<Vec<Patch>, BackendError> {
        let result = self
            .call("patch_list", &[Value::Struct(params)])
            .await?;
        as_array(&result)?
            .iter()
            .map(|value| patch_from_value(value))
            .collect()
    }
}

#[async_trait]
impl Backend for XmlRpcBackend {
    fn name(&self) -> &'static str {
        "xmlrpc"
    }

    async fn list_patches(&self, filter: ListFilter) -> Result<Patches, BackendError> {
        let pager = XmlRpcPager {
            backend: self.clone(),
            filter: Some(filter.clone()),
        };
        Ok(Patches::new(Box::new(pager), filter.limit))
    }

    async fn get_patch(&self, id: u64) -> Result<Patch, BackendError> {
        let value = self.call("patch_get", &[Value::Int(id as i64)]).await?;
        let members = as_struct(&value)?;
        if members.is_empty() {
            // The XML-RPC API reports a missing patch as an empty struct.
            return Err(BackendError::PatchNotFound(id));
        }
        patch_from_value(&value)
    }

    async fn get_mbox(&self, id: u64) -> Result<Vec<u8>, BackendError> {
        // Distinguish a missing patch from a patch with no content.
        self.get_patch(id).await?;

        let value = self
            .call("patch_get_mbox", &[Value::Int(id as i64)])
            .await?;
        let mbox = value
            .as_str()
            .ok_or_else(|| BackendError::Protocol("patch_get_mbox returned a non-string".into()))?;
        if mbox.is_empty() {
            return Err(BackendError::DiffUnavailable(id));
        }
        Ok(mbox.into_bytes())
    }

    async fn get_diff(&self, id: u64) -> Result<Vec<u8>, BackendError> {
        self.get_patch(id).await?;

        let value = self
            .call("patch_get_diff", &[Value::Int(id as i64)])
            .await?;
        let diff = value
            .as_str()
            .ok_or_else(|| BackendError::Protocol("patch_get_diff returned a non-string".into()))?;
        if diff.is_empty() {
            return Err(BackendError::DiffUnavailable(id));
        }
        Ok(diff.into_bytes())
    }

    async fn update_patch(&self, id: u64, update: PatchUpdate) -> Result<Patch, BackendError> {
        self.require_auth()?;

        // Ensure the patch exists so a bad id maps cleanly.
        self.get_patch(id).await?;

        let mut params = BTreeMap::new();
        if let Some(state) = &update.state {
            let state_id = self.state_id_by_name(state).await?.ok_or_else(|| {
                BackendError::Api {
                    status: 400,
                    message: format!("no patch state matching '{state}'"),
                }
            })?;
            params.insert("state".to_string(), Value::Int(state_id));
        }
        if let Some(archived) = update.archived {
            params.insert("archived".to_string(), Value::Bool(archived));
        }
        if let Some(commit_ref) = &update.commit_ref {
            params.insert("commit_ref".to_string(), commit_ref.as_str().into());
        }
        if let Some(delegate) = &update.delegate {
            params.insert("delegate".to_string(), delegate.as_str().into());
        }

        self.call("patch_set", &[Value::Int(id as i64), Value::Struct(params)])
            .await?;

        self.get_patch(id).await
    }

    async fn list_checks(&self, patch_id: u64) -> Result<Vec<Check>, BackendError> {
        self.get_patch(patch_id).await?;

        let mut filters = BTreeMap::new();
        filters.insert("patch_id".to_string(), Value::Int(patch_id as i64));
        let result = self.call("check_list", &[Value::Struct(filters)]).await?;
        as_array(&result)?
            .iter()
            .map(|value| check_from_value(value, patch_id))
            .collect()
    }

    async fn create_check(
        &self,
        patch_id: u64,
        check: CheckRequest,
    ) -> Result<Check, BackendError> {
        self.require_auth()?;

        self.call(
            "check_create",
            &[
                Value::Int(patch_id as i64),
                check.context.as_str().into(),
                check.state.name().into(),
                check.target_url.clone().unwrap_or_default().into(),
                check.description.as_str().into(),
            ],
        )
        .await?;

        // The call returns only a success flag; re-fetch to report what
        // the server recorded.
        let created = self
            .list_checks(patch_id)
            .await?
            .into_iter()
            .filter(|existing| existing.context == check.context)
            .max_by_key(|existing| existing.id);
        Ok(created.unwrap_or(Check {
            id: 0,
            patch_id,
            context: check.context,
            state: check.state,
            description: check.description,
            target_url: check.target_url,
            user: String::new(),
            date: String::new(),
        }))
    }

    async fn list_projects(&self) -> Result<Vec<Project>, BackendError> {
        let result = self.call("project_list", &["".into(), Value::Int(0)]).await?;
        as_array(&result)?
            .iter()
            .map(|value| {
                let members = as_struct(value)?;
                Ok(Project {
                    id: require_id(members)?,
                    linkname: get_str(members, "linkname"),
                    name: get_str(members, "name"),
                })
            })
            .collect()
    }
}

/// Pager for the bulk XML-RPC listing: one fetch, then exhausted.
struct XmlRpcPager {
    backend: XmlRpcBackend,
    filter: Option<ListFilter>,
}

#[async_trait]
impl PatchPager for XmlRpcPager {
    async fn next_page(&mut self) -> Result<Vec<Patch>, BackendError> {
        let Some(filter) = self.filter.take() else {
            return Ok(Vec::new());
        };
        self.backend.fetch_filtered(&filter).await
    }
}

/// Map a fault onto the shared taxonomy by code.
fn map_fault(fault: Fault) -> BackendError {
    match fault.code {
        401 => BackendError::AuthFailed(fault.message),
        403 => BackendError::PermissionDenied(fault.message),
        _ => BackendError::Api {
            status: fault.code.clamp(0, u16::MAX as i64) as u16,
            message: fault.message,
        },
    }
}

fn as_array(value: &Value) -> Result<&[Value], BackendError> {
    value
        .as_array()
        .ok_or_else(|| BackendError::Protocol("expected an array response".to_string()))
}

fn as_struct(value: &Value) -> Result<&BTreeMap<String, Value>, BackendError> {
    value
        .as_struct()
        .ok_or_else(|| BackendError::Protocol("expected a struct response".to_string()))
}

fn get_str(members: &BTreeMap<String, Value>, key: &str) -> String {
    members
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
}

fn require_id(members: &BTreeMap<String, Value>) -> Result<u64, BackendError> {
    members
        .get("id")
        .and_then(Value::as_int)
        .and_then(|id| u64::try_from(id).ok())
        .ok_or_else(|| BackendError::Protocol("missing or invalid 'id' field".to_string()))
}

fn patch_from_value(value: &Value) -> Result<Patch, BackendError> {
    let members = as_struct(value)?;
    Ok(Patch {
        id: require_id(members)?,
        name: get_str(members, "name"),
        project: get_str(members, "project"),
        state: get_str(members, "state"),
        submitter: get_str(members, "submitter"),
        delegate: get_str(members, "delegate"),
        date: get_str(members, "date"),
        msgid: get_str(members, "msgid"),
        archived: members
            .get("archived")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        commit_ref: Some(get_str(members, "commit_ref")).filter(|s| !s.is_empty()),
        hash: Some(get_str(members, "hash")).filter(|s| !s.is_empty()),
        filename: get_str(members, "filename"),
    })
}

fn check_from_value(value: &Value, patch_id: u64) -> Result<Check, BackendError> {
    let members = as_struct(value)?;
    let state_name = get_str(members, "state");
    let state = CheckState::parse(&state_name)
        .ok_or_else(|| BackendError::Protocol(format!("unknown check state '{state_name}'")))?;
    Ok(Check {
        id: require_id(members)?,
        patch_id,
        context: get_str(members, "context"),
        state,
        description: get_str(members, "description"),
        target_url: Some(get_str(members, "target_url")).filter(|s| !s.is_empty()),
        user: get_str(members, "user"),
        date: get_str(members, "date"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn struct_value(pairs: &[(&str, Value)]) -> Value {
        Value::Struct(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn patch_from_struct() {
        let value = struct_value(&[
            ("id", Value::Int(42)),
            ("name", "mm: fix the thing".into()),
            ("project", "alpha".into()),
            ("state", "New".into()),
            ("submitter", "Jane Doe <jane@example.com>".into()),
            ("date", "2024-01-01 00:00:00".into()),
            ("msgid", "<a@b>".into()),
            ("archived", Value::Bool(false)),
            ("commit_ref", "".into()),
        ]);
        let patch = patch_from_value(&value).unwrap();
        assert_eq!(patch.id, 42);
        assert_eq!(patch.state, "New");
        assert_eq!(patch.commit_ref, None);
    }

    #[test]
    fn patch_without_id_is_protocol_error() {
        let value = struct_value(&[("name", "nameless".into())]);
        assert!(matches!(
            patch_from_value(&value),
            Err(BackendError::Protocol(_))
        ));
    }

    #[test]
    fn check_with_unknown_state_is_protocol_error() {
        let value = struct_value(&[
            ("id", Value::Int(1)),
            ("context", "ci".into()),
            ("state", "exploded".into()),
        ]);
        assert!(matches!(
            check_from_value(&value, 7),
            Err(BackendError::Protocol(_))
        ));
    }

    #[test]
    fn fault_codes_map_to_taxonomy() {
        assert!(matches!(
            map_fault(Fault {
                code: 403,
                message: "nope".into()
            }),
            BackendError::PermissionDenied(_)
        ));
        assert!(matches!(
            map_fault(Fault {
                code: 401,
                message: "bad creds".into()
            }),
            BackendError::AuthFailed(_)
        ));
        assert!(matches!(
            map_fault(Fault {
                code: 1,
                message: "other".into()
            }),
            BackendError::Api { status: 1, .. }
        ));
    }
}
