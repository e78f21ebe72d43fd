//! Common test utilities for xavyo-connector-box integration tests.
//!
//! Two in-memory [`RemoteApi`] implementations:
//! - [`ScriptedApi`] answers from a fixed script and checks that calls arrive
//!   in exactly the scripted order.
//! - [`FakeBox`] keeps users, groups, aliases and memberships in memory and
//!   behaves like the parts of the Box API the connector uses.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use serde_json::{json, Value};
use xavyo_connector_box::{
    BoxConnector, HttpMethod, RemoteApi, RemoteError, RemoteRequest, RemoteResponse, StaticToken,
};

static INIT: Once = Once::new();

/// Initialize logging for tests (once).
pub fn init_test_logging() {
    INIT.call_once(|| {
        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::fmt()
                .with_test_writer()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .try_init()
                .ok();
        }
    });
}

/// Box error body.
pub fn box_error(status: u16, code: &str, message: &str) -> RemoteError {
    RemoteError::from_response(
        status,
        json!({
            "type": "error",
            "status": status,
            "code": code,
            "message": message,
            "request_id": "test"
        })
        .to_string(),
    )
}

/// Test data factory for Box users.
pub fn box_user(id: &str, login: &str, name: &str) -> Value {
    json!({
        "type": "user",
        "id": id,
        "login": login,
        "name": name,
        "status": "active",
        "created_at": "2012-12-12T10:53:43-08:00",
        "modified_at": "2012-12-12T11:04:26-08:00",
        "language": "en",
        "timezone": "Africa/Bujumbura",
        "space_amount": 11345156112i64,
        "space_used": 1237009912,
        "max_upload_size": 2147483648i64,
        "job_title": "CEO",
        "phone": "6509241374",
        "address": "900 Jefferson Ave, Redwood City, CA 94063",
        "avatar_url": "https://www.box.com/api/avatar/large/181216415",
        "role": "user",
        "enterprise": {"type": "enterprise", "id": "11446498", "name": "Acme Inc."}
    })
}

/// Test data factory for Box groups.
pub fn box_group(id: &str, name: &str) -> Value {
    json!({
        "type": "group",
        "id": id,
        "name": name,
        "group_type": "managed_group",
        "created_at": "2012-12-12T10:53:43-08:00",
        "modified_at": "2012-12-12T11:04:26-08:00"
    })
}

/// Wrap entries in a Box collection.
pub fn collection(entries: Vec<Value>, offset: usize, limit: usize, total: usize) -> Value {
    json!({
        "total_count": total,
        "entries": entries,
        "offset": offset,
        "limit": limit
    })
}

/// Connector over an in-memory API with a static token.
pub fn connector_over(api: Arc<dyn RemoteApi>, page_size: u32) -> BoxConnector {
    BoxConnector::from_parts(api, Arc::new(StaticToken::new("test-token")), page_size)
}

// =============================================================================
// ScriptedApi
// =============================================================================

struct Step {
    method: HttpMethod,
    path: String,
    outcome: Result<RemoteResponse, RemoteError>,
}

/// Answers calls from a script, asserting method and path of each call.
#[derive(Default)]
pub struct ScriptedApi {
    steps: Mutex<VecDeque<Step>>,
    received: Mutex<Vec<RemoteRequest>>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, method: HttpMethod, path: &str, status: u16, body: Value) -> Self {
        self.push(method, path, Ok(RemoteResponse::new(status, body)))
    }

    pub fn fail(self, method: HttpMethod, path: &str, error: RemoteError) -> Self {
        self.push(method, path, Err(error))
    }

    fn push(
        self,
        method: HttpMethod,
        path: &str,
        outcome: Result<RemoteResponse, RemoteError>,
    ) -> Self {
        self.steps.lock().unwrap().push_back(Step {
            method,
            path: path.to_string(),
            outcome,
        });
        self
    }

    pub fn received(&self) -> Vec<RemoteRequest> {
        self.received.lock().unwrap().clone()
    }

    /// Method and path of every call, e.g. `"PUT /users/1"`.
    pub fn calls(&self) -> Vec<String> {
        self.received()
            .iter()
            .map(|r| format!("{} {}", r.method, r.path))
            .collect()
    }

    pub fn assert_exhausted(&self) {
        let remaining: Vec<String> = self
            .steps
            .lock()
            .unwrap()
            .iter()
            .map(|s| format!("{} {}", s.method, s.path))
            .collect();
        assert!(remaining.is_empty(), "unused scripted calls: {remaining:?}");
    }
}

#[async_trait]
impl RemoteApi for ScriptedApi {
    async fn invoke(&self, request: RemoteRequest) -> Result<RemoteResponse, RemoteError> {
        self.received.lock().unwrap().push(request.clone());
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected call: {} {}", request.method, request.path));
        assert_eq!(
            (step.method, step.path.as_str()),
            (request.method, request.path.as_str()),
            "call out of script order"
        );
        step.outcome
    }
}

// =============================================================================
// FakeBox
// =============================================================================

#[derive(Default)]
struct State {
    next_id: u64,
    users: BTreeMap<String, Value>,
    groups: BTreeMap<String, Value>,
    /// user id -> (alias id, email)
    aliases: BTreeMap<String, Vec<(String, String)>>,
    /// membership id -> (user id, group id, role)
    memberships: BTreeMap<String, (String, String, String)>,
    failures: Vec<(HttpMethod, String, RemoteError)>,
    log: Vec<RemoteRequest>,
}

impl State {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        (1000 + self.next_id).to_string()
    }
}

/// In-memory Box.
#[derive(Default)]
pub struct FakeBox {
    state: Mutex<State>,
}

fn not_found(what: &str) -> RemoteError {
    box_error(404, "not_found", &format!("Not Found: {what}"))
}

fn query_usize(request: &RemoteRequest, key: &str, default: usize) -> usize {
    request
        .query_value(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn page(request: &RemoteRequest, items: Vec<Value>) -> RemoteResponse {
    let limit = query_usize(request, "limit", 100);
    let offset = query_usize(request, "offset", 0);
    let total = items.len();
    let entries: Vec<Value> = items.into_iter().skip(offset).take(limit).collect();
    RemoteResponse::new(200, collection(entries, offset, limit, total))
}

fn merge(target: &mut Value, patch: &Value) {
    if let (Some(target), Some(patch)) = (target.as_object_mut(), patch.as_object()) {
        for (key, value) in patch {
            target.insert(key.clone(), value.clone());
        }
    }
}

fn same(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

impl FakeBox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, id: &str, login: &str, name: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .users
            .insert(id.to_string(), box_user(id, login, name));
        self
    }

    pub fn with_group(self, id: &str, name: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .groups
            .insert(id.to_string(), box_group(id, name));
        self
    }

    pub fn with_membership(self, user_id: &str, group_id: &str, role: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let id = state.next_id();
            state.memberships.insert(
                format!("m{id}"),
                (user_id.to_string(), group_id.to_string(), role.to_string()),
            );
        }
        self
    }

    pub fn with_alias(self, user_id: &str, email: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let id = state.next_id();
            state
                .aliases
                .entry(user_id.to_string())
                .or_default()
                .push((format!("a{id}"), email.to_string()));
        }
        self
    }

    /// Fail the next call matching `method` and `path` with `error`.
    pub fn fail_next(&self, method: HttpMethod, path: &str, error: RemoteError) {
        self.state
            .lock()
            .unwrap()
            .failures
            .push((method, path.to_string(), error));
    }

    pub fn user(&self, id: &str) -> Option<Value> {
        self.state.lock().unwrap().users.get(id).cloned()
    }

    pub fn group(&self, id: &str) -> Option<Value> {
        self.state.lock().unwrap().groups.get(id).cloned()
    }

    /// Sorted group ids of a user's memberships.
    pub fn groups_of(&self, user_id: &str) -> Vec<String> {
        let mut groups: Vec<String> = self
            .state
            .lock()
            .unwrap()
            .memberships
            .values()
            .filter(|(user, _, _)| user == user_id)
            .map(|(_, group, _)| group.clone())
            .collect();
        groups.sort();
        groups
    }

    /// Sorted alias emails of a user.
    pub fn aliases_of(&self, user_id: &str) -> Vec<String> {
        let mut emails: Vec<String> = self
            .state
            .lock()
            .unwrap()
            .aliases
            .get(user_id)
            .map(|aliases| aliases.iter().map(|(_, email)| email.clone()).collect())
            .unwrap_or_default();
        emails.sort();
        emails
    }

    pub fn requests(&self) -> Vec<RemoteRequest> {
        self.state.lock().unwrap().log.clone()
    }

    /// Method and path of every call, e.g. `"PUT /users/1"`.
    pub fn calls(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|r| format!("{} {}", r.method, r.path))
            .collect()
    }

    fn membership_entry(id: &str, user: &str, group: &str, role: &str) -> Value {
        json!({
            "type": "group_membership",
            "id": id,
            "user": {"type": "user", "id": user},
            "group": {"type": "group", "id": group},
            "role": role
        })
    }

    fn handle(state: &mut State, request: &RemoteRequest) -> Result<RemoteResponse, RemoteError> {
        let body = request.body.clone().unwrap_or(Value::Null);
        let segments: Vec<&str> = request.path.trim_matches('/').split('/').collect();

        match (request.method, segments.as_slice()) {
            // Users
            (HttpMethod::Post, ["users"]) => {
                let login = body["login"].as_str().unwrap_or_default().to_string();
                if state
                    .users
                    .values()
                    .any(|u| same(u["login"].as_str().unwrap_or_default(), &login))
                {
                    return Err(box_error(
                        409,
                        "user_login_already_used",
                        "User with the specified login already exists",
                    ));
                }
                let id = state.next_id();
                let mut user = json!({"type": "user", "id": id, "status": "active"});
                merge(&mut user, &body);
                state.users.insert(id, user.clone());
                Ok(RemoteResponse::new(201, user))
            }
            (HttpMethod::Get, ["users"]) => {
                let term = request.query_value("filter_term").unwrap_or_default().to_lowercase();
                let users = state
                    .users
                    .values()
                    .filter(|u| {
                        let login = u["login"].as_str().unwrap_or_default().to_lowercase();
                        let name = u["name"].as_str().unwrap_or_default().to_lowercase();
                        login.starts_with(&term) || name.starts_with(&term)
                    })
                    .cloned()
                    .collect();
                Ok(page(request, users))
            }
            (HttpMethod::Get, ["users", id]) => state
                .users
                .get(*id)
                .cloned()
                .map(|u| RemoteResponse::new(200, u))
                .ok_or_else(|| not_found(id)),
            (HttpMethod::Put, ["users", id]) => {
                let Some(current) = state.users.get(*id).cloned() else {
                    return Err(not_found(id));
                };
                let old_login = current["login"].as_str().unwrap_or_default().to_string();
                if let Some(new_login) = body["login"].as_str() {
                    if !same(new_login, &old_login) {
                        let aliases = state.aliases.entry(id.to_string()).or_default();
                        let Some(position) = aliases.iter().position(|(_, e)| same(e, new_login))
                        else {
                            return Err(box_error(
                                400,
                                "bad_request",
                                "login must be a confirmed email alias",
                            ));
                        };
                        let (alias_id, _) = aliases.remove(position);
                        aliases.push((alias_id, old_login));
                    }
                }
                let user = state.users.entry(id.to_string()).or_insert(current);
                merge(user, &body);
                Ok(RemoteResponse::new(200, user.clone()))
            }
            (HttpMethod::Delete, ["users", id]) => {
                if state.users.remove(*id).is_none() {
                    return Err(not_found(id));
                }
                state.memberships.retain(|_, (user, _, _)| user != id);
                state.aliases.remove(*id);
                Ok(RemoteResponse::new(204, Value::Null))
            }
            (HttpMethod::Get, ["users", id, "memberships"]) => {
                if !state.users.contains_key(*id) {
                    return Err(not_found(id));
                }
                let entries = state
                    .memberships
                    .iter()
                    .filter(|(_, (user, _, _))| user == id)
                    .map(|(m, (user, group, role))| Self::membership_entry(m, user, group, role))
                    .collect();
                Ok(page(request, entries))
            }

            // Email aliases
            (HttpMethod::Post, ["users", id, "email_aliases"]) => {
                if !state.users.contains_key(*id) {
                    return Err(not_found(id));
                }
                let email = body["email"].as_str().unwrap_or_default().to_string();
                if state
                    .aliases
                    .get(*id)
                    .is_some_and(|aliases| aliases.iter().any(|(_, e)| same(e, &email)))
                {
                    return Err(box_error(409, "conflict", "Alias already exists"));
                }
                let alias_id = format!("a{}", state.next_id());
                state
                    .aliases
                    .entry(id.to_string())
                    .or_default()
                    .push((alias_id.clone(), email.clone()));
                Ok(RemoteResponse::new(
                    201,
                    json!({"type": "email_alias", "id": alias_id, "email": email, "is_confirmed": true}),
                ))
            }
            (HttpMethod::Get, ["users", id, "email_aliases"]) => {
                let entries: Vec<Value> = state
                    .aliases
                    .get(*id)
                    .into_iter()
                    .flatten()
                    .map(|(alias_id, email)| {
                        json!({"type": "email_alias", "id": alias_id, "email": email, "is_confirmed": true})
                    })
                    .collect();
                Ok(RemoteResponse::new(
                    200,
                    json!({"total_count": entries.len(), "entries": entries}),
                ))
            }
            (HttpMethod::Delete, ["users", id, "email_aliases", alias_id]) => {
                let aliases = state.aliases.entry(id.to_string()).or_default();
                let before = aliases.len();
                aliases.retain(|(a, _)| a != alias_id);
                if aliases.len() == before {
                    return Err(not_found(alias_id));
                }
                Ok(RemoteResponse::new(204, Value::Null))
            }

            // Groups
            (HttpMethod::Post, ["groups"]) => {
                let name = body["name"].as_str().unwrap_or_default().to_string();
                if state
                    .groups
                    .values()
                    .any(|g| same(g["name"].as_str().unwrap_or_default(), &name))
                {
                    return Err(box_error(409, "conflict", "Group already exists"));
                }
                let id = state.next_id();
                let mut group = json!({"type": "group", "id": id, "group_type": "managed_group"});
                merge(&mut group, &body);
                state.groups.insert(id, group.clone());
                Ok(RemoteResponse::new(201, group))
            }
            (HttpMethod::Get, ["groups"]) => {
                let term = request.query_value("filter_term").unwrap_or_default().to_lowercase();
                let groups = state
                    .groups
                    .values()
                    .filter(|g| {
                        g["name"]
                            .as_str()
                            .unwrap_or_default()
                            .to_lowercase()
                            .starts_with(&term)
                    })
                    .cloned()
                    .collect();
                Ok(page(request, groups))
            }
            (HttpMethod::Get, ["groups", id]) => state
                .groups
                .get(*id)
                .cloned()
                .map(|g| RemoteResponse::new(200, g))
                .ok_or_else(|| not_found(id)),
            (HttpMethod::Put, ["groups", id]) => {
                let Some(group) = state.groups.get_mut(*id) else {
                    return Err(not_found(id));
                };
                merge(group, &body);
                Ok(RemoteResponse::new(200, group.clone()))
            }
            (HttpMethod::Delete, ["groups", id]) => {
                if state.groups.remove(*id).is_none() {
                    return Err(not_found(id));
                }
                state.memberships.retain(|_, (_, group, _)| group != id);
                Ok(RemoteResponse::new(204, Value::Null))
            }
            (HttpMethod::Get, ["groups", id, "memberships"]) => {
                if !state.groups.contains_key(*id) {
                    return Err(not_found(id));
                }
                let entries = state
                    .memberships
                    .iter()
                    .filter(|(_, (_, group, _))| group == id)
                    .map(|(m, (user, group, role))| Self::membership_entry(m, user, group, role))
                    .collect();
                Ok(page(request, entries))
            }

            // Memberships
            (HttpMethod::Post, ["group_memberships"]) => {
                let user = body["user"]["id"].as_str().unwrap_or_default().to_string();
                let group = body["group"]["id"].as_str().unwrap_or_default().to_string();
                let role = body["role"].as_str().unwrap_or("member").to_string();
                if !state.users.contains_key(&user) {
                    return Err(not_found(&user));
                }
                if !state.groups.contains_key(&group) {
                    return Err(not_found(&group));
                }
                if state
                    .memberships
                    .values()
                    .any(|(u, g, _)| *u == user && *g == group)
                {
                    return Err(box_error(409, "conflict", "User is already a member"));
                }
                let id = format!("m{}", state.next_id());
                let entry = Self::membership_entry(&id, &user, &group, &role);
                state.memberships.insert(id, (user, group, role));
                Ok(RemoteResponse::new(201, entry))
            }
            (HttpMethod::Delete, ["group_memberships", id]) => {
                if state.memberships.remove(*id).is_none() {
                    return Err(not_found(id));
                }
                Ok(RemoteResponse::new(204, Value::Null))
            }

            _ => Err(box_error(405, "method_not_allowed", "Method Not Allowed")),
        }
    }
}

#[async_trait]
impl RemoteApi for FakeBox {
    async fn invoke(&self, request: RemoteRequest) -> Result<RemoteResponse, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.log.push(request.clone());

        if let Some(position) = state
            .failures
            .iter()
            .position(|(method, path, _)| *method == request.method && *path == request.path)
        {
            let (_, _, error) = state.failures.remove(position);
            return Err(error);
        }

        Self::handle(&mut state, &request)
    }
}
