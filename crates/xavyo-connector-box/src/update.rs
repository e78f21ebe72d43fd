//! Update orchestration.
//!
//! A user update can take several remote calls: the login rename protocol,
//! the `PUT` of the changed fields, and one call per membership edge. Each
//! step awaits the previous one.
//!
//! Box only lets a login change to an address that is already a confirmed
//! email alias of the user. A rename therefore runs as a small state machine:
//! add the new address as an alias, promote it with the `PUT`, then drop the
//! old login, which Box keeps as an alias after the promotion. If the `PUT`
//! fails the alias is removed again and the original failure is returned.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument, warn};
use xavyo_connector::error::{ConnectorError, ConnectorResult};
use xavyo_connector::operation::{AttributeDeltaSet, Uid};

use crate::classify::{to_connector_error, RemoteOperation, ResourceKind};
use crate::client::{RemoteApi, RemoteRequest};
use crate::mapper::{AttributeMapper, MembershipChange, UpdatePlan};
use crate::membership::{add_membership, list_user_memberships, remove_membership};
use crate::query::QueryEngine;
use crate::schema::{BoxObjectClass, SchemaRegistry};

/// How a login rename ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameOutcome {
    /// The new login only differs in case; no alias was involved.
    Unchanged,
    /// The login changed and the old login is gone.
    Completed,
    /// The login changed but the old login is still an alias of the user.
    OldAliasRetained { alias: String },
}

/// What an update did beyond the plain field changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    pub rename: Option<RenameOutcome>,
}

#[derive(Debug)]
enum RenameState {
    Init,
    AliasAdded { alias_id: String },
    Promoted,
    RollingBack { alias_id: String, cause: ConnectorError },
    Done(RenameOutcome),
}

/// Applies attribute deltas to users and groups.
pub struct UpdateOrchestrator {
    api: Arc<dyn RemoteApi>,
    registry: Arc<SchemaRegistry>,
    query: Arc<QueryEngine>,
    page_size: u32,
}

impl UpdateOrchestrator {
    pub fn new(
        api: Arc<dyn RemoteApi>,
        registry: Arc<SchemaRegistry>,
        query: Arc<QueryEngine>,
        page_size: u32,
    ) -> Self {
        Self {
            api,
            registry,
            query,
            page_size,
        }
    }

    #[instrument(skip(self, deltas), fields(object_class = class.host_name(), uid = %uid))]
    pub async fn update(
        &self,
        class: BoxObjectClass,
        uid: &Uid,
        deltas: &AttributeDeltaSet,
    ) -> ConnectorResult<UpdateReport> {
        let schema = self.registry.schema_for(class);
        let plan = AttributeMapper::new(schema).plan_update(deltas)?;

        let report = match class {
            BoxObjectClass::User => self.update_user(uid, plan).await?,
            BoxObjectClass::Group => {
                self.put(class, uid.value(), plan.payload).await?;
                UpdateReport::default()
            }
        };

        info!(attributes = deltas.len(), "Updated object");
        Ok(report)
    }

    async fn update_user(&self, uid: &Uid, plan: UpdatePlan) -> ConnectorResult<UpdateReport> {
        let UpdatePlan {
            payload,
            identity,
            memberships,
        } = plan;

        let rename = match identity {
            Some(new_login) => Some(self.rename(uid, &new_login, payload).await?),
            None => {
                self.put(BoxObjectClass::User, uid.value(), payload).await?;
                None
            }
        };

        if let Some(change) = memberships {
            self.reconcile_memberships(uid.value(), change).await?;
        }

        Ok(UpdateReport { rename })
    }

    /// `PUT` the changed fields. An empty payload sends nothing.
    async fn put(
        &self,
        class: BoxObjectClass,
        id: &str,
        payload: Map<String, Value>,
    ) -> ConnectorResult<()> {
        if payload.is_empty() {
            debug!(id, "No field changes, skipping PUT");
            return Ok(());
        }

        self.api
            .invoke(RemoteRequest::put(
                format!("/{}/{id}", class.collection()),
                Value::Object(payload),
            ))
            .await
            .map_err(|e| to_connector_error(e, class.resource_kind(), RemoteOperation::Update, id))?;
        Ok(())
    }

    /// Change a user's login, with `payload` carrying the new login and any
    /// other field changes.
    async fn rename(
        &self,
        uid: &Uid,
        new_login: &str,
        payload: Map<String, Value>,
    ) -> ConnectorResult<RenameOutcome> {
        let user_id = uid.value();
        let old_login = match uid.name_hint() {
            Some(hint) => hint.value().to_string(),
            None => {
                self.query
                    .current_identity(BoxObjectClass::User, uid)
                    .await?
            }
        };

        if old_login.eq_ignore_ascii_case(new_login) {
            self.put(BoxObjectClass::User, user_id, payload).await?;
            return Ok(RenameOutcome::Unchanged);
        }

        let mut payload = Some(payload);
        let mut state = RenameState::Init;
        loop {
            debug!(state = ?state, "Rename step");
            state = match state {
                RenameState::Init => {
                    let alias_id = self.ensure_alias(user_id, new_login).await?;
                    RenameState::AliasAdded { alias_id }
                }
                RenameState::AliasAdded { alias_id } => {
                    let body = payload.take().unwrap_or_default();
                    match self.put(BoxObjectClass::User, user_id, body).await {
                        Ok(()) => RenameState::Promoted,
                        Err(cause) => RenameState::RollingBack { alias_id, cause },
                    }
                }
                RenameState::Promoted => {
                    RenameState::Done(self.retire_old_login(user_id, &old_login).await)
                }
                RenameState::RollingBack { alias_id, cause } => {
                    if let Err(e) = self.delete_alias(user_id, &alias_id).await {
                        warn!(
                            alias_id = %alias_id,
                            error = %e,
                            "Failed to clean up email alias after failed rename"
                        );
                    }
                    return Err(cause);
                }
                RenameState::Done(outcome) => {
                    info!(old_login = %old_login, new_login = %new_login, "Renamed user");
                    return Ok(outcome);
                }
            };
        }
    }

    /// Add `email` as a confirmed alias and return the alias id. An alias
    /// that already exists is reused.
    async fn ensure_alias(&self, user_id: &str, email: &str) -> ConnectorResult<String> {
        let added = self
            .api
            .invoke(RemoteRequest::post(
                format!("/users/{user_id}/email_aliases"),
                json!({ "email": email, "is_confirmed": true }),
            ))
            .await;

        let error = match added {
            Ok(response) => {
                return response
                    .body
                    .get("id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| ConnectorError::Serialization {
                        message: "email alias response without id".to_string(),
                    });
            }
            Err(e) => e,
        };

        // The alias may be left over from an earlier attempt.
        match self.find_alias(user_id, email).await {
            Ok(Some(alias_id)) => {
                debug!(alias_id = %alias_id, "Reusing existing email alias");
                Ok(alias_id)
            }
            Ok(None) | Err(_) => {
                warn!(email = %email, error = %error, "Failed to add email alias");
                Err(to_connector_error(
                    error,
                    ResourceKind::EmailAlias,
                    RemoteOperation::Create,
                    email,
                ))
            }
        }
    }

    async fn find_alias(&self, user_id: &str, email: &str) -> ConnectorResult<Option<String>> {
        let response = self
            .api
            .invoke(RemoteRequest::get(format!("/users/{user_id}/email_aliases")))
            .await
            .map_err(|e| {
                to_connector_error(e, ResourceKind::EmailAlias, RemoteOperation::List, user_id)
            })?;

        let found = response
            .body
            .get("entries")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .find(|alias| {
                alias
                    .get("email")
                    .and_then(Value::as_str)
                    .is_some_and(|candidate| candidate.eq_ignore_ascii_case(email))
            })
            .and_then(|alias| alias.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(found)
    }

    async fn delete_alias(&self, user_id: &str, alias_id: &str) -> ConnectorResult<()> {
        self.api
            .invoke(RemoteRequest::delete(format!(
                "/users/{user_id}/email_aliases/{alias_id}"
            )))
            .await
            .map_err(|e| {
                to_connector_error(e, ResourceKind::EmailAlias, RemoteOperation::Delete, alias_id)
            })?;
        Ok(())
    }

    /// Drop the alias Box created from the old login. Failures are logged
    /// and reported, never returned.
    async fn retire_old_login(&self, user_id: &str, old_login: &str) -> RenameOutcome {
        let result = match self.find_alias(user_id, old_login).await {
            Ok(Some(alias_id)) => self.delete_alias(user_id, &alias_id).await,
            Ok(None) => {
                debug!(old_login = %old_login, "Old login is not an alias, nothing to remove");
                Ok(())
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => RenameOutcome::Completed,
            Err(e) => {
                warn!(
                    old_login = %old_login,
                    error = %e,
                    "Failed to remove old login alias after rename"
                );
                RenameOutcome::OldAliasRetained {
                    alias: old_login.to_string(),
                }
            }
        }
    }

    /// Apply a membership change. Every add and every removal is attempted;
    /// the first failure is returned once all of them have run.
    async fn reconcile_memberships(
        &self,
        user_id: &str,
        change: MembershipChange,
    ) -> ConnectorResult<()> {
        let api = self.api.as_ref();
        let mut known_edges = None;
        let (add, remove): (Vec<String>, HashSet<String>) = match change {
            MembershipChange::Partial { add, remove } => (add, remove.into_iter().collect()),
            MembershipChange::Replace(desired) => {
                let edges = list_user_memberships(api, user_id, self.page_size).await?;
                let current: HashSet<String> =
                    edges.iter().map(|edge| edge.group_id.clone()).collect();
                let desired: HashSet<String> = desired.into_iter().collect();
                known_edges = Some(edges);
                (
                    desired.difference(&current).cloned().collect(),
                    current.difference(&desired).cloned().collect(),
                )
            }
        };

        let mut first_error = None;

        for group_id in &add {
            if let Err(e) = add_membership(api, user_id, group_id).await {
                warn!(group_id = %group_id, error = %e, "Failed to add group membership");
                first_error.get_or_insert(e);
            }
        }

        if !remove.is_empty() {
            let edges = match known_edges {
                Some(edges) => Ok(edges),
                None => list_user_memberships(api, user_id, self.page_size).await,
            };
            match edges {
                Ok(edges) => {
                    for edge in edges.iter().filter(|edge| remove.contains(&edge.group_id)) {
                        if let Err(e) = remove_membership(api, &edge.id).await {
                            warn!(
                                group_id = %edge.group_id,
                                error = %e,
                                "Failed to remove group membership"
                            );
                            first_error.get_or_insert(e);
                        }
                    }
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        debug!(added = add.len(), removed = remove.len(), "Reconciled memberships");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
