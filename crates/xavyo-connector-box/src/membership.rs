//! Group membership edges.
//!
//! Box models membership as its own resource (`/group_memberships`), so
//! adding a user to a group creates an edge and removing one deletes the edge
//! by its id.

use serde_json::{json, Value};
use tracing::{debug, instrument, warn};
use xavyo_connector::error::ConnectorResult;

use crate::classify::{kind_of, to_connector_error, FailureKind, RemoteOperation, ResourceKind};
use crate::client::{Pager, RemoteApi, RemoteRequest};

/// Role of a user within a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MembershipRole {
    Member,
    Admin,
}

impl MembershipRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipRole::Member => "member",
            MembershipRole::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "member" => Some(MembershipRole::Member),
            "admin" => Some(MembershipRole::Admin),
            _ => None,
        }
    }
}

/// A user's membership in a group, as read from the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipEdge {
    pub id: String,
    pub user_id: String,
    pub group_id: String,
    pub role: MembershipRole,
}

impl MembershipEdge {
    /// Parse a `group_membership` entry. Entries missing an id or carrying an
    /// unknown role are skipped.
    fn from_remote(entry: &Value) -> Option<Self> {
        let id = entry.get("id")?.as_str()?;
        let user_id = entry.pointer("/user/id")?.as_str()?;
        let group_id = entry.pointer("/group/id")?.as_str()?;
        let role = entry
            .get("role")
            .and_then(Value::as_str)
            .map_or(Some(MembershipRole::Member), MembershipRole::parse)?;

        Some(Self {
            id: id.to_string(),
            user_id: user_id.to_string(),
            group_id: group_id.to_string(),
            role,
        })
    }
}

/// Result of adding a membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    AlreadyMember,
}

async fn collect_edges(
    api: &dyn RemoteApi,
    path: String,
    owner_id: &str,
    page_size: u32,
) -> ConnectorResult<Vec<MembershipEdge>> {
    let mut pager = Pager::new(api, RemoteRequest::get(path), page_size);
    let mut edges = Vec::new();

    loop {
        let page = pager.next_page().await.map_err(|e| {
            to_connector_error(e, ResourceKind::Membership, RemoteOperation::List, owner_id)
        })?;
        let Some(entries) = page else {
            break;
        };
        edges.extend(entries.iter().filter_map(MembershipEdge::from_remote));
    }

    Ok(edges)
}

/// All memberships of a user.
#[instrument(skip(api))]
pub async fn list_user_memberships(
    api: &dyn RemoteApi,
    user_id: &str,
    page_size: u32,
) -> ConnectorResult<Vec<MembershipEdge>> {
    collect_edges(api, format!("/users/{user_id}/memberships"), user_id, page_size).await
}

/// All memberships of a group.
#[instrument(skip(api))]
pub async fn list_group_memberships(
    api: &dyn RemoteApi,
    group_id: &str,
    page_size: u32,
) -> ConnectorResult<Vec<MembershipEdge>> {
    collect_edges(api, format!("/groups/{group_id}/memberships"), group_id, page_size).await
}

/// Make `user_id` a member of `group_id`. An existing membership is success.
#[instrument(skip(api))]
pub async fn add_membership(
    api: &dyn RemoteApi,
    user_id: &str,
    group_id: &str,
) -> ConnectorResult<AddOutcome> {
    let body = json!({
        "user": { "id": user_id },
        "group": { "id": group_id },
        "role": MembershipRole::Member.as_str(),
    });

    match api
        .invoke(RemoteRequest::post("/group_memberships", body))
        .await
    {
        Ok(_) => {
            debug!(user_id, group_id, "Added group membership");
            Ok(AddOutcome::Added)
        }
        Err(e)
            if kind_of(&e, ResourceKind::Membership, RemoteOperation::Create)
                == Some(FailureKind::AlreadyExists) =>
        {
            warn!(user_id, group_id, "Membership already exists, treating as added");
            Ok(AddOutcome::AlreadyMember)
        }
        Err(e) => Err(to_connector_error(
            e,
            ResourceKind::Membership,
            RemoteOperation::Create,
            group_id,
        )),
    }
}

/// Delete one membership edge by its id.
#[instrument(skip(api))]
pub async fn remove_membership(api: &dyn RemoteApi, membership_id: &str) -> ConnectorResult<()> {
    api.invoke(RemoteRequest::delete(format!(
        "/group_memberships/{membership_id}"
    )))
    .await
    .map_err(|e| {
        to_connector_error(
            e,
            ResourceKind::Membership,
            RemoteOperation::Delete,
            membership_id,
        )
    })?;
    debug!(membership_id, "Removed group membership");
    Ok(())
}
