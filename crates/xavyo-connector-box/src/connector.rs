//! Box connector implementation.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use xavyo_connector::error::{ConnectorError, ConnectorResult};
use xavyo_connector::operation::{
    AttributeDeltaSet, AttributeSet, Filter, Name, OperationOptions, Uid,
};
use xavyo_connector::schema::Schema;
use xavyo_connector::traits::{
    Connector, CreateOp, DeleteOp, ResultsHandler, SchemaOp, SearchOp, UpdateDeltaOp,
};

use crate::auth::AuthProvider;
use crate::classify::{to_connector_error, RemoteOperation};
use crate::client::{HttpRemoteClient, RemoteApi, RemoteRequest};
use crate::config::BoxConfig;
use crate::mapper::AttributeMapper;
use crate::membership::{add_membership, AddOutcome};
use crate::query::QueryEngine;
use crate::schema::{BoxObjectClass, SchemaRegistry};
use crate::update::{UpdateOrchestrator, UpdateReport};

/// Provisions Box users and groups.
pub struct BoxConnector {
    display_name: String,
    api: Arc<dyn RemoteApi>,
    auth: Arc<dyn AuthProvider>,
    registry: Arc<SchemaRegistry>,
    query: Arc<QueryEngine>,
    updates: UpdateOrchestrator,
    disposed: Arc<RwLock<bool>>,
}

impl std::fmt::Debug for BoxConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxConnector")
            .field("display_name", &self.display_name)
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

impl BoxConnector {
    /// Create a connector talking to the API described by `config`.
    pub fn new(config: BoxConfig, auth: Arc<dyn AuthProvider>) -> ConnectorResult<Self> {
        config.validate()?;
        let display_name = format!("Box: {}", config.base_url);
        let page_size = config.page_size;
        let api: Arc<dyn RemoteApi> = Arc::new(HttpRemoteClient::new(config, Arc::clone(&auth))?);

        let mut connector = Self::from_parts(api, auth, page_size);
        connector.display_name = display_name;
        Ok(connector)
    }

    /// Assemble a connector around an existing API client.
    pub fn from_parts(api: Arc<dyn RemoteApi>, auth: Arc<dyn AuthProvider>, page_size: u32) -> Self {
        let registry = Arc::new(SchemaRegistry::new());
        let query = Arc::new(QueryEngine::new(
            Arc::clone(&api),
            Arc::clone(&registry),
            page_size,
        ));
        let updates = UpdateOrchestrator::new(
            Arc::clone(&api),
            Arc::clone(&registry),
            Arc::clone(&query),
            page_size,
        );

        Self {
            display_name: "Box".to_string(),
            api,
            auth,
            registry,
            query,
            updates,
            disposed: Arc::new(RwLock::new(false)),
        }
    }

    /// Apply `deltas` and report what the update did beyond the field changes,
    /// such as whether the old login survived a rename as an alias.
    pub async fn update_with_report(
        &self,
        object_class: &str,
        uid: &Uid,
        deltas: &AttributeDeltaSet,
    ) -> ConnectorResult<UpdateReport> {
        self.check_disposed().await?;
        let class = BoxObjectClass::from_host(object_class)?;
        self.updates.update(class, uid, deltas).await
    }

    async fn check_disposed(&self) -> ConnectorResult<()> {
        if *self.disposed.read().await {
            return Err(ConnectorError::InvalidConfiguration {
                message: "connector has been disposed".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Connector for BoxConnector {
    fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Liveness check: proves a fresh token can be obtained.
    #[instrument(skip(self))]
    async fn test_connection(&self) -> ConnectorResult<()> {
        self.check_disposed().await?;

        if !self.auth.can_refresh() {
            warn!("Credential cannot be refreshed");
            return Err(ConnectorError::connection_failed(
                "credential cannot be refreshed; configure client credentials",
            ));
        }

        self.auth.refresh().await?;
        info!(connector = %self.display_name, "Box connection test successful");
        Ok(())
    }

    async fn dispose(&self) -> ConnectorResult<()> {
        *self.disposed.write().await = true;
        self.auth.invalidate().await;
        info!("Box connector disposed");
        Ok(())
    }
}

impl SchemaOp for BoxConnector {
    fn schema(&self) -> Schema {
        self.registry.schema()
    }
}

#[async_trait]
impl CreateOp for BoxConnector {
    #[instrument(skip(self, attributes))]
    async fn create(&self, object_class: &str, attributes: AttributeSet) -> ConnectorResult<Uid> {
        self.check_disposed().await?;
        let class = BoxObjectClass::from_host(object_class)?;
        let payload =
            AttributeMapper::new(self.registry.schema_for(class)).to_create_payload(&attributes)?;

        debug!(name = %payload.name, "Creating Box object");
        let response = self
            .api
            .invoke(RemoteRequest::post(
                format!("/{}", class.collection()),
                serde_json::Value::Object(payload.body),
            ))
            .await
            .map_err(|e| {
                to_connector_error(e, class.resource_kind(), RemoteOperation::Create, &payload.name)
            })?;

        let id = response
            .body
            .get("id")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ConnectorError::Serialization {
                message: "create response did not contain an id".to_string(),
            })?;

        let mut first_error = None;
        for group_id in &payload.memberships {
            match add_membership(self.api.as_ref(), &id, group_id).await {
                Ok(AddOutcome::Added | AddOutcome::AlreadyMember) => {}
                Err(e) => {
                    warn!(
                        id = %id,
                        group_id = %group_id,
                        error = %e,
                        "Failed to add initial membership"
                    );
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        info!(object_class = %object_class, id = %id, "Box object created");
        Ok(Uid::with_name_hint(id, Name::new(payload.name)))
    }
}

#[async_trait]
impl SearchOp for BoxConnector {
    #[instrument(skip(self, options, handler))]
    async fn search(
        &self,
        object_class: &str,
        filter: Option<Filter>,
        options: &OperationOptions,
        handler: &mut ResultsHandler<'_>,
    ) -> ConnectorResult<()> {
        self.check_disposed().await?;
        let class = BoxObjectClass::from_host(object_class)?;
        self.query.execute(class, filter, options, handler).await
    }
}

#[async_trait]
impl UpdateDeltaOp for BoxConnector {
    #[instrument(skip(self, deltas))]
    async fn update_delta(
        &self,
        object_class: &str,
        uid: &Uid,
        deltas: AttributeDeltaSet,
    ) -> ConnectorResult<AttributeDeltaSet> {
        let report = self.update_with_report(object_class, uid, &deltas).await?;
        debug!(report = ?report, "Update finished");

        // Box never changes a user's id, so there are no side effects to report.
        Ok(AttributeDeltaSet::new())
    }
}

#[async_trait]
impl DeleteOp for BoxConnector {
    #[instrument(skip(self))]
    async fn delete(&self, object_class: &str, uid: &Uid) -> ConnectorResult<()> {
        self.check_disposed().await?;
        let class = BoxObjectClass::from_host(object_class)?;

        let mut request = RemoteRequest::delete(format!("/{}/{}", class.collection(), uid.value()));
        if class == BoxObjectClass::User {
            request = request.with_query("notify", false).with_query("force", false);
        }

        self.api.invoke(request).await.map_err(|e| {
            to_connector_error(e, class.resource_kind(), RemoteOperation::Delete, uid.value())
        })?;

        info!(object_class = %object_class, id = %uid.value(), "Box object deleted");
        Ok(())
    }
}
