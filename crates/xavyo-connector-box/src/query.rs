//! Lookup strategies: by id, by name, and full enumeration.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, instrument, warn};
use xavyo_connector::error::{ConnectorError, ConnectorResult};
use xavyo_connector::operation::{ConnectorObject, Filter, Name, OperationOptions, Uid};
use xavyo_connector::traits::ResultsHandler;

use crate::classify::{kind_of, to_connector_error, FailureKind, RemoteOperation};
use crate::client::{Pager, RemoteApi, RemoteRequest};
use crate::config::MAX_PAGE_SIZE;
use crate::mapper::{AttributeMapper, RemoteResource};
use crate::membership::{list_group_memberships, list_user_memberships};
use crate::schema::{BoxObjectClass, NotFoundPolicy, Projection, SchemaRegistry};

/// Runs searches and single reads against the Box API.
pub struct QueryEngine {
    api: Arc<dyn RemoteApi>,
    registry: Arc<SchemaRegistry>,
    page_size: u32,
}

impl QueryEngine {
    pub fn new(api: Arc<dyn RemoteApi>, registry: Arc<SchemaRegistry>, page_size: u32) -> Self {
        Self {
            api,
            registry,
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    fn page_size(&self, options: &OperationOptions) -> u32 {
        options
            .page_size
            .map_or(self.page_size, |size| size.clamp(1, MAX_PAGE_SIZE))
    }

    /// Stream the objects matching `filter` to `handler`.
    #[instrument(skip(self, options, handler), fields(object_class = class.host_name()))]
    pub async fn execute(
        &self,
        class: BoxObjectClass,
        filter: Option<Filter>,
        options: &OperationOptions,
        handler: &mut ResultsHandler<'_>,
    ) -> ConnectorResult<()> {
        let schema = self.registry.schema_for(class);
        let projection = Projection::from_options(schema, options);

        match filter {
            Some(Filter::Uid(uid)) => self.by_uid(class, &uid, &projection, handler).await,
            Some(Filter::Name(name)) => {
                self.by_name(class, &name, &projection, options, handler)
                    .await
            }
            None => self.enumerate(class, &projection, options, handler).await,
        }
    }

    async fn by_uid(
        &self,
        class: BoxObjectClass,
        uid: &Uid,
        projection: &Projection<'_>,
        handler: &mut ResultsHandler<'_>,
    ) -> ConnectorResult<()> {
        let request = RemoteRequest::get(format!("/{}/{}", class.collection(), uid.value()))
            .with_query("fields", projection.fields_param());

        let body = match self.api.invoke(request).await {
            Ok(response) => response.body,
            Err(e)
                if kind_of(&e, class.resource_kind(), RemoteOperation::Read)
                    == Some(FailureKind::NotFound) =>
            {
                return match self.registry.schema_for(class).not_found_policy() {
                    NotFoundPolicy::EmptyResult => {
                        warn!(uid = %uid, "Object not found, returning no results");
                        Ok(())
                    }
                    NotFoundPolicy::UnknownIdentity => {
                        warn!(uid = %uid, "Unknown uid");
                        Err(ConnectorError::unknown_uid(uid.value()))
                    }
                };
            }
            Err(e) => {
                return Err(to_connector_error(
                    e,
                    class.resource_kind(),
                    RemoteOperation::Read,
                    uid.value(),
                ))
            }
        };

        let object = self.materialize(class, projection, body).await?;
        handler(object);
        Ok(())
    }

    async fn by_name(
        &self,
        class: BoxObjectClass,
        name: &Name,
        projection: &Projection<'_>,
        options: &OperationOptions,
        handler: &mut ResultsHandler<'_>,
    ) -> ConnectorResult<()> {
        let wanted = name.value();
        let request = RemoteRequest::get(format!("/{}", class.collection()))
            .with_query("filter_term", wanted)
            .with_query("fields", projection.fields_param());
        let mut pager = Pager::new(self.api.as_ref(), request, self.page_size(options));

        while let Some(entries) = pager.next_page().await.map_err(|e| {
            to_connector_error(e, class.resource_kind(), RemoteOperation::List, wanted)
        })? {
            // filter_term is a prefix match; equality is checked here.
            let hit = entries.into_iter().find(|entry| {
                entry
                    .get(class.identity_field())
                    .and_then(Value::as_str)
                    .is_some_and(|candidate| candidate.eq_ignore_ascii_case(wanted))
            });

            if let Some(entry) = hit {
                let object = self.materialize(class, projection, entry).await?;
                handler(object);
                return Ok(());
            }
        }

        debug!(name = %wanted, "No object with this name");
        Ok(())
    }

    async fn enumerate(
        &self,
        class: BoxObjectClass,
        projection: &Projection<'_>,
        options: &OperationOptions,
        handler: &mut ResultsHandler<'_>,
    ) -> ConnectorResult<()> {
        let request = RemoteRequest::get(format!("/{}", class.collection()))
            .with_query("fields", projection.fields_param());
        let mut pager = Pager::new(self.api.as_ref(), request, self.page_size(options));
        let mut delivered = 0usize;

        while let Some(entries) = pager.next_page().await.map_err(|e| {
            to_connector_error(e, class.resource_kind(), RemoteOperation::List, class.collection())
        })? {
            for entry in entries {
                let object = self.materialize(class, projection, entry).await?;
                delivered += 1;
                if !handler(object) {
                    debug!(delivered, "Handler stopped the search");
                    return Ok(());
                }
            }
        }

        debug!(delivered, "Enumeration complete");
        Ok(())
    }

    /// Map one fetched entry, fetching memberships when the projection asks
    /// for them.
    async fn materialize(
        &self,
        class: BoxObjectClass,
        projection: &Projection<'_>,
        entry: Value,
    ) -> ConnectorResult<ConnectorObject> {
        let schema = self.registry.schema_for(class);
        let resource = RemoteResource::from_value(entry)?;

        let memberships = match (projection.needs_memberships(), resource.id()) {
            (true, Some(id)) => Some(match class {
                BoxObjectClass::User => {
                    list_user_memberships(self.api.as_ref(), id, self.page_size).await?
                }
                BoxObjectClass::Group => {
                    list_group_memberships(self.api.as_ref(), id, self.page_size).await?
                }
            }),
            _ => None,
        };

        AttributeMapper::new(schema).from_remote(&resource, projection, memberships.as_deref())
    }

    /// Current value of the identity field, read with a minimal projection.
    pub async fn current_identity(&self, class: BoxObjectClass, uid: &Uid) -> ConnectorResult<String> {
        let field = class.identity_field();
        let request = RemoteRequest::get(format!("/{}/{}", class.collection(), uid.value()))
            .with_query("fields", field);

        let body = self
            .api
            .invoke(request)
            .await
            .map_err(|e| {
                to_connector_error(e, class.resource_kind(), RemoteOperation::Read, uid.value())
            })?
            .body;

        body.get(field)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ConnectorError::Serialization {
                message: format!("{} {uid} without {field}", class.collection()),
            })
    }
}
