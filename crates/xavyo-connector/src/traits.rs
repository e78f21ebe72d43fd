//! Connector Framework traits
//!
//! Capability-based trait definitions for connectors, inspired by `ConnId`.
//! A connector implements [`Connector`] plus whichever operations it supports.

use async_trait::async_trait;

use crate::error::{ConnectorError, ConnectorResult};
use crate::operation::{
    AttributeDeltaSet, AttributeSet, ConnectorObject, Filter, OperationOptions, Uid,
};
use crate::schema::Schema;

/// Callback receiving search results one at a time.
///
/// Returning `false` stops the search; no further results are fetched.
pub type ResultsHandler<'a> = dyn FnMut(ConnectorObject) -> bool + Send + 'a;

/// Base trait for all connectors.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Get the display name for this connector instance.
    fn display_name(&self) -> &str;

    /// Verify the connector can talk to the target system.
    ///
    /// Returns `Ok(())` when a working credential is available, or an error
    /// describing what went wrong.
    async fn test_connection(&self) -> ConnectorResult<()>;

    /// Dispose of connector resources.
    async fn dispose(&self) -> ConnectorResult<()> {
        Ok(())
    }

    /// Lightweight health check, cheaper than `test_connection`.
    fn is_healthy(&self) -> bool {
        true
    }
}

/// Capability for describing the object classes and attributes a connector
/// supports.
pub trait SchemaOp: Connector {
    /// Get the schema.
    fn schema(&self) -> Schema;
}

/// Capability for creating objects in the target system.
#[async_trait]
pub trait CreateOp: Connector {
    /// Create a new object in the target system.
    ///
    /// # Returns
    /// The identifier assigned by the target system, carrying the new name as
    /// its hint.
    async fn create(&self, object_class: &str, attributes: AttributeSet) -> ConnectorResult<Uid>;
}

/// Capability for applying attribute deltas to existing objects.
#[async_trait]
pub trait UpdateDeltaOp: Connector {
    /// Apply `deltas` to the object identified by `uid`.
    ///
    /// # Returns
    /// Attribute changes the target system made as a side effect.
    async fn update_delta(
        &self,
        object_class: &str,
        uid: &Uid,
        deltas: AttributeDeltaSet,
    ) -> ConnectorResult<AttributeDeltaSet>;
}

/// Capability for deleting objects from the target system.
#[async_trait]
pub trait DeleteOp: Connector {
    /// Delete an object from the target system.
    async fn delete(&self, object_class: &str, uid: &Uid) -> ConnectorResult<()>;
}

/// Capability for searching objects in the target system.
#[async_trait]
pub trait SearchOp: Connector {
    /// Stream objects matching `filter` to `handler`.
    ///
    /// `None` enumerates every object of the class.
    async fn search(
        &self,
        object_class: &str,
        filter: Option<Filter>,
        options: &OperationOptions,
        handler: &mut ResultsHandler<'_>,
    ) -> ConnectorResult<()>;

    /// Read a single object by its UID.
    ///
    /// A missing object is `Ok(None)`, whatever the search semantics of the
    /// object class are.
    async fn read(
        &self,
        object_class: &str,
        uid: &Uid,
        options: &OperationOptions,
    ) -> ConnectorResult<Option<ConnectorObject>> {
        let mut found = None;
        let result = self
            .search(
                object_class,
                Some(Filter::Uid(uid.clone())),
                options,
                &mut |object: ConnectorObject| {
                    found = Some(object);
                    false
                },
            )
            .await;

        match result {
            Ok(()) => Ok(found),
            Err(ConnectorError::UnknownUid { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
