//! # Connector Framework
//!
//! Core abstractions for connecting xavyo to external identity systems.
//!
//! This crate defines the contract between the provisioning host and a
//! connector: the object model exchanged on every call, the schema a
//! connector advertises, the typed error taxonomy, and the capability traits
//! a connector implements.
//!
//! ## Architecture
//!
//! The framework uses a capability-based trait system inspired by `ConnId`:
//!
//! - [`Connector`] - Base trait all connectors implement
//! - [`SchemaOp`] - Advertise object classes and attributes
//! - [`CreateOp`], [`UpdateDeltaOp`], [`DeleteOp`] - Write operations
//! - [`SearchOp`] - Streamed, interruptible search and single reads
//!
//! ## Example
//!
//! ```ignore
//! use xavyo_connector::prelude::*;
//!
//! connector.test_connection().await?;
//!
//! let attrs = AttributeSet::new()
//!     .with(NAME, "ceo@example.com")
//!     .with("name", "Aaron Levie");
//! let uid = connector.create(ACCOUNT_OBJECT_CLASS, attrs).await?;
//!
//! let deltas = AttributeDeltaSet::new()
//!     .with(AttributeDelta::replace_single(NAME, "ceo2@example.com"));
//! connector.update_delta(ACCOUNT_OBJECT_CLASS, &uid, deltas).await?;
//! ```
//!
//! ## Crate Organization
//!
//! - [`error`] - Error taxonomy with transient/permanent classification
//! - [`traits`] - Connector capability traits
//! - [`schema`] - Schema description types
//! - [`operation`] - Uid/Name, attribute sets and deltas, filters, options
//!
//! [`Connector`]: traits::Connector
//! [`SchemaOp`]: traits::SchemaOp
//! [`CreateOp`]: traits::CreateOp
//! [`UpdateDeltaOp`]: traits::UpdateDeltaOp
//! [`DeleteOp`]: traits::DeleteOp
//! [`SearchOp`]: traits::SearchOp

pub mod error;
pub mod operation;
pub mod schema;
pub mod traits;

/// Prelude module for convenient imports.
///
/// ```
/// use xavyo_connector::prelude::*;
/// ```
pub mod prelude {
    // Error handling
    pub use crate::error::{ConnectorError, ConnectorResult};

    // Traits
    pub use crate::traits::{
        Connector, CreateOp, DeleteOp, ResultsHandler, SchemaOp, SearchOp, UpdateDeltaOp,
    };

    // Schema
    pub use crate::schema::{
        AttributeDataType, AttributeInfo, ObjectClassInfo, Schema, ACCOUNT_OBJECT_CLASS,
        GROUP_OBJECT_CLASS,
    };

    // Operations
    pub use crate::operation::{
        AttributeDelta, AttributeDeltaSet, AttributeSet, AttributeValue, ConnectorObject, Filter,
        Name, OperationOptions, Uid, ENABLE, NAME, UID,
    };
}

// Re-export async_trait for connector implementors
pub use async_trait::async_trait;
