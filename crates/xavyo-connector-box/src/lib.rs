//! Box Connector for xavyo
//!
//! This crate implements the xavyo-connector traits for the Box directory,
//! provisioning enterprise users and groups through the Box Content API.
//!
//! # Features
//!
//! - Create, read, search, update and delete for users and groups
//! - Attribute projection with minimal, standard and full tiers
//! - Login rename through the email alias swap Box requires
//! - Group membership reconciliation, partial or by full replacement
//! - Typed error classification of Box API failures
//! - Static developer tokens or client-credentials grants
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use xavyo_connector::prelude::*;
//! use xavyo_connector_box::{BoxAppSettings, BoxConfig, BoxConnector, ClientCredentials};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BoxConfig::default();
//! let settings = BoxAppSettings::from_json(&std::fs::read_to_string("box_config.json")?)?;
//! let auth = Arc::new(ClientCredentials::from_app_settings(settings, config.token_url.clone()));
//!
//! let connector = BoxConnector::new(config, auth)?;
//! connector.test_connection().await?;
//!
//! let _uid = connector
//!     .create(
//!         ACCOUNT_OBJECT_CLASS,
//!         AttributeSet::new()
//!             .with(NAME, "ceo@example.com")
//!             .with("name", "Aaron Levie"),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod auth;
mod classify;
mod client;
mod config;
mod connector;
mod mapper;
mod membership;
mod query;
mod retry;
mod schema;
mod update;

// Re-exports
pub use auth::{AuthProvider, ClientCredentials, StaticToken, TokenSubject};
pub use classify::{classify, FailureKind, RemoteOperation, ResourceKind};
pub use client::{
    HttpMethod, HttpRemoteClient, RemoteApi, RemoteError, RemoteRequest, RemoteResponse,
};
pub use config::{BoxAppSettings, BoxConfig, ProxyConfig, MAX_PAGE_SIZE};
pub use connector::BoxConnector;
pub use mapper::{AttributeMapper, CreatePayload, MembershipChange, RemoteResource, UpdatePlan};
pub use membership::{MembershipEdge, MembershipRole};
pub use retry::{LogVerbosity, RetryConfig};
pub use schema::{
    AttributeDefinition, Binding, BoxObjectClass, NotFoundPolicy, ObjectClassSchema, Projection,
    SchemaRegistry, Tier,
};
pub use update::{RenameOutcome, UpdateReport};
