//! Request traffic logging for axum applications
//!
//! A [`Traffic`] facade binds one or more [`Store`]s to a host application.
//! Its watcher middleware times each request, collects a fixed set of
//! attributes and hands the resulting [`TrafficEvent`] to every store, each of
//! which keeps only what its own [`LogPolicy`] enables.
//!
//! ```ignore
//! let traffic = Traffic::init_app(
//!     Some(HostApp::new("shop", "./instance")),
//!     vec![
//!         Box::new(CsvStore::new().with_policy(LogPolicy::only([Attribute::ResponseTime]))),
//!         Box::new(SqlStore::new()),
//!     ],
//! )
//! .await?;
//!
//! let app = traffic.layer(Router::new().route("/", get(index)));
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod policy;
pub mod stores;
pub mod traffic;
pub mod user_agent;
pub mod watcher;

pub use error::{Result, TrafficError};
pub use event::{project, TrafficEvent, TrafficRecord};
pub use policy::{Attribute, LogPolicy};
pub use stores::{ConnectionMode, CsvStore, JsonStore, OrmStore, SqlStore, Store, TrafficModel};
pub use traffic::{HostApp, OnStoreError, Traffic};
pub use watcher::{RequestTimer, ResponseException};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing/logging
///
/// Helper for host binaries. This function can only be called once per process.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}

/// Same as [`init_tracing`], emitting one JSON object per line
pub fn init_json_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_target(true))
        .init();
}
