//! Pluggable persistence backends for traffic events
//!
//! Every store receives the full [`TrafficEvent`], projects it through its own
//! [`LogPolicy`](crate::policy::LogPolicy) and appends one row. Stores are set
//! up exactly once by [`Traffic::init_app`](crate::traffic::Traffic::init_app)
//! before the first request is served.

pub mod csv;
pub mod json;
pub mod orm;
pub mod sql;

pub use self::csv::CsvStore;
pub use self::json::JsonStore;
pub use self::orm::{OrmStore, TrafficModel};
pub use self::sql::{ConnectionMode, SqlStore};

use crate::error::{Result, TrafficError};
use crate::event::{TrafficEvent, TrafficRecord};
use crate::traffic::HostApp;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// A traffic persistence backend
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Short backend name used in logs and errors (e.g. "csv", "sql")
    fn name(&self) -> &'static str;

    /// Acquire the backing medium (file, table, session)
    async fn setup(&mut self, app: &HostApp) -> Result<()>;

    /// Persist one event
    async fn log(&self, event: &TrafficEvent) -> Result<()>;

    /// All persisted records, most recent first
    async fn read(&self) -> Result<Vec<TrafficRecord>> {
        Err(TrafficError::ReadUnsupported(self.name()))
    }
}

/// Resolve `location/filename`, falling back to the host's instance folder
pub(crate) fn resolve_path(location: Option<&Path>, filename: &str, app: &HostApp) -> PathBuf {
    match location {
        Some(dir) => dir.join(filename),
        None => app.instance_path.join(filename),
    }
}

/// Create parent directories and an empty file if it does not exist yet
pub(crate) fn ensure_file(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;

    Ok(())
}
