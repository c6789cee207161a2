//! Flat-file CSV store
//!
//! The file is opened, appended to and closed on every `log` call. Concurrent
//! writers are not locked against each other; each row is written with a
//! single append.

use super::{ensure_file, resolve_path, Store};
use crate::error::{Result, TrafficError};
use crate::event::{project, TrafficEvent, TrafficRecord};
use crate::policy::LogPolicy;
use crate::traffic::HostApp;
use async_trait::async_trait;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

pub const DEFAULT_FILENAME: &str = "traffic.csv";

/// Appends one CSV row per event
#[derive(Debug, Clone)]
pub struct CsvStore {
    filename: String,
    location: Option<PathBuf>,
    policy: LogPolicy,
    filepath: Option<PathBuf>,
}

impl Default for CsvStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CsvStore {
    /// `traffic.csv` in the host's instance folder, logging every attribute
    pub fn new() -> Self {
        Self {
            filename: DEFAULT_FILENAME.to_string(),
            location: None,
            policy: LogPolicy::default(),
            filepath: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    /// Directory the file is placed in instead of the instance folder
    pub fn with_location(mut self, location: impl Into<PathBuf>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_policy(mut self, policy: LogPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &LogPolicy {
        &self.policy
    }

    /// Resolved file path, available after `setup`
    pub fn filepath(&self) -> Option<&Path> {
        self.filepath.as_deref()
    }

    fn require_path(&self) -> Result<PathBuf> {
        self.filepath
            .clone()
            .ok_or(TrafficError::NotSetUp(self.name()))
    }
}

fn append_record(path: &Path, record: &TrafficRecord) -> Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let is_empty = file.metadata()?.len() == 0;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(is_empty)
        .from_writer(file);
    writer.serialize(record)?;
    writer.flush()?;

    Ok(())
}

fn read_records(path: &Path) -> Result<Vec<TrafficRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut records = reader
        .deserialize::<TrafficRecord>()
        .collect::<std::result::Result<Vec<_>, _>>()?;
    records.reverse();
    Ok(records)
}

#[async_trait]
impl Store for CsvStore {
    fn name(&self) -> &'static str {
        "csv"
    }

    async fn setup(&mut self, app: &HostApp) -> Result<()> {
        let path = resolve_path(self.location.as_deref(), &self.filename, app);

        let target = path.clone();
        tokio::task::spawn_blocking(move || ensure_file(&target)).await??;

        tracing::info!(path = %path.display(), "CSV traffic store ready");
        self.filepath = Some(path);
        Ok(())
    }

    async fn log(&self, event: &TrafficEvent) -> Result<()> {
        let path = self.require_path()?;
        let Some(record) = project(event, &self.policy) else {
            return Ok(());
        };

        tokio::task::spawn_blocking(move || append_record(&path, &record)).await??;

        tracing::debug!(store = self.name(), "Logged traffic event");
        Ok(())
    }

    async fn read(&self) -> Result<Vec<TrafficRecord>> {
        let path = self.require_path()?;
        tokio::task::spawn_blocking(move || read_records(&path)).await?
    }
}
