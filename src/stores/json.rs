//! JSON Lines store: one JSON object per event, appended to a single file

use super::{ensure_file, resolve_path, Store};
use crate::error::{Result, TrafficError};
use crate::event::{project, TrafficEvent, TrafficRecord};
use crate::policy::LogPolicy;
use crate::traffic::HostApp;
use async_trait::async_trait;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

pub const DEFAULT_FILENAME: &str = "traffic.jsonl";

#[derive(Debug, Clone)]
pub struct JsonStore {
    filename: String,
    location: Option<PathBuf>,
    policy: LogPolicy,
    filepath: Option<PathBuf>,
}

impl Default for JsonStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonStore {
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

    pub fn with_location(mut self, location: impl Into<PathBuf>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_policy(mut self, policy: LogPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn filepath(&self) -> Option<&Path> {
        self.filepath.as_deref()
    }

    fn require_path(&self) -> Result<PathBuf> {
        self.filepath
            .clone()
            .ok_or(TrafficError::NotSetUp(self.name()))
    }
}

fn append_line(path: &Path, record: &TrafficRecord) -> Result<()> {
    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');

    // Single write so one event never spans two appends
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    file.write_all(&line)?;

    Ok(())
}

fn read_lines(path: &Path) -> Result<Vec<TrafficRecord>> {
    let reader = BufReader::new(std::fs::File::open(path)?);
    let mut records = Vec::new();

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line)?);
    }

    records.reverse();
    Ok(records)
}

#[async_trait]
impl Store for JsonStore {
    fn name(&self) -> &'static str {
        "json"
    }

    async fn setup(&mut self, app: &HostApp) -> Result<()> {
        let path = resolve_path(self.location.as_deref(), &self.filename, app);

        let target = path.clone();
        tokio::task::spawn_blocking(move || ensure_file(&target)).await??;

        tracing::info!(path = %path.display(), "JSON traffic store ready");
        self.filepath = Some(path);
        Ok(())
    }

    async fn log(&self, event: &TrafficEvent) -> Result<()> {
        let path = self.require_path()?;
        let Some(record) = project(event, &self.policy) else {
            return Ok(());
        };

        tokio::task::spawn_blocking(move || append_line(&path, &record)).await??;

        tracing::debug!(store = self.name(), "Logged traffic event");
        Ok(())
    }

    async fn read(&self) -> Result<Vec<TrafficRecord>> {
        let path = self.require_path()?;
        tokio::task::spawn_blocking(move || read_lines(&path)).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::tests::sample_event;
    use crate::policy::Attribute;

    #[tokio::test]
    async fn test_log_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonStore::new()
            .with_policy(LogPolicy::default().with(Attribute::RequestUserAgent, false));
        store.setup(&HostApp::new("test", dir.path())).await.unwrap();

        store.log(&sample_event()).await.unwrap();
        store
            .log(&TrafficEvent {
                request_path: Some("/later".to_string()),
                ..sample_event()
            })
            .await
            .unwrap();

        let records = store.read().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].request_path.as_deref(), Some("/later"));
        assert_eq!(records[1].request_path.as_deref(), Some("/"));
        assert!(records[0].request_user_agent.is_none());
    }

    #[tokio::test]
    async fn test_null_fields_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonStore::new().with_policy(LogPolicy::only([Attribute::RequestPath]));
        store.setup(&HostApp::new("test", dir.path())).await.unwrap();
        store.log(&sample_event()).await.unwrap();

        let contents = std::fs::read_to_string(store.filepath().unwrap()).unwrap();
        let value: serde_json::Value = serde_json::from_str(contents.trim()).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), Attribute::ALL.len());
        assert!(object["request_method"].is_null());
        assert_eq!(object["request_path"], "/");
    }
}
