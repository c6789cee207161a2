//! Relational table store on SQLite
//!
//! This module provides:
//! - Connection resolution from an existing pool, a URL or a database path
//! - Idempotent table creation
//! - One committed transaction per logged event

use super::{resolve_path, Store};
use crate::error::{Result, TrafficError};
use crate::event::{project, TrafficEvent, TrafficRecord};
use crate::policy::LogPolicy;
use crate::traffic::HostApp;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_FILENAME: &str = "traffic.sqlite";
pub const DEFAULT_TABLE_NAME: &str = "_traffic_";

/// How the store obtains its database connection
///
/// Decided once at construction. A pool wins over a URL, which wins over a
/// database file.
#[derive(Debug, Clone)]
pub enum ConnectionMode {
    /// Pool owned by the host application
    Pool(SqlitePool),
    /// Connection URL such as `sqlite:///var/lib/app/traffic.db`
    Url(String),
    /// Database file resolved at setup time
    File {
        filename: String,
        location: Option<PathBuf>,
    },
}

impl ConnectionMode {
    /// Pick the highest-priority mode among the supplied options
    pub fn resolve(
        pool: Option<SqlitePool>,
        url: Option<String>,
        filename: Option<String>,
        location: Option<PathBuf>,
    ) -> Self {
        if let Some(pool) = pool {
            Self::Pool(pool)
        } else if let Some(url) = url {
            Self::Url(url)
        } else {
            Self::File {
                filename: filename.unwrap_or_else(|| DEFAULT_FILENAME.to_string()),
                location,
            }
        }
    }
}

/// Writes one table row per event
#[derive(Debug)]
pub struct SqlStore {
    mode: ConnectionMode,
    table_name: String,
    policy: LogPolicy,
    pool: Option<SqlitePool>,
}

impl Default for SqlStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlStore {
    /// `traffic.sqlite` in the host's instance folder
    pub fn new() -> Self {
        Self::with_mode(ConnectionMode::File {
            filename: DEFAULT_FILENAME.to_string(),
            location: None,
        })
    }

    pub fn with_mode(mode: ConnectionMode) -> Self {
        Self {
            mode,
            table_name: DEFAULT_TABLE_NAME.to_string(),
            policy: LogPolicy::sql_default(),
            pool: None,
        }
    }

    pub fn from_file(filename: impl Into<String>, location: Option<PathBuf>) -> Self {
        Self::with_mode(ConnectionMode::File {
            filename: filename.into(),
            location,
        })
    }

    pub fn from_url(url: impl Into<String>) -> Self {
        Self::with_mode(ConnectionMode::Url(url.into()))
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self::with_mode(ConnectionMode::Pool(pool))
    }

    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    pub fn with_policy(mut self, policy: LogPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn mode(&self) -> &ConnectionMode {
        &self.mode
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Connection pool, available after `setup`
    pub fn pool(&self) -> Option<&SqlitePool> {
        self.pool.as_ref()
    }

    fn require_pool(&self) -> Result<&SqlitePool> {
        self.pool.as_ref().ok_or(TrafficError::NotSetUp(self.name()))
    }

    async fn connect(&self, app: &HostApp) -> Result<SqlitePool> {
        let (options, in_memory) = match &self.mode {
            ConnectionMode::Pool(pool) => return Ok(pool.clone()),
            ConnectionMode::Url(url) => {
                let in_memory = url.contains(":memory:") || url.contains("mode=memory");
                (SqliteConnectOptions::from_str(url)?, in_memory)
            }
            ConnectionMode::File { filename, location } => {
                let path = resolve_path(location.as_deref(), filename, app);
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                // Path given verbatim, never parsed as a URL
                (SqliteConnectOptions::new().filename(&path), false)
            }
        };

        let mut options = options
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(30));
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool_options = if in_memory {
            // Each in-memory connection sees its own database, and the data
            // is gone once the last connection closes
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;

        Ok(pool)
    }

    async fn create_table(&self, pool: &SqlitePool) -> Result<()> {
        let statement = format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{table}" (
                traffic_id INTEGER PRIMARY KEY AUTOINCREMENT,
                request_date TEXT,
                request_method TEXT,
                request_host_url TEXT,
                request_path TEXT,
                request_endpoint TEXT,
                request_remote_address TEXT,
                request_referrer TEXT,
                request_user_agent TEXT,
                request_browser TEXT,
                request_platform TEXT,
                response_time INTEGER,
                response_size INTEGER,
                response_status_code INTEGER,
                response_exception TEXT,
                response_mimetype TEXT
            )
            "#,
            table = self.table_name
        );

        sqlx::query(&statement).execute(pool).await?;
        Ok(())
    }
}

/// Table names are interpolated into SQL, so only plain identifiers pass
fn validate_table_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid {
        return Err(TrafficError::Config(format!(
            "Invalid table name '{}': use letters, digits and underscores",
            name
        )));
    }
    Ok(())
}

#[async_trait]
impl Store for SqlStore {
    fn name(&self) -> &'static str {
        "sql"
    }

    async fn setup(&mut self, app: &HostApp) -> Result<()> {
        validate_table_name(&self.table_name)?;

        let pool = self.connect(app).await?;
        self.create_table(&pool).await?;

        tracing::info!(table = %self.table_name, "SQL traffic store ready");
        self.pool = Some(pool);
        Ok(())
    }

    async fn log(&self, event: &TrafficEvent) -> Result<()> {
        let pool = self.require_pool()?;
        let Some(record) = project(event, &self.policy) else {
            return Ok(());
        };

        let statement = format!(
            r#"INSERT INTO "{}" (
                request_date, request_method, request_host_url, request_path,
                request_endpoint, request_remote_address, request_referrer,
                request_user_agent, request_browser, request_platform,
                response_time, response_size, response_status_code,
                response_exception, response_mimetype
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"#,
            self.table_name
        );

        let mut tx = pool.begin().await?;

        sqlx::query(&statement)
            .bind(&record.request_date)
            .bind(&record.request_method)
            .bind(&record.request_host_url)
            .bind(&record.request_path)
            .bind(&record.request_endpoint)
            .bind(&record.request_remote_address)
            .bind(&record.request_referrer)
            .bind(&record.request_user_agent)
            .bind(&record.request_browser)
            .bind(&record.request_platform)
            .bind(record.response_time)
            .bind(record.response_size)
            .bind(record.response_status_code)
            .bind(&record.response_exception)
            .bind(&record.response_mimetype)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::debug!(store = self.name(), table = %self.table_name, "Logged traffic event");
        Ok(())
    }

    async fn read(&self) -> Result<Vec<TrafficRecord>> {
        let pool = self.require_pool()?;

        let statement = format!(
            r#"SELECT request_date, request_method, request_host_url, request_path,
                      request_endpoint, request_remote_address, request_referrer,
                      request_user_agent, request_browser, request_platform,
                      response_time, response_size, response_status_code,
                      response_exception, response_mimetype
               FROM "{}"
               ORDER BY traffic_id DESC"#,
            self.table_name
        );

        let rows = sqlx::query(&statement).fetch_all(pool).await?;

        let records = rows
            .into_iter()
            .map(|row| -> Result<TrafficRecord> {
                Ok(TrafficRecord {
                    request_date: row.try_get("request_date")?,
                    request_method: row.try_get("request_method")?,
                    request_host_url: row.try_get("request_host_url")?,
                    request_path: row.try_get("request_path")?,
                    request_endpoint: row.try_get("request_endpoint")?,
                    request_remote_address: row.try_get("request_remote_address")?,
                    request_referrer: row.try_get("request_referrer")?,
                    request_user_agent: row.try_get("request_user_agent")?,
                    request_browser: row.try_get("request_browser")?,
                    request_platform: row.try_get("request_platform")?,
                    response_time: row.try_get("response_time")?,
                    response_size: row.try_get("response_size")?,
                    response_status_code: row.try_get("response_status_code")?,
                    response_exception: row.try_get("response_exception")?,
                    response_mimetype: row.try_get("response_mimetype")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(records)
    }
}
