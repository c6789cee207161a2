use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T, E = TrafficError> = std::result::Result<T, E>;

/// Traffic logging error types
#[derive(Debug, Error)]
pub enum TrafficError {
    /// No host application handle was supplied to `init_app`
    #[error("No host application was passed in, call Traffic::init_app(Some(app), stores)")]
    MissingApp,
    /// The host application handle is unusable
    #[error("Invalid host application: {0}")]
    InvalidApp(String),
    /// `init_app` was called with an empty store list
    #[error("No stores were passed in")]
    MissingStores,
    /// Store or configuration value is invalid
    #[error("Configuration error: {0}")]
    Config(String),
    /// `log`/`read` called before `setup`
    #[error("Store '{0}' used before setup")]
    NotSetUp(&'static str),
    /// Store does not support reading back records
    #[error("Store '{0}' does not support reading records")]
    ReadUnsupported(&'static str),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("ORM error: {0}")]
    Orm(#[from] sea_orm::DbErr),
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

impl IntoResponse for TrafficError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.to_string(),
                "type": error_type_name(&self),
            }
        }));

        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

fn error_type_name(error: &TrafficError) -> &'static str {
    match error {
        TrafficError::MissingApp => "missing_app",
        TrafficError::InvalidApp(_) => "invalid_app",
        TrafficError::MissingStores => "missing_stores",
        TrafficError::Config(_) => "config_error",
        TrafficError::NotSetUp(_) => "not_set_up",
        TrafficError::ReadUnsupported(_) => "read_unsupported",
        TrafficError::Io(_) => "io_error",
        TrafficError::Csv(_) => "csv_error",
        TrafficError::Json(_) => "json_error",
        TrafficError::Database(_) => "database_error",
        TrafficError::Orm(_) => "orm_error",
        TrafficError::Task(_) => "task_error",
        TrafficError::Load(_) => "config_load_error",
    }
}
