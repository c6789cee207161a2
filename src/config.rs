use crate::error::{Result, TrafficError};
use crate::policy::LogPolicy;
use crate::stores::{ConnectionMode, CsvStore, JsonStore, SqlStore, Store};
use crate::traffic::{HostApp, OnStoreError};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct TrafficConfig {
    pub host: HostApp,
    #[serde(default)]
    pub on_store_error: OnStoreError,
    pub stores: Vec<StoreConfig>,
}

/// One `[[stores]]` entry, selected by its `type` key
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    Csv {
        filename: Option<String>,
        location: Option<PathBuf>,
        policy: Option<LogPolicy>,
    },
    Json {
        filename: Option<String>,
        location: Option<PathBuf>,
        policy: Option<LogPolicy>,
    },
    Sql {
        filename: Option<String>,
        location: Option<PathBuf>,
        url: Option<String>,
        table_name: Option<String>,
        policy: Option<LogPolicy>,
    },
}

impl StoreConfig {
    /// Build the configured store (not yet set up)
    pub fn build(&self) -> Box<dyn Store> {
        match self {
            StoreConfig::Csv {
                filename,
                location,
                policy,
            } => {
                let mut store = CsvStore::new().with_policy(policy.unwrap_or_default());
                if let Some(filename) = filename {
                    store = store.with_filename(filename.clone());
                }
                if let Some(location) = location {
                    store = store.with_location(location.clone());
                }
                Box::new(store)
            }
            StoreConfig::Json {
                filename,
                location,
                policy,
            } => {
                let mut store = JsonStore::new().with_policy(policy.unwrap_or_default());
                if let Some(filename) = filename {
                    store = store.with_filename(filename.clone());
                }
                if let Some(location) = location {
                    store = store.with_location(location.clone());
                }
                Box::new(store)
            }
            StoreConfig::Sql {
                filename,
                location,
                url,
                table_name,
                policy,
            } => {
                let mode =
                    ConnectionMode::resolve(None, url.clone(), filename.clone(), location.clone());
                let mut store =
                    SqlStore::with_mode(mode).with_policy(policy.unwrap_or_else(LogPolicy::sql_default));
                if let Some(table_name) = table_name {
                    store = store.with_table_name(table_name.clone());
                }
                Box::new(store)
            }
        }
    }
}

impl TrafficConfig {
    pub fn build_stores(&self) -> Vec<Box<dyn Store>> {
        self.stores.iter().map(StoreConfig::build).collect()
    }
}

/// Load and validate a configuration file (format picked from its extension)
pub fn load_config(path: &Path) -> Result<TrafficConfig> {
    let config = config::Config::builder()
        .add_source(config::File::from(path))
        .build()?;

    let cfg: TrafficConfig = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

fn validate_config(cfg: &TrafficConfig) -> Result<()> {
    if cfg.host.name.trim().is_empty() {
        return Err(TrafficError::Config("Host name cannot be empty".to_string()));
    }

    if cfg.stores.is_empty() {
        return Err(TrafficError::Config(
            "At least one store must be configured".to_string(),
        ));
    }

    for (index, store) in cfg.stores.iter().enumerate() {
        let filename = match store {
            StoreConfig::Csv { filename, .. } | StoreConfig::Json { filename, .. } => filename,
            StoreConfig::Sql { filename, url, .. } => {
                if url.as_deref().is_some_and(|u| u.trim().is_empty()) {
                    return Err(TrafficError::Config(format!(
                        "Store #{} has an empty database url",
                        index
                    )));
                }
                filename
            }
        };

        if filename.as_deref().is_some_and(|f| f.trim().is_empty()) {
            return Err(TrafficError::Config(format!(
                "Store #{} has an empty filename",
                index
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Attribute;

    fn write_config(dir: &Path, contents: &str) -> PathBuf {
        let path = dir.join("traffic.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_config_with_stores() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"
            on_store_error = "log"

            [host]
            name = "shop"
            instance_path = "./instance"

            [[stores]]
            type = "csv"
            filename = "hits.csv"

            [stores.policy]
            request_user_agent = false

            [[stores]]
            type = "sql"
            url = "sqlite::memory:"
            table_name = "hits"
            "#,
        );

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.host.name, "shop");
        assert_eq!(cfg.on_store_error, OnStoreError::Log);
        assert_eq!(cfg.stores.len(), 2);

        match &cfg.stores[0] {
            StoreConfig::Csv {
                filename, policy, ..
            } => {
                assert_eq!(filename.as_deref(), Some("hits.csv"));
                let policy = policy.unwrap();
                assert!(!policy.is_enabled(Attribute::RequestUserAgent));
                assert!(policy.is_enabled(Attribute::RequestPath));
            }
            other => panic!("unexpected store {:?}", other),
        }

        let stores = cfg.build_stores();
        assert_eq!(stores[0].name(), "csv");
        assert_eq!(stores[1].name(), "sql");
    }

    #[test]
    fn test_on_store_error_defaults_to_fail() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"
            [host]
            name = "shop"
            instance_path = "./instance"

            [[stores]]
            type = "json"
            "#,
        );

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.on_store_error, OnStoreError::Fail);
    }

    #[test]
    fn test_validate_config_requires_stores() {
        let cfg = TrafficConfig {
            host: HostApp::new("shop", "./instance"),
            on_store_error: OnStoreError::Log,
            stores: vec![],
        };

        let result = validate_config(&cfg);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("At least one store must be configured"));
    }

    #[test]
    fn test_validate_config_rejects_empty_filename() {
        let cfg = TrafficConfig {
            host: HostApp::new("shop", "./instance"),
            on_store_error: OnStoreError::Log,
            stores: vec![StoreConfig::Json {
                filename: Some(" ".to_string()),
                location: None,
                policy: None,
            }],
        };

        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn test_sql_store_config_builds() {
        let store = StoreConfig::Sql {
            filename: Some("ignored.sqlite".to_string()),
            location: None,
            url: Some("sqlite::memory:".to_string()),
            table_name: None,
            policy: None,
        };
        assert_eq!(store.build().name(), "sql");
    }
}
