//! Traffic facade: binds stores to one host application

use crate::error::{Result, TrafficError};
use crate::event::TrafficEvent;
use crate::stores::Store;
use crate::watcher;
use axum::{middleware, Router};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Handle describing the host application
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HostApp {
    pub name: String,
    /// Instance/data folder; default location for file-backed stores
    pub instance_path: PathBuf,
}

impl HostApp {
    pub fn new(name: impl Into<String>, instance_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            instance_path: instance_path.into(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(TrafficError::InvalidApp(
                "host application name cannot be empty".to_string(),
            ));
        }
        if self.instance_path.as_os_str().is_empty() {
            return Err(TrafficError::InvalidApp(
                "host application instance path cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// What the watcher does when a store fails to log an event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnStoreError {
    /// Emit an error log and return the response unchanged
    Log,
    /// Replace the response with a 500
    #[default]
    Fail,
}

/// Traffic logging bound to one host application
pub struct Traffic {
    app: HostApp,
    stores: Vec<Box<dyn Store>>,
    on_store_error: OnStoreError,
}

impl std::fmt::Debug for Traffic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Traffic")
            .field("app", &self.app)
            .field(
                "stores",
                &self.stores.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("on_store_error", &self.on_store_error)
            .finish()
    }
}

impl Traffic {
    /// Validate the host handle, set up every store once, in order
    ///
    /// # Example
    ///
    /// ```ignore
    /// let traffic = Traffic::init_app(
    ///     Some(HostApp::new("shop", "./instance")),
    ///     vec![Box::new(CsvStore::new())],
    /// )
    /// .await?;
    /// let app = traffic.layer(Router::new().route("/", get(index)));
    /// ```
    pub async fn init_app(app: Option<HostApp>, stores: Vec<Box<dyn Store>>) -> Result<Arc<Self>> {
        Self::init_app_with(app, stores, OnStoreError::default()).await
    }

    pub async fn init_app_with(
        app: Option<HostApp>,
        mut stores: Vec<Box<dyn Store>>,
        on_store_error: OnStoreError,
    ) -> Result<Arc<Self>> {
        let app = app.ok_or(TrafficError::MissingApp)?;
        app.validate()?;

        if stores.is_empty() {
            return Err(TrafficError::MissingStores);
        }

        for store in stores.iter_mut() {
            store.setup(&app).await?;
        }

        tracing::info!(
            app = %app.name,
            stores = stores.len(),
            "Traffic logging initialized"
        );

        Ok(Arc::new(Self {
            app,
            stores,
            on_store_error,
        }))
    }

    /// Register the request watcher on a host router
    pub fn layer<S>(self: &Arc<Self>, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(middleware::from_fn_with_state(
            self.clone(),
            watcher::watch_request,
        ))
    }

    /// Hand an event to every store in configuration order
    ///
    /// Stops at the first failing store; earlier stores keep what they wrote.
    pub async fn dispatch(&self, event: &TrafficEvent) -> Result<()> {
        for store in &self.stores {
            store.log(event).await.inspect_err(|e| {
                tracing::error!(store = store.name(), error = %e, "Failed to log traffic event");
            })?;
        }
        Ok(())
    }

    pub fn app(&self) -> &HostApp {
        &self.app
    }

    pub fn stores(&self) -> &[Box<dyn Store>] {
        &self.stores
    }

    pub fn on_store_error(&self) -> OnStoreError {
        self.on_store_error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::tests::sample_event;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Store that counts calls and optionally fails
    struct CountingStore {
        setups: Arc<AtomicUsize>,
        logs: Arc<AtomicUsize>,
        fail: bool,
    }

    impl CountingStore {
        fn new(fail: bool) -> (Self, Arc<AtomicUsize>, Arc<AtomicUsize>) {
            let setups = Arc::new(AtomicUsize::new(0));
            let logs = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    setups: setups.clone(),
                    logs: logs.clone(),
                    fail,
                },
                setups,
                logs,
            )
        }
    }

    #[async_trait]
    impl Store for CountingStore {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn setup(&mut self, _app: &HostApp) -> Result<()> {
            self.setups.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn log(&self, _event: &TrafficEvent) -> Result<()> {
            self.logs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(TrafficError::Config("store failure".to_string()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_store_failures_fail_the_request_by_default() {
        let (store, _, _) = CountingStore::new(false);
        let traffic = Traffic::init_app(Some(HostApp::new("app", "/tmp")), vec![Box::new(store)])
            .await
            .unwrap();
        assert_eq!(traffic.on_store_error(), OnStoreError::Fail);
    }

    #[tokio::test]
    async fn test_init_app_requires_app() {
        let (store, _, _) = CountingStore::new(false);
        let err = Traffic::init_app(None, vec![Box::new(store)]).await.unwrap_err();
        assert!(matches!(err, TrafficError::MissingApp));
    }

    #[tokio::test]
    async fn test_init_app_requires_stores() {
        let err = Traffic::init_app(Some(HostApp::new("app", "/tmp")), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, TrafficError::MissingStores));
    }

    #[tokio::test]
    async fn test_init_app_rejects_invalid_app() {
        let (store, _, _) = CountingStore::new(false);
        let err = Traffic::init_app(Some(HostApp::new(" ", "/tmp")), vec![Box::new(store)])
            .await
            .unwrap_err();
        assert!(matches!(err, TrafficError::InvalidApp(_)));
    }

    #[tokio::test]
    async fn test_init_app_sets_up_each_store_once() {
        let (first, first_setups, _) = CountingStore::new(false);
        let (second, second_setups, _) = CountingStore::new(false);

        let traffic = Traffic::init_app(
            Some(HostApp::new("app", "/tmp")),
            vec![Box::new(first), Box::new(second)],
        )
        .await
        .unwrap();

        assert_eq!(traffic.stores().len(), 2);
        assert_eq!(first_setups.load(Ordering::SeqCst), 1);
        assert_eq!(second_setups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dispatch_stops_at_first_failure() {
        let (first, _, first_logs) = CountingStore::new(false);
        let (second, _, second_logs) = CountingStore::new(true);
        let (third, _, third_logs) = CountingStore::new(false);

        let traffic = Traffic::init_app(
            Some(HostApp::new("app", "/tmp")),
            vec![Box::new(first), Box::new(second), Box::new(third)],
        )
        .await
        .unwrap();

        assert!(traffic.dispatch(&sample_event()).await.is_err());
        assert_eq!(first_logs.load(Ordering::SeqCst), 1);
        assert_eq!(second_logs.load(Ordering::SeqCst), 1);
        assert_eq!(third_logs.load(Ordering::SeqCst), 0);
    }
}
