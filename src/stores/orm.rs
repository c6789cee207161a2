//! Object-relational store on sea-orm
//!
//! The host owns the [`DatabaseConnection`] and its lifecycle; this store only
//! borrows it. Rows are built from a caller-chosen active model type that
//! implements [`TrafficModel`], so the host can keep traffic in its own
//! entity alongside its other tables.

use super::Store;
use crate::error::Result;
use crate::event::{project, TrafficEvent, TrafficRecord};
use crate::policy::LogPolicy;
use crate::traffic::HostApp;
use async_trait::async_trait;
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, Schema,
};
use std::marker::PhantomData;

/// Maps a projected [`TrafficRecord`] onto a host entity
///
/// Implement this for the `ActiveModel` of any entity that carries the
/// traffic columns. [`traffic::ActiveModel`] is a ready-made implementation.
pub trait TrafficModel: ActiveModelTrait + ActiveModelBehavior + Send + Sync + 'static {
    fn from_record(record: TrafficRecord) -> Self;
}

/// Default traffic entity, table `_traffic_`
pub mod traffic {
    use super::TrafficModel;
    use crate::event::TrafficRecord;
    use sea_orm::entity::prelude::*;
    use sea_orm::ActiveValue::{NotSet, Set};

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "_traffic_")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub traffic_id: i32,
        pub request_date: Option<String>,
        pub request_method: Option<String>,
        pub request_host_url: Option<String>,
        pub request_path: Option<String>,
        pub request_endpoint: Option<String>,
        pub request_remote_address: Option<String>,
        pub request_referrer: Option<String>,
        pub request_user_agent: Option<String>,
        pub request_browser: Option<String>,
        pub request_platform: Option<String>,
        pub response_time: Option<i64>,
        pub response_size: Option<i64>,
        pub response_status_code: Option<i64>,
        pub response_exception: Option<String>,
        pub response_mimetype: Option<String>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}

    impl TrafficModel for ActiveModel {
        fn from_record(record: TrafficRecord) -> Self {
            Self {
                traffic_id: NotSet,
                request_date: Set(record.request_date),
                request_method: Set(record.request_method),
                request_host_url: Set(record.request_host_url),
                request_path: Set(record.request_path),
                request_endpoint: Set(record.request_endpoint),
                request_remote_address: Set(record.request_remote_address),
                request_referrer: Set(record.request_referrer),
                request_user_agent: Set(record.request_user_agent),
                request_browser: Set(record.request_browser),
                request_platform: Set(record.request_platform),
                response_time: Set(record.response_time),
                response_size: Set(record.response_size),
                response_status_code: Set(record.response_status_code),
                response_exception: Set(record.response_exception),
                response_mimetype: Set(record.response_mimetype),
            }
        }
    }

    impl From<Model> for TrafficRecord {
        fn from(model: Model) -> Self {
            Self {
                request_date: model.request_date,
                request_method: model.request_method,
                request_host_url: model.request_host_url,
                request_path: model.request_path,
                request_endpoint: model.request_endpoint,
                request_remote_address: model.request_remote_address,
                request_referrer: model.request_referrer,
                request_user_agent: model.request_user_agent,
                request_browser: model.request_browser,
                request_platform: model.request_platform,
                response_time: model.response_time,
                response_size: model.response_size,
                response_status_code: model.response_status_code,
                response_exception: model.response_exception,
                response_mimetype: model.response_mimetype,
            }
        }
    }
}

/// Create the table for `entity` unless it already exists
///
/// For hosts that do not run their own migrations.
pub async fn create_table<E: EntityTrait>(db: &DatabaseConnection, entity: E) -> Result<()> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();

    db.execute(backend.build(&statement)).await?;
    Ok(())
}

/// Persists traffic through the host's ORM session
pub struct OrmStore<M: TrafficModel> {
    db: DatabaseConnection,
    policy: LogPolicy,
    _model: PhantomData<fn() -> M>,
}

impl<M: TrafficModel> OrmStore<M> {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            policy: LogPolicy::sql_default(),
            _model: PhantomData,
        }
    }

    pub fn with_policy(mut self, policy: LogPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl<M> Store for OrmStore<M>
where
    M: TrafficModel,
    <M::Entity as EntityTrait>::Model: IntoActiveModel<M>,
{
    fn name(&self) -> &'static str {
        "orm"
    }

    async fn setup(&mut self, _app: &HostApp) -> Result<()> {
        // The session must already be initialized by the host
        self.db.ping().await?;
        tracing::info!("ORM traffic store ready");
        Ok(())
    }

    async fn log(&self, event: &TrafficEvent) -> Result<()> {
        let Some(record) = project(event, &self.policy) else {
            return Ok(());
        };

        let model = M::from_record(record);
        <M::Entity as EntityTrait>::insert(model)
            .exec_without_returning(&self.db)
            .await?;

        tracing::debug!(store = self.name(), "Logged traffic event");
        Ok(())
    }
}
