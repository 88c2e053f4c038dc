//! Backend selection and background workers.

use std::sync::Arc;

use broker::{BrokerError, InMemoryBroker, MessageBroker};
use outbox::{InMemoryStore, OutboxDispatcher, PostgresStore};
use projections::{InMemoryReadModel, PostgresReadModel, ProjectorWorker};
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::state::{AppState, SharedReadModel, SharedStore};

/// Errors raised while wiring the backends.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("REDIS_URL is set but the binary was built without the `redis` feature")]
    RedisDisabled,
}

/// Store, read model and broker clients, constructed once and injected
/// into every component that needs them.
#[derive(Clone)]
pub struct Backends {
    pub store: SharedStore,
    pub read_model: SharedReadModel,
    pub broker: Arc<dyn MessageBroker>,
}

impl Backends {
    /// In-process backends.
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(InMemoryStore::new()),
            read_model: Arc::new(InMemoryReadModel::new()),
            broker: Arc::new(InMemoryBroker::new()),
        }
    }

    /// Connects the backends selected by `config`, running migrations when
    /// PostgreSQL is configured.
    pub async fn connect(config: &Config) -> Result<Self, BootstrapError> {
        let mut backends = Self::in_memory();

        if let Some(url) = &config.database_url {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(url)
                .await?;
            let store = PostgresStore::new(pool.clone());
            store.run_migrations().await?;
            tracing::info!("using PostgreSQL stores");
            backends.store = Arc::new(store);
            backends.read_model = Arc::new(PostgresReadModel::new(pool));
        }

        if let Some(url) = &config.redis_url {
            backends.broker = redis_broker(url, config).await?;
            tracing::info!(consumer = %config.broker_consumer, "using Redis Streams broker");
        }

        Ok(backends)
    }

    pub fn state(&self) -> AppState {
        AppState::new(self.store.clone(), self.read_model.clone())
    }
}

#[cfg(feature = "redis")]
async fn redis_broker(
    url: &str,
    config: &Config,
) -> Result<Arc<dyn MessageBroker>, BootstrapError> {
    let broker = broker::RedisStreamsBroker::connect(url, &config.broker_consumer)
        .await?
        .with_claim_idle(config.broker_claim_idle);
    Ok(Arc::new(broker))
}

#[cfg(not(feature = "redis"))]
async fn redis_broker(
    _url: &str,
    _config: &Config,
) -> Result<Arc<dyn MessageBroker>, BootstrapError> {
    Err(BootstrapError::RedisDisabled)
}

/// Handles of the background workers.
pub struct Workers {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Workers {
    /// Spawns the outbox dispatcher and the projector worker.
    pub fn spawn(backends: &Backends, config: &Config) -> Self {
        let (shutdown, rx) = watch::channel(false);

        let dispatcher = OutboxDispatcher::new(
            backends.store.clone(),
            backends.broker.clone(),
            config.dispatcher(),
        );
        let dispatcher_rx = rx.clone();
        let dispatcher = tokio::spawn(async move { dispatcher.run(dispatcher_rx).await });

        let projector = ProjectorWorker::new(
            backends.read_model.clone(),
            backends.broker.clone(),
            config.projector(),
        );
        let projector = tokio::spawn(async move {
            if let Err(e) = projector.run(rx).await {
                tracing::error!(error = %e, "projector worker exited");
            }
        });

        Self {
            shutdown,
            handles: vec![dispatcher, projector],
        }
    }

    /// Signals shutdown and waits for every worker to finish its current unit.
    pub async fn shutdown(self) {
        // Every receiver already gone means every worker already stopped.
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "worker task panicked");
            }
        }
    }
}
