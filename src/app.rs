use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    api,
    config::Config,
    fetcher::{HttpPageFetcher, PageFetcher},
    observability::Telemetry,
    reader::ScheduleReader,
    refresh::{RefreshCoordinator, RefreshOrchestrator},
    scheduler::{BackupDaemon, DailyCadence, RefreshDaemon},
    store::CacheStore,
    util::time::{Clock, system_clock},
};

#[derive(Clone)]
pub(crate) struct AppState {
    registry: Arc<ComponentRegistry>,
}

pub struct ComponentRegistry {
    config: Arc<Config>,
    telemetry: Telemetry,
    store: Arc<CacheStore>,
    coordinator: Arc<RefreshCoordinator>,
    reader: ScheduleReader,
    clock: Clock,
}

impl AppState {
    pub(crate) fn new(registry: ComponentRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub(crate) fn telemetry(&self) -> &Telemetry {
        &self.registry.telemetry
    }

    pub(crate) fn reader(&self) -> &ScheduleReader {
        &self.registry.reader
    }

    pub(crate) fn store(&self) -> &CacheStore {
        &self.registry.store
    }

    pub(crate) fn coordinator(&self) -> &RefreshCoordinator {
        &self.registry.coordinator
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        (self.registry.clock)()
    }
}

impl ComponentRegistry {
    /// Wires the worker against the real monitor pages.
    ///
    /// # Errors
    /// Fails when telemetry, the HTTP client or the cache directory cannot be
    /// initialised.
    pub async fn build(config: Config) -> Result<Self> {
        let telemetry = Telemetry::new()?;
        let fetcher = Arc::new(
            HttpPageFetcher::new(&config.http_fetcher_config())
                .context("failed to build page fetcher")?,
        );
        Self::with_fetcher(config, telemetry, fetcher).await
    }

    /// Wires the worker around an arbitrary page source.
    ///
    /// # Errors
    /// Fails when the cache directory cannot be opened.
    pub async fn with_fetcher(
        config: Config,
        telemetry: Telemetry,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Result<Self> {
        Self::with_fetcher_and_clock(config, telemetry, fetcher, system_clock()).await
    }

    /// Like [`Self::with_fetcher`], with `clock` deciding the reference day
    /// of requests and of the refreshes they trigger.
    ///
    /// # Errors
    /// Fails when the cache directory cannot be opened.
    pub async fn with_fetcher_and_clock(
        config: Config,
        telemetry: Telemetry,
        fetcher: Arc<dyn PageFetcher>,
        clock: Clock,
    ) -> Result<Self> {
        let config = Arc::new(config);
        let metrics = telemetry.metrics();
        let store = Arc::new(
            CacheStore::open(config.cache_dir(), Arc::clone(&metrics))
                .await
                .with_context(|| {
                    format!("failed to open cache directory {}", config.cache_dir().display())
                })?,
        );
        let calendar = config.calendar();
        let orchestrator = Arc::new(RefreshOrchestrator::new(
            fetcher,
            Arc::clone(&store),
            calendar,
            config.refresh_settings(),
            Arc::clone(&metrics),
        ));
        let coordinator = Arc::new(
            RefreshCoordinator::new(orchestrator, metrics).with_clock(Arc::clone(&clock)),
        );
        let reader = ScheduleReader::new(Arc::clone(&store), Arc::clone(&coordinator), calendar);

        Ok(Self {
            config,
            telemetry,
            store,
            coordinator,
            reader,
            clock,
        })
    }

    #[must_use]
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    #[must_use]
    pub fn coordinator(&self) -> Arc<RefreshCoordinator> {
        Arc::clone(&self.coordinator)
    }

    #[must_use]
    pub fn reader(&self) -> &ScheduleReader {
        &self.reader
    }

    /// Starts the refresh and backup timers.
    ///
    /// # Errors
    /// Fails when the backup hour is not a valid clock hour.
    pub fn spawn_daemons(&self, cancel_token: &CancellationToken) -> Result<Vec<JoinHandle<()>>> {
        let cadence = DailyCadence::new(self.config.timezone(), self.config.backup_hour(), 0)
            .with_context(|| format!("invalid backup hour {}", self.config.backup_hour()))?;
        let refresh = RefreshDaemon::new(self.coordinator(), self.config.refresh_interval())
            .spawn(cancel_token.clone());
        let backup = BackupDaemon::new(self.coordinator(), cadence)
            .with_clock(Arc::clone(&self.clock))
            .spawn(cancel_token.clone());
        Ok(vec![refresh, backup])
    }
}

pub fn build_router(registry: ComponentRegistry) -> Router {
    let state = AppState::new(registry);
    api::router(state)
}
