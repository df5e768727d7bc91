//! Snapshot aggregator
//!
//! Sole writer of the dashboard snapshot. Three paths fetch from the pull
//! collaborator and all of them apply the result the same way, by swapping
//! the whole snapshot into the [`StateStore`]:
//! - `load_initial()`: blocking, bounded by the initial-load timeout, errors
//!   go to the caller and nothing is applied
//! - background refresh: fixed interval, failures are logged and the
//!   previous snapshot stays in place
//! - `refresh_forced()`: asks the server to bypass its cache; used after a
//!   guarded transition or an explicit user action
//!
//! After `shutdown()` every path fails with [`OpsError::ViewClosed`]; a fetch
//! still in flight is dropped and its result never reaches the store.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use flightline_core::RefreshConfig;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::DashboardApi;
use crate::error::{OpsError, Result};
use crate::store::StateStore;
use crate::types::{DashboardSnapshot, WeatherSnapshot};

struct BackgroundTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Fetches the consolidated dashboard snapshot and installs it in the store.
pub struct SnapshotAggregator<A: DashboardApi> {
    api: Arc<A>,
    store: Arc<StateStore>,
    initial_load_timeout: Duration,
    background_interval: Duration,
    background: Mutex<Option<BackgroundTask>>,
    shutdown: CancellationToken,
}

impl<A: DashboardApi> SnapshotAggregator<A> {
    /// Create an aggregator writing into `store`
    pub fn new(api: Arc<A>, store: Arc<StateStore>, refresh: &RefreshConfig) -> Self {
        Self {
            api,
            store,
            initial_load_timeout: refresh.initial_load_timeout(),
            background_interval: refresh.background_interval(),
            background: Mutex::new(None),
            shutdown: CancellationToken::new(),
        }
    }

    /// Shared pull collaborator
    pub fn api(&self) -> &Arc<A> {
        &self.api
    }

    /// Store this aggregator writes into
    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// Blocking first load. On error the store is left untouched.
    pub async fn load_initial(&self) -> Result<Arc<DashboardSnapshot>> {
        let fetched = tokio::time::timeout(
            self.initial_load_timeout,
            fetch_and_apply(self.api.as_ref(), &self.store, &self.shutdown, false),
        )
        .await;

        match fetched {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    timeout_secs = self.initial_load_timeout.as_secs(),
                    "Initial dashboard load timed out"
                );
                Err(OpsError::Timeout(self.initial_load_timeout))
            }
        }
    }

    /// Fetch bypassing server-side caches and install the result.
    pub async fn refresh_forced(&self) -> Result<Arc<DashboardSnapshot>> {
        fetch_and_apply(self.api.as_ref(), &self.store, &self.shutdown, true).await
    }

    /// One background-style refresh: failures are logged and swallowed.
    ///
    /// Returns whether a new snapshot was installed.
    pub async fn refresh_background(&self) -> bool {
        refresh_quietly(self.api.as_ref(), &self.store, &self.shutdown).await
    }

    /// Start the fixed-interval refresh task. No-op if already running.
    ///
    /// The first tick fires one full interval from now; the initial load
    /// covers time zero.
    pub fn start_background(&self) {
        let mut slot = match self.background.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };

        if self.shutdown.is_cancelled()
            || slot.as_ref().is_some_and(|task| !task.handle.is_finished())
        {
            return;
        }

        let cancel = self.shutdown.child_token();
        let handle = tokio::spawn(run_background(
            Arc::clone(&self.api),
            Arc::clone(&self.store),
            self.background_interval,
            cancel.clone(),
        ));

        *slot = Some(BackgroundTask { cancel, handle });
    }

    /// Cancel the refresh task and wait for it to finish. Idempotent.
    pub async fn stop_background(&self) {
        let task = match self.background.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        if let Some(task) = task {
            task.cancel.cancel();
            if let Err(e) = task.handle.await {
                warn!(error = %e, "Background refresh task ended abnormally");
            }
            info!("Background dashboard refresh stopped");
        }
    }

    /// Stop the refresh task and refuse every later fetch. Idempotent.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.stop_background().await;
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Whether the refresh task is running
    pub fn is_background_running(&self) -> bool {
        match self.background.lock() {
            Ok(slot) => slot.as_ref().is_some_and(|task| !task.handle.is_finished()),
            Err(_) => false,
        }
    }

    /// Location-keyed weather lookup. The result is returned to the caller
    /// and never written into the store.
    pub async fn weather_for(&self, location: &str) -> Result<WeatherSnapshot> {
        self.api.weather_for(location).await
    }
}

impl<A: DashboardApi> Drop for SnapshotAggregator<A> {
    fn drop(&mut self) {
        let task = match self.background.get_mut() {
            Ok(slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        if let Some(task) = task {
            task.cancel.cancel();
            task.handle.abort();
        }
    }
}

async fn fetch_and_apply<A: DashboardApi>(
    api: &A,
    store: &StateStore,
    shutdown: &CancellationToken,
    force_refresh: bool,
) -> Result<Arc<DashboardSnapshot>> {
    if shutdown.is_cancelled() {
        return Err(OpsError::ViewClosed);
    }

    let fetched = tokio::select! {
        biased;
        _ = shutdown.cancelled() => {
            debug!(force_refresh, "Dashboard fetch abandoned at shutdown");
            return Err(OpsError::ViewClosed);
        }
        fetched = api.fetch_snapshot(force_refresh) => fetched?,
    };

    let snapshot = Arc::new(fetched);
    let revision = store.replace_snapshot(Arc::clone(&snapshot)).await;
    debug!(revision, force_refresh, "Dashboard snapshot replaced");
    Ok(snapshot)
}

async fn refresh_quietly<A: DashboardApi>(
    api: &A,
    store: &StateStore,
    shutdown: &CancellationToken,
) -> bool {
    match fetch_and_apply(api, store, shutdown, false).await {
        Ok(_) => true,
        Err(OpsError::ViewClosed) => false,
        Err(e) => {
            warn!(error = %e, "Background dashboard refresh failed; keeping previous snapshot");
            false
        }
    }
}

async fn run_background<A: DashboardApi>(
    api: Arc<A>,
    store: Arc<StateStore>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(interval_secs = period.as_secs(), "Background dashboard refresh started");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = refresh_quietly(api.as_ref(), &store, &cancel) => {}
        }
    }
}
