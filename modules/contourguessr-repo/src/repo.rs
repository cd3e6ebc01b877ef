use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use contourguessr_common::{Challenge, RegionId};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::capabilities::CapabilitiesSource;
use crate::challenge_id;
use crate::challenges::load_challenge_snapshot;
use crate::error::{RepoError, StoreError};
use crate::regions::load_region_snapshot;
use crate::snapshot::{RegionSnapshot, SnapshotStore};
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct RepoConfig {
    pub regions_refresh: Duration,
    pub challenges_refresh: Duration,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            regions_refresh: Duration::from_secs(24 * 60 * 60),
            challenges_refresh: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Readiness {
    Pending,
    Ready,
    Failed(String),
}

struct Shared {
    store: Arc<dyn Store>,
    capabilities: Arc<dyn CapabilitiesSource>,
    snapshots: SnapshotStore,
}

impl Shared {
    async fn refresh_regions(&self) -> Result<(), StoreError> {
        let snapshot = load_region_snapshot(self.store.as_ref(), self.capabilities.as_ref()).await?;
        self.snapshots.publish_regions(snapshot);
        Ok(())
    }

    async fn refresh_challenges(&self) -> Result<(), StoreError> {
        let snapshot = load_challenge_snapshot(self.store.as_ref()).await?;
        self.snapshots.publish_challenges(snapshot);
        Ok(())
    }
}

/// In-memory cache of regions and challenges, kept fresh by two background
/// refreshers.
pub struct Repo {
    shared: Arc<Shared>,
    regions_ready: watch::Receiver<Readiness>,
    challenges_ready: watch::Receiver<Readiness>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Repo {
    /// Spawn both refreshers. Must be called from within a tokio runtime.
    ///
    /// # Panics
    ///
    /// If either refresh period is zero.
    pub fn start(
        store: Arc<dyn Store>,
        capabilities: Arc<dyn CapabilitiesSource>,
        config: RepoConfig,
    ) -> Self {
        assert!(
            !config.regions_refresh.is_zero(),
            "regions refresh period must be non-zero"
        );
        assert!(
            !config.challenges_refresh.is_zero(),
            "challenges refresh period must be non-zero"
        );

        let shared = Arc::new(Shared {
            store,
            capabilities,
            snapshots: SnapshotStore::new(),
        });
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (regions_tx, regions_ready) = watch::channel(Readiness::Pending);
        let (challenges_tx, challenges_ready) = watch::channel(Readiness::Pending);

        let challenges_task = {
            let shared = shared.clone();
            tokio::spawn(refresh_loop(
                "challenges",
                config.challenges_refresh,
                challenges_tx,
                shutdown_rx.clone(),
                move || {
                    let shared = shared.clone();
                    async move { shared.refresh_challenges().await }
                },
            ))
        };
        let regions_task = {
            let shared = shared.clone();
            tokio::spawn(refresh_loop(
                "regions",
                config.regions_refresh,
                regions_tx,
                shutdown_rx,
                move || {
                    let shared = shared.clone();
                    async move { shared.refresh_regions().await }
                },
            ))
        };

        info!(
            regions_refresh_secs = config.regions_refresh.as_secs(),
            challenges_refresh_secs = config.challenges_refresh.as_secs(),
            "Repo refreshers started"
        );

        Self {
            shared,
            regions_ready,
            challenges_ready,
            shutdown,
            tasks: Mutex::new(vec![challenges_task, regions_task]),
        }
    }

    /// Resolve once both datasets have loaded at least once. Fails if either
    /// initial load failed; the repo cannot serve in that case.
    pub async fn wait_until_ready(&self) -> Result<(), RepoError> {
        let mut regions = self.regions_ready.clone();
        let mut challenges = self.challenges_ready.clone();
        tokio::try_join!(settled(&mut regions), settled(&mut challenges))?;
        Ok(())
    }

    /// Queries wait for startup to settle. After a failed startup they serve
    /// the empty snapshots.
    async fn ready(&self) {
        if let Err(e) = self.wait_until_ready().await {
            warn!(error = %e, "Serving query from empty snapshot after failed startup");
        }
    }

    pub async fn regions(&self) -> Arc<RegionSnapshot> {
        self.ready().await;
        self.shared.snapshots.regions()
    }

    pub async fn random_challenge(&self, region: Option<RegionId>) -> Result<Challenge, RepoError> {
        self.ready().await;
        let snapshot = self.shared.snapshots.challenges();
        snapshot
            .random(region, &mut rand::rng())
            .cloned()
            .ok_or(RepoError::NoChallengesAvailable)
    }

    pub async fn challenge(&self, id: &str) -> Result<Challenge, RepoError> {
        let internal_id = challenge_id::decode(id)?;
        self.ready().await;
        self.shared
            .snapshots
            .challenges()
            .get(internal_id)
            .cloned()
            .ok_or(RepoError::ChallengeNotFound)
    }

    /// Challenge count per region from the live snapshot. Does not wait for
    /// readiness.
    pub fn challenges_per_region(&self) -> HashMap<RegionId, usize> {
        self.shared.snapshots.challenges().counts()
    }

    /// The cached challenge together with the raw source photo metadata.
    pub async fn challenge_debug_info(&self, id: &str) -> Result<serde_json::Value, RepoError> {
        let internal_id = challenge_id::decode(id)?;
        self.ready().await;
        let challenge = self
            .shared
            .snapshots
            .challenges()
            .get(internal_id)
            .cloned()
            .ok_or(RepoError::ChallengeNotFound)?;
        let store_id = i32::try_from(internal_id).map_err(|_| RepoError::ChallengeNotFound)?;

        let row = self
            .shared
            .store
            .challenge_debug_row(store_id)
            .await
            .map_err(|e| {
                error!(challenge = id, error = %e, "Failed to load challenge debug info");
                RepoError::Internal
            })?
            .unwrap_or_default();

        Ok(serde_json::json!({
            "challenge": challenge,
            "internal_id": internal_id,
            "summary": row.summary,
            "info": row.info,
            "sizes": row.sizes,
            "exif": row.exif,
            "inserted_at": row.inserted_at,
        }))
    }

    /// Stop both refreshers, wait for them to exit, then close the store.
    pub async fn close(&self) {
        info!("Closing repo");
        self.shutdown.send_replace(true);

        let tasks = {
            let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *tasks)
        };
        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Refresher task did not exit cleanly");
            }
        }

        self.shared.store.close().await;
    }
}

impl Drop for Repo {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

async fn settled(rx: &mut watch::Receiver<Readiness>) -> Result<(), RepoError> {
    let state = match rx.wait_for(|state| *state != Readiness::Pending).await {
        Ok(state) => (*state).clone(),
        Err(_) => {
            return Err(RepoError::StartupFailed(
                "refresher exited before its first load".to_string(),
            ))
        }
    };
    match state {
        Readiness::Failed(reason) => Err(RepoError::StartupFailed(reason)),
        Readiness::Ready | Readiness::Pending => Ok(()),
    }
}

/// Load once, report readiness, then reload every `period` until shutdown.
/// A cycle in progress always runs to completion before shutdown is seen.
async fn refresh_loop<F, Fut>(
    dataset: &'static str,
    period: Duration,
    ready: watch::Sender<Readiness>,
    mut shutdown: watch::Receiver<bool>,
    refresh: F,
) where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<(), StoreError>>,
{
    if let Err(e) = refresh().await {
        error!(dataset, error = %e, "Initial load failed");
        ready.send_replace(Readiness::Failed(format!("initial {dataset} load failed: {e}")));
        return;
    }
    ready.send_replace(Readiness::Ready);
    info!(dataset, "Initial load complete");

    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = refresh().await {
                    error!(dataset, error = %e, "Refresh failed, keeping previous snapshot");
                }
            }
            _ = shutdown.changed() => {
                info!(dataset, "Cancelling refresher");
                return;
            }
        }
    }
}
