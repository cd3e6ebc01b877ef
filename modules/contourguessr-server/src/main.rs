use std::sync::Arc;

use anyhow::Result;
use capabilities_client::{CapabilitiesClient, RetryPolicy};
use sqlx::postgres::PgPoolOptions;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use contourguessr_common::Config;
use contourguessr_repo::{PgStore, Repo, RepoConfig};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    // Initialize logging
    let filter = EnvFilter::from_default_env()
        .add_directive("contourguessr=info".parse()?)
        .add_directive("capabilities_client=info".parse()?);
    if config.is_dev() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    }

    info!("Contourguessr starting...");
    config.log_redacted();

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;

    let capabilities = CapabilitiesClient::new(RetryPolicy {
        max_elapsed: config.capabilities_max_elapsed,
        attempt_timeout: config.capabilities_timeout,
        ..RetryPolicy::default()
    })?;

    let repo = Arc::new(Repo::start(
        Arc::new(PgStore::new(pool)),
        Arc::new(capabilities),
        RepoConfig {
            regions_refresh: config.regions_refresh,
            challenges_refresh: config.challenges_refresh,
        },
    ));

    if let Err(e) = repo.wait_until_ready().await {
        error!(error = %e, "Repo failed to become ready");
        repo.close().await;
        return Err(e.into());
    }

    log_available_regions(&repo).await;

    let stats = tokio::spawn(log_stats_loop(repo.clone(), config.stats_log_interval));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    stats.abort();
    repo.close().await;
    info!("Contourguessr stopped");
    Ok(())
}

async fn log_available_regions(repo: &Repo) {
    let regions = repo.regions().await;
    let counts = repo.challenges_per_region();

    let mut listed: Vec<_> = regions.iter().collect();
    listed.sort_by(|(_, a), (_, b)| a.name.cmp(&b.name));

    info!(regions = listed.len(), "Available regions");
    for (id, region) in listed {
        info!(
            region = *id,
            name = %region.name,
            map_layer = %region.map_layer.name,
            challenges = counts.get(id).copied().unwrap_or(0),
            "Region"
        );
    }
}

/// Periodically log the challenge count for every region.
async fn log_stats_loop(repo: Arc<Repo>, period: std::time::Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let counts = repo.challenges_per_region();
        let total: usize = counts.values().sum();
        info!(regions = counts.len(), challenges = total, "Challenge stats");
        for (region, count) in counts {
            info!(region, challenges = count, "Challenges per region");
        }
    }
}
