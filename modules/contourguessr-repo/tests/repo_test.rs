//! Repo lifecycle and query behaviour against the in-memory mocks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use contourguessr_repo::challenge_id;
use contourguessr_repo::store::ChallengeDebugRow;
use contourguessr_repo::testing::{
    challenge_row, link, map_layer_row, region_row, MockCapabilities, MockStore,
};
use contourguessr_repo::{Repo, RepoConfig, RepoError};

const OS: &str = "https://tiles.test/os/wmts";
const SWISSTOPO: &str = "https://tiles.test/swisstopo/wmts";

fn fast_config() -> RepoConfig {
    RepoConfig {
        regions_refresh: Duration::from_secs(3600),
        challenges_refresh: Duration::from_millis(50),
    }
}

/// Two regions on the OS layer, one on swisstopo, with challenges spread
/// across them.
fn seeded_store() -> MockStore {
    MockStore::new()
        .with_region(region_row(1, "Cairngorms"))
        .with_region(region_row(2, "Lake District"))
        .with_region(region_row(3, "Bernese Oberland"))
        .with_map_layer(map_layer_row(10, OS))
        .with_map_layer(map_layer_row(20, SWISSTOPO))
        .with_link(link(1, 10))
        .with_link(link(2, 10))
        .with_link(link(3, 20))
        .with_challenge(challenge_row(1, 1))
        .with_challenge(challenge_row(2, 1))
        .with_challenge(challenge_row(3, 2))
        .with_challenge(challenge_row(4, 3))
}

fn all_capabilities() -> MockCapabilities {
    MockCapabilities::new()
        .on(OS, "<Capabilities>os</Capabilities>")
        .on(SWISSTOPO, "<Capabilities>swisstopo</Capabilities>")
}

async fn eventually(timeout: Duration, mut check: impl FnMut() -> bool) {
    let start = Instant::now();
    while !check() {
        assert!(start.elapsed() < timeout, "condition not met within {timeout:?}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn serves_queries_once_ready() {
    let store = Arc::new(seeded_store());
    let repo = Repo::start(store.clone(), Arc::new(all_capabilities()), fast_config());

    repo.wait_until_ready().await.unwrap();
    // Later calls return immediately.
    repo.wait_until_ready().await.unwrap();

    let regions = repo.regions().await;
    assert_eq!(regions.len(), 3);
    for region in regions.values() {
        assert!(region.map_layer.is_enriched());
    }
    assert_eq!(regions[&3].map_layer.capabilities_xml, "<Capabilities>swisstopo</Capabilities>");

    let challenge = repo.challenge(&challenge_id::encode(3)).await.unwrap();
    assert_eq!(challenge.region_id, "2");
    assert_eq!(challenge.title, "Photo 3");

    let picked = repo.random_challenge(Some(1)).await.unwrap();
    assert_eq!(picked.region_id, "1");
    assert!(repo.random_challenge(None).await.is_ok());

    repo.close().await;
}

#[tokio::test]
async fn invalid_and_missing_ids() {
    let repo = Repo::start(Arc::new(seeded_store()), Arc::new(all_capabilities()), fast_config());
    repo.wait_until_ready().await.unwrap();

    assert!(matches!(
        repo.challenge("not-base32!").await,
        Err(RepoError::InvalidId(_))
    ));
    assert!(matches!(
        repo.challenge(&challenge_id::encode(999_999_999)).await,
        Err(RepoError::ChallengeNotFound)
    ));
    assert!(matches!(
        repo.random_challenge(Some(42)).await,
        Err(RepoError::NoChallengesAvailable)
    ));

    repo.close().await;
}

#[tokio::test]
async fn failed_layer_prunes_only_its_regions() {
    let caps = MockCapabilities::new().on(OS, "<Capabilities>os</Capabilities>");
    let repo = Repo::start(Arc::new(seeded_store()), Arc::new(caps), fast_config());
    repo.wait_until_ready().await.unwrap();

    let regions = repo.regions().await;
    let mut ids: Vec<_> = regions.keys().copied().collect();
    ids.sort();
    assert_eq!(ids, vec![1, 2]);

    repo.close().await;
}

#[tokio::test]
async fn challenges_per_region_matches_loaded_rows() {
    let store = Arc::new(seeded_store());
    let repo = Repo::start(store.clone(), Arc::new(all_capabilities()), fast_config());
    repo.wait_until_ready().await.unwrap();

    let counts = repo.challenges_per_region();
    assert_eq!(counts.values().sum::<usize>(), 4);
    assert_eq!(counts[&1], 2);

    store.set_challenges(vec![challenge_row(7, 2), challenge_row(8, 2), challenge_row(9, 2)]);
    eventually(Duration::from_secs(2), || {
        repo.challenges_per_region().get(&2) == Some(&3)
    })
    .await;
    let counts = repo.challenges_per_region();
    assert_eq!(counts.len(), 1);
    assert_eq!(counts.values().sum::<usize>(), 3);

    repo.close().await;
}

#[tokio::test]
async fn steady_state_failure_keeps_previous_snapshot() {
    let store = Arc::new(seeded_store());
    let repo = Repo::start(store.clone(), Arc::new(all_capabilities()), fast_config());
    repo.wait_until_ready().await.unwrap();

    store.fail_challenges(true);
    store.set_challenges(Vec::new());
    let loads = store.challenge_loads();
    eventually(Duration::from_secs(2), || store.challenge_loads() >= loads + 2).await;

    assert_eq!(repo.challenges_per_region().values().sum::<usize>(), 4);
    assert!(repo.challenge(&challenge_id::encode(1)).await.is_ok());

    store.fail_challenges(false);
    eventually(Duration::from_secs(2), || repo.challenges_per_region().is_empty()).await;
    assert!(matches!(
        repo.random_challenge(None).await,
        Err(RepoError::NoChallengesAvailable)
    ));

    repo.close().await;
}

#[tokio::test]
async fn initial_failure_fails_startup() {
    let store = MockStore::new().with_region(region_row(1, "Cairngorms"));
    store.fail_regions(true);
    let repo = Repo::start(Arc::new(store), Arc::new(all_capabilities()), fast_config());

    let err = repo.wait_until_ready().await.unwrap_err();
    match err {
        RepoError::StartupFailed(reason) => assert!(reason.contains("regions"), "{reason}"),
        other => panic!("expected StartupFailed, got {other:?}"),
    }

    repo.close().await;
}

#[tokio::test]
async fn reads_do_not_wait_for_refresh_in_flight() {
    let store = Arc::new(seeded_store());
    let repo = Repo::start(store.clone(), Arc::new(all_capabilities()), fast_config());
    repo.wait_until_ready().await.unwrap();

    store.delay_challenges(Duration::from_millis(300));
    let loads = store.challenge_loads();
    eventually(Duration::from_secs(2), || store.challenge_loads() > loads).await;

    // A load is now sleeping inside the store.
    let start = Instant::now();
    for _ in 0..100 {
        let regions = repo.regions().await;
        assert!(regions.values().all(|r| r.map_layer.is_enriched()));
        repo.challenge(&challenge_id::encode(2)).await.unwrap();
    }
    assert!(
        start.elapsed() < Duration::from_millis(100),
        "reads took {:?}",
        start.elapsed()
    );

    repo.close().await;
}

#[tokio::test]
async fn region_refresh_never_publishes_partial_layers() {
    let caps = all_capabilities().with_delay(Duration::from_millis(100));
    let repo = Repo::start(
        Arc::new(seeded_store()),
        Arc::new(caps),
        RepoConfig {
            regions_refresh: Duration::from_millis(150),
            challenges_refresh: Duration::from_secs(3600),
        },
    );
    repo.wait_until_ready().await.unwrap();

    let deadline = Instant::now() + Duration::from_millis(600);
    while Instant::now() < deadline {
        let regions = repo.regions().await;
        assert_eq!(regions.len(), 3);
        assert!(regions.values().all(|r| r.map_layer.is_enriched()));
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    repo.close().await;
}

#[tokio::test]
async fn close_stops_refreshers_before_closing_store() {
    let store = Arc::new(seeded_store());
    let repo = Repo::start(store.clone(), Arc::new(all_capabilities()), fast_config());
    repo.wait_until_ready().await.unwrap();

    repo.close().await;
    assert!(store.is_closed());

    let loads = store.challenge_loads();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(store.challenge_loads(), loads);
}

#[tokio::test]
async fn debug_info_includes_source_metadata() {
    let store = seeded_store().with_debug_row(
        3,
        ChallengeDebugRow {
            summary: Some(serde_json::json!({ "id": "52866" })),
            ..ChallengeDebugRow::default()
        },
    );
    let repo = Repo::start(Arc::new(store), Arc::new(all_capabilities()), fast_config());
    repo.wait_until_ready().await.unwrap();

    let info = repo
        .challenge_debug_info(&challenge_id::encode(3))
        .await
        .unwrap();
    assert_eq!(info["internal_id"], 3);
    assert_eq!(info["summary"]["id"], "52866");
    assert_eq!(info["challenge"]["region_id"], "2");
    assert!(info["exif"].is_null());

    assert!(matches!(
        repo.challenge_debug_info(&challenge_id::encode(99)).await,
        Err(RepoError::ChallengeNotFound)
    ));

    repo.close().await;
}

#[tokio::test]
async fn region_refresh_failure_keeps_previous_snapshot() {
    let store = Arc::new(seeded_store());
    let repo = Repo::start(
        store.clone(),
        Arc::new(all_capabilities()),
        RepoConfig {
            regions_refresh: Duration::from_millis(50),
            challenges_refresh: Duration::from_secs(3600),
        },
    );
    repo.wait_until_ready().await.unwrap();

    store.fail_regions(true);
    let loads = store.region_loads();
    eventually(Duration::from_secs(2), || store.region_loads() >= loads + 2).await;

    let regions = repo.regions().await;
    let mut ids: Vec<_> = regions.keys().copied().collect();
    ids.sort();
    assert_eq!(ids, vec![1, 2, 3]);
    assert!(regions.values().all(|r| r.map_layer.is_enriched()));

    repo.close().await;
}

#[tokio::test]
#[should_panic(expected = "challenges refresh period must be non-zero")]
async fn zero_refresh_period_is_rejected_at_start() {
    Repo::start(
        Arc::new(seeded_store()),
        Arc::new(all_capabilities()),
        RepoConfig {
            regions_refresh: Duration::from_secs(3600),
            challenges_refresh: Duration::ZERO,
        },
    );
}

#[tokio::test]
async fn debug_info_rejects_invalid_id() {
    let repo = Repo::start(Arc::new(seeded_store()), Arc::new(all_capabilities()), fast_config());
    repo.wait_until_ready().await.unwrap();

    assert!(matches!(
        repo.challenge_debug_info("not-base32!").await,
        Err(RepoError::InvalidId(_))
    ));

    repo.close().await;
}

#[tokio::test]
async fn queries_after_failed_startup_serve_empty_snapshots() {
    let store = seeded_store();
    store.fail_regions(true);
    store.fail_challenges(true);
    let repo = Repo::start(Arc::new(store), Arc::new(all_capabilities()), fast_config());
    assert!(repo.wait_until_ready().await.is_err());

    assert!(repo.regions().await.is_empty());
    assert!(matches!(
        repo.random_challenge(None).await,
        Err(RepoError::NoChallengesAvailable)
    ));

    repo.close().await;
}
