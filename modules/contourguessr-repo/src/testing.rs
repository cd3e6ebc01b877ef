// Test mocks for the repo.
//
// Two mocks matching the two trait boundaries:
// - MockStore (Store) — in-memory rows, switchable failures, load counters
// - MockCapabilities (CapabilitiesSource) — HashMap-based URL→document
//
// Plus row and domain fixtures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use contourguessr_common::{
    Challenge, LngLat, MapLayerId, Photographer, PictureSources, RegionId, ScoringPoint,
};

use crate::capabilities::CapabilitiesSource;
use crate::error::StoreError;
use crate::store::{
    ChallengeDebugRow, ChallengeRow, MapLayerRow, RegionMapLayerRow, RegionRow, RegionRows, Store,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn region_row(id: RegionId, name: &str) -> RegionRow {
    RegionRow {
        id,
        geo_json: serde_json::json!({
            "type": "Polygon",
            "coordinates": [[[-4.0, 56.8], [-3.2, 56.8], [-3.2, 57.2], [-4.0, 56.8]]],
        }),
        name: name.to_string(),
        country_iso2: "GB".to_string(),
        logo_url: format!("https://logos.test/{id}.svg"),
        min_lng: -4.0,
        max_lng: -3.2,
        min_lat: 56.8,
        max_lat: 57.2,
    }
}

pub fn map_layer_row(id: MapLayerId, capabilities_url: &str) -> MapLayerRow {
    MapLayerRow {
        id,
        name: format!("Layer {id}"),
        capabilities_url: capabilities_url.to_string(),
        layer: "Outdoor_27700".to_string(),
        matrix_set: "EPSG:27700".to_string(),
        resolutions: vec![896.0, 448.0, 224.0, 112.0, 56.0, 28.0, 14.0, 7.0, 3.5, 1.75],
        default_resolution: 14.0,
        os_branding: Some(true),
        extra_attributions: vec!["Contains OS data".to_string()],
    }
}

pub fn link(region_id: RegionId, map_layer_id: MapLayerId) -> RegionMapLayerRow {
    RegionMapLayerRow {
        region_id,
        map_layer_id,
    }
}

pub fn challenge_row(id: i32, region_id: RegionId) -> ChallengeRow {
    ChallengeRow {
        id,
        region_id,
        lng: -3.6,
        lat: 57.0,
        title: format!("Photo {id}"),
        description_html: "<p>A view</p>".to_string(),
        date_taken: None,
        link: format!("https://photos.test/{id}"),
        preview_src: format!("https://photos.test/{id}_t.jpg"),
        preview_width: 100,
        preview_height: 75,
        regular_src: format!("https://photos.test/{id}_c.jpg"),
        regular_width: 800,
        regular_height: 600,
        large_src: format!("https://photos.test/{id}_b.jpg"),
        large_width: 1024,
        large_height: 768,
        photographer_icon: "https://photos.test/icon.jpg".to_string(),
        photographer_text: "A. Photographer".to_string(),
        photographer_link: "https://photos.test/people/a".to_string(),
        rx: 0.25,
        ry: 0.75,
    }
}

/// A published challenge, for tests that bypass the store.
pub fn challenge(internal_id: u32, region_id: RegionId) -> Challenge {
    Challenge {
        id: crate::challenge_id::encode(internal_id),
        region_id: region_id.to_string(),
        geo: LngLat { lng: -3.6, lat: 57.0 },
        title: format!("Photo {internal_id}"),
        description_html: String::new(),
        date_taken: None,
        link: String::new(),
        src: PictureSources::default(),
        photographer: Photographer::default(),
        r: ScoringPoint::default(),
    }
}

// ---------------------------------------------------------------------------
// MockStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MockStoreState {
    regions: RegionRows,
    challenges: Vec<ChallengeRow>,
    debug_rows: HashMap<i32, ChallengeDebugRow>,
}

/// In-memory store. Rows can be swapped and failures toggled between
/// refresh cycles.
#[derive(Default)]
pub struct MockStore {
    state: Mutex<MockStoreState>,
    fail_regions: AtomicBool,
    fail_challenges: AtomicBool,
    challenge_delay: Mutex<Option<Duration>>,
    region_loads: AtomicUsize,
    challenge_loads: AtomicUsize,
    closed: AtomicBool,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_region(self, row: RegionRow) -> Self {
        self.state.lock().unwrap().regions.regions.push(row);
        self
    }

    pub fn with_map_layer(self, row: MapLayerRow) -> Self {
        self.state.lock().unwrap().regions.map_layers.push(row);
        self
    }

    pub fn with_link(self, row: RegionMapLayerRow) -> Self {
        self.state.lock().unwrap().regions.links.push(row);
        self
    }

    pub fn with_challenge(self, row: ChallengeRow) -> Self {
        self.state.lock().unwrap().challenges.push(row);
        self
    }

    pub fn with_debug_row(self, challenge_id: i32, row: ChallengeDebugRow) -> Self {
        self.state.lock().unwrap().debug_rows.insert(challenge_id, row);
        self
    }

    /// Replace the challenge rows seen by subsequent loads.
    pub fn set_challenges(&self, rows: Vec<ChallengeRow>) {
        self.state.lock().unwrap().challenges = rows;
    }

    pub fn fail_regions(&self, fail: bool) {
        self.fail_regions.store(fail, Ordering::SeqCst);
    }

    pub fn fail_challenges(&self, fail: bool) {
        self.fail_challenges.store(fail, Ordering::SeqCst);
    }

    /// Make each challenge load take at least `delay`.
    pub fn delay_challenges(&self, delay: Duration) {
        *self.challenge_delay.lock().unwrap() = Some(delay);
    }

    pub fn region_loads(&self) -> usize {
        self.region_loads.load(Ordering::SeqCst)
    }

    pub fn challenge_loads(&self) -> usize {
        self.challenge_loads.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check_open(&self) -> Result<(), StoreError> {
        if self.is_closed() {
            return Err(StoreError::Database(sqlx::Error::PoolClosed));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MockStore {
    async fn load_regions(&self) -> Result<RegionRows, StoreError> {
        self.check_open()?;
        self.region_loads.fetch_add(1, Ordering::SeqCst);
        if self.fail_regions.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(self.state.lock().unwrap().regions.clone())
    }

    async fn load_challenges(&self) -> Result<Vec<ChallengeRow>, StoreError> {
        self.check_open()?;
        self.challenge_loads.fetch_add(1, Ordering::SeqCst);
        let delay = *self.challenge_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_challenges.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(self.state.lock().unwrap().challenges.clone())
    }

    async fn challenge_debug_row(
        &self,
        internal_id: i32,
    ) -> Result<Option<ChallengeDebugRow>, StoreError> {
        self.check_open()?;
        Ok(self.state.lock().unwrap().debug_rows.get(&internal_id).cloned())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// MockCapabilities
// ---------------------------------------------------------------------------

/// HashMap-based capabilities source. Returns `Err` for unregistered URLs.
#[derive(Default)]
pub struct MockCapabilities {
    documents: HashMap<String, String>,
    delay: Option<Duration>,
    calls: Mutex<HashMap<String, usize>>,
}

impl MockCapabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, url: &str, document: &str) -> Self {
        self.documents.insert(url.to_string(), document.to_string());
        self
    }

    /// Make every fetch take at least `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl CapabilitiesSource for MockCapabilities {
    async fn fetch(&self, url: &str) -> Result<String> {
        *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.documents
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("MockCapabilities: unexpected status code 503 for {url}"))
    }
}
