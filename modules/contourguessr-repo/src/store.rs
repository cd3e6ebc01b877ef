// Read-only Postgres queries backing the refreshers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use contourguessr_common::{MapLayerId, RegionId};
use sqlx::PgPool;
use tracing::info;

use crate::error::StoreError;

/// A row from `regions`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RegionRow {
    pub id: RegionId,
    pub geo_json: serde_json::Value,
    pub name: String,
    pub country_iso2: String,
    pub logo_url: String,
    pub min_lng: f64,
    pub max_lng: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

/// A row from `map_layers`. Carries the capabilities URL, not the document.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MapLayerRow {
    pub id: MapLayerId,
    pub name: String,
    pub capabilities_url: String,
    pub layer: String,
    pub matrix_set: String,
    pub resolutions: Vec<f64>,
    pub default_resolution: f64,
    pub os_branding: Option<bool>,
    pub extra_attributions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct RegionMapLayerRow {
    pub region_id: RegionId,
    pub map_layer_id: MapLayerId,
}

/// Everything the region refresher reads, taken from a single transaction.
#[derive(Debug, Clone, Default)]
pub struct RegionRows {
    pub regions: Vec<RegionRow>,
    pub map_layers: Vec<MapLayerRow>,
    pub links: Vec<RegionMapLayerRow>,
}

/// A row from `challenges` joined to an active region.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChallengeRow {
    pub id: i32,
    pub region_id: RegionId,
    pub lng: f64,
    pub lat: f64,
    pub title: String,
    pub description_html: String,
    pub date_taken: Option<DateTime<Utc>>,
    pub link: String,
    pub preview_src: String,
    pub preview_width: i32,
    pub preview_height: i32,
    pub regular_src: String,
    pub regular_width: i32,
    pub regular_height: i32,
    pub large_src: String,
    pub large_width: i32,
    pub large_height: i32,
    pub photographer_icon: String,
    pub photographer_text: String,
    pub photographer_link: String,
    pub rx: f64,
    pub ry: f64,
}

/// Raw Flickr metadata for the photo a challenge was built from.
#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct ChallengeDebugRow {
    pub summary: Option<serde_json::Value>,
    pub info: Option<serde_json::Value>,
    pub sizes: Option<serde_json::Value>,
    pub exif: Option<serde_json::Value>,
    pub inserted_at: Option<DateTime<Utc>>,
}

/// Query interface the cache reads through.
#[async_trait]
pub trait Store: Send + Sync {
    /// Active regions, the map layers they reference, and all
    /// region/map-layer associations, read in one transaction.
    async fn load_regions(&self) -> Result<RegionRows, StoreError>;

    /// Every challenge in an active region.
    async fn load_challenges(&self) -> Result<Vec<ChallengeRow>, StoreError>;

    async fn challenge_debug_row(
        &self,
        internal_id: i32,
    ) -> Result<Option<ChallengeDebugRow>, StoreError>;

    /// Release the underlying connections. Called once the refreshers have stopped.
    async fn close(&self);
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn load_regions(&self) -> Result<RegionRows, StoreError> {
        let mut tx = self.pool.begin().await?;

        let regions = sqlx::query_as::<_, RegionRow>(
            r#"
            SELECT id, ST_AsGeoJSON(geo)::json AS geo_json, name, country_iso2, logo_url,
                   min_lng, max_lng, min_lat, max_lat
            FROM regions
            WHERE active
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;

        let map_layers = sqlx::query_as::<_, MapLayerRow>(
            r#"
            SELECT ml.id, ml.name, ml.capabilities_url, ml.layer, ml.matrix_set,
                   ml.resolutions, ml.default_resolution, ml.os_branding, ml.extra_attributions
            FROM map_layers AS ml
            JOIN region_map_layers ON ml.id = region_map_layers.map_layer_id
            JOIN regions ON regions.id = region_map_layers.region_id
            WHERE regions.active
            GROUP BY ml.id
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;

        let links = sqlx::query_as::<_, RegionMapLayerRow>(
            r#"
            SELECT region_id, map_layer_id
            FROM region_map_layers
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(RegionRows {
            regions,
            map_layers,
            links,
        })
    }

    async fn load_challenges(&self) -> Result<Vec<ChallengeRow>, StoreError> {
        let rows = sqlx::query_as::<_, ChallengeRow>(
            r#"
            SELECT c.id, c.region_id,
                   ST_X(c.geo::geometry) AS lng, ST_Y(c.geo::geometry) AS lat,
                   c.title, c.description_html, c.date_taken, c.link,
                   c.preview_src, c.preview_width, c.preview_height,
                   c.regular_src, c.regular_width, c.regular_height,
                   c.large_src, c.large_width, c.large_height,
                   c.photographer_icon, c.photographer_text, c.photographer_link,
                   c.rx, c.ry
            FROM challenges AS c
            JOIN regions ON c.region_id = regions.id
            WHERE regions.active
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn challenge_debug_row(
        &self,
        internal_id: i32,
    ) -> Result<Option<ChallengeDebugRow>, StoreError> {
        let row = sqlx::query_as::<_, ChallengeDebugRow>(
            r#"
            SELECT p.summary, p.info, p.sizes, p.exif, p.inserted_at
            FROM flickr_photos AS p
            JOIN flickr_challenge_sources AS src ON p.flickr_id = src.flickr_id
            WHERE src.challenge_id = $1
            "#,
        )
        .bind(internal_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn close(&self) {
        info!("Closing database pool");
        self.pool.close().await;
    }
}
