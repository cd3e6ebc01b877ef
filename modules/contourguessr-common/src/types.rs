use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store-assigned identifier of a region.
pub type RegionId = i32;

/// Store-assigned identifier of a map layer.
pub type MapLayerId = i32;

// --- Regions ---

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BBox {
    pub min_lng: f64,
    pub max_lng: f64,
    pub max_lat: f64,
    pub min_lat: f64,
}

/// A playable area. Only ever published with a fully enriched `map_layer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: String,
    /// Boundary polygon or multipolygon as GeoJSON. Opaque to the cache.
    pub geo_json: serde_json::Value,
    pub name: String,
    pub country_iso2: String,
    pub logo_url: String,
    pub bbox: BBox,
    pub map_layer: MapLayer,
}

/// Tiled map source shared by every region that references it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MapLayer {
    pub id: String,
    pub name: String,
    /// WMTS capabilities document fetched from the layer's capabilities URL.
    pub capabilities_xml: String,
    pub layer: String,
    pub matrix_set: String,
    /// One per zoom level, descending.
    pub resolutions: Vec<f64>,
    pub default_resolution: f64,
    pub os_branding: bool,
    pub extra_attributions: Vec<String>,
}

impl MapLayer {
    pub fn is_enriched(&self) -> bool {
        !self.capabilities_xml.is_empty()
    }
}

// --- Challenges ---

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PictureSrc {
    pub src: String,
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PictureSources {
    pub preview: PictureSrc,
    pub regular: PictureSrc,
    pub large: PictureSrc,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Photographer {
    pub icon: String,
    pub text: String,
    pub link: String,
}

/// Auxiliary coordinates consumed by client-side scoring.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoringPoint {
    pub x: f64,
    pub y: f64,
}

/// A photograph to be located. `id` is the opaque, encoded form of the
/// internal identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: String,
    pub region_id: String,
    pub geo: LngLat,
    pub title: String,
    #[serde(rename = "description")]
    pub description_html: String,
    pub date_taken: Option<DateTime<Utc>>,
    pub link: String,
    pub src: PictureSources,
    pub photographer: Photographer,
    pub r: ScoringPoint,
}
