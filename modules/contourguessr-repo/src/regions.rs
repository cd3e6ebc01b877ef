use std::collections::HashMap;
use std::time::Instant;

use contourguessr_common::{BBox, MapLayer, MapLayerId, Region, RegionId};
use futures::future::join_all;
use tracing::{info, warn};

use crate::capabilities::CapabilitiesSource;
use crate::error::StoreError;
use crate::snapshot::RegionSnapshot;
use crate::store::{MapLayerRow, RegionMapLayerRow, RegionRow, Store};

/// Build a complete region snapshot. Store errors abort the load; failed
/// capability fetches only prune the affected regions.
pub(crate) async fn load_region_snapshot(
    store: &dyn Store,
    capabilities: &dyn CapabilitiesSource,
) -> Result<RegionSnapshot, StoreError> {
    let start = Instant::now();
    let rows = store.load_regions().await?;

    let layer_count = rows.map_layers.len();
    let layers = enrich_map_layers(capabilities, rows.map_layers).await;
    let snapshot = attach_map_layers(rows.regions, &rows.links, &layers);

    info!(
        regions = snapshot.len(),
        map_layers = layers.len(),
        failed_map_layers = layer_count - layers.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Region snapshot loaded"
    );
    Ok(snapshot)
}

/// Fetch capabilities for every distinct layer concurrently. Layers whose
/// fetch failed are absent from the result.
async fn enrich_map_layers(
    capabilities: &dyn CapabilitiesSource,
    rows: Vec<MapLayerRow>,
) -> HashMap<MapLayerId, MapLayer> {
    let distinct: HashMap<MapLayerId, MapLayerRow> =
        rows.into_iter().map(|row| (row.id, row)).collect();

    let fetches = distinct.into_values().map(|row| async move {
        let result = capabilities.fetch(&row.capabilities_url).await;
        (row, result)
    });

    join_all(fetches)
        .await
        .into_iter()
        .filter_map(|(row, result)| match result {
            Ok(xml) if !xml.is_empty() => Some((row.id, into_map_layer(row, xml))),
            Ok(_) => {
                warn!(
                    map_layer = row.id,
                    url = %row.capabilities_url,
                    "Empty capabilities document, dropping map layer"
                );
                None
            }
            Err(e) => {
                warn!(
                    map_layer = row.id,
                    url = %row.capabilities_url,
                    error = %e,
                    "Failed to fetch capabilities, dropping map layer"
                );
                None
            }
        })
        .collect()
}

fn into_map_layer(row: MapLayerRow, capabilities_xml: String) -> MapLayer {
    MapLayer {
        id: row.id.to_string(),
        name: row.name,
        capabilities_xml,
        layer: row.layer,
        matrix_set: row.matrix_set,
        resolutions: row.resolutions,
        default_resolution: row.default_resolution,
        os_branding: row.os_branding.unwrap_or(false),
        extra_attributions: row.extra_attributions,
    }
}

/// Join regions to their enriched layer. A region whose layer is missing,
/// or that has no layer at all, is left out.
fn attach_map_layers(
    regions: Vec<RegionRow>,
    links: &[RegionMapLayerRow],
    layers: &HashMap<MapLayerId, MapLayer>,
) -> RegionSnapshot {
    let mut working: HashMap<RegionId, RegionRow> =
        regions.into_iter().map(|row| (row.id, row)).collect();
    let mut attached: HashMap<RegionId, &MapLayer> = HashMap::new();

    for link in links {
        if !working.contains_key(&link.region_id) {
            continue;
        }
        match layers.get(&link.map_layer_id) {
            Some(layer) => {
                attached.insert(link.region_id, layer);
            }
            None => {
                warn!(
                    region = link.region_id,
                    map_layer = link.map_layer_id,
                    "Missing map layer for region, dropping region"
                );
                working.remove(&link.region_id);
                attached.remove(&link.region_id);
            }
        }
    }

    working
        .into_iter()
        .filter_map(|(id, row)| match attached.get(&id) {
            Some(layer) => Some((id, into_region(row, (*layer).clone()))),
            None => {
                warn!(region = id, "Region has no map layer, dropping region");
                None
            }
        })
        .collect()
}

fn into_region(row: RegionRow, map_layer: MapLayer) -> Region {
    Region {
        id: row.id.to_string(),
        geo_json: row.geo_json,
        name: row.name,
        country_iso2: row.country_iso2,
        logo_url: row.logo_url,
        bbox: BBox {
            min_lng: row.min_lng,
            max_lng: row.max_lng,
            max_lat: row.max_lat,
            min_lat: row.min_lat,
        },
        map_layer,
    }
}
