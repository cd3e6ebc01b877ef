use std::time::Instant;

use contourguessr_common::{
    Challenge, LngLat, Photographer, PictureSources, PictureSrc, ScoringPoint,
};
use tracing::info;

use crate::challenge_id;
use crate::error::StoreError;
use crate::snapshot::ChallengeSnapshot;
use crate::store::{ChallengeRow, Store};

pub(crate) async fn load_challenge_snapshot(
    store: &dyn Store,
) -> Result<ChallengeSnapshot, StoreError> {
    let start = Instant::now();
    let rows = store.load_challenges().await?;

    let mut snapshot = ChallengeSnapshot::default();
    for row in rows {
        let internal_id = u32::try_from(row.id)
            .ok()
            .filter(|id| challenge_id::in_domain(*id))
            .ok_or_else(|| StoreError::InvalidRow(format!("challenge id {} out of range", row.id)))?;
        let region_id = row.region_id;
        snapshot.insert(internal_id, region_id, into_challenge(internal_id, row));
    }

    info!(
        challenges = snapshot.len(),
        regions = snapshot.regions_with_challenges().len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Challenge snapshot loaded"
    );
    Ok(snapshot)
}

fn into_challenge(internal_id: u32, row: ChallengeRow) -> Challenge {
    Challenge {
        id: challenge_id::encode(internal_id),
        region_id: row.region_id.to_string(),
        geo: LngLat {
            lng: row.lng,
            lat: row.lat,
        },
        title: row.title,
        description_html: row.description_html,
        date_taken: row.date_taken,
        link: row.link,
        src: PictureSources {
            preview: PictureSrc {
                src: row.preview_src,
                width: row.preview_width,
                height: row.preview_height,
            },
            regular: PictureSrc {
                src: row.regular_src,
                width: row.regular_width,
                height: row.regular_height,
            },
            large: PictureSrc {
                src: row.large_src,
                width: row.large_width,
                height: row.large_height,
            },
        },
        photographer: Photographer {
            icon: row.photographer_icon,
            text: row.photographer_text,
            link: row.photographer_link,
        },
        r: ScoringPoint {
            x: row.rx,
            y: row.ry,
        },
    }
}
