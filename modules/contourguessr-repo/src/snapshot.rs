use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use contourguessr_common::{Challenge, Region, RegionId};
use rand::seq::IndexedRandom;
use rand::Rng;

/// Published regions keyed by region id.
pub type RegionSnapshot = HashMap<RegionId, Region>;

/// Published challenges with the indexes queries need.
#[derive(Debug, Default)]
pub struct ChallengeSnapshot {
    by_id: HashMap<u32, Arc<Challenge>>,
    by_region: HashMap<RegionId, Vec<Arc<Challenge>>>,
    regions_with_challenges: Vec<RegionId>,
}

impl ChallengeSnapshot {
    pub fn insert(&mut self, internal_id: u32, region_id: RegionId, challenge: Challenge) {
        let challenge = Arc::new(challenge);
        if !self.by_region.contains_key(&region_id) {
            self.regions_with_challenges.push(region_id);
        }
        self.by_region
            .entry(region_id)
            .or_default()
            .push(challenge.clone());
        self.by_id.insert(internal_id, challenge);
    }

    pub fn get(&self, internal_id: u32) -> Option<&Challenge> {
        self.by_id.get(&internal_id).map(Arc::as_ref)
    }

    /// Pick a challenge uniformly from `region`, or, with no region, pick a
    /// region with challenges uniformly and then a challenge within it.
    /// Small regions are therefore overrepresented relative to a flat sample.
    pub fn random<R: Rng + ?Sized>(
        &self,
        region: Option<RegionId>,
        rng: &mut R,
    ) -> Option<&Challenge> {
        let region = match region {
            Some(region) => region,
            None => *self.regions_with_challenges.choose(rng)?,
        };
        self.by_region
            .get(&region)?
            .choose(rng)
            .map(Arc::as_ref)
    }

    pub fn regions_with_challenges(&self) -> &[RegionId] {
        &self.regions_with_challenges
    }

    pub fn counts(&self) -> HashMap<RegionId, usize> {
        self.by_region
            .iter()
            .map(|(region, list)| (*region, list.len()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

struct Live {
    regions: Arc<RegionSnapshot>,
    challenges: Arc<ChallengeSnapshot>,
}

/// Holder of the live snapshots. The lock only guards pointer swaps and
/// clones; lookups happen on the cloned `Arc` after it is released.
pub struct SnapshotStore {
    live: Mutex<Live>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self {
            live: Mutex::new(Live {
                regions: Arc::new(RegionSnapshot::new()),
                challenges: Arc::new(ChallengeSnapshot::default()),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Live> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn regions(&self) -> Arc<RegionSnapshot> {
        self.lock().regions.clone()
    }

    pub fn challenges(&self) -> Arc<ChallengeSnapshot> {
        self.lock().challenges.clone()
    }

    pub fn publish_regions(&self, regions: RegionSnapshot) {
        let regions = Arc::new(regions);
        let previous = std::mem::replace(&mut self.lock().regions, regions);
        drop(previous);
    }

    pub fn publish_challenges(&self, challenges: ChallengeSnapshot) {
        let challenges = Arc::new(challenges);
        let previous = std::mem::replace(&mut self.lock().challenges, challenges);
        drop(previous);
    }
}
