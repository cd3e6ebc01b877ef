pub mod capabilities;
pub mod challenge_id;
mod challenges;
pub mod error;
mod regions;
pub mod repo;
pub mod snapshot;
pub mod store;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use capabilities::CapabilitiesSource;
pub use error::{RepoError, StoreError};
pub use repo::{Repo, RepoConfig};
pub use snapshot::{ChallengeSnapshot, RegionSnapshot, SnapshotStore};
pub use store::{PgStore, Store};
