//! Domain types shared by every pipeline stage.

pub mod ids;
pub mod region;
pub mod series;

pub use ids::{DatasetHash, RegionId};
pub use region::{AnomalyPoint, AnomalyRegion, FlagSource};
pub use series::{Cadence, NormalizeStats, Observation, Provenance, Series};

/// Entity name type alias
pub type Entity = String;
