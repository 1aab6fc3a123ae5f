pub mod assemble;
pub mod config;
pub mod query;
pub mod session;
pub mod sort;

pub use assemble::{assemble, detect_breaks, TrajectoryBuffer};
pub use config::{load_config, SelectSpec, SimulationInfo, TrackConfig};
pub use query::{prune_dead, select_ids, select_query, Query};
pub use session::{ParticleChunks, TimeSlice, TrackSession};
pub use sort::{RankOffsets, SortEngine, SortOptions};
