pub mod diversify;
pub mod intent;
pub mod noise;
pub mod scoring;
pub mod types;

pub use scoring::Ranker;
pub use types::*;

// Module-level constants
pub const TARGET_RANK: &str = "rank";
