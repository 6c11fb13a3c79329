//! Report generation: JSON export and run statistics

mod json;
mod stats;

pub use json::write_export;
pub use stats::{collect_stats, StatsReport};
