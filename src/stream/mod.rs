// Progressive-delivery core — range resolution, piece prioritization, range cache.

pub mod cache;
pub mod range;
pub mod scheduler;
