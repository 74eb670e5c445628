pub mod altitude;
pub mod dead_reckoning;
pub mod fusion_engine;
