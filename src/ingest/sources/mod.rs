// src/ingest/sources/mod.rs
pub mod probeg;
pub mod russia_running;

pub use probeg::ProbegSource;
pub use russia_running::RussiaRunningSource;
