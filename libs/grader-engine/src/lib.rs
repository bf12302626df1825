pub mod alloc;
pub mod binding;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod instrument;
pub mod isolation;
pub mod runner;
pub mod synthesizer;

pub use config::GraderConfig;
pub use executor::{grade, grade_payload};

// Binaries install the allocator themselves; unit tests need it for heap deltas
#[cfg(test)]
#[global_allocator]
static GLOBAL: alloc::TrackingAllocator = alloc::TrackingAllocator;
