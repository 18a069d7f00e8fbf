//! Shared filesystem and path helpers used across the generation
//! pipeline.

pub mod fs;
pub mod paths;
