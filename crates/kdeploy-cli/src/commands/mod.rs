//! CLI command implementations

pub mod deploy;
pub mod render;
