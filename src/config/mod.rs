//! Configuration module for gpulaunch
//!
//! Provides the launch description, batch directives, CLI arguments,
//! and JSON profile loading.

mod settings;

pub use settings::*;
