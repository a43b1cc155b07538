//! External SED-fitting engine: config rendering, invocation, output scanning.

pub mod artifacts;
pub mod config;
pub mod runner;

pub use artifacts::collect_artifacts;
pub use config::{DEFAULT_VARIABLES, declared_bands, declared_paths, default_modules, render_config, write_config};
pub use runner::{CONFIG_PLACEHOLDER, EngineCommand, EngineOutput};
