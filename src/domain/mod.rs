//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - sky positions, surveys and the photometric band registry
//! - photometry rows/tables and their flux values
//! - engine run configuration and run artifacts

pub mod bands;
pub mod types;

pub use bands::*;
pub use types::*;
