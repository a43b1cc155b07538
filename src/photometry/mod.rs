//! Photometry stages: aggregation, extinction correction, flux normalization.
//!
//! Stages run in that order on one `PhotometryTable`; each mutates it in place.

pub mod aggregate;
pub mod extinction;
pub mod normalize;

pub use aggregate::{AggregatorConfig, PhotometryAggregator, merge_detections};
pub use extinction::ExtinctionCorrector;
pub use normalize::Normalizer;
