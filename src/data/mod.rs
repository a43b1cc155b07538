//! External data collaborators: name resolution, survey search, reddening.
//!
//! Each collaborator is a small trait so the pipeline can be driven by the
//! HTTP clients in production and by in-memory fakes in tests. Service URLs
//! and timeouts are explicit construction values.

use std::time::Duration;

use reqwest::blocking::Client;

use crate::domain::{ExtinctionValue, SkyPosition, SurveyCategory, SurveyDetection};
use crate::error::PipelineError;

pub mod dust;
pub mod sesame;
pub mod vizier;

pub use dust::{DustClient, DustConfig};
pub use sesame::{SesameClient, SesameConfig};
pub use vizier::{VizierClient, VizierConfig};

/// Object name → sky position.
pub trait NameResolver {
    fn resolve(&self, name: &str) -> Result<SkyPosition, PipelineError>;
}

/// Parameters of one multi-survey cone search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub position: SkyPosition,
    pub radius_arcsec: f64,
    /// Survey categories to leave out of the search.
    pub exclude: Vec<SurveyCategory>,
}

impl SearchRequest {
    pub fn includes(&self, category: SurveyCategory) -> bool {
        !self.exclude.contains(&category)
    }
}

/// Cone search over the photometric surveys.
///
/// An empty result is a valid answer, not an error.
pub trait SurveySearch {
    fn search(&self, request: &SearchRequest) -> Result<Vec<SurveyDetection>, PipelineError>;
}

/// Position → one E(B-V) value.
pub trait ReddeningLookup {
    fn lookup(&self, position: &SkyPosition) -> Result<ExtinctionValue, PipelineError>;
}

pub(crate) fn build_http_client(timeout: Duration) -> Result<Client, PipelineError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("sed-prep/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| PipelineError::io("failed to build HTTP client", std::io::Error::other(e)))
}
