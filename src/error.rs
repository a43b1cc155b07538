use thiserror::Error;

use crate::domain::SkyPosition;

/// Errors surfaced by the photometry / engine pipeline.
///
/// Lookup and aggregation errors carry enough context (position, radius) for a
/// caller to retry with adjusted parameters. Engine errors carry the engine's
/// own diagnostic text untouched.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("could not resolve sky position for '{query}': {reason}")]
    Resolution { query: String, reason: String },

    #[error("no photometry found within {radius_arcsec}\" of {position}")]
    NoPhotometryFound {
        position: SkyPosition,
        radius_arcsec: f64,
    },

    #[error("survey search failed at {position} (radius {radius_arcsec}\"): {reason}")]
    SurveySearch {
        position: SkyPosition,
        radius_arcsec: f64,
        reason: String,
    },

    #[error("reddening lookup failed at {position}: {reason}")]
    ExtinctionLookup { position: SkyPosition, reason: String },

    #[error("extinction already applied to this table (E(B-V)={applied:.4})")]
    ExtinctionAlreadyApplied { applied: f64 },

    #[error("schema mismatch: {detail}")]
    SchemaMismatch { detail: String },

    #[error("malformed config: {0}")]
    MalformedConfig(String),

    #[error("fitting engine exited with {status}:\n{stderr}")]
    EngineExecution { status: String, stderr: String },

    #[error("run for '{object_id}' was aborted before the engine started")]
    Aborted { object_id: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Process exit code used by the `sed` binary for this error kind.
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::MalformedConfig(_) | PipelineError::SchemaMismatch { .. } => 2,
            PipelineError::NoPhotometryFound { .. } => 3,
            PipelineError::Resolution { .. }
            | PipelineError::SurveySearch { .. }
            | PipelineError::ExtinctionLookup { .. }
            | PipelineError::ExtinctionAlreadyApplied { .. } => 4,
            PipelineError::EngineExecution { .. } => 5,
            PipelineError::Io { .. } => 6,
            PipelineError::Aborted { .. } => 1,
        }
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        AppError::new(err.exit_code(), err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
