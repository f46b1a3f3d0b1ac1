use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// One requirement that took part in a conflict, with the package that asked
/// for it (`None` for a direct requirement).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictCause {
    pub requirement: String,
    pub parent: Option<String>,
}

impl fmt::Display for ConflictCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.parent {
            Some(parent) => write!(f, "{} (required by {parent})", self.requirement),
            None => write!(f, "{} (direct requirement)", self.requirement),
        }
    }
}

/// Diagnostic attached to a failed resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictReport {
    pub packages: Vec<String>,
    pub causes: Vec<ConflictCause>,
}

impl fmt::Display for ConflictReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no version of {} satisfies all of: ",
            self.packages.join(", ")
        )?;
        for (i, cause) in self.causes.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{cause}")?;
        }
        Ok(())
    }
}

#[derive(Error, Debug, Clone)]
pub enum PydepsError {
    #[error("I/O Error: {0}")]
    Io(#[from] Arc<std::io::Error>),

    #[error("HTTP Request Error: {0}")]
    Http(#[from] Arc<reqwest::Error>),

    #[error("JSON Parsing Error: {0}")]
    Json(#[from] Arc<serde_json::Error>),

    #[error("Archive Error: {0}")]
    Zip(#[from] Arc<zip::result::ZipError>),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Parsing Error in {0}: {1}")]
    ParseError(&'static str, String),

    #[error("Marker evaluation failed: {0}")]
    MarkerEvaluation(String),

    #[error("Unsupported environment: {0}")]
    UnsupportedEnvironment(String),

    #[error("Failed to fetch '{url}': {reason}")]
    RegistryFetch { url: String, reason: String },

    #[error("Cache Error: {0}")]
    Cache(String),

    #[error("Resolution impossible: {0}")]
    ResolutionImpossible(ConflictReport),

    #[error("Resolution did not converge within {rounds} rounds (pinned so far: {})", pinned.join(", "))]
    RoundLimitExceeded { rounds: usize, pinned: Vec<String> },

    #[error("Incompatible manifest {path}: {reason}")]
    IncompatibleManifest { path: String, reason: String },

    #[error("Resolution timed out after {0}")]
    Timeout(String),

    #[error("Resource Not Found: {0}")]
    NotFound(String),

    #[error("Validation Error: {0}")]
    ValidationError(String),

    #[error("Checksum Mismatch: {0}")]
    ChecksumMismatch(String),

    #[error("Failed to execute command: {0}")]
    CommandExecError(String),

    #[error("Generic Error: {0}")]
    Generic(String),
}

impl From<std::io::Error> for PydepsError {
    fn from(err: std::io::Error) -> Self {
        PydepsError::Io(Arc::new(err))
    }
}

impl From<reqwest::Error> for PydepsError {
    fn from(err: reqwest::Error) -> Self {
        PydepsError::Http(Arc::new(err))
    }
}

impl From<serde_json::Error> for PydepsError {
    fn from(err: serde_json::Error) -> Self {
        PydepsError::Json(Arc::new(err))
    }
}

impl From<zip::result::ZipError> for PydepsError {
    fn from(err: zip::result::ZipError) -> Self {
        PydepsError::Zip(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, PydepsError>;
