use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("hdf5 error: {0}")]
    Hdf5(#[from] hdf5::Error),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("mismatch: {0}")]
    Mismatch(String),
    #[error("missing store: {0}")]
    MissingStore(String),
    #[error("error in the ordering of the tracked particles ({path}): {reason}")]
    SortFailure { path: String, reason: String },
    #[error("error in selector syntax: {0}")]
    QuerySyntax(String),
    #[error("no particles found")]
    NoParticlesFound,
    #[error("invalid argument: {0}")]
    Argument(String),
    #[error("unsupported export: {0}")]
    UnsupportedExport(String),
}

pub type TrackResult<T> = Result<T, TrackError>;

impl TrackError {
    /// Errors that leave the session usable; everything else is fatal to it.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TrackError::UnsupportedExport(_))
    }
}
