use thiserror::Error;

use crate::service::Phase;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid resolution filter: {0}")]
    InvalidFilter(String),

    #[error("filter not supported by this source: {0}")]
    UnsupportedFilter(String),

    #[error("resolution failed during {phase}: {source}")]
    PhaseFailed {
        phase: Phase,
        #[source]
        source: Box<Error>,
    },

    #[error("entity not found: {0}")]
    EntityNotFound(String),

    #[error("relationship not found: {0}")]
    RelationshipNotFound(String),

    #[error("malformed timestamp: {0}")]
    MalformedTimestamp(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Tags an error with the phase that was executing when it surfaced.
    /// Filter validation errors pass through untouched so callers can tell
    /// bad input from storage failures.
    #[must_use]
    pub fn in_phase(self, phase: Phase) -> Self {
        match self {
            e @ (Self::InvalidFilter(_) | Self::UnsupportedFilter(_) | Self::PhaseFailed { .. }) => e,
            other => Self::PhaseFailed {
                phase,
                source: Box::new(other),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
