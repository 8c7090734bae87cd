//! Error taxonomy shared by the search client, image fetcher and photo store.

use thiserror::Error;

/// Errors raised by the library components.
///
/// Nothing here is retried automatically; retry policy belongs to the caller.
#[derive(Debug, Error)]
pub enum TouristError {
    /// Network unreachable, timeout, or a non-2xx HTTP response
    #[error("transport error: {0}")]
    Transport(String),

    /// The response did not have the expected JSON shape
    #[error("unexpected response format: {0}")]
    ResponseFormat(String),

    /// The photo search API answered with a failure envelope (`stat` != "ok")
    #[error("photo search API reported failure (code {code:?}): {message}")]
    ApiStatus { code: Option<i64>, message: String },

    /// A latitude or longitude outside the valid ranges, or not finite
    #[error("invalid coordinate: {0}")]
    InvalidCoordinate(String),

    /// A referenced pin or photo does not exist
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Writing the store snapshot failed
    #[error("failed to persist store: {0}")]
    Persistence(String),

    /// The photo has no remote path to download from
    #[error("photo {0} has no remote path")]
    MissingPath(String),
}

impl TouristError {
    pub fn pin_not_found(id: impl ToString) -> Self {
        TouristError::NotFound {
            kind: "pin",
            id: id.to_string(),
        }
    }

    pub fn photo_not_found(id: impl ToString) -> Self {
        TouristError::NotFound {
            kind: "photo",
            id: id.to_string(),
        }
    }

    /// True for the `NotFound` variant
    pub fn is_not_found(&self) -> bool {
        matches!(self, TouristError::NotFound { .. })
    }
}

impl From<reqwest::Error> for TouristError {
    fn from(err: reqwest::Error) -> Self {
        TouristError::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TouristError>;
