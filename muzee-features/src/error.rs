use muzee_core::CoreError;
use muzee_spotify_api::SpotifyError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeatureError {
    /// The feature cannot run with the user's current settings. Raised before
    /// any request is sent.
    #[error("Feature precondition failed: {reason}")]
    PreconditionFailed { reason: String },

    #[error(transparent)]
    Spotify(#[from] SpotifyError),

    #[error(transparent)]
    Store(#[from] CoreError),

    #[error("Weather lookup failed: {reason}")]
    Weather { reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP middleware error: {0}")]
    Middleware(#[from] reqwest_middleware::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FeatureError {
    pub(crate) fn precondition(reason: impl Into<String>) -> Self {
        Self::PreconditionFailed {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FeatureError>;
