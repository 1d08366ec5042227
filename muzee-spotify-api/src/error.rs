use muzee_core::CoreError;
use thiserror::Error;

/// Unified error type for all Spotify-related operations.
#[derive(Debug, Error)]
pub enum SpotifyError {
    /// The API rejected the access token. Handled inside the client by
    /// refreshing; callers only see it if they bypass `SpotifyClient::request`.
    #[error("Spotify access token expired")]
    AuthExpired,

    /// The refresh grant was rejected or the refresh budget is spent.
    #[error("Spotify token could not be refreshed: {reason}")]
    CantRefresh { reason: String },

    /// A non-retryable 4xx, or a 429/5xx that outlived the transient retries.
    #[error("Spotify rejected {method} {path} [{params}] with {status}: {message}")]
    UpstreamRejected {
        status: u16,
        method: String,
        path: String,
        params: String,
        message: String,
    },

    #[error("Spotify resource not found: {path}")]
    NotFound { path: String },

    /// The request timed out twice in a row.
    #[error("Spotify request timed out: {method} {path}")]
    Timeout { method: String, path: String },

    /// Authentication failed during the interactive OAuth flow.
    #[error("Spotify authentication failed: {reason}")]
    AuthFailed { reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP middleware error: {0}")]
    Middleware(#[from] reqwest_middleware::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] CoreError),
}

impl SpotifyError {
    /// Whether the error means the user has to log in again.
    #[must_use]
    pub const fn requires_login(&self) -> bool {
        matches!(self, Self::CantRefresh { .. })
    }
}

/// Convenience type alias for Results with `SpotifyError`.
pub type Result<T> = std::result::Result<T, SpotifyError>;
