use muzee_core::{CoreError, UserId};
use muzee_features::FeatureError;
use muzee_spotify_api::SpotifyError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Spotify(#[from] SpotifyError),

    #[error(transparent)]
    Feature(#[from] FeatureError),

    #[error("No user with id {0}; run `muzee login` first")]
    NoSuchUser(UserId),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed to create tokio runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
