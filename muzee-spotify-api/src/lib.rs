pub mod client;
pub mod config;
pub mod error;
pub mod oauth;
pub mod playlists;

pub use client::SpotifyClient;
pub use config::{MAX_REFRESHES, PAGE_SIZE, TRACK_FIELDS, USER_AGENT, WRITE_CHUNK_SIZE};
pub use error::SpotifyError;
pub use oauth::{LoginOutcome, SpotifyLogin};
pub use playlists::{CurrentUser, PlaylistAccessor, PlaylistRef, PlaylistSummary, PlaylistTrack};
