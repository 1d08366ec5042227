//! Wire constants for the Spotify Web API.

use const_format::concatcp;

/// Items per page for every paginated read
pub const PAGE_SIZE: usize = 50;

/// Most track uris accepted by one add/remove/replace call
pub const WRITE_CHUNK_SIZE: usize = 50;

/// Refreshes allowed per logical request before giving up
pub const MAX_REFRESHES: u32 = 2;

/// Field projection used when only track identity matters
pub const TRACK_FIELDS: &str = "items(is_local,track(uri,name,type,is_local))";

/// User agent sent with every API and token request
pub const USER_AGENT: &str = concatcp!("muzee/", env!("CARGO_PKG_VERSION"));

/// Logging target for the HTTP layer
pub const LOG_TARGET: &str = "muzee::spotify";
