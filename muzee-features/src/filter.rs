//! Language Filter: copy the tracks whose names use an allowed alphabet.

use crate::context::FeatureContext;
use crate::error::{FeatureError, Result};
use muzee_core::{FeatureResult, StatKind, TrackUri};
use muzee_spotify_api::PlaylistRef;
use serde_json::json;
use std::collections::HashSet;
use tracing::info;

const PLAYLIST_URL_PREFIX: &str = "https://open.spotify.com/playlist/";
const PLAYLIST_ID_LEN: usize = 22;

/// Longest accepted allow-list, in characters
pub const MAX_KEEP_CHARS: usize = 150;

const FILTER_FIELDS: &str = "items(is_local,track(type,is_local,uri,name))";

/// Accept a bare playlist id or an `open.spotify.com` playlist link.
#[must_use]
pub fn parse_playlist_id(input: &str) -> Option<String> {
    let input = input.trim();
    let id = input.strip_prefix(PLAYLIST_URL_PREFIX).unwrap_or(input);
    let id = id.split('?').next().unwrap_or_default();

    let valid = id.len() == PLAYLIST_ID_LEN && id.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then(|| id.to_string())
}

/// A track is kept if any character of its name is allowed.
#[must_use]
pub fn keep_track(name: &str, allowed: &str) -> bool {
    name.chars().any(|c| allowed.contains(c))
}

/// Run the filter over `source_playlist` for the context's user.
///
/// # Errors
///
/// - [`FeatureError::PreconditionFailed`] for an empty or oversized allow-list
/// - Any Spotify or store error
pub async fn run_language_filter(
    ctx: &FeatureContext<'_>,
    source_playlist: &str,
    keep_chars: &str,
) -> Result<FeatureResult> {
    let allowed_len = keep_chars.chars().count();
    if allowed_len == 0 || allowed_len > MAX_KEEP_CHARS {
        return Err(FeatureError::precondition(format!(
            "keep_chars must hold 1 to {MAX_KEEP_CHARS} characters"
        )));
    }

    let source_name = ctx.accessor.playlist_name(source_playlist).await?;
    let tracks = ctx
        .accessor
        .fetch_all_tracks(PlaylistRef::Playlist(source_playlist), Some(FILTER_FIELDS))
        .await?;

    let mut seen = HashSet::new();
    let kept: Vec<TrackUri> = tracks
        .into_iter()
        .filter(|track| {
            track
                .name
                .as_deref()
                .is_some_and(|name| keep_track(name, keep_chars))
        })
        .map(|track| track.uri)
        .filter(|uri| seen.insert(uri.clone()))
        .collect();

    let name = format!("Filtered {source_name}");
    let playlist = ctx
        .accessor
        .create_playlist(
            &ctx.user.spotify_id,
            &name,
            &format!("🪄 Filtered by Muzee @ {}.", ctx.stamp()),
            false,
        )
        .await?;
    ctx.accessor.add_tracks(&playlist.id, &kept).await?;

    ctx.store
        .increment_stat(ctx.user.id, StatKind::FilteredPlaylists, 1)
        .await?;
    info!(
        "Filtered {} into {} keeping {} tracks",
        source_playlist,
        playlist.id,
        kept.len()
    );

    let payload = json!({
        "id": playlist.id,
        "name": name,
        "source": source_playlist,
        "songs_count": kept.len(),
    });
    Ok(FeatureResult::ok(playlist.id).with_payload(payload))
}
