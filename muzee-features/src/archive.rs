//! Liked Archive: collect tracks the user has un-liked since the last run.

use crate::context::FeatureContext;
use crate::error::{FeatureError, Result};
use muzee_core::{FeatureResult, StatKind, TrackUri};
use muzee_spotify_api::PlaylistRef;
use serde_json::json;
use std::collections::HashSet;
use tracing::{debug, info};

/// Cache key of the Liked Songs baseline
pub const LIKED_SONGS_CACHE_KEY: &str = "liked_songs";

/// Tracks in `previous` that are no longer in `current`, in `previous` order.
#[must_use]
pub fn unliked(previous: &[TrackUri], current: &[TrackUri]) -> Vec<TrackUri> {
    let current: HashSet<&TrackUri> = current.iter().collect();
    let mut seen = HashSet::new();
    previous
        .iter()
        .filter(|uri| !current.contains(uri) && seen.insert(*uri))
        .cloned()
        .collect()
}

async fn liked_now(ctx: &FeatureContext<'_>) -> Result<Vec<TrackUri>> {
    Ok(ctx
        .accessor
        .fetch_all_tracks(PlaylistRef::Liked, None)
        .await?
        .into_iter()
        .map(|track| track.uri)
        .collect())
}

async fn save_baseline(ctx: &FeatureContext<'_>, liked: &[TrackUri]) -> Result<()> {
    ctx.store
        .save_cache(ctx.user.id, LIKED_SONGS_CACHE_KEY, &serde_json::to_value(liked)?)
        .await?;
    Ok(())
}

/// Run Liked Archive for the context's user.
///
/// A `create` run makes the archive playlist and records the baseline
/// without archiving anything. Later runs replace the baseline before
/// appending the un-liked tracks.
///
/// # Errors
///
/// - [`FeatureError::PreconditionFailed`] if no archive playlist is
///   configured and `create` is not set
/// - Any Spotify or store error
pub async fn run_liked_archive(ctx: &FeatureContext<'_>, create: bool) -> Result<FeatureResult> {
    let configured = ctx.user.liked_archive_playlist.as_deref();
    let playlist_id = match configured {
        Some(id) if !create => id.to_string(),
        _ if create => {
            let playlist = ctx
                .accessor
                .create_playlist(
                    &ctx.user.spotify_id,
                    &format!("Liked Archive - {}", ctx.user.username),
                    "💥 songs i used to like",
                    false,
                )
                .await?;

            let liked = liked_now(ctx).await?;
            save_baseline(ctx, &liked).await?;
            info!(
                "Created Liked Archive for {} with a baseline of {} tracks",
                ctx.user.username,
                liked.len()
            );

            let payload = json!({ "playlist_id": playlist.id, "create": true, "archived": 0 });
            return Ok(FeatureResult::ok(playlist.id).with_payload(payload));
        }
        _ => return Err(FeatureError::precondition("No playlist set for Liked Archive.")),
    };

    let previous: Vec<TrackUri> = match ctx
        .store
        .load_cache(ctx.user.id, LIKED_SONGS_CACHE_KEY)
        .await?
    {
        Some(value) => serde_json::from_value(value)?,
        None => Vec::new(),
    };
    let current = liked_now(ctx).await?;
    let gone = unliked(&previous, &current);

    debug!(
        "Old liked: {} | Now liked: {} | Unliked: {}",
        previous.len(),
        current.len(),
        gone.len()
    );
    save_baseline(ctx, &current).await?;

    if !gone.is_empty() {
        ctx.accessor.add_tracks(&playlist_id, &gone).await?;
        let archived = i64::try_from(gone.len()).unwrap_or(i64::MAX);
        ctx.store
            .increment_stat(ctx.user.id, StatKind::ArchivedSongs, archived)
            .await?;
        info!(
            "Updated Liked Archive for {} +{} unliked",
            ctx.user.username,
            gone.len()
        );
    }

    let payload = json!({
        "playlist_id": playlist_id,
        "create": false,
        "archived": gone.len(),
        "added": gone,
    });
    Ok(FeatureResult::ok(playlist_id).with_payload(payload))
}
