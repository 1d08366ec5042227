//! Daily Smash: refill a playlist with random tracks from the user's library.

use crate::context::FeatureContext;
use crate::error::{FeatureError, Result};
use crate::sampling::{sample_tracks, SamplingParams};
use muzee_core::{FeatureResult, StatKind};
use rand::Rng;
use serde_json::json;
use tracing::info;

/// Run Daily Smash for the context's user.
///
/// Sources are the user's own playlists except the destination. The
/// destination is cleared before the sample is written.
///
/// # Errors
///
/// - [`FeatureError::PreconditionFailed`] if no destination is configured and
///   `create` is not set
/// - Any Spotify or store error
pub async fn run_daily_smash<R>(
    ctx: &FeatureContext<'_>,
    create: bool,
    rng: &mut R,
) -> Result<FeatureResult>
where
    R: Rng + Send + ?Sized,
{
    let settings = &ctx.user.daily_smash;
    let configured = settings.playlist.as_deref();
    if configured.is_none() && !create {
        return Err(FeatureError::precondition("No playlist set for Daily Smash."));
    }

    let songs_count = match settings.songs_count {
        0 => ctx.settings.default_songs_count,
        n => n,
    };

    let playlist_id = match configured {
        Some(id) if !create => {
            if !ctx.accessor.playlist_exists(id).await? {
                info!("Daily Smash playlist {} is gone, skipping", id);
                return Ok(FeatureResult::skipped(Some(id.to_string())));
            }
            id.to_string()
        }
        _ => {
            ctx.accessor
                .create_playlist(&ctx.user.spotify_id, "Daily Smash", "🕺🕺🕺", false)
                .await?
                .id
        }
    };

    let sources: Vec<String> = ctx
        .accessor
        .user_playlists(&ctx.user.spotify_id)
        .await?
        .into_iter()
        .map(|playlist| playlist.id)
        .filter(|id| *id != playlist_id)
        .collect();

    if sources.is_empty() {
        info!("{} has no playlists to smash", ctx.user.username);
        return Ok(FeatureResult::skipped(Some(playlist_id)));
    }

    let params = SamplingParams {
        target: usize::try_from(songs_count).unwrap_or(usize::MAX),
        max_empty_draws: ctx.settings.max_empty_draws,
        deadline: ctx.settings.sampling_deadline(),
    };
    let songs = sample_tracks(&ctx.accessor, &sources, params, rng).await?;

    ctx.accessor.replace_tracks(&playlist_id, &[]).await?;
    ctx.accessor.add_tracks(&playlist_id, &songs).await?;
    ctx.accessor
        .edit_playlist(
            &playlist_id,
            &format!("🕺 Last updated by Muzee @ {}.", ctx.stamp()),
        )
        .await?;

    ctx.store
        .increment_stat(ctx.user.id, StatKind::DailySmashes, 1)
        .await?;

    info!(
        "Daily Smash for {}: {}/{} tracks from {} playlists",
        ctx.user.username,
        songs.len(),
        songs_count,
        sources.len()
    );

    let payload = json!({
        "playlist_id": playlist_id,
        "songs_count": songs_count,
        "added": songs.len(),
        "create": create,
    });
    Ok(FeatureResult::ok(playlist_id).with_payload(payload))
}
