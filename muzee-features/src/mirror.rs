//! Public Liked: keep a public playlist set-equal to the user's Liked Songs.

use crate::context::FeatureContext;
use crate::error::{FeatureError, Result};
use muzee_core::{FeatureResult, TrackUri};
use muzee_spotify_api::{PlaylistRef, PlaylistTrack};
use serde_json::json;
use std::collections::HashSet;
use tracing::info;

/// Projection used when reading the mirror; names are not needed
const MIRROR_FIELDS: &str = "items(is_local,track(type,uri,is_local))";

/// Reconciliation steps that turn the mirror into a copy of the source.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MirrorPlan {
    /// In mirror order, without duplicates
    pub to_remove: Vec<TrackUri>,
    /// In source order, without duplicates
    pub to_add: Vec<TrackUri>,
}

impl MirrorPlan {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.to_remove.is_empty() && self.to_add.is_empty()
    }
}

fn missing_from(left: &[TrackUri], right: &HashSet<&TrackUri>) -> Vec<TrackUri> {
    let mut seen = HashSet::new();
    left.iter()
        .filter(|uri| !right.contains(uri) && seen.insert(*uri))
        .cloned()
        .collect()
}

/// Diff a source collection against its mirror.
#[must_use]
pub fn plan_mirror(source: &[TrackUri], mirror: &[TrackUri]) -> MirrorPlan {
    let source_set: HashSet<&TrackUri> = source.iter().collect();
    let mirror_set: HashSet<&TrackUri> = mirror.iter().collect();

    MirrorPlan {
        to_remove: missing_from(mirror, &source_set),
        to_add: missing_from(source, &mirror_set),
    }
}

fn uris(tracks: Vec<PlaylistTrack>) -> Vec<TrackUri> {
    tracks.into_iter().map(|track| track.uri).collect()
}

/// Run Public Liked for the context's user.
///
/// With `create`, a new public playlist is made and becomes the mirror.
/// Otherwise the configured mirror must still exist, or the run is skipped.
///
/// # Errors
///
/// - [`FeatureError::PreconditionFailed`] if no mirror is configured and
///   `create` is not set
/// - Any Spotify error raised while reading or writing
pub async fn run_public_liked(ctx: &FeatureContext<'_>, create: bool) -> Result<FeatureResult> {
    let configured = ctx.user.public_liked_playlist.as_deref();
    if configured.is_none() && !create {
        return Err(FeatureError::precondition("No playlist set for Public Liked."));
    }

    let playlist_id = match configured {
        Some(id) if !create => {
            if !ctx.accessor.playlist_exists(id).await? {
                info!("Public Liked playlist {} is gone, skipping", id);
                return Ok(FeatureResult::skipped(Some(id.to_string())));
            }
            id.to_string()
        }
        _ => {
            ctx.accessor
                .create_playlist(
                    &ctx.user.spotify_id,
                    &format!("Public Liked - {}", ctx.user.username),
                    "🎸 Here is what I listen to...",
                    true,
                )
                .await?
                .id
        }
    };

    let liked = uris(ctx.accessor.fetch_all_tracks(PlaylistRef::Liked, None).await?);
    let mirror = uris(
        ctx.accessor
            .fetch_all_tracks(PlaylistRef::Playlist(&playlist_id), Some(MIRROR_FIELDS))
            .await?,
    );

    let plan = plan_mirror(&liked, &mirror);
    if !plan.to_remove.is_empty() {
        ctx.accessor.remove_tracks(&playlist_id, &plan.to_remove).await?;
    }
    if !plan.to_add.is_empty() {
        ctx.accessor.add_tracks(&playlist_id, &plan.to_add).await?;
    }

    ctx.accessor
        .edit_playlist(
            &playlist_id,
            &format!("🩷 Last updated by Muzee @ {}.", ctx.stamp()),
        )
        .await?;

    info!(
        "Public Liked for {}: -{} +{}",
        ctx.user.username,
        plan.to_remove.len(),
        plan.to_add.len()
    );

    let payload = json!({
        "playlist_id": playlist_id,
        "create": create,
        "removed": plan.to_remove.len(),
        "added": plan.to_add.len(),
    });
    Ok(FeatureResult::ok(playlist_id).with_payload(payload))
}
