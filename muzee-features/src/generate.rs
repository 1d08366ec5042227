//! Generate Playlist: a new playlist sampled from search results for topics.

use crate::context::FeatureContext;
use crate::error::{FeatureError, Result};
use crate::sampling::{sample_tracks, SamplingParams};
use muzee_core::{FeatureResult, StatKind};
use rand::Rng;
use serde_json::json;
use std::ops::RangeInclusive;
use tracing::info;

/// Topics beyond this many are ignored
pub const MAX_TOPICS: usize = 5;

/// Search results used as sources per topic
pub const RESULTS_PER_TOPIC: usize = 5;

pub const SONGS_COUNT_RANGE: RangeInclusive<u32> = 5..=100;

/// Split a comma-separated topic list, dropping blanks and keeping the first
/// [`MAX_TOPICS`].
#[must_use]
pub fn parse_topics(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|topic| !topic.is_empty())
        .take(MAX_TOPICS)
        .map(ToString::to_string)
        .collect()
}

/// Run the generator for the context's user.
///
/// Finding no tracks at all is reported as a failed result and creates
/// nothing.
///
/// # Errors
///
/// - [`FeatureError::PreconditionFailed`] for an empty topic list or a
///   `songs_count` outside [`SONGS_COUNT_RANGE`]
/// - Any Spotify or store error
pub async fn run_generate_playlist<R>(
    ctx: &FeatureContext<'_>,
    topics: &[String],
    songs_count: u32,
    rng: &mut R,
) -> Result<FeatureResult>
where
    R: Rng + Send + ?Sized,
{
    let topics: Vec<&str> = topics
        .iter()
        .map(|topic| topic.trim())
        .filter(|topic| !topic.is_empty())
        .take(MAX_TOPICS)
        .collect();
    if topics.is_empty() {
        return Err(FeatureError::precondition("At least one topic is required."));
    }
    if !SONGS_COUNT_RANGE.contains(&songs_count) {
        return Err(FeatureError::precondition(format!(
            "songs_count must be between {} and {}, got {songs_count}",
            SONGS_COUNT_RANGE.start(),
            SONGS_COUNT_RANGE.end()
        )));
    }

    let mut sources = Vec::new();
    for topic in &topics {
        let found = ctx
            .accessor
            .search_playlists(topic, RESULTS_PER_TOPIC)
            .await?;
        sources.extend(found.into_iter().map(|playlist| playlist.id));
    }

    let params = SamplingParams {
        target: usize::try_from(songs_count).unwrap_or(usize::MAX),
        max_empty_draws: ctx.settings.max_empty_draws,
        deadline: ctx.settings.sampling_deadline(),
    };
    let songs = sample_tracks(&ctx.accessor, &sources, params, rng).await?;
    if songs.is_empty() {
        info!("No songs found for topics {:?}", topics);
        return Ok(FeatureResult::failed("No songs found"));
    }

    let generation = ctx
        .store
        .increment_stat(ctx.user.id, StatKind::GeneratedPlaylists, 1)
        .await?;
    let name = format!("Generated #{generation} - {}", topics.join(", "));
    let playlist = ctx
        .accessor
        .create_playlist(
            &ctx.user.spotify_id,
            &name,
            &format!("🪄 Generated by Muzee @ {}.", ctx.stamp()),
            false,
        )
        .await?;

    ctx.accessor.add_tracks(&playlist.id, &songs).await?;
    let image = ctx.accessor.fetch_cover_image(&playlist.id).await?;

    info!(
        "Generated {} with {} tracks for {}",
        playlist.name,
        songs.len(),
        ctx.user.username
    );

    let payload = json!({
        "id": playlist.id,
        "name": playlist.name,
        "image": image,
        "songs_count": songs.len(),
        "topics": topics,
    });
    Ok(FeatureResult::ok(playlist.id).with_payload(payload))
}
