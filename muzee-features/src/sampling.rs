//! Random sampling of tracks across several source playlists.
//!
//! Sources are shuffled once and then drawn cyclically. Each draw reads a
//! random window of one source and adds the tracks not seen yet. Sampling
//! stops when enough tracks are collected, after too many consecutive draws
//! that added nothing, or when the deadline passes. Running out of tracks is
//! not an error: the caller gets whatever was collected.

use crate::error::Result;
use async_trait::async_trait;
use muzee_core::TrackUri;
use muzee_spotify_api::PlaylistAccessor;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Smallest and largest window read per draw
const MIN_TAKE: i64 = 2;
const MAX_TAKE: i64 = 10;

/// Random jitter added to the per-source share of the target
const TAKE_JITTER: i64 = 10;

/// Where sampled tracks come from.
#[async_trait]
pub trait SampleSource: Send + Sync {
    /// Number of items in a source.
    async fn track_count(&self, source_id: &str) -> Result<u64>;

    /// Playable tracks in the window `[offset, offset + limit)`.
    async fn fetch_window(&self, source_id: &str, offset: u64, limit: usize)
        -> Result<Vec<TrackUri>>;
}

#[async_trait]
impl SampleSource for PlaylistAccessor<'_> {
    async fn track_count(&self, source_id: &str) -> Result<u64> {
        Ok(PlaylistAccessor::track_count(self, source_id).await?)
    }

    async fn fetch_window(
        &self,
        source_id: &str,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<TrackUri>> {
        Ok(self
            .fetch_track_page(source_id, offset, limit)
            .await?
            .into_iter()
            .map(|track| track.uri)
            .collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingParams {
    /// Number of unique tracks wanted
    pub target: usize,
    /// Consecutive draws without a new track tolerated before giving up
    pub max_empty_draws: u32,
    pub deadline: Duration,
}

/// Size of the window read in one draw: the per-source share of the target
/// plus jitter, clamped to `[2, 10]`.
fn take_size<R: Rng + ?Sized>(rng: &mut R, target: usize, sources: usize) -> usize {
    let share = i64::try_from(target / sources.max(1)).unwrap_or(MAX_TAKE);
    let take = (rng.random_range(-TAKE_JITTER..=TAKE_JITTER) + share).clamp(MIN_TAKE, MAX_TAKE);
    usize::try_from(take).unwrap_or(2)
}

/// Collect up to `params.target` unique tracks from `sources`.
///
/// # Errors
///
/// Returns the first error raised by the source.
pub async fn sample_tracks<S, R>(
    source: &S,
    sources: &[String],
    params: SamplingParams,
    rng: &mut R,
) -> Result<Vec<TrackUri>>
where
    S: SampleSource + ?Sized,
    R: Rng + Send + ?Sized,
{
    if sources.is_empty() || params.target == 0 {
        return Ok(Vec::new());
    }

    let mut order = sources.to_vec();
    order.shuffle(rng);

    let started = Instant::now();
    let mut picked: Vec<TrackUri> = Vec::with_capacity(params.target);
    let mut seen: HashSet<TrackUri> = HashSet::new();
    let mut empty_draws = 0;

    for source_id in order.iter().cycle() {
        if picked.len() >= params.target {
            break;
        }
        if empty_draws > params.max_empty_draws {
            info!(
                "Sampling gave up after {} empty draws with {}/{} tracks",
                empty_draws,
                picked.len(),
                params.target
            );
            break;
        }
        if started.elapsed() >= params.deadline {
            warn!(
                "Sampling deadline of {:?} reached with {}/{} tracks",
                params.deadline,
                picked.len(),
                params.target
            );
            break;
        }

        let take = take_size(rng, params.target, order.len());
        let total = source.track_count(source_id).await?;
        if total == 0 {
            empty_draws += 1;
            continue;
        }

        let max_offset = total.saturating_sub(take as u64);
        let offset = rng.random_range(0..=max_offset);
        let window = source.fetch_window(source_id, offset, take).await?;

        let before = picked.len();
        for uri in window {
            if seen.insert(uri.clone()) {
                picked.push(uri);
            }
        }

        let added = picked.len() - before;
        debug!("+ {} new tracks from {} (offset {}, take {})", added, source_id, offset, take);
        if added == 0 {
            empty_draws += 1;
        } else {
            empty_draws = 0;
        }
    }

    picked.truncate(params.target);
    Ok(picked)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory sources: id -> ordered track uris.
    pub(crate) struct FakeSources {
        pub playlists: HashMap<String, Vec<TrackUri>>,
        pub count_calls: AtomicUsize,
        pub delay: Option<Duration>,
    }

    impl FakeSources {
        pub(crate) fn new(playlists: &[(&str, usize)]) -> Self {
            let playlists = playlists
                .iter()
                .map(|(id, len)| {
                    let tracks = (0..*len)
                        .map(|n| TrackUri::new(format!("spotify:track:{id}-{n}")))
                        .collect();
                    ((*id).to_string(), tracks)
                })
                .collect();
            Self {
                playlists,
                count_calls: AtomicUsize::new(0),
                delay: None,
            }
        }
    }

    #[async_trait]
    impl SampleSource for FakeSources {
        async fn track_count(&self, source_id: &str) -> Result<u64> {
            self.count_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.playlists.get(source_id).map_or(0, |t| t.len() as u64))
        }

        async fn fetch_window(
            &self,
            source_id: &str,
            offset: u64,
            limit: usize,
        ) -> Result<Vec<TrackUri>> {
            let tracks = self.playlists.get(source_id).cloned().unwrap_or_default();
            let start = usize::try_from(offset).unwrap().min(tracks.len());
            let end = (start + limit).min(tracks.len());
            Ok(tracks[start..end].to_vec())
        }
    }

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    fn params(target: usize) -> SamplingParams {
        SamplingParams {
            target,
            max_empty_draws: 3,
            deadline: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_take_size_is_clamped() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..500 {
            let small = take_size(&mut rng, 1, 50);
            assert!((2..=10).contains(&small));
            let large = take_size(&mut rng, 1000, 1);
            assert_eq!(large, 10);
        }
    }

    #[tokio::test]
    async fn test_collects_exactly_target_unique_tracks() {
        let sources = FakeSources::new(&[("a", 20), ("b", 5)]);
        let mut rng = StdRng::seed_from_u64(7);

        let picked = sample_tracks(&sources, &ids(&["a", "b"]), params(10), &mut rng)
            .await
            .unwrap();

        assert_eq!(picked.len(), 10);
        let unique: HashSet<_> = picked.iter().collect();
        assert_eq!(unique.len(), 10);
        assert!(picked.iter().all(|uri| {
            sources
                .playlists
                .values()
                .any(|tracks| tracks.contains(uri))
        }));
    }

    #[tokio::test]
    async fn test_exhausted_sources_return_what_exists() {
        let sources = FakeSources::new(&[("tiny", 3)]);
        let mut rng = StdRng::seed_from_u64(3);

        let picked = sample_tracks(&sources, &ids(&["tiny"]), params(10), &mut rng)
            .await
            .unwrap();

        let unique: HashSet<_> = picked.iter().collect();
        assert_eq!(picked.len(), 3);
        assert_eq!(unique.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_sources_stop_after_max_empty_draws() {
        let sources = FakeSources::new(&[("e1", 0), ("e2", 0)]);
        let mut rng = StdRng::seed_from_u64(11);

        let picked = sample_tracks(&sources, &ids(&["e1", "e2"]), params(10), &mut rng)
            .await
            .unwrap();

        assert!(picked.is_empty());
        // draws 1..=4 are empty; the fifth check sees 4 > 3 and stops
        assert_eq!(sources.count_calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_bounds_sampling() {
        let mut sources = FakeSources::new(&[("e1", 0)]);
        sources.delay = Some(Duration::from_secs(10));
        let mut rng = StdRng::seed_from_u64(5);

        let picked = sample_tracks(
            &sources,
            &ids(&["e1"]),
            SamplingParams {
                target: 10,
                max_empty_draws: 1000,
                deadline: Duration::from_secs(25),
            },
            &mut rng,
        )
        .await
        .unwrap();

        assert!(picked.is_empty());
        assert_eq!(sources.count_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_no_sources_or_zero_target_is_empty() {
        let sources = FakeSources::new(&[("a", 20)]);
        let mut rng = StdRng::seed_from_u64(1);

        assert!(sample_tracks(&sources, &[], params(10), &mut rng)
            .await
            .unwrap()
            .is_empty());
        assert!(sample_tracks(&sources, &ids(&["a"]), params(0), &mut rng)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(sources.count_calls.load(Ordering::SeqCst), 0);
    }
}
