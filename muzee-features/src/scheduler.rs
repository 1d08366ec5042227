//! Minute-tick scheduler for the recurring features.

use crate::error::Result;
use crate::runner::{FeatureRequest, FeatureRunner};
use chrono::{DateTime, Timelike, Utc};
use muzee_core::{FeatureKind, Store, UserId, UserProfile};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const TICK: Duration = Duration::from_secs(60);

/// Daily Smash is checked on minutes divisible by this
pub const DAILY_SMASH_STEP: u32 = 5;

/// Mirror, archive and weather run on minutes divisible by this
pub const HALF_HOURLY_STEP: u32 = 30;

/// One scheduled feature run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueJob {
    pub user: UserId,
    pub request: FeatureRequest,
}

/// Round a minute of the day down to the Daily Smash grid.
#[must_use]
pub const fn daily_smash_slot(minute_of_day: u32) -> u32 {
    minute_of_day - minute_of_day % DAILY_SMASH_STEP
}

fn smash_due(user: &UserProfile, slot: u32) -> bool {
    let settings = &user.daily_smash;
    settings.playlist.is_some()
        && settings.songs_count > 0
        && settings.update_at.map(daily_smash_slot) == Some(slot)
}

/// Runs whose time has come at `now`.
///
/// # Errors
///
/// Returns an error if the store cannot list users.
pub async fn due_jobs(store: &dyn Store, now: DateTime<Utc>) -> Result<Vec<DueJob>> {
    let minute = now.minute();
    let mut jobs = Vec::new();

    if minute % DAILY_SMASH_STEP == 0 {
        let slot = daily_smash_slot(now.hour() * 60 + minute);
        for user in store.users_with_feature(FeatureKind::DailySmash).await? {
            if smash_due(&user, slot) {
                jobs.push(DueJob {
                    user: user.id,
                    request: FeatureRequest::DailySmash { create: false },
                });
            }
        }
    }

    if minute % HALF_HOURLY_STEP == 0 {
        for user in store.users_with_feature(FeatureKind::PublicLiked).await? {
            if user.public_liked_playlist.is_some() {
                jobs.push(DueJob {
                    user: user.id,
                    request: FeatureRequest::PublicLiked { create: false },
                });
            }
        }
        for user in store.users_with_feature(FeatureKind::LikedArchive).await? {
            if user.liked_archive_playlist.is_some() {
                jobs.push(DueJob {
                    user: user.id,
                    request: FeatureRequest::LikedArchive { create: false },
                });
            }
        }
        for user in store.users_with_feature(FeatureKind::LiveWeather).await? {
            if user.live_weather.is_configured() {
                jobs.push(DueJob {
                    user: user.id,
                    request: FeatureRequest::LiveWeather,
                });
            }
        }
    }

    Ok(jobs)
}

/// Background loop that starts due runs once a minute until cancelled.
pub struct Scheduler {
    runner: Arc<FeatureRunner>,
    cancel_token: CancellationToken,
}

impl Scheduler {
    #[must_use]
    pub const fn new(runner: Arc<FeatureRunner>, cancel_token: CancellationToken) -> Self {
        Self {
            runner,
            cancel_token,
        }
    }

    /// Tick on minute boundaries, spawning each due run as its own task.
    /// Returns after cancellation once in-flight runs have finished.
    pub async fn run(self) {
        info!("Scheduler started");

        let into_minute = u64::from(Utc::now().second());
        let first_tick = Instant::now() + Duration::from_secs(60 - into_minute.min(59));
        let mut interval = tokio::time::interval_at(first_tick, TICK);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!("Scheduler shutting down, waiting for {} runs", tasks.len());
                    break;
                }
                _ = interval.tick() => {
                    self.spawn_due(Utc::now(), &mut tasks).await;
                }
                Some(joined) = tasks.join_next() => {
                    if let Err(e) = joined {
                        error!("Scheduled run panicked: {}", e);
                    }
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("Scheduled run panicked: {}", e);
            }
        }
        info!("Scheduler stopped");
    }

    async fn spawn_due(&self, now: DateTime<Utc>, tasks: &mut JoinSet<()>) {
        let jobs = match due_jobs(self.runner.store().as_ref(), now).await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!("Could not list due runs: {}", e);
                return;
            }
        };
        debug!("{} runs due at {}", jobs.len(), now.format("%H:%M"));

        for job in jobs {
            let runner = self.runner.clone();
            tasks.spawn(async move {
                match runner.run(job.user, &job.request).await {
                    Ok(result) => {
                        debug!("{} for user {}: {:?}", job.request.kind(), job.user, result.status);
                    }
                    Err(e) => {
                        warn!("Scheduled {} for user {} failed: {}", job.request.kind(), job.user, e);
                    }
                }
            });
        }
    }
}
