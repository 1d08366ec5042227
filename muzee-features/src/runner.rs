//! Runs one feature for one user and records the outcome.

use crate::archive::run_liked_archive;
use crate::context::FeatureContext;
use crate::daily_smash::run_daily_smash;
use crate::error::{FeatureError, Result};
use crate::filter::{parse_playlist_id, run_language_filter};
use crate::generate::run_generate_playlist;
use crate::mirror::run_public_liked;
use crate::weather::{run_live_weather, WeatherClient};
use chrono::Utc;
use muzee_core::{
    ClientCredentials, CoreError, FeatureKind, FeatureResult, FeaturesConfig, HttpConfig,
    MuzeeConfig, Store, UserId,
};
use muzee_spotify_api::{PlaylistAccessor, SpotifyClient};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

/// A single feature invocation with its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "feature", rename_all = "kebab-case")]
pub enum FeatureRequest {
    DailySmash { create: bool },
    PublicLiked { create: bool },
    LikedArchive { create: bool },
    LiveWeather,
    GeneratePlaylist { topics: Vec<String>, songs_count: u32 },
    LanguageFilter { playlist: String, keep_chars: String },
}

impl FeatureRequest {
    #[must_use]
    pub const fn kind(&self) -> FeatureKind {
        match self {
            Self::DailySmash { .. } => FeatureKind::DailySmash,
            Self::PublicLiked { .. } => FeatureKind::PublicLiked,
            Self::LikedArchive { .. } => FeatureKind::LikedArchive,
            Self::LiveWeather => FeatureKind::LiveWeather,
            Self::GeneratePlaylist { .. } => FeatureKind::GeneratePlaylist,
            Self::LanguageFilter { .. } => FeatureKind::LanguageFilter,
        }
    }

    /// Whether the run creates the feature's persistent playlist
    #[must_use]
    pub const fn creates(&self) -> bool {
        matches!(
            self,
            Self::DailySmash { create: true }
                | Self::PublicLiked { create: true }
                | Self::LikedArchive { create: true }
        )
    }
}

/// Builds a client per invocation and dispatches to the feature algorithms.
pub struct FeatureRunner {
    store: Arc<dyn Store>,
    credentials: ClientCredentials,
    http: HttpConfig,
    features: FeaturesConfig,
    weather: Option<WeatherClient>,
}

impl FeatureRunner {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        credentials: ClientCredentials,
        http: HttpConfig,
        features: FeaturesConfig,
        weather: Option<WeatherClient>,
    ) -> Self {
        Self {
            store,
            credentials,
            http,
            features,
            weather,
        }
    }

    /// # Errors
    ///
    /// Returns an error if the weather HTTP client cannot be created.
    pub fn from_config(config: &MuzeeConfig, store: Arc<dyn Store>) -> Result<Self> {
        let weather = config
            .weather
            .as_ref()
            .map(|weather| WeatherClient::new(weather, &config.http))
            .transpose()?;

        Ok(Self::new(
            store,
            config.spotify.credentials(),
            config.http.clone(),
            config.features.clone(),
            weather,
        ))
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Run a feature and append its outcome to the user's event log.
    ///
    /// After a successful `create` run the new playlist is stored as the
    /// feature's playlist and the feature is enabled.
    ///
    /// # Errors
    ///
    /// Returns the feature's error after logging it as a failed event, or a
    /// store error if a created playlist cannot be saved.
    pub async fn run(&self, user: UserId, request: &FeatureRequest) -> Result<FeatureResult> {
        let feature = request.kind();
        info!("Running {} for user {}", feature, user);

        match self.dispatch(user, request).await {
            Ok(result) => {
                if request.creates() {
                    if let Some(playlist) = result.target.as_deref() {
                        self.store.set_feature_playlist(user, feature, playlist).await?;
                        self.store.set_feature_enabled(user, feature, true).await?;
                    }
                }

                let data = json!({
                    "request": serde_json::to_value(request).unwrap_or(Value::Null),
                    "result": serde_json::to_value(&result).unwrap_or(Value::Null),
                });
                self.record(user, feature, result.is_success(), &data).await;
                Ok(result)
            }
            Err(e) => {
                error!("{} failed for user {}: {}", feature, user, e);
                let data = json!({
                    "request": serde_json::to_value(request).unwrap_or(Value::Null),
                    "error": e.to_string(),
                });
                self.record(user, feature, false, &data).await;
                Err(e)
            }
        }
    }

    /// Append to the event log. The run's outcome stands even if this fails.
    async fn record(&self, user: UserId, feature: FeatureKind, success: bool, data: &Value) {
        if let Err(e) = self
            .store
            .log_event(user, feature.as_str(), success, data)
            .await
        {
            warn!("Could not record {} run for user {}: {}", feature, user, e);
        }
    }

    async fn dispatch(&self, user: UserId, request: &FeatureRequest) -> Result<FeatureResult> {
        let profile = self
            .store
            .user(user)
            .await?
            .ok_or(CoreError::UnknownUser { user_id: user })?;

        // Checked here so an unconfigured feature never builds a client
        let weather = match request {
            FeatureRequest::LiveWeather => Some(self.weather.as_ref().ok_or_else(|| {
                FeatureError::precondition("Weather API key is not configured.")
            })?),
            _ => None,
        };

        let client =
            SpotifyClient::for_user(self.store.clone(), user, &self.credentials, &self.http)
                .await?;
        let ctx = FeatureContext {
            accessor: PlaylistAccessor::new(&client),
            store: self.store.as_ref(),
            user: &profile,
            settings: &self.features,
            now: Utc::now(),
        };
        let mut rng = StdRng::from_os_rng();

        match request {
            FeatureRequest::DailySmash { create } => {
                run_daily_smash(&ctx, *create, &mut rng).await
            }
            FeatureRequest::PublicLiked { create } => run_public_liked(&ctx, *create).await,
            FeatureRequest::LikedArchive { create } => run_liked_archive(&ctx, *create).await,
            FeatureRequest::LiveWeather => match weather {
                Some(weather) => run_live_weather(&ctx, weather).await,
                None => Err(FeatureError::precondition("Weather API key is not configured.")),
            },
            FeatureRequest::GeneratePlaylist {
                topics,
                songs_count,
            } => run_generate_playlist(&ctx, topics, *songs_count, &mut rng).await,
            FeatureRequest::LanguageFilter {
                playlist,
                keep_chars,
            } => {
                let playlist_id = parse_playlist_id(playlist).ok_or_else(|| {
                    FeatureError::precondition(format!("Not a Spotify playlist: {playlist}"))
                })?;
                run_language_filter(&ctx, &playlist_id, keep_chars).await
            }
        }
    }
}
