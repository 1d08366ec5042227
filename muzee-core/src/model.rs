//! Domain types shared by the API client, the feature engine and the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Identifier of a Muzee user in the store.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Spotify application credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl ClientCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Access/refresh token pair as persisted for a user.
#[derive(Clone, PartialEq, Eq)]
pub struct StoredTokens {
    pub access_token: String,
    pub refresh_token: String,
}

impl fmt::Debug for StoredTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredTokens")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Everything an authenticated client needs to call the API and mint new
/// access tokens.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub client_id: String,
    pub client_secret: String,
}

impl TokenPair {
    #[must_use]
    pub fn new(tokens: StoredTokens, credentials: &ClientCredentials) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            client_id: credentials.client_id.clone(),
            client_secret: credentials.client_secret.clone(),
        }
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// A playable track reference, e.g. `spotify:track:4iV5W9uYEdYUVa79Axb7Rh`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackUri(String);

impl TrackUri {
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackUri {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// The automations a user can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeatureKind {
    DailySmash,
    PublicLiked,
    LikedArchive,
    LiveWeather,
    GeneratePlaylist,
    LanguageFilter,
}

impl FeatureKind {
    pub const ALL: [Self; 6] = [
        Self::DailySmash,
        Self::PublicLiked,
        Self::LikedArchive,
        Self::LiveWeather,
        Self::GeneratePlaylist,
        Self::LanguageFilter,
    ];

    /// Stable identifier used in the store and in event logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DailySmash => "daily-smash",
            Self::PublicLiked => "public-liked",
            Self::LikedArchive => "liked-archive",
            Self::LiveWeather => "live-weather",
            Self::GeneratePlaylist => "generate-playlist",
            Self::LanguageFilter => "language-filter",
        }
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown feature: {s}"))
    }
}

/// Per-user counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatKind {
    GeneratedPlaylists,
    DailySmashes,
    FilteredPlaylists,
    ArchivedSongs,
    WeatherChanges,
}

impl StatKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::GeneratedPlaylists => "generated_playlists",
            Self::DailySmashes => "daily_smashes",
            Self::FilteredPlaylists => "filtered_playlists",
            Self::ArchivedSongs => "archived_songs",
            Self::WeatherChanges => "weather_changes",
        }
    }
}

/// Outcome of one feature invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureStatus {
    Ok,
    /// Nothing to do, e.g. the destination playlist is gone.
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureResult {
    pub status: FeatureStatus,
    /// Id of the playlist the feature acted on, if any.
    pub target: Option<String>,
    pub payload: Option<serde_json::Value>,
}

impl FeatureResult {
    pub fn ok(target: impl Into<String>) -> Self {
        Self {
            status: FeatureStatus::Ok,
            target: Some(target.into()),
            payload: None,
        }
    }

    #[must_use]
    pub fn skipped(target: Option<String>) -> Self {
        Self {
            status: FeatureStatus::Skipped,
            target,
            payload: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: FeatureStatus::Failed,
            target: None,
            payload: Some(serde_json::json!({ "error": reason.into() })),
        }
    }

    #[must_use]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        !matches!(self.status, FeatureStatus::Failed)
    }
}

/// Temperature unit used by the live weather description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureScale {
    #[default]
    #[serde(alias = "celcius")]
    Celsius,
    Fahrenheit,
    Kelvin,
}

impl TemperatureScale {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Celsius => "celsius",
            Self::Fahrenheit => "fahrenheit",
            Self::Kelvin => "kelvin",
        }
    }

    #[must_use]
    pub const fn symbol(&self) -> char {
        match self {
            Self::Celsius => 'C',
            Self::Fahrenheit => 'F',
            Self::Kelvin => 'K',
        }
    }

    /// Convert a Celsius reading into this scale.
    #[must_use]
    pub fn convert_celsius(&self, celsius: f64) -> f64 {
        match self {
            Self::Celsius => celsius,
            Self::Fahrenheit => celsius.mul_add(1.8, 32.0),
            Self::Kelvin => celsius + 273.15,
        }
    }
}

impl FromStr for TemperatureScale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "celsius" | "celcius" => Ok(Self::Celsius),
            "fahrenheit" => Ok(Self::Fahrenheit),
            "kelvin" => Ok(Self::Kelvin),
            other => Err(format!("unknown temperature scale: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DailySmashSettings {
    pub playlist: Option<String>,
    pub songs_count: u32,
    /// Minute of the day (UTC) at which the playlist is regenerated.
    pub update_at: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LiveWeatherSettings {
    pub playlist: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub scale: TemperatureScale,
}

impl LiveWeatherSettings {
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.playlist.is_some() && self.lat.is_some() && self.lon.is_some()
    }
}

/// A user's Spotify identity and feature settings.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UserProfile {
    pub id: UserId,
    pub spotify_id: String,
    pub username: String,
    pub enabled_features: BTreeSet<String>,
    pub daily_smash: DailySmashSettings,
    pub public_liked_playlist: Option<String>,
    pub liked_archive_playlist: Option<String>,
    pub live_weather: LiveWeatherSettings,
}

impl UserProfile {
    #[must_use]
    pub fn is_enabled(&self, feature: FeatureKind) -> bool {
        self.enabled_features.contains(feature.as_str())
    }

    /// The playlist a feature writes to, if it has a persistent one.
    #[must_use]
    pub fn feature_playlist(&self, feature: FeatureKind) -> Option<&str> {
        match feature {
            FeatureKind::DailySmash => self.daily_smash.playlist.as_deref(),
            FeatureKind::PublicLiked => self.public_liked_playlist.as_deref(),
            FeatureKind::LikedArchive => self.liked_archive_playlist.as_deref(),
            FeatureKind::LiveWeather => self.live_weather.playlist.as_deref(),
            FeatureKind::GeneratePlaylist | FeatureKind::LanguageFilter => None,
        }
    }
}

/// One row of the event log.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub name: String,
    pub success: bool,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_kind_round_trips_through_name() {
        for kind in FeatureKind::ALL {
            assert_eq!(kind.as_str().parse::<FeatureKind>(), Ok(kind));
        }
        assert!("weekly-smash".parse::<FeatureKind>().is_err());
    }

    #[test]
    fn test_token_pair_debug_hides_secrets() {
        let pair = TokenPair::new(
            StoredTokens {
                access_token: "access-123".into(),
                refresh_token: "refresh-456".into(),
            },
            &ClientCredentials::new("client", "secret-789"),
        );

        let debug = format!("{pair:?}");
        assert!(!debug.contains("access-123"));
        assert!(!debug.contains("refresh-456"));
        assert!(!debug.contains("secret-789"));
        assert!(debug.contains("client"));
    }

    #[test]
    fn test_temperature_conversion() {
        assert!((TemperatureScale::Celsius.convert_celsius(21.5) - 21.5).abs() < f64::EPSILON);
        assert!((TemperatureScale::Fahrenheit.convert_celsius(100.0) - 212.0).abs() < 1e-9);
        assert!((TemperatureScale::Kelvin.convert_celsius(0.0) - 273.15).abs() < 1e-9);
    }

    #[test]
    fn test_temperature_scale_accepts_legacy_spelling() {
        assert_eq!("celcius".parse(), Ok(TemperatureScale::Celsius));
        let parsed: TemperatureScale = serde_json::from_str("\"celcius\"").unwrap();
        assert_eq!(parsed, TemperatureScale::Celsius);
    }

    #[test]
    fn test_feature_result_failed_carries_reason() {
        let result = FeatureResult::failed("No songs found");
        assert!(!result.is_success());
        assert_eq!(
            result.payload,
            Some(serde_json::json!({ "error": "No songs found" }))
        );
    }
}
