//! Live Weather: stamp current conditions into a playlist description.

use crate::context::FeatureContext;
use crate::error::{FeatureError, Result};
use muzee_core::{FeatureResult, HttpConfig, StatKind, TemperatureScale, WeatherConfig};
use muzee_spotify_api::USER_AGENT;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

/// Conditions reported by the Visual Crossing timeline API, in metric units.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct CurrentConditions {
    /// Degrees Celsius
    pub temp: f64,
    pub humidity: f64,
    /// km/h
    pub windspeed: f64,
}

#[derive(Debug, Deserialize)]
struct TimelineResponse {
    #[serde(rename = "currentConditions")]
    current_conditions: Option<CurrentConditions>,
}

/// Visual Crossing timeline client
pub struct WeatherClient {
    client: ClientWithMiddleware,
    base_url: String,
    api_key: String,
}

impl WeatherClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: &WeatherConfig, http: &HttpConfig) -> Result<Self> {
        // Base client with timeout
        let base_client = reqwest::Client::builder()
            .timeout(http.request_timeout())
            .connect_timeout(http.connect_timeout())
            .user_agent(USER_AGENT)
            .build()?;

        // Wrap with retry middleware (exponential backoff)
        let retry_policy =
            ExponentialBackoff::builder().build_with_max_retries(http.max_transient_retries);
        let client = ClientBuilder::new(base_client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// Current conditions at a location, if the provider reports any.
    ///
    /// # Errors
    ///
    /// Returns [`FeatureError::Weather`] on a non-success status, or an HTTP
    /// error if the request fails.
    pub async fn current_conditions(&self, lat: f64, lon: f64) -> Result<Option<CurrentConditions>> {
        let url = format!("{}/{lat},{lon}", self.base_url);
        debug!("Weather GET {}", url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("unitGroup", "metric"),
                ("key", self.api_key.as_str()),
                ("contentType", "json"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FeatureError::Weather {
                reason: format!("{status}: {}", body.trim()),
            });
        }

        let timeline: TimelineResponse = response.json().await?;
        Ok(timeline.current_conditions)
    }
}

/// Playlist description for the given conditions.
#[must_use]
pub fn describe(conditions: &CurrentConditions, scale: TemperatureScale) -> String {
    format!(
        "🌡️ {:.1}°{} | Humidity: 💧 {}% Wind: 💨 {}km/h",
        scale.convert_celsius(conditions.temp),
        scale.symbol(),
        conditions.humidity,
        conditions.windspeed
    )
}

/// Run Live Weather for the context's user.
///
/// # Errors
///
/// - [`FeatureError::PreconditionFailed`] if the playlist or the location is
///   not configured
/// - Any weather, Spotify or store error
pub async fn run_live_weather(
    ctx: &FeatureContext<'_>,
    weather: &WeatherClient,
) -> Result<FeatureResult> {
    let settings = &ctx.user.live_weather;
    let (Some(playlist_id), Some(lat), Some(lon)) =
        (settings.playlist.as_deref(), settings.lat, settings.lon)
    else {
        return Err(FeatureError::precondition("Live Weather isn't configured."));
    };

    let Some(conditions) = weather.current_conditions(lat, lon).await? else {
        warn!(
            "Could not get the current weather in {},{} for {}",
            lat, lon, ctx.user.username
        );
        return Ok(FeatureResult::skipped(Some(playlist_id.to_string())));
    };

    let description = describe(&conditions, settings.scale);
    ctx.accessor.edit_playlist(playlist_id, &description).await?;
    ctx.store
        .increment_stat(ctx.user.id, StatKind::WeatherChanges, 1)
        .await?;
    info!("Live Weather for {}: {}", ctx.user.username, description);

    let payload = json!({
        "playlist_id": playlist_id,
        "temp": conditions.temp,
        "humidity": conditions.humidity,
        "wind": conditions.windspeed,
        "description": description,
    });
    Ok(FeatureResult::ok(playlist_id).with_payload(payload))
}
