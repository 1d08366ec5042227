use crate::error::{CoreError, Result};
use crate::model::ClientCredentials;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MuzeeConfig {
    pub spotify: SpotifyConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
    #[serde(default)]
    pub weather: Option<WeatherConfig>,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_redirect_uri")]
    pub oauth_redirect_uri: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
}

fn default_redirect_uri() -> String {
    "http://127.0.0.1:8888/callback".into()
}

fn default_scopes() -> Vec<String> {
    [
        "user-library-read",
        "playlist-read-private",
        "playlist-read-collaborative",
        "playlist-modify-public",
        "playlist-modify-private",
        "user-read-email",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl SpotifyConfig {
    #[must_use]
    pub fn credentials(&self) -> ClientCredentials {
        ClientCredentials::new(&self.client_id, &self.client_secret)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Retries for rate-limited (429) and 5xx responses
    #[serde(default = "default_transient_retries")]
    pub max_transient_retries: u32,
}

fn default_api_base_url() -> String {
    "https://api.spotify.com/v1".into()
}

fn default_token_url() -> String {
    "https://accounts.spotify.com/api/token".into()
}

const fn default_request_timeout() -> u64 {
    10
}

const fn default_connect_timeout() -> u64 {
    5
}

const fn default_transient_retries() -> u32 {
    3
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            token_url: default_token_url(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            max_transient_retries: default_transient_retries(),
        }
    }
}

impl HttpConfig {
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    /// Wall-clock budget for one sampling run
    #[serde(default = "default_sampling_deadline")]
    pub sampling_deadline_secs: u64,
    /// Consecutive draws without a new track before sampling gives up
    #[serde(default = "default_max_empty_draws")]
    pub max_empty_draws: u32,
    #[serde(default = "default_songs_count")]
    pub default_songs_count: u32,
}

const fn default_sampling_deadline() -> u64 {
    60
}

const fn default_max_empty_draws() -> u32 {
    3
}

const fn default_songs_count() -> u32 {
    30
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            sampling_deadline_secs: default_sampling_deadline(),
            max_empty_draws: default_max_empty_draws(),
            default_songs_count: default_songs_count(),
        }
    }
}

impl FeaturesConfig {
    #[must_use]
    pub const fn sampling_deadline(&self) -> Duration {
        Duration::from_secs(self.sampling_deadline_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    pub api_key: String,
    #[serde(default = "default_weather_base_url")]
    pub base_url: String,
}

fn default_weather_base_url() -> String {
    "https://weather.visualcrossing.com/VisualCrossingWebServices/rest/services/timeline".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DatabaseConfig {
    /// Overrides `~/.config/muzee/muzee.db`
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    /// Also write logs to `~/.config/muzee/muzee.log`
    #[serde(default)]
    pub file: bool,
}

impl MuzeeConfig {
    /// Get the config file path (~/.config/muzee/config.toml)
    #[must_use]
    pub fn config_path() -> PathBuf {
        crate::paths::config_path()
    }

    /// Load config from the default location or create the template on first run
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read, parsed, or if required fields are missing.
    pub fn load_or_create() -> Result<Self> {
        Self::load_or_create_at(&Self::config_path())
    }

    /// Load config from `path`, writing the template there if it does not exist
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigNotFound`] after writing the template, or an error if the
    /// file cannot be read, parsed or validated.
    pub fn load_or_create_at(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            if let Some(parent) = config_path.parent() {
                fs::create_dir_all(parent)?;
            }

            fs::write(config_path, CONFIG_TEMPLATE)?;

            return Err(CoreError::ConfigNotFound {
                path: config_path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(config_path)?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse config from TOML text without validating it
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed.
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Validate that required fields are present.
    ///
    /// # Errors
    ///
    /// Returns an error if required fields are missing or empty.
    pub fn validate(&self) -> Result<()> {
        if self.spotify.client_id.is_empty() {
            return Err(CoreError::ConfigMissingField {
                field: "spotify.client_id".to_string(),
            });
        }
        if self.spotify.client_secret.is_empty() {
            return Err(CoreError::ConfigMissingField {
                field: "spotify.client_secret".to_string(),
            });
        }
        if self.features.max_empty_draws == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "features.max_empty_draws must be at least 1".to_string(),
            });
        }
        if let Some(weather) = &self.weather {
            if weather.api_key.is_empty() {
                return Err(CoreError::ConfigMissingField {
                    field: "weather.api_key".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Database location, honoring the `[database] path` override
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(crate::paths::database_path)
    }
}

const CONFIG_TEMPLATE: &str = r#"# Muzee Configuration
# ~/.config/muzee/config.toml

[spotify]
# Required: Get these from https://developer.spotify.com/dashboard
client_id = ""
client_secret = ""
oauth_redirect_uri = "http://127.0.0.1:8888/callback"

[http]
request_timeout_secs = 10
connect_timeout_secs = 5
# Retries for rate-limited (429) and 5xx responses
max_transient_retries = 3

[features]
# Wall-clock budget for one Daily Smash / generator run
sampling_deadline_secs = 60
# Consecutive draws without a new track before sampling gives up
max_empty_draws = 3
default_songs_count = 30

# Optional: required by the Live Weather feature (https://www.visualcrossing.com)
# [weather]
# api_key = ""

[database]
# path = "/var/lib/muzee/muzee.db"

[logging]
# Also write logs to ~/.config/muzee/muzee.log
file = false
"#;
