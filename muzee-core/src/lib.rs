pub mod config;
pub mod error;
pub mod model;
pub mod paths;
pub mod store;

pub use config::{
    DatabaseConfig, FeaturesConfig, HttpConfig, LoggingConfig, MuzeeConfig, SpotifyConfig,
    WeatherConfig,
};

/// Re-export toml error type for config parsing error handling
pub use toml::de::Error as TomlParseError;
pub use error::CoreError;
pub use model::{
    ClientCredentials, DailySmashSettings, EventRecord, FeatureKind, FeatureResult, FeatureStatus,
    LiveWeatherSettings, StatKind, StoredTokens, TemperatureScale, TokenPair, TrackUri, UserId,
    UserProfile,
};
pub use paths::{
    config_dir, config_path, database_path, log_file_path, CONFIG_DIR_NAME, CONFIG_FILE_NAME,
    DATABASE_FILE_NAME, LOG_FILE_NAME,
};
pub use store::{SqliteStore, Store};
