//! Persistence for users, tokens, per-user caches, stats and the event log.
//!
//! [`Store`] is the seam the API client and feature engine depend on;
//! [`SqliteStore`] is the production implementation.

use crate::error::{CoreError, Result};
use crate::model::{
    DailySmashSettings, EventRecord, FeatureKind, LiveWeatherSettings, StatKind, StoredTokens,
    TemperatureScale, UserId, UserProfile,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use std::path::Path;
use tokio_rusqlite::Connection;
use tracing::{debug, info};

const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    spotify_id TEXT NOT NULL UNIQUE,
    username TEXT NOT NULL,
    access_token TEXT NOT NULL,
    refresh_token TEXT NOT NULL,
    enabled_features TEXT NOT NULL DEFAULT '',
    daily_smash_playlist TEXT,
    daily_smash_songs_count INTEGER NOT NULL DEFAULT 30,
    daily_smash_update_at INTEGER,
    public_liked_playlist TEXT,
    liked_archive_playlist TEXT,
    live_weather_playlist TEXT,
    live_weather_lat REAL,
    live_weather_lon REAL,
    live_weather_scale TEXT NOT NULL DEFAULT 'celsius',
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS user_stats (
    user_id INTEGER PRIMARY KEY,
    generated_playlists INTEGER NOT NULL DEFAULT 0,
    daily_smashes INTEGER NOT NULL DEFAULT 0,
    filtered_playlists INTEGER NOT NULL DEFAULT 0,
    archived_songs INTEGER NOT NULL DEFAULT 0,
    weather_changes INTEGER NOT NULL DEFAULT 0,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS user_cache (
    user_id INTEGER NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (user_id, key),
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    success INTEGER NOT NULL,
    data TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_users_access_token ON users(access_token);
CREATE INDEX IF NOT EXISTS idx_users_refresh_token ON users(refresh_token);
CREATE INDEX IF NOT EXISTS idx_events_user ON events(user_id, id);
";

const USER_COLUMNS: &str = r"
    id, spotify_id, username, enabled_features,
    daily_smash_playlist, daily_smash_songs_count, daily_smash_update_at,
    public_liked_playlist, liked_archive_playlist,
    live_weather_playlist, live_weather_lat, live_weather_lon, live_weather_scale
";

/// Persistent state shared by every client and feature run.
///
/// Token updates are compare-and-swap: they only apply while the stored
/// value still equals `old`, so concurrent refreshers converge on one winner.
#[async_trait]
pub trait Store: Send + Sync {
    async fn token_pair(&self, user: UserId) -> Result<Option<StoredTokens>>;

    /// Returns `true` if the stored access token was `old` and is now `new`.
    async fn cas_update_access_token(&self, old: &str, new: &str) -> Result<bool>;

    /// Returns `true` if the stored refresh token was `old` and is now `new`.
    async fn cas_update_refresh_token(&self, old: &str, new: &str) -> Result<bool>;

    async fn load_cache(&self, user: UserId, key: &str) -> Result<Option<serde_json::Value>>;

    async fn save_cache(&self, user: UserId, key: &str, value: &serde_json::Value) -> Result<()>;

    async fn log_event(
        &self,
        user: UserId,
        name: &str,
        success: bool,
        data: &serde_json::Value,
    ) -> Result<()>;

    /// Adds `delta` to a counter and returns the new value.
    async fn increment_stat(&self, user: UserId, stat: StatKind, delta: i64) -> Result<i64>;

    async fn stat(&self, user: UserId, stat: StatKind) -> Result<i64>;

    async fn user(&self, user: UserId) -> Result<Option<UserProfile>>;

    /// Insert a user on first login, or refresh their name and tokens.
    async fn upsert_user(
        &self,
        spotify_id: &str,
        username: &str,
        tokens: &StoredTokens,
    ) -> Result<UserId>;

    async fn set_feature_enabled(&self, user: UserId, feature: FeatureKind, enabled: bool)
        -> Result<()>;

    async fn set_feature_playlist(
        &self,
        user: UserId,
        feature: FeatureKind,
        playlist_id: &str,
    ) -> Result<()>;

    async fn update_daily_smash(
        &self,
        user: UserId,
        songs_count: u32,
        update_at: Option<u32>,
    ) -> Result<()>;

    async fn update_live_weather(&self, user: UserId, settings: &LiveWeatherSettings)
        -> Result<()>;

    async fn users_with_feature(&self, feature: FeatureKind) -> Result<Vec<UserProfile>>;

    async fn recent_events(&self, user: UserId, limit: u32) -> Result<Vec<EventRecord>>;
}

/// SQLite-backed [`Store`]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open a store at a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub async fn open(path: &Path) -> Result<Self> {
        info!("Opening store database at {:?}", path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).await?;
        Self::init(conn).await
    }

    /// Open a private in-memory store
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA_SQL)?;
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            Ok(())
        })
        .await?;

        info!("Store database initialized");
        Ok(Self { conn })
    }

    /// Checkpoint WAL for clean shutdown
    ///
    /// # Errors
    ///
    /// Returns an error if the WAL checkpoint fails.
    pub async fn checkpoint(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE)")?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }

    async fn execute_for_user(
        &self,
        user: UserId,
        sql: &'static str,
        params: Vec<rusqlite::types::Value>,
    ) -> Result<()> {
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(sql, rusqlite::params_from_iter(params))?;
                Ok(changed)
            })
            .await?;

        if changed == 0 {
            return Err(CoreError::UnknownUser { user_id: user });
        }
        Ok(())
    }
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserProfile> {
    let enabled: String = row.get(3)?;
    let songs_count: i64 = row.get(5)?;
    let update_at: Option<i64> = row.get(6)?;
    let scale: String = row.get(12)?;

    Ok(UserProfile {
        id: UserId(row.get(0)?),
        spotify_id: row.get(1)?,
        username: row.get(2)?,
        enabled_features: enabled
            .split(',')
            .filter(|name| !name.is_empty())
            .map(String::from)
            .collect(),
        daily_smash: DailySmashSettings {
            playlist: row.get(4)?,
            songs_count: u32::try_from(songs_count).unwrap_or(0),
            update_at: update_at.and_then(|minute| u32::try_from(minute).ok()),
        },
        public_liked_playlist: row.get(7)?,
        liked_archive_playlist: row.get(8)?,
        live_weather: LiveWeatherSettings {
            playlist: row.get(9)?,
            lat: row.get(10)?,
            lon: row.get(11)?,
            scale: scale.parse::<TemperatureScale>().unwrap_or_default(),
        },
    })
}

const fn feature_playlist_update(feature: FeatureKind) -> Option<&'static str> {
    match feature {
        FeatureKind::DailySmash => Some("UPDATE users SET daily_smash_playlist = ?2 WHERE id = ?1"),
        FeatureKind::PublicLiked => {
            Some("UPDATE users SET public_liked_playlist = ?2 WHERE id = ?1")
        }
        FeatureKind::LikedArchive => {
            Some("UPDATE users SET liked_archive_playlist = ?2 WHERE id = ?1")
        }
        FeatureKind::LiveWeather => {
            Some("UPDATE users SET live_weather_playlist = ?2 WHERE id = ?1")
        }
        FeatureKind::GeneratePlaylist | FeatureKind::LanguageFilter => None,
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn token_pair(&self, user: UserId) -> Result<Option<StoredTokens>> {
        self.conn
            .call(move |conn| {
                let tokens = conn
                    .query_row(
                        "SELECT access_token, refresh_token FROM users WHERE id = ?1",
                        rusqlite::params![user.0],
                        |row| {
                            Ok(StoredTokens {
                                access_token: row.get(0)?,
                                refresh_token: row.get(1)?,
                            })
                        },
                    )
                    .optional()?;
                Ok(tokens)
            })
            .await
            .map_err(Into::into)
    }

    async fn cas_update_access_token(&self, old: &str, new: &str) -> Result<bool> {
        let old = old.to_string();
        let new = new.to_string();

        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE users SET access_token = ?2 WHERE access_token = ?1",
                    rusqlite::params![old, new],
                )?;
                Ok(changed)
            })
            .await?;

        debug!(target: "muzee::store", "Access token CAS applied to {} row(s)", changed);
        Ok(changed > 0)
    }

    async fn cas_update_refresh_token(&self, old: &str, new: &str) -> Result<bool> {
        let old = old.to_string();
        let new = new.to_string();

        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE users SET refresh_token = ?2 WHERE refresh_token = ?1",
                    rusqlite::params![old, new],
                )?;
                Ok(changed)
            })
            .await?;

        debug!(target: "muzee::store", "Refresh token CAS applied to {} row(s)", changed);
        Ok(changed > 0)
    }

    async fn load_cache(&self, user: UserId, key: &str) -> Result<Option<serde_json::Value>> {
        let key = key.to_string();

        let raw: Option<String> = self
            .conn
            .call(move |conn| {
                let value = conn
                    .query_row(
                        "SELECT value FROM user_cache WHERE user_id = ?1 AND key = ?2",
                        rusqlite::params![user.0, key],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(value)
            })
            .await?;

        raw.map(|text| serde_json::from_str(&text))
            .transpose()
            .map_err(Into::into)
    }

    async fn save_cache(&self, user: UserId, key: &str, value: &serde_json::Value) -> Result<()> {
        let key = key.to_string();
        let text = serde_json::to_string(value)?;
        let now = Utc::now().timestamp();

        self.conn
            .call(move |conn| {
                conn.execute(
                    r"
                    INSERT INTO user_cache (user_id, key, value, updated_at)
                    VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(user_id, key) DO UPDATE SET
                        value = excluded.value,
                        updated_at = excluded.updated_at
                ",
                    rusqlite::params![user.0, key, text, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }

    async fn log_event(
        &self,
        user: UserId,
        name: &str,
        success: bool,
        data: &serde_json::Value,
    ) -> Result<()> {
        let name = name.to_string();
        let text = serde_json::to_string(data)?;
        let now = Utc::now().timestamp();

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO events (user_id, name, success, data, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![user.0, name, success, text, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }

    async fn increment_stat(&self, user: UserId, stat: StatKind, delta: i64) -> Result<i64> {
        let column = stat.as_str();

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT OR IGNORE INTO user_stats (user_id) VALUES (?1)",
                    rusqlite::params![user.0],
                )?;
                tx.execute(
                    &format!("UPDATE user_stats SET {column} = {column} + ?2 WHERE user_id = ?1"),
                    rusqlite::params![user.0, delta],
                )?;
                let value: i64 = tx.query_row(
                    &format!("SELECT {column} FROM user_stats WHERE user_id = ?1"),
                    rusqlite::params![user.0],
                    |row| row.get(0),
                )?;
                tx.commit()?;
                Ok(value)
            })
            .await
            .map_err(Into::into)
    }

    async fn stat(&self, user: UserId, stat: StatKind) -> Result<i64> {
        let column = stat.as_str();

        self.conn
            .call(move |conn| {
                let value: Option<i64> = conn
                    .query_row(
                        &format!("SELECT {column} FROM user_stats WHERE user_id = ?1"),
                        rusqlite::params![user.0],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(value.unwrap_or(0))
            })
            .await
            .map_err(Into::into)
    }

    async fn user(&self, user: UserId) -> Result<Option<UserProfile>> {
        self.conn
            .call(move |conn| {
                let profile = conn
                    .query_row(
                        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                        rusqlite::params![user.0],
                        user_from_row,
                    )
                    .optional()?;
                Ok(profile)
            })
            .await
            .map_err(Into::into)
    }

    async fn upsert_user(
        &self,
        spotify_id: &str,
        username: &str,
        tokens: &StoredTokens,
    ) -> Result<UserId> {
        info!(target: "muzee::store", "Saving user {}", spotify_id);
        let spotify_id = spotify_id.to_string();
        let username = username.to_string();
        let tokens = tokens.clone();
        let now = Utc::now().timestamp();

        let id: i64 = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    r"
                    INSERT INTO users (spotify_id, username, access_token, refresh_token, created_at)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    ON CONFLICT(spotify_id) DO UPDATE SET
                        username = excluded.username,
                        access_token = excluded.access_token,
                        refresh_token = excluded.refresh_token
                ",
                    rusqlite::params![
                        spotify_id,
                        username,
                        tokens.access_token,
                        tokens.refresh_token,
                        now
                    ],
                )?;
                let id: i64 = tx.query_row(
                    "SELECT id FROM users WHERE spotify_id = ?1",
                    rusqlite::params![spotify_id],
                    |row| row.get(0),
                )?;
                tx.execute(
                    "INSERT OR IGNORE INTO user_stats (user_id) VALUES (?1)",
                    rusqlite::params![id],
                )?;
                tx.commit()?;
                Ok(id)
            })
            .await?;

        Ok(UserId(id))
    }

    async fn set_feature_enabled(
        &self,
        user: UserId,
        feature: FeatureKind,
        enabled: bool,
    ) -> Result<()> {
        let mut profile = self
            .user(user)
            .await?
            .ok_or(CoreError::UnknownUser { user_id: user })?;

        if enabled {
            profile.enabled_features.insert(feature.as_str().to_string());
        } else {
            profile.enabled_features.remove(feature.as_str());
        }

        let joined = profile
            .enabled_features
            .into_iter()
            .collect::<Vec<_>>()
            .join(",");

        self.execute_for_user(
            user,
            "UPDATE users SET enabled_features = ?2 WHERE id = ?1",
            vec![user.0.into(), joined.into()],
        )
        .await
    }

    async fn set_feature_playlist(
        &self,
        user: UserId,
        feature: FeatureKind,
        playlist_id: &str,
    ) -> Result<()> {
        let sql = feature_playlist_update(feature).ok_or_else(|| CoreError::InvalidStoredValue {
            field: "feature_playlist",
            value: feature.as_str().to_string(),
        })?;

        self.execute_for_user(
            user,
            sql,
            vec![user.0.into(), playlist_id.to_string().into()],
        )
        .await
    }

    async fn update_daily_smash(
        &self,
        user: UserId,
        songs_count: u32,
        update_at: Option<u32>,
    ) -> Result<()> {
        let update_at: rusqlite::types::Value =
            update_at.map_or(rusqlite::types::Value::Null, |minute| {
                i64::from(minute).into()
            });

        self.execute_for_user(
            user,
            "UPDATE users SET daily_smash_songs_count = ?2, daily_smash_update_at = ?3 WHERE id = ?1",
            vec![user.0.into(), i64::from(songs_count).into(), update_at],
        )
        .await
    }

    async fn update_live_weather(
        &self,
        user: UserId,
        settings: &LiveWeatherSettings,
    ) -> Result<()> {
        let optional_real = |value: Option<f64>| {
            value.map_or(rusqlite::types::Value::Null, rusqlite::types::Value::Real)
        };

        self.execute_for_user(
            user,
            "UPDATE users SET live_weather_lat = ?2, live_weather_lon = ?3, live_weather_scale = ?4 WHERE id = ?1",
            vec![
                user.0.into(),
                optional_real(settings.lat),
                optional_real(settings.lon),
                settings.scale.as_str().to_string().into(),
            ],
        )
        .await
    }

    async fn users_with_feature(&self, feature: FeatureKind) -> Result<Vec<UserProfile>> {
        let users: Vec<UserProfile> = self
            .conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare_cached(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))?;
                let rows = stmt
                    .query_map([], user_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        Ok(users
            .into_iter()
            .filter(|profile| profile.is_enabled(feature))
            .collect())
    }

    async fn recent_events(&self, user: UserId, limit: u32) -> Result<Vec<EventRecord>> {
        let rows: Vec<(String, bool, String, i64)> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare_cached(
                    r"
                    SELECT name, success, data, created_at
                    FROM events
                    WHERE user_id = ?1
                    ORDER BY id DESC
                    LIMIT ?2
                ",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![user.0, limit], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(name, success, data, created_at)| {
                Ok(EventRecord {
                    name,
                    success,
                    data: serde_json::from_str(&data)?,
                    created_at: DateTime::from_timestamp(created_at, 0).unwrap_or_else(Utc::now),
                })
            })
            .collect()
    }
}
