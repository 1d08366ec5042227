use clap::{Args, Parser, Subcommand};
use muzee_core::{FeatureKind, TemperatureScale};
use muzee_features::{parse_topics, FeatureRequest};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "muzee", author, version, about, long_about = None)]
pub struct Cli {
    /// Config file to use instead of ~/.config/muzee/config.toml
    #[arg(short, long, env = "MUZEE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Authorize Muzee with Spotify in the browser and register the account
    Login,

    /// Run one feature now
    Run {
        #[arg(short, long, env = "MUZEE_USER")]
        user: i64,

        #[command(subcommand)]
        feature: RunFeature,
    },

    /// Enable a scheduled feature
    Enable(ToggleArgs),

    /// Disable a scheduled feature
    Disable(ToggleArgs),

    /// Change Daily Smash settings
    ConfigureDailySmash {
        #[arg(short, long, env = "MUZEE_USER")]
        user: i64,

        /// Number of tracks per refill (5-100)
        #[arg(long, value_parser = clap::value_parser!(u32).range(5..=100))]
        songs: u32,

        /// UTC time of day to refill at, as HH:MM
        #[arg(long, value_parser = parse_time_of_day)]
        update_at: Option<u32>,

        /// Existing playlist to use, as an id or open.spotify.com link
        #[arg(long)]
        playlist: Option<String>,
    },

    /// Change Live Weather settings
    ConfigureWeather {
        #[arg(short, long, env = "MUZEE_USER")]
        user: i64,

        /// Playlist whose description shows the weather
        #[arg(long)]
        playlist: String,

        #[arg(long, allow_negative_numbers = true, value_parser = parse_latitude)]
        lat: f64,

        #[arg(long, allow_negative_numbers = true, value_parser = parse_longitude)]
        lon: f64,

        /// celsius, fahrenheit or kelvin
        #[arg(long, default_value = "celsius")]
        scale: TemperatureScale,
    },

    /// Show a user's settings and counters
    Show {
        #[arg(short, long, env = "MUZEE_USER")]
        user: i64,
    },

    /// Show a user's most recent feature runs
    Events {
        #[arg(short, long, env = "MUZEE_USER")]
        user: i64,

        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },

    /// Run the scheduler until Ctrl+C
    Daemon,
}

#[derive(Args, Debug)]
pub struct ToggleArgs {
    #[arg(short, long, env = "MUZEE_USER")]
    pub user: i64,

    /// daily-smash, public-liked, liked-archive or live-weather
    pub feature: FeatureKind,
}

#[derive(Subcommand, Debug)]
pub enum RunFeature {
    /// Refill the Daily Smash playlist
    DailySmash {
        /// Create a new playlist first
        #[arg(long)]
        create: bool,
    },
    /// Sync the public copy of Liked Songs
    PublicLiked {
        #[arg(long)]
        create: bool,
    },
    /// Archive tracks removed from Liked Songs
    LikedArchive {
        #[arg(long)]
        create: bool,
    },
    /// Update the weather playlist description
    LiveWeather,
    /// Create a playlist from search results for comma-separated topics
    Generate {
        topics: String,

        #[arg(short, long, default_value_t = 30)]
        songs: u32,
    },
    /// Copy the tracks whose names contain any of the given characters
    Filter {
        /// Source playlist id or open.spotify.com link
        playlist: String,

        #[arg(short, long)]
        keep_chars: String,
    },
}

impl RunFeature {
    #[must_use]
    pub fn into_request(self) -> FeatureRequest {
        match self {
            Self::DailySmash { create } => FeatureRequest::DailySmash { create },
            Self::PublicLiked { create } => FeatureRequest::PublicLiked { create },
            Self::LikedArchive { create } => FeatureRequest::LikedArchive { create },
            Self::LiveWeather => FeatureRequest::LiveWeather,
            Self::Generate { topics, songs } => FeatureRequest::GeneratePlaylist {
                topics: parse_topics(&topics),
                songs_count: songs,
            },
            Self::Filter {
                playlist,
                keep_chars,
            } => FeatureRequest::LanguageFilter {
                playlist,
                keep_chars,
            },
        }
    }
}

/// Parse `HH:MM` into a minute of the day rounded down to 5 minutes.
pub fn parse_time_of_day(value: &str) -> Result<u32, String> {
    let (hours, minutes) = value
        .split_once(':')
        .ok_or_else(|| format!("expected HH:MM, got `{value}`"))?;
    let hours: u32 = hours
        .trim()
        .parse()
        .map_err(|_| format!("invalid hour in `{value}`"))?;
    let minutes: u32 = minutes
        .trim()
        .parse()
        .map_err(|_| format!("invalid minute in `{value}`"))?;
    if hours > 23 || minutes > 59 {
        return Err(format!("`{value}` is not a time of day"));
    }

    let minute_of_day = hours * 60 + minutes;
    Ok(minute_of_day - minute_of_day % 5)
}

fn parse_bounded(value: &str, bound: f64, name: &str) -> Result<f64, String> {
    let parsed: f64 = value
        .parse()
        .map_err(|_| format!("invalid {name} `{value}`"))?;
    if (-bound..=bound).contains(&parsed) {
        Ok(parsed)
    } else {
        Err(format!("{name} must be within ±{bound}"))
    }
}

fn parse_latitude(value: &str) -> Result<f64, String> {
    parse_bounded(value, 90.0, "latitude")
}

fn parse_longitude(value: &str) -> Result<f64, String> {
    parse_bounded(value, 180.0, "longitude")
}
