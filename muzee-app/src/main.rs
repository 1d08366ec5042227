mod cli;
mod error;

use crate::cli::{Cli, Command, RunFeature, ToggleArgs};
use crate::error::{AppError, Result};
use clap::Parser;
use muzee_core::{
    FeatureKind, FeatureStatus, LiveWeatherSettings, MuzeeConfig, SqliteStore, StatKind, Store,
    UserId, UserProfile,
};
use muzee_features::{parse_playlist_id, FeatureRunner, Scheduler};
use muzee_spotify_api::SpotifyLogin;
use std::fs::File;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_TARGET: &str = "muzee::app";

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Load config or create template on first run
    let config = match cli.config.as_deref() {
        Some(path) => MuzeeConfig::load_or_create_at(path),
        None => MuzeeConfig::load_or_create(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(config.logging.file);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(target: LOG_TARGET, "{}", AppError::Runtime(e));
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli.command, config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(target: LOG_TARGET, "{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: MuzeeConfig) -> Result<()> {
    let store = Arc::new(SqliteStore::open(&config.database_path()).await?);

    let outcome = match command {
        Command::Login => login(&config, store.as_ref()).await,
        Command::Run { user, feature } => run_feature(&config, &store, UserId(user), feature).await,
        Command::Enable(args) => toggle(store.as_ref(), &args, true).await,
        Command::Disable(args) => toggle(store.as_ref(), &args, false).await,
        Command::ConfigureDailySmash {
            user,
            songs,
            update_at,
            playlist,
        } => {
            let user = existing_user(store.as_ref(), UserId(user)).await?.id;
            if let Some(playlist) = playlist {
                let playlist_id = playlist_arg(&playlist)?;
                store
                    .set_feature_playlist(user, FeatureKind::DailySmash, &playlist_id)
                    .await?;
            }
            store.update_daily_smash(user, songs, update_at).await?;
            println!("Daily Smash settings saved");
            Ok(())
        }
        Command::ConfigureWeather {
            user,
            playlist,
            lat,
            lon,
            scale,
        } => {
            let user = existing_user(store.as_ref(), UserId(user)).await?.id;
            let playlist_id = playlist_arg(&playlist)?;
            store
                .set_feature_playlist(user, FeatureKind::LiveWeather, &playlist_id)
                .await?;
            store
                .update_live_weather(
                    user,
                    &LiveWeatherSettings {
                        playlist: Some(playlist_id),
                        lat: Some(lat),
                        lon: Some(lon),
                        scale,
                    },
                )
                .await?;
            println!("Live Weather settings saved");
            Ok(())
        }
        Command::Show { user } => show(store.as_ref(), UserId(user)).await,
        Command::Events { user, limit } => {
            let user = existing_user(store.as_ref(), UserId(user)).await?.id;
            for event in store.recent_events(user, limit).await? {
                println!(
                    "{}  {:<18} {:<6} {}",
                    event.created_at.format("%Y-%m-%d %H:%M:%S"),
                    event.name,
                    if event.success { "ok" } else { "FAILED" },
                    event.data
                );
            }
            Ok(())
        }
        Command::Daemon => daemon(&config, &store).await,
    };

    if let Err(e) = store.checkpoint().await {
        error!(target: LOG_TARGET, "Failed to checkpoint database: {}", e);
    }
    outcome
}

async fn login(config: &MuzeeConfig, store: &dyn Store) -> Result<()> {
    let outcome = SpotifyLogin::new(&config.spotify)
        .authenticate_interactive()
        .await?;
    let user = store
        .upsert_user(&outcome.spotify_id, &outcome.username, &outcome.tokens)
        .await?;

    println!(
        "Logged in as {} ({}). Your Muzee user id is {user}.",
        outcome.username, outcome.spotify_id
    );
    Ok(())
}

async fn run_feature(
    config: &MuzeeConfig,
    store: &Arc<SqliteStore>,
    user: UserId,
    feature: RunFeature,
) -> Result<()> {
    existing_user(store.as_ref(), user).await?;
    let runner = FeatureRunner::from_config(config, store.clone())?;
    let result = runner.run(user, &feature.into_request()).await?;

    match result.status {
        FeatureStatus::Ok => println!("Done"),
        FeatureStatus::Skipped => println!("Nothing to do"),
        FeatureStatus::Failed => println!("Failed"),
    }
    if let Some(target) = &result.target {
        println!("Playlist: https://open.spotify.com/playlist/{target}");
    }
    if let Some(payload) = &result.payload {
        println!("{payload}");
    }
    Ok(())
}

async fn toggle(store: &dyn Store, args: &ToggleArgs, enabled: bool) -> Result<()> {
    if matches!(
        args.feature,
        FeatureKind::GeneratePlaylist | FeatureKind::LanguageFilter
    ) {
        return Err(AppError::InvalidArgument(format!(
            "{} runs on demand and cannot be scheduled",
            args.feature
        )));
    }

    let user = existing_user(store, UserId(args.user)).await?;
    store.set_feature_enabled(user.id, args.feature, enabled).await?;

    if enabled && user.feature_playlist(args.feature).is_none() {
        println!(
            "{} enabled. It has no playlist yet: run `muzee run {} --create` once.",
            args.feature, args.feature
        );
    } else {
        println!("{} {}", args.feature, if enabled { "enabled" } else { "disabled" });
    }
    Ok(())
}

async fn show(store: &dyn Store, user: UserId) -> Result<()> {
    let profile = existing_user(store, user).await?;

    println!("{} ({}) #{}", profile.username, profile.spotify_id, profile.id);
    for feature in FeatureKind::ALL {
        let state = if profile.is_enabled(feature) { "on " } else { "off" };
        let playlist = profile.feature_playlist(feature).unwrap_or("-");
        println!("  {state} {:<18} {playlist}", feature.as_str());
    }

    let smash = &profile.daily_smash;
    if let Some(minute) = smash.update_at {
        println!(
            "  daily smash: {} songs at {:02}:{:02} UTC",
            smash.songs_count,
            minute / 60,
            minute % 60
        );
    }
    let weather = &profile.live_weather;
    if let (Some(lat), Some(lon)) = (weather.lat, weather.lon) {
        println!("  live weather: {lat},{lon} in {}", weather.scale.as_str());
    }

    for stat in [
        StatKind::GeneratedPlaylists,
        StatKind::DailySmashes,
        StatKind::FilteredPlaylists,
        StatKind::ArchivedSongs,
        StatKind::WeatherChanges,
    ] {
        println!("  {:<20} {}", stat.as_str(), store.stat(profile.id, stat).await?);
    }
    Ok(())
}

async fn daemon(config: &MuzeeConfig, store: &Arc<SqliteStore>) -> Result<()> {
    let runner = Arc::new(FeatureRunner::from_config(config, store.clone())?);

    // Create shared cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();

    // Set up Ctrl+C handler to trigger graceful shutdown
    let ctrlc_token = cancel_token.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!(target: LOG_TARGET, "Received Ctrl+C, shutting down gracefully...");
        ctrlc_token.cancel();
    }) {
        error!(target: LOG_TARGET, "Failed to set Ctrl+C handler: {}", e);
    }

    Scheduler::new(runner, cancel_token).run().await;
    Ok(())
}

async fn existing_user(store: &dyn Store, user: UserId) -> Result<UserProfile> {
    store.user(user).await?.ok_or(AppError::NoSuchUser(user))
}

fn playlist_arg(value: &str) -> Result<String> {
    parse_playlist_id(value)
        .ok_or_else(|| AppError::InvalidArgument(format!("not a Spotify playlist: {value}")))
}

/// Initialize tracing with console output and optional file logging
fn init_tracing(file_logging_enabled: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,rspotify_http=warn"));

    let fmt_layer = tracing_subscriber::fmt::layer();

    if file_logging_enabled {
        let log_path = muzee_core::paths::log_file_path();

        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        match File::options().create(true).append(true).open(&log_path) {
            Ok(file) => {
                let file_layer = tracing_subscriber::fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt_layer)
                    .with(file_layer)
                    .init();

                return;
            }
            Err(e) => {
                eprintln!("Failed to open log file at {}: {e}", log_path.display());
            }
        }
    }

    // Fallback: console only
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
