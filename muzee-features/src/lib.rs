pub mod archive;
pub mod context;
pub mod daily_smash;
pub mod error;
pub mod filter;
pub mod generate;
pub mod mirror;
pub mod runner;
pub mod sampling;
pub mod scheduler;
pub mod weather;

pub use context::FeatureContext;
pub use error::{FeatureError, Result};
pub use filter::parse_playlist_id;
pub use generate::parse_topics;
pub use runner::{FeatureRequest, FeatureRunner};
pub use sampling::{sample_tracks, SampleSource, SamplingParams};
pub use scheduler::{due_jobs, DueJob, Scheduler};
pub use weather::{describe, CurrentConditions, WeatherClient};
