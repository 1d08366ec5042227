//! Everything one feature invocation works with.

use chrono::{DateTime, Utc};
use muzee_core::{FeaturesConfig, Store, UserProfile};
use muzee_spotify_api::PlaylistAccessor;

/// Borrowed state for a single run of a feature for a single user.
pub struct FeatureContext<'a> {
    pub accessor: PlaylistAccessor<'a>,
    pub store: &'a dyn Store,
    pub user: &'a UserProfile,
    pub settings: &'a FeaturesConfig,
    /// Wall-clock time the run started, used for description stamps
    pub now: DateTime<Utc>,
}

impl FeatureContext<'_> {
    /// `HH:MM dd/mm/YYYY` in UTC
    #[must_use]
    pub fn stamp(&self) -> String {
        self.now.format("%H:%M %d/%m/%Y").to_string()
    }
}
