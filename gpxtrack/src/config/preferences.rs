//! Live preferences handed to the core.
//!
//! [`SharedPreferences`] is the single owner of the user's choices; the tile
//! cache and the app read them through [`ConfigSource`] and can subscribe to
//! changes instead of polling a global store.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::info;

use super::file::{resolve_provider, ConfigFile};
use crate::provider::{catalog, TileServerDescriptor};
use crate::units::Units;

/// Kind of movement being recorded, passed to the location source as a hint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    #[default]
    Other,
    AutomotiveNavigation,
    Fitness,
    OtherNavigation,
    Airborne,
}

impl ActivityType {
    pub const ALL: [ActivityType; 5] = [
        ActivityType::Other,
        ActivityType::AutomotiveNavigation,
        ActivityType::Fitness,
        ActivityType::OtherNavigation,
        ActivityType::Airborne,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::Other => "other",
            ActivityType::AutomotiveNavigation => "automotive_navigation",
            ActivityType::Fitness => "fitness",
            ActivityType::OtherNavigation => "other_navigation",
            ActivityType::Airborne => "airborne",
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        ActivityType::ALL
            .into_iter()
            .find(|a| a.as_str() == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = ActivityType::ALL.iter().map(|a| a.as_str()).collect();
                format!("unknown activity type '{}', expected one of {}", s, names.join(", "))
            })
    }
}

/// Snapshot of the preferences the core consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preferences {
    pub use_cache: bool,
    pub provider: &'static TileServerDescriptor,
    pub units: Units,
    pub activity_type: ActivityType,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            use_cache: true,
            provider: catalog::default_provider(),
            units: Units::default(),
            activity_type: ActivityType::default(),
        }
    }
}

impl Preferences {
    pub fn from_config(config: &ConfigFile) -> Self {
        Self {
            use_cache: config.tiles.use_cache,
            provider: resolve_provider(&config.tiles.provider),
            units: config.tracking.units,
            activity_type: config.tracking.activity_type,
        }
    }
}

/// Read access to the current preferences plus a change feed.
pub trait ConfigSource: Send + Sync {
    fn use_cache(&self) -> bool;

    fn provider(&self) -> &'static TileServerDescriptor;

    fn units(&self) -> Units;

    fn activity_type(&self) -> ActivityType;

    /// Receiver that observes every subsequent change.
    fn subscribe(&self) -> watch::Receiver<Preferences>;
}

/// Preferences shared between the components that consume them.
///
/// Cloning yields another handle to the same values.
#[derive(Debug, Clone)]
pub struct SharedPreferences {
    tx: Arc<watch::Sender<Preferences>>,
}

impl SharedPreferences {
    pub fn new(initial: Preferences) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn from_config(config: &ConfigFile) -> Self {
        Self::new(Preferences::from_config(config))
    }

    pub fn current(&self) -> Preferences {
        *self.tx.borrow()
    }

    pub fn set_use_cache(&self, use_cache: bool) {
        self.update(|p| p.use_cache = use_cache);
    }

    pub fn set_provider(&self, provider: &'static TileServerDescriptor) {
        self.update(|p| p.provider = provider);
    }

    pub fn set_units(&self, units: Units) {
        self.update(|p| p.units = units);
    }

    pub fn set_activity_type(&self, activity_type: ActivityType) {
        self.update(|p| p.activity_type = activity_type);
    }

    fn update(&self, change: impl FnOnce(&mut Preferences)) {
        let changed = self.tx.send_if_modified(|prefs| {
            let before = *prefs;
            change(prefs);
            *prefs != before
        });
        if changed {
            let prefs = self.current();
            info!(
                use_cache = prefs.use_cache,
                provider = prefs.provider.id,
                units = %prefs.units,
                activity_type = %prefs.activity_type,
                "Preferences changed"
            );
        }
    }
}

impl Default for SharedPreferences {
    fn default() -> Self {
        Self::new(Preferences::default())
    }
}

impl ConfigSource for SharedPreferences {
    fn use_cache(&self) -> bool {
        self.tx.borrow().use_cache
    }

    fn provider(&self) -> &'static TileServerDescriptor {
        self.tx.borrow().provider
    }

    fn units(&self) -> Units {
        self.tx.borrow().units
    }

    fn activity_type(&self) -> ActivityType {
        self.tx.borrow().activity_type
    }

    fn subscribe(&self) -> watch::Receiver<Preferences> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_type_parse() {
        assert_eq!(
            "automotive-navigation".parse::<ActivityType>(),
            Ok(ActivityType::AutomotiveNavigation)
        );
        assert!("swimming".parse::<ActivityType>().is_err());
        for activity in ActivityType::ALL {
            assert_eq!(activity.to_string().parse::<ActivityType>(), Ok(activity));
        }
    }

    #[test]
    fn test_from_config_falls_back_to_default_provider() {
        let mut config = ConfigFile::default();
        config.tiles.provider = "42".to_string();
        let prefs = Preferences::from_config(&config);
        assert_eq!(prefs.provider.id, catalog::default_provider().id);
    }

    #[tokio::test]
    async fn test_subscribers_observe_changes() {
        let prefs = SharedPreferences::default();
        let mut rx = prefs.subscribe();

        prefs.set_use_cache(false);

        rx.changed().await.unwrap();
        assert!(!rx.borrow_and_update().use_cache);
        assert!(!prefs.use_cache());
    }

    #[test]
    fn test_unchanged_value_does_not_notify() {
        let prefs = SharedPreferences::default();
        let rx = prefs.subscribe();

        prefs.set_units(Units::Metric);

        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_clones_share_state() {
        let prefs = SharedPreferences::default();
        let other = prefs.clone();
        other.set_units(Units::Imperial);
        assert_eq!(prefs.units(), Units::Imperial);
    }
}
