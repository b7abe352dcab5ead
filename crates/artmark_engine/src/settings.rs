use std::fs;
use std::path::Path;
use std::time::Duration;

use artmark_logging::artmark_warn;
use serde::{Deserialize, Serialize};

use crate::fetch::FetchSettings;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("cannot read settings {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("cannot parse settings {path}: {message}")]
    Parse { path: String, message: String },
}

/// Tunables for one page runtime, stored as RON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Attempts per installation task before it gives up.
    pub retry_budget: u32,
    #[serde(with = "millis")]
    pub retry_interval: Duration,
    /// Expand the caption panel on item pages once it shows up.
    pub open_caption: bool,
    #[serde(with = "millis")]
    pub open_caption_delay: Duration,
    pub fetch: FetchSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            retry_budget: 20,
            retry_interval: Duration::from_millis(500),
            open_caption: true,
            open_caption_delay: Duration::from_millis(1000),
            fetch: FetchSettings::default(),
        }
    }
}

impl EngineSettings {
    pub fn from_ron(text: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(text)
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_ron(&text).map_err(|err| SettingsError::Parse {
            path: path.display().to_string(),
            message: err.to_string(),
        })
    }

    /// Like [`EngineSettings::load`], but a missing or broken file yields defaults.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(settings) => settings,
            Err(err) => {
                artmark_warn!("{err}; using default settings");
                Self::default()
            }
        }
    }
}

/// Durations as whole milliseconds.
pub(crate) mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
