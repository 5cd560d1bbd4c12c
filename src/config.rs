use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::audio::Patch;
use crate::timing::{DEFAULT_LEAD_IN, MIN_LEAD_IN};
use crate::ui::PianoRoll;
use crate::{Error, Result};

pub const CONFIG_ENV: &str = "MELODECK_CONFIG";
pub const API_URL_ENV: &str = "MELODECK_API_URL";
pub const DEFAULT_CONFIG_FILE: &str = "melodeck.ron";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base URL of the melody service
    pub api_url: String,
    /// Seconds between pressing play and the first note
    pub lead_in: f64,
    /// Seconds before a fetch is abandoned; none waits forever
    pub fetch_timeout: Option<f64>,
    pub roll: PianoRoll,
    pub synth: Patch,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:4050".to_string(),
            lead_in: DEFAULT_LEAD_IN,
            fetch_timeout: None,
            roll: PianoRoll::default(),
            synth: Patch::default(),
        }
    }
}

impl Settings {
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .map_err(|e| Error::Config(format!("{}: {}", dir.display(), e)))?;
        }

        let ron_string = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| Error::Config(e.to_string()))?;
        fs::write(path, ron_string)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let ron_string = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        let settings: Settings = ron::from_str(&ron_string)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

        Ok(settings.normalized())
    }

    /// Reads the file named by `$MELODECK_CONFIG` (or `melodeck.ron`), falling
    /// back to defaults when it does not exist, then applies `$MELODECK_API_URL`.
    pub fn load_or_default() -> Result<Self> {
        let path = config_path();
        let settings = if path.exists() {
            info!(path = %path.display(), "loading settings");
            Self::load(&path)?
        } else {
            debug!(path = %path.display(), "no settings file, using defaults");
            Self::default()
        };

        Ok(settings.with_api_url_override(std::env::var(API_URL_ENV).ok()))
    }

    pub fn with_api_url_override(mut self, api_url: Option<String>) -> Self {
        if let Some(url) = api_url.filter(|u| !u.trim().is_empty()) {
            self.api_url = url;
        }
        self
    }

    pub fn lead_in(&self) -> f64 {
        self.lead_in.max(MIN_LEAD_IN)
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout
            .filter(|s| s.is_finite() && *s > 0.0)
            .map(Duration::from_secs_f64)
    }

    fn normalized(mut self) -> Self {
        self.lead_in = self.lead_in();
        self.api_url = self.api_url.trim_end_matches('/').to_string();
        self
    }
}

pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}
