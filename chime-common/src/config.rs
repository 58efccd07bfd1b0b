//! Engine configuration loading
//!
//! Configuration is resolved in priority order:
//! 1. Explicit file path (command-line argument)
//! 2. `CHIME_CONFIG` environment variable
//! 3. TOML config file (`~/.config/chime/config.toml`, then `/etc/chime/config.toml`)
//! 4. Compiled defaults
//!
//! Environment overrides (`CANBERRA_DRIVER`, `CHIME_THEME`) are applied on top of
//! whatever file was loaded. A missing file is never fatal; a file that exists
//! but does not parse is reported.

use crate::props::{Prop, PropertySet};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "CHIME_CONFIG";

/// Environment variable naming the preferred driver (libcanberra compatible)
pub const DRIVER_ENV: &str = "CANBERRA_DRIVER";

/// Environment variable naming the sound theme
pub const THEME_ENV: &str = "CHIME_THEME";

/// Theme every lookup falls back to
pub const DEFAULT_THEME: &str = "freedesktop";

/// Output profile used when neither config nor properties name one
pub const DEFAULT_OUTPUT_PROFILE: &str = "stereo";

/// Audio backend variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Pulse,
    Alsa,
    Gstreamer,
    Oss,
    Null,
}

impl BackendKind {
    /// Default priority order when no preference is configured
    pub const DEFAULT_ORDER: [BackendKind; 5] = [
        BackendKind::Pulse,
        BackendKind::Alsa,
        BackendKind::Gstreamer,
        BackendKind::Oss,
        BackendKind::Null,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Pulse => "pulse",
            BackendKind::Alsa => "alsa",
            BackendKind::Gstreamer => "gstreamer",
            BackendKind::Oss => "oss",
            BackendKind::Null => "null",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pulse" | "pulseaudio" => Ok(BackendKind::Pulse),
            "alsa" => Ok(BackendKind::Alsa),
            "gstreamer" | "gst" => Ok(BackendKind::Gstreamer),
            "oss" => Ok(BackendKind::Oss),
            "null" => Ok(BackendKind::Null),
            other => Err(Error::NoDriver(format!("Unknown driver '{}'", other))),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Preferred backend, tried before `driver_order`
    pub driver: Option<BackendKind>,

    /// Fallback priority order
    pub driver_order: Vec<BackendKind>,

    pub application_name: Option<String>,

    pub application_id: Option<String>,

    /// Master switch; false makes every play call fail with `Disabled`
    pub enable: bool,

    /// XDG sound theme name
    pub theme: String,

    /// Output profile preferred during theme lookup
    pub output_profile: String,

    /// Sound directories searched for themes (empty = XDG data dirs)
    pub sound_dirs: Vec<PathBuf>,

    /// Byte budget before volatile cache entries are evicted
    pub cache_budget_bytes: u64,

    /// Idle time after which an unreferenced volatile entry is stale
    pub volatile_idle_secs: u64,

    pub resolve_timeout_ms: u64,

    pub decode_timeout_ms: u64,

    /// Extra time a voice may run past its sample duration (None = no watchdog)
    pub playback_grace_ms: Option<u64>,

    /// Additional properties merged into every play call
    pub properties: BTreeMap<String, String>,

    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            driver: None,
            driver_order: BackendKind::DEFAULT_ORDER.to_vec(),
            application_name: None,
            application_id: None,
            enable: true,
            theme: DEFAULT_THEME.to_string(),
            output_profile: DEFAULT_OUTPUT_PROFILE.to_string(),
            sound_dirs: Vec::new(),
            cache_budget_bytes: 32 * 1024 * 1024,
            volatile_idle_secs: 30,
            resolve_timeout_ms: 5_000,
            decode_timeout_ms: 10_000,
            playback_grace_ms: Some(5_000),
            properties: BTreeMap::new(),
            log_level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration following the documented priority order
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match Self::locate(explicit) {
            Some(path) => Self::from_file(&path)?,
            None => {
                debug!("No config file found, using compiled defaults");
                Self::default()
            }
        };
        config.apply_env();
        Ok(config)
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Io(format!("Failed to read {}: {}", path.display(), e)))?;
        let config = Self::from_toml(&content)
            .map_err(|e| Error::InvalidArgument(format!("{}: {}", path.display(), e)))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::InvalidArgument(format!("Invalid config: {}", e)))
    }

    /// Apply `CANBERRA_DRIVER` and `CHIME_THEME`
    pub fn apply_env(&mut self) {
        if let Ok(name) = std::env::var(DRIVER_ENV) {
            match name.parse::<BackendKind>() {
                Ok(kind) => self.driver = Some(kind),
                Err(e) => warn!("Ignoring {}: {}", DRIVER_ENV, e),
            }
        }
        if let Ok(theme) = std::env::var(THEME_ENV) {
            if !theme.trim().is_empty() {
                self.theme = theme;
            }
        }
    }

    fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }

        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
            warn!("{} points to missing file {}", CONFIG_ENV, path.display());
        }

        let user_config = dirs::config_dir().map(|d| d.join("chime").join("config.toml"));
        let system_config = PathBuf::from("/etc/chime/config.toml");

        user_config
            .into_iter()
            .chain(std::iter::once(system_config))
            .find(|p| p.exists())
    }

    /// Backends in the order they should be tried
    ///
    /// The preferred driver comes first, followed by `driver_order` without
    /// duplicates.
    pub fn backend_order(&self) -> Vec<BackendKind> {
        let mut order = Vec::with_capacity(self.driver_order.len() + 1);
        for kind in self.driver.iter().chain(self.driver_order.iter()) {
            if !order.contains(kind) {
                order.push(*kind);
            }
        }
        order
    }

    /// Directories containing sound themes
    pub fn sound_search_dirs(&self) -> Vec<PathBuf> {
        if !self.sound_dirs.is_empty() {
            return self.sound_dirs.clone();
        }
        xdg_sound_dirs()
    }

    /// Properties every play call inherits
    pub fn global_properties(&self) -> Result<PropertySet> {
        let mut builder = PropertySet::builder();
        if let Some(name) = &self.application_name {
            builder = builder.set(Prop::ApplicationName, name.as_str());
        }
        if let Some(id) = &self.application_id {
            builder = builder.set(Prop::ApplicationId, id.as_str());
        }
        for (key, value) in &self.properties {
            builder = builder.set(key.as_str(), value.as_str());
        }
        builder.build()
    }

    pub fn volatile_idle(&self) -> Duration {
        Duration::from_secs(self.volatile_idle_secs)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout_ms)
    }

    pub fn decode_timeout(&self) -> Duration {
        Duration::from_millis(self.decode_timeout_ms)
    }

    pub fn playback_grace(&self) -> Option<Duration> {
        self.playback_grace_ms.map(Duration::from_millis)
    }
}

/// `$XDG_DATA_HOME/sounds` followed by each `$XDG_DATA_DIRS/sounds`
pub fn xdg_sound_dirs() -> Vec<PathBuf> {
    let data_home = std::env::var_os("XDG_DATA_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(dirs::data_dir);

    let data_dirs = std::env::var("XDG_DATA_DIRS")
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "/usr/local/share:/usr/share".to_string());

    data_home
        .into_iter()
        .chain(data_dirs.split(':').filter(|s| !s.is_empty()).map(PathBuf::from))
        .map(|d| d.join("sounds"))
        .collect()
}
