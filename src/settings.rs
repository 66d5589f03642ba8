//! Persisted user settings for the tone engine.
//!
//! Values are stored JSON-encoded under stable keys so the web build can
//! share them with `localStorage` entries written by the rest of the app.

use std::collections::HashMap;

use tracing::warn;

use crate::error::ToneError;

pub const VOLUME_KEY: &str = "mindbody-music-volume";
pub const AUTOPLAY_KEY: &str = "mindbody-music-autoplay";

pub const DEFAULT_VOLUME: f64 = 0.15;
pub const DEFAULT_AUTOPLAY: bool = true;

/// A get/set key-value store for persisted settings.
pub trait SettingsStore {
    fn load(&self, key: &str) -> Option<String>;
    fn save(&mut self, key: &str, value: &str) -> Result<(), ToneError>;
}

/// Clamp a volume into `[0, 1]`. NaN maps to silence.
pub fn clamp_volume(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

/// Read the persisted volume, falling back to the default when the stored
/// value is missing or unreadable.
pub fn load_volume<S: SettingsStore + ?Sized>(store: &S) -> f64 {
    match store.load(VOLUME_KEY) {
        None => DEFAULT_VOLUME,
        Some(raw) => match serde_json::from_str::<f64>(&raw) {
            Ok(v) => clamp_volume(v),
            Err(e) => {
                warn!(key = VOLUME_KEY, value = %raw, error = %e, "ignoring unreadable stored volume");
                DEFAULT_VOLUME
            }
        },
    }
}

pub fn save_volume<S: SettingsStore + ?Sized>(store: &mut S, volume: f64) -> Result<(), ToneError> {
    let raw = serde_json::to_string(&volume).map_err(|e| ToneError::Settings(e.to_string()))?;
    store.save(VOLUME_KEY, &raw)
}

pub fn load_autoplay<S: SettingsStore + ?Sized>(store: &S) -> bool {
    match store.load(AUTOPLAY_KEY) {
        None => DEFAULT_AUTOPLAY,
        Some(raw) => serde_json::from_str::<bool>(&raw).unwrap_or_else(|e| {
            warn!(key = AUTOPLAY_KEY, value = %raw, error = %e, "ignoring unreadable autoplay flag");
            DEFAULT_AUTOPLAY
        }),
    }
}

pub fn save_autoplay<S: SettingsStore + ?Sized>(store: &mut S, enabled: bool) -> Result<(), ToneError> {
    store.save(AUTOPLAY_KEY, if enabled { "true" } else { "false" })
}

/// In-process store. Used by tests, the offline renderer, and hosts that
/// persist settings some other way.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }
}

impl SettingsStore for MemoryStore {
    fn load(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn save(&mut self, key: &str, value: &str) -> Result<(), ToneError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(feature = "native")]
pub use file::JsonFileStore;

#[cfg(feature = "native")]
mod file {
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::{Path, PathBuf};

    use directories::ProjectDirs;
    use tracing::debug;

    use super::SettingsStore;
    use crate::error::ToneError;

    /// Settings persisted as one JSON object on disk.
    #[derive(Debug, Clone)]
    pub struct JsonFileStore {
        path: PathBuf,
        values: BTreeMap<String, serde_json::Value>,
    }

    impl JsonFileStore {
        /// Open (or lazily create) the store at `path`.
        pub fn open(path: impl AsRef<Path>) -> Result<Self, ToneError> {
            let path = path.as_ref().to_path_buf();
            let values = if path.exists() {
                let text = fs::read_to_string(&path)
                    .map_err(|e| ToneError::Settings(format!("{}: {e}", path.display())))?;
                serde_json::from_str(&text)
                    .map_err(|e| ToneError::Settings(format!("{}: {e}", path.display())))?
            } else {
                BTreeMap::new()
            };
            debug!(path = %path.display(), entries = values.len(), "opened settings file");
            Ok(JsonFileStore { path, values })
        }

        /// Platform config directory, e.g. `~/.config/mindbody/settings.json`.
        pub fn default_path() -> Option<PathBuf> {
            ProjectDirs::from("app", "mindbody", "mindbody")
                .map(|dirs| dirs.config_dir().join("settings.json"))
        }

        pub fn path(&self) -> &Path {
            &self.path
        }
    }

    impl SettingsStore for JsonFileStore {
        fn load(&self, key: &str) -> Option<String> {
            self.values.get(key).map(|v| v.to_string())
        }

        fn save(&mut self, key: &str, value: &str) -> Result<(), ToneError> {
            let parsed: serde_json::Value =
                serde_json::from_str(value).map_err(|e| ToneError::Settings(e.to_string()))?;
            self.values.insert(key.to_string(), parsed);
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent).map_err(|e| ToneError::Settings(e.to_string()))?;
            }
            let text = serde_json::to_string_pretty(&self.values)
                .map_err(|e| ToneError::Settings(e.to_string()))?;
            fs::write(&self.path, text)
                .map_err(|e| ToneError::Settings(format!("{}: {e}", self.path.display())))
        }
    }

}
