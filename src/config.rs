//! Configuration for the asset cache and the submission queue.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Site identity and the remote form relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Origin the site is served from, e.g. `https://vuanh.example`.
    pub origin: String,
    /// Third-party form relay that receives contact submissions.
    pub form_endpoint: String,
    /// Hosts whose font requests are cached even though they are cross-origin.
    pub font_hosts: Vec<String>,
    /// Language used when a submission does not carry one.
    pub default_language: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:8080".to_string(),
            form_endpoint: "https://formspree.io/f/contact".to_string(),
            font_hosts: vec![
                "fonts.googleapis.com".to_string(),
                "fonts.gstatic.com".to_string(),
            ],
            default_language: "vi".to_string(),
        }
    }
}

impl SiteConfig {
    /// Sets the site origin.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Sets the form relay endpoint.
    #[must_use]
    pub fn with_form_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.form_endpoint = endpoint.into();
        self
    }
}

/// Cache generation naming and the precache manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Prefix shared by every cache name.
    pub prefix: String,
    /// Generation tag baked in at deploy time.
    pub version: String,
    /// Assets fetched and stored on install. Relative entries resolve against the origin.
    pub precache: Vec<String>,
    /// Cached page served to navigations when neither network nor runtime cache answers.
    pub shell_path: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: "vuanh".to_string(),
            version: "v1.0.0".to_string(),
            precache: [
                "/",
                "/index.html",
                "/css/style.css",
                "/js/main.js",
                "/js/i18n.js",
                "/js/form-handler.js",
                "/manifest.json",
                "/icons/icon-192x192.png",
                "/icons/icon-512x512.png",
                "/locales/vi.json",
                "/locales/en.json",
                "https://fonts.googleapis.com/css2?family=Inter:wght@300;400;500;600;700&display=swap",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            shell_path: "/index.html".to_string(),
        }
    }
}

impl CacheConfig {
    /// Name of the current precache generation, e.g. `vuanh-v1.0.0`.
    #[must_use]
    pub fn precache_name(&self) -> String {
        format!("{}-{}", self.prefix, self.version)
    }

    /// Name of the runtime cache, which survives generation changes.
    #[must_use]
    pub fn runtime_name(&self) -> String {
        format!("{}-runtime", self.prefix)
    }

    /// Sets the generation tag.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Replaces the precache manifest.
    #[must_use]
    pub fn with_precache<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.precache = entries.into_iter().map(Into::into).collect();
        self
    }
}

/// Submission queue replay and rate limiting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Pause between two replayed submissions, in milliseconds.
    pub replay_delay_ms: u64,
    /// Attempts allowed per form inside one rate-limit window.
    pub rate_limit_max_attempts: usize,
    /// Length of the sliding rate-limit window, in milliseconds.
    pub rate_limit_window_ms: u64,
    /// Identity of the contact form, used as the rate limiter key.
    pub form_id: String,
    /// Background sync tag the cache controller answers to.
    pub sync_tag: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            replay_delay_ms: 1000,
            rate_limit_max_attempts: 3,
            rate_limit_window_ms: 300_000,
            form_id: "contact-form".to_string(),
            sync_tag: "sync-form-submissions".to_string(),
        }
    }
}

impl QueueConfig {
    /// Pause between two replayed submissions.
    #[must_use]
    pub const fn replay_delay(&self) -> Duration {
        Duration::from_millis(self.replay_delay_ms)
    }

    /// Length of the sliding rate-limit window.
    #[must_use]
    pub const fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_ms)
    }

    /// Sets the replay delay.
    #[must_use]
    pub const fn with_replay_delay_ms(mut self, ms: u64) -> Self {
        self.replay_delay_ms = ms;
        self
    }

    /// Sets the rate limit.
    #[must_use]
    pub const fn with_rate_limit(mut self, max_attempts: usize, window_ms: u64) -> Self {
        self.rate_limit_max_attempts = max_attempts;
        self.rate_limit_window_ms = window_ms;
        self
    }
}

/// Where durable state lives on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the submission queue and the disk cache.
    pub state_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
        }
    }
}

impl StorageConfig {
    /// Directory of the disk-backed cache store.
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.state_dir.join("caches")
    }

    /// Directory of the key-value storage.
    #[must_use]
    pub fn kv_dir(&self) -> PathBuf {
        self.state_dir.join("storage")
    }
}

/// Uses `STATE_DIRECTORY` (set by systemd when `StateDirectory=` is configured),
/// falling back to `$XDG_DATA_HOME/vuanh` for interactive use.
fn default_state_dir() -> PathBuf {
    std::env::var("STATE_DIRECTORY").map_or_else(
        |_| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("vuanh")
        },
        PathBuf::from,
    )
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Site identity and form relay.
    pub site: SiteConfig,
    /// Cache naming and manifest.
    pub cache: CacheConfig,
    /// Queue replay and rate limiting.
    pub queue: QueueConfig,
    /// Durable state location.
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default location of the config file: `$VUANH_CONFIG`, else
    /// `$XDG_CONFIG_HOME/vuanh/config.toml`.
    #[must_use]
    pub fn config_path() -> PathBuf {
        std::env::var("VUANH_CONFIG").map_or_else(
            |_| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("vuanh")
                    .join("config.toml")
            },
            PathBuf::from,
        )
    }

    /// Loads configuration from the default path, or defaults if no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if path.exists() {
            Self::from_file(&path)
        } else {
            log::debug!("No config file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from a TOML string. Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the string is not valid TOML for this shape.
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cache_names() {
        let config = CacheConfig::default();
        assert_eq!(config.precache_name(), "vuanh-v1.0.0");
        assert_eq!(config.runtime_name(), "vuanh-runtime");
    }

    #[test]
    fn cache_version_builder() {
        let config = CacheConfig::default().with_version("v2.0.0");
        assert_eq!(config.precache_name(), "vuanh-v2.0.0");
        assert_eq!(config.runtime_name(), "vuanh-runtime");
    }

    #[test]
    fn default_manifest_has_one_external_font() {
        let config = CacheConfig::default();
        let external: Vec<_> = config
            .precache
            .iter()
            .filter(|u| u.starts_with("https://"))
            .collect();
        assert_eq!(external.len(), 1);
        assert!(external[0].contains("fonts.googleapis.com"));
    }

    #[test]
    fn default_queue_config() {
        let config = QueueConfig::default();
        assert_eq!(config.replay_delay(), Duration::from_secs(1));
        assert_eq!(config.rate_limit_max_attempts, 3);
        assert_eq!(config.rate_limit_window(), Duration::from_secs(300));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [site]
            origin = "https://vuanh.example"

            [cache]
            version = "v1.2.3"
            "#,
        )
        .unwrap();
        assert_eq!(config.site.origin, "https://vuanh.example");
        assert_eq!(config.cache.precache_name(), "vuanh-v1.2.3");
        assert_eq!(config.queue.form_id, "contact-form");
        assert!(!config.cache.precache.is_empty());
    }

    #[test]
    fn malformed_toml_is_config_error() {
        let err = AppConfig::from_toml("[site\norigin = 1").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let loaded = AppConfig::from_toml(&toml_str).unwrap();
        assert_eq!(loaded.cache.precache, config.cache.precache);
        assert_eq!(loaded.queue.sync_tag, config.queue.sync_tag);
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[queue]\nreplay_delay_ms = 250\n").unwrap();
        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.queue.replay_delay_ms, 250);
    }

    #[test]
    fn storage_dirs_are_under_state_dir() {
        let config = StorageConfig {
            state_dir: PathBuf::from("/var/lib/vuanh"),
        };
        assert_eq!(config.cache_dir(), PathBuf::from("/var/lib/vuanh/caches"));
        assert_eq!(config.kv_dir(), PathBuf::from("/var/lib/vuanh/storage"));
    }
}
