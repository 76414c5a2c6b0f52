use serde::{Deserialize, Serialize};

use std::future::Future;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{OutreachError, ParseError};

/// Default quiet window before a draft is written to the local cache.
pub const DEFAULT_FAST_DELAY_MS: u64 = 2_000;

/// Default quiet window before a draft is synced to the remote store.
pub const DEFAULT_SLOW_DELAY_MS: u64 = 10_000;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Debounce windows for the two persistence tiers.
    pub autosave: AutoSaveConfig,
    /// Local cache settings.
    pub cache: CacheConfig,
    /// Remote draft store settings.
    pub remote: RemoteConfig,
    /// Logging settings.
    pub telemetry: TelemetrySettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoSaveConfig {
    /// Quiet window for the local cache write, in milliseconds.
    pub fast_delay_ms: u64,
    /// Quiet window for the remote sync, in milliseconds.
    pub slow_delay_ms: u64,
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            fast_delay_ms: DEFAULT_FAST_DELAY_MS,
            slow_delay_ms: DEFAULT_SLOW_DELAY_MS,
        }
    }
}

impl AutoSaveConfig {
    pub fn fast_delay(&self) -> Duration {
        Duration::from_millis(self.fast_delay_ms)
    }

    pub fn slow_delay(&self) -> Duration {
        Duration::from_millis(self.slow_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory for file-backed local drafts. Defaults under the platform data dir.
    pub dir: Option<PathBuf>,
    /// How long an in-memory session cache entry survives.
    pub ttl_secs: u64,
    /// Capacity of the in-memory session cache.
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            ttl_secs: 24 * 60 * 60,
            max_entries: 256,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn dir_or_default(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| data_dir().join("local-drafts"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Directory for the file-backed remote store.
    pub dir: Option<PathBuf>,
}

impl RemoteConfig {
    pub fn dir_or_default(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| data_dir().join("remote-drafts"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Console log level, e.g. "debug". `RUST_LOG` still wins when set.
    pub log_level: Option<String>,
}

impl Config {
    /// Loads the configuration from the provided loader.
    pub async fn load(loader: &impl Loader) -> Result<Self, OutreachError> {
        let config = loader.load().await?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the configuration using the provided saver.
    pub async fn save(&self, saver: &impl Saver) -> Result<(), OutreachError> {
        saver.save(self).await
    }

    /// Parse TOML text, substituting `$VAR` references from the environment first.
    pub fn from_toml_str(name: &str, text: &str) -> Result<Self, OutreachError> {
        let text = substitute_env(text);
        toml::from_str(&text)
            .map_err(|e| ParseError::from_toml(name, text.clone(), &e).into())
    }

    pub fn from_json_str(name: &str, text: &str) -> Result<Self, OutreachError> {
        serde_json::from_str(text).map_err(|e| ParseError::from_json(name, text, &e).into())
    }

    /// Reject settings the engine can't work with.
    pub fn validate(&self) -> Result<(), OutreachError> {
        if self.autosave.fast_delay_ms == 0 || self.autosave.slow_delay_ms == 0 {
            return Err(OutreachError::InvalidConfig(
                "autosave delays must be greater than zero".into(),
            ));
        }
        if self.autosave.slow_delay_ms < self.autosave.fast_delay_ms {
            tracing::warn!(
                fast_delay_ms = self.autosave.fast_delay_ms,
                slow_delay_ms = self.autosave.slow_delay_ms,
                "remote sync window is shorter than local cache window"
            );
        }
        if self.cache.max_entries == 0 {
            return Err(OutreachError::InvalidConfig(
                "cache.max_entries must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Replace each `$NAME` with the value of that environment variable.
///
/// `NAME` is the longest run of `[A-Za-z0-9_]` after the `$` (not starting
/// with a digit). Unset names are left as written.
fn substitute_env(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let len = identifier_len(after);
        let name = &after[..len];
        match std::env::var(name) {
            Ok(value) if len > 0 => out.push_str(&value),
            _ => {
                out.push('$');
                out.push_str(name);
            }
        }
        rest = &after[len..];
    }
    out.push_str(rest);
    out
}

fn identifier_len(text: &str) -> usize {
    let bytes = text.as_bytes();
    match bytes.first() {
        Some(b) if b.is_ascii_alphabetic() || *b == b'_' => {}
        _ => return 0,
    }
    bytes
        .iter()
        .position(|b| !(b.is_ascii_alphanumeric() || *b == b'_'))
        .unwrap_or(bytes.len())
}

/// The trait for loading configuration data.
pub trait Loader {
    /// Loads the configuration data.
    fn load(&self) -> impl Future<Output = Result<Config, OutreachError>> + Send;
}

/// The trait for saving configuration data.
pub trait Saver {
    /// Saves the configuration data.
    fn save(&self, config: &Config) -> impl Future<Output = Result<(), OutreachError>> + Send;
}

/// An implementation of [`Loader`] and [`Saver`] that reads and writes a configuration file.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Create a new [`FileStore`] with the given path.
    ///
    /// [`Config`] data is serialized and deserialized based on the file extension,
    /// `.toml` or `.json`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn name(&self) -> String {
        self.path.display().to_string()
    }
}

impl Default for FileStore {
    fn default() -> Self {
        Self::new(config_dir().join("config.toml"))
    }
}

impl Loader for FileStore {
    async fn load(&self) -> Result<Config, OutreachError> {
        match self.path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => {
                Config::from_json_str(&self.name(), &std::fs::read_to_string(&self.path)?)
            }
            Some("toml") => {
                Config::from_toml_str(&self.name(), &std::fs::read_to_string(&self.path)?)
            }
            other => Err(OutreachError::UnsupportedFormat(
                other.unwrap_or("<none>").to_owned(),
            )),
        }
    }
}

impl Saver for FileStore {
    async fn save(&self, config: &Config) -> Result<(), OutreachError> {
        let text = match self.path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::to_string_pretty(config)?,
            Some("toml") => toml::to_string_pretty(config)?,
            other => {
                return Err(OutreachError::UnsupportedFormat(
                    other.unwrap_or("<none>").to_owned(),
                ));
            }
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, text)?;
        Ok(())
    }
}

pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("./"))
        .join("outreach")
}

pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("./"))
        .join("outreach")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.autosave.fast_delay(), Duration::from_millis(2_000));
        assert_eq!(config.autosave.slow_delay(), Duration::from_millis(10_000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = Config::from_toml_str("t.toml", "[autosave]\nfast_delay_ms = 500\n").unwrap();
        assert_eq!(config.autosave.fast_delay_ms, 500);
        assert_eq!(config.autosave.slow_delay_ms, DEFAULT_SLOW_DELAY_MS);
        assert_eq!(config.cache.max_entries, 256);
    }

    #[test]
    fn test_env_substitution_matches_whole_names() {
        // SAFETY: these names are used by no other test.
        unsafe {
            std::env::set_var("OUTREACH_PX", "short");
            std::env::set_var("OUTREACH_PXDIR", "/long/dir");
        }
        let config = Config::from_toml_str("t.toml", "[cache]\ndir = \"$OUTREACH_PXDIR\"\n")
            .unwrap();
        assert_eq!(config.cache.dir, Some(PathBuf::from("/long/dir")));

        assert_eq!(substitute_env("$OUTREACH_PX/x"), "short/x");
        assert_eq!(substitute_env("$OUTREACH_PX_UNSET and $"), "$OUTREACH_PX_UNSET and $");
        assert_eq!(substitute_env("cost: $5"), "cost: $5");
    }

    #[test]
    fn test_toml_parse_error_has_message() {
        let err = Config::from_toml_str("t.toml", "[autosave]\nfast_delay_ms = \"soon\"\n")
            .unwrap_err();
        match err {
            OutreachError::Parse(parse) => assert!(!parse.message().is_empty()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_zero_delay_rejected() {
        let mut config = Config::default();
        config.autosave.fast_delay_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(OutreachError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_file_store_roundtrip_toml() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested/config.toml"));
        let mut config = Config::default();
        config.autosave.slow_delay_ms = 30_000;
        config.telemetry.log_level = Some("debug".into());

        config.save(&store).await.unwrap();
        let loaded = Config::load(&store).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_file_store_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"autosave": {"slow_delay_ms": 4000}}"#).unwrap();
        let loaded = Config::load(&FileStore::new(&path)).await.unwrap();
        assert_eq!(loaded.autosave.slow_delay_ms, 4000);
        assert_eq!(loaded.autosave.fast_delay_ms, DEFAULT_FAST_DELAY_MS);
    }

    #[tokio::test]
    async fn test_unsupported_extension() {
        let store = FileStore::new("/tmp/outreach-config.yaml");
        assert!(matches!(
            Config::load(&store).await,
            Err(OutreachError::UnsupportedFormat(_))
        ));
    }
}
