use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::clock::CalendarZone;
use crate::engine::DEFAULT_APP_ID;
use crate::error::{AdError, Result};
use crate::policy::cache::DEFAULT_TTL_SECONDS;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
}

impl Config {
    /// Defaults, then either the explicit file (`--config` / `ADGATE_CONFIG`)
    /// or the global and project files, then `ADGATE_*` overrides.
    pub fn load(explicit_path: Option<&Path>, root: &Path) -> Result<Self> {
        let explicit = explicit_path
            .map(PathBuf::from)
            .or_else(|| std::env::var("ADGATE_CONFIG").ok().map(PathBuf::from));
        let global = if explicit.is_some() {
            None
        } else {
            dirs::config_dir().map(|dir| dir.join("adgate/config.toml"))
        };
        Self::load_layers(explicit.as_deref(), global.as_deref(), root, env_lookup)
    }

    fn load_layers(
        explicit: Option<&Path>,
        global: Option<&Path>,
        root: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = explicit {
            let patch = Self::load_patch(path)?.ok_or_else(|| {
                AdError::MissingConfig(format!("config file not found: {}", path.display()))
            })?;
            config.merge_patch(patch);
        } else {
            if let Some(patch) = global.map(Self::load_patch).transpose()?.flatten() {
                config.merge_patch(patch);
            }
            if let Some(patch) = Self::load_patch(&root.join("config.toml"))? {
                config.merge_patch(patch);
            }
        }

        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    fn load_patch(path: &Path) -> Result<Option<ConfigPatch>> {
        if !path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|err| AdError::Config(format!("read config {}: {err}", path.display())))?;
        let patch = toml::from_str(&raw)
            .map_err(|err| AdError::Config(format!("parse config {}: {err}", path.display())))?;
        Ok(Some(patch))
    }

    fn merge_patch(&mut self, patch: ConfigPatch) {
        if let Some(patch) = patch.engine {
            self.engine.merge(patch);
        }
        if let Some(patch) = patch.storage {
            self.storage.merge(patch);
        }
        if let Some(patch) = patch.refresh {
            self.refresh.merge(patch);
        }
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(value) = lookup("ADGATE_APP_ID") {
            self.engine.app_id = value;
        }
        if let Some(value) = lookup("ADGATE_TIMEZONE") {
            self.engine.timezone = value;
        }
        if let Some(value) = lookup("ADGATE_WRITE_BEHIND") {
            self.engine.write_behind = parse_bool(&value);
        }
        if let Some(value) = lookup("ADGATE_STATE_PATH") {
            self.storage.state_path = PathBuf::from(value);
        }
        if let Some(value) = lookup("ADGATE_POLICY_CACHE_PATH") {
            self.storage.policy_cache_path = PathBuf::from(value);
        }
        if let Some(value) = parse_u64(&lookup, "ADGATE_POLICY_CACHE_TTL")? {
            self.storage.policy_cache_ttl_seconds = value;
        }
        if let Some(value) = parse_u64(&lookup, "ADGATE_REFRESH_INTERVAL")? {
            self.refresh.interval_seconds = value;
        }
        if let Some(value) = lookup("ADGATE_POLICY_SOURCE") {
            self.refresh.source_path = Some(PathBuf::from(value));
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.engine.app_id.trim().is_empty() {
            return Err(AdError::Config("engine.app_id must not be empty".to_string()));
        }
        if self.refresh.interval_seconds == 0 {
            return Err(AdError::Config("refresh.interval_seconds must be positive".to_string()));
        }
        self.engine.zone()?;
        Ok(())
    }

    pub fn state_path(&self, root: &Path) -> PathBuf {
        resolve(root, &self.storage.state_path)
    }

    pub fn policy_cache_path(&self, root: &Path) -> PathBuf {
        resolve(root, &self.storage.policy_cache_path)
    }

    pub fn policy_source_path(&self, root: &Path) -> Option<PathBuf> {
        self.refresh.source_path.as_deref().map(|path| resolve(root, path))
    }
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub app_id: String,
    /// `local`, `utc`, or a fixed offset such as `+09:00`.
    #[serde(default)]
    pub timezone: String,
    /// Queue state writes on a background thread; `flush` drains them.
    #[serde(default = "default_write_behind")]
    pub write_behind: bool,
}

const fn default_write_behind() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            app_id: DEFAULT_APP_ID.to_string(),
            timezone: "local".to_string(),
            write_behind: default_write_behind(),
        }
    }
}

impl EngineConfig {
    fn merge(&mut self, patch: EnginePatch) {
        if let Some(value) = patch.app_id {
            self.app_id = value;
        }
        if let Some(value) = patch.timezone {
            self.timezone = value;
        }
        if let Some(value) = patch.write_behind {
            self.write_behind = value;
        }
    }

    pub fn zone(&self) -> Result<CalendarZone> {
        CalendarZone::parse(&self.timezone)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub state_path: PathBuf,
    #[serde(default)]
    pub policy_cache_path: PathBuf,
    #[serde(default)]
    pub policy_cache_ttl_seconds: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from("state.db"),
            policy_cache_path: PathBuf::from("policy_cache.json"),
            policy_cache_ttl_seconds: DEFAULT_TTL_SECONDS,
        }
    }
}

impl StorageConfig {
    fn merge(&mut self, patch: StoragePatch) {
        if let Some(value) = patch.state_path {
            self.state_path = value;
        }
        if let Some(value) = patch.policy_cache_path {
            self.policy_cache_path = value;
        }
        if let Some(value) = patch.policy_cache_ttl_seconds {
            self.policy_cache_ttl_seconds = value;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    #[serde(default)]
    pub interval_seconds: u64,
    /// Policy document read by `adgate refresh`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 3600,
            source_path: None,
        }
    }
}

impl RefreshConfig {
    fn merge(&mut self, patch: RefreshPatch) {
        if let Some(value) = patch.interval_seconds {
            self.interval_seconds = value;
        }
        if let Some(value) = patch.source_path {
            self.source_path = Some(value);
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigPatch {
    pub engine: Option<EnginePatch>,
    pub storage: Option<StoragePatch>,
    pub refresh: Option<RefreshPatch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct EnginePatch {
    pub app_id: Option<String>,
    pub timezone: Option<String>,
    pub write_behind: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct StoragePatch {
    pub state_path: Option<PathBuf>,
    pub policy_cache_path: Option<PathBuf>,
    pub policy_cache_ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RefreshPatch {
    pub interval_seconds: Option<u64>,
    pub source_path: Option<PathBuf>,
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<u64>> {
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|err| AdError::Config(format!("invalid {key} value {value}: {err}"))),
        None => Ok(None),
    }
}
