use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::Config;
use crate::engine::AdEngine;
use crate::error::{AdError, Result};
use crate::policy::refresh::restore_from_cache;
use crate::policy::{FilePolicySource, PolicyCache, PolicyRefresher};
use crate::storage::{KeyValueStore, SqliteStore};

/// Composition root for the CLI: configuration, the on-disk state and the
/// engine built over it.
pub struct AppContext {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub config: Config,
    pub engine: Arc<AdEngine>,
    pub cache: PolicyCache,
    pub robot_mode: bool,
    pub verbosity: u8,
}

impl AppContext {
    pub fn from_cli(cli: &crate::cli::Cli) -> Result<Self> {
        let root = Self::find_root()?;
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| default_config_path(&root));
        let config = Config::load(cli.config.as_deref(), &root)?;
        Self::open(root, config_path, config, cli.robot, cli.verbose)
    }

    /// Build the context for an already loaded configuration.
    pub fn open(
        root: PathBuf,
        config_path: PathBuf,
        config: Config,
        robot_mode: bool,
        verbosity: u8,
    ) -> Result<Self> {
        let store = SqliteStore::open(config.state_path(&root))?;
        let engine = AdEngine::builder()
            .store(Arc::new(store) as Arc<dyn KeyValueStore>)
            .zone(config.engine.zone()?)
            .write_behind(config.engine.write_behind)
            .app_id(config.engine.app_id.clone())
            .build();
        let cache = PolicyCache::new(
            config.policy_cache_path(&root),
            config.storage.policy_cache_ttl_seconds,
        );

        let ctx = Self {
            root,
            config_path,
            config,
            engine: Arc::new(engine),
            cache,
            robot_mode,
            verbosity,
        };
        let restored = ctx.restore_cached_policy();
        debug!(root = %ctx.root.display(), restored, "app context ready");
        Ok(ctx)
    }

    /// Apply the cached policy document if it is still within its TTL.
    pub fn restore_cached_policy(&self) -> bool {
        restore_from_cache(&self.engine, &self.cache)
    }

    /// Refresher over the configured file source, or an explicit override.
    pub fn refresher(&self, source_override: Option<&Path>) -> Result<PolicyRefresher> {
        let source = source_override
            .map(Path::to_path_buf)
            .or_else(|| self.config.policy_source_path(&self.root))
            .ok_or_else(|| {
                AdError::MissingConfig(
                    "no policy source configured (set refresh.source_path or pass --source)"
                        .to_string(),
                )
            })?;
        Ok(
            PolicyRefresher::new(Arc::clone(&self.engine), Arc::new(FilePolicySource::new(source)))
                .with_cache(self.cache.clone())
                .with_interval(Duration::from_secs(self.config.refresh.interval_seconds)),
        )
    }

    fn find_root() -> Result<PathBuf> {
        if let Ok(root) = std::env::var("ADGATE_ROOT") {
            return Ok(PathBuf::from(root));
        }
        let cwd = std::env::current_dir()?;
        if let Some(found) = find_upwards(&cwd, ".adgate") {
            return Ok(found);
        }

        let data_dir = dirs::data_dir()
            .ok_or_else(|| AdError::MissingConfig("data directory not found".to_string()))?;
        Ok(data_dir.join("adgate"))
    }
}

fn default_config_path(root: &Path) -> PathBuf {
    if root.ends_with(".adgate") {
        root.join("config.toml")
    } else {
        dirs::config_dir()
            .unwrap_or_else(|| root.to_path_buf())
            .join("adgate/config.toml")
    }
}

fn find_upwards(start: &Path, name: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_dir())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::AdKind;
    use crate::test_utils::RootFixture;

    fn open(fixture: &RootFixture) -> AppContext {
        AppContext::open(
            fixture.root.clone(),
            fixture.root.join("config.toml"),
            Config::default(),
            false,
            0,
        )
        .unwrap()
    }

    #[test]
    fn finds_root_directory_upwards() {
        let fixture = RootFixture::new();
        let nested = fixture.temp_dir.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();
        assert_eq!(find_upwards(&nested, ".adgate"), Some(fixture.root.clone()));
        assert_eq!(find_upwards(&nested, ".missing"), None);
    }

    #[test]
    fn counters_persist_between_contexts() {
        let fixture = RootFixture::new();
        {
            let ctx = open(&fixture);
            ctx.engine.apply_document(r#"{"ad_banner_enabled": true}"#);
            assert!(ctx.engine.reserve(AdKind::Banner));
            ctx.engine.flush();
        }
        let ctx = open(&fixture);
        assert_eq!(ctx.engine.counters(AdKind::Banner).0, 1);
        assert!(fixture.root.join("state.db").exists());
    }

    #[test]
    fn refresher_requires_a_source() {
        let fixture = RootFixture::new();
        let ctx = open(&fixture);
        assert!(matches!(ctx.refresher(None), Err(AdError::MissingConfig(_))));

        let source = fixture.create_file("policy.json", r#"{"ad_banner_enabled": true}"#);
        let refresher = ctx.refresher(Some(&source)).unwrap();
        refresher.refresh_once();
        assert!(ctx.engine.can_show(AdKind::Banner));

        // A later context picks the document up from the cache.
        let later = open(&fixture);
        assert!(later.engine.is_policy_loaded());
        assert!(later.engine.can_show(AdKind::Banner));
    }
}
