//! Background policy refresh.
//!
//! A [`PolicySource`] yields the raw document; the refresher parses it,
//! caches good documents and hands the result to the engine. An unreachable
//! source or an empty body leaves the current policy in place, while a
//! malformed body applies the fail-closed default.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::AdEngine;
use crate::error::Result;

use super::cache::PolicyCache;
use super::document::parse_policy;
use super::model::AdPolicy;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Where policy documents come from.
pub trait PolicySource: Send + Sync {
    /// `Ok(None)` means the source answered with nothing.
    fn fetch(&self) -> Result<Option<String>>;

    fn describe(&self) -> String;
}

/// Reads the document from a local file.
#[derive(Debug, Clone)]
pub struct FilePolicySource {
    path: PathBuf,
}

impl FilePolicySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PolicySource for FilePolicySource {
    fn fetch(&self) -> Result<Option<String>> {
        let body = std::fs::read_to_string(&self.path)?;
        Ok(Some(body))
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

/// In-process source whose body can be swapped at runtime.
#[derive(Debug, Default)]
pub struct StaticPolicySource {
    body: Mutex<Option<String>>,
}

impl StaticPolicySource {
    pub fn new(body: Option<String>) -> Self {
        Self {
            body: Mutex::new(body),
        }
    }

    pub fn set_body(&self, body: Option<String>) {
        *self.body.lock() = body;
    }
}

impl PolicySource for StaticPolicySource {
    fn fetch(&self) -> Result<Option<String>> {
        Ok(self.body.lock().clone())
    }

    fn describe(&self) -> String {
        "static".to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Document parsed and applied.
    Applied { changed: bool },
    /// Document was malformed; the fail-closed default was applied.
    FailClosed { changed: bool },
    /// Source answered with an empty body; nothing changed.
    Kept,
    /// Source could not be reached; nothing changed.
    FetchFailed(String),
}

impl RefreshOutcome {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Applied { .. } => "applied",
            Self::FailClosed { .. } => "fail_closed",
            Self::Kept => "kept",
            Self::FetchFailed(_) => "fetch_failed",
        }
    }
}

/// Apply `cache`'s document to `engine` if it is within its TTL.
pub fn restore_from_cache(engine: &AdEngine, cache: &PolicyCache) -> bool {
    match cache.load(engine.now_ms()) {
        Ok(Some(cached)) => {
            let change = engine.apply_document(&cached.document);
            debug!(
                age_ms = cached.age_ms(engine.now_ms()),
                changed = change.changed,
                "restored cached policy"
            );
            true
        }
        Ok(None) => false,
        Err(err) => {
            warn!(error = %err, "policy cache unreadable; staying on current policy");
            false
        }
    }
}

pub struct PolicyRefresher {
    engine: Arc<AdEngine>,
    source: Arc<dyn PolicySource>,
    cache: Option<PolicyCache>,
    interval: Duration,
}

impl PolicyRefresher {
    pub fn new(engine: Arc<AdEngine>, source: Arc<dyn PolicySource>) -> Self {
        Self {
            engine,
            source,
            cache: None,
            interval: DEFAULT_REFRESH_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_cache(mut self, cache: PolicyCache) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Apply the cached document if it is still fresh. Returns whether one was applied.
    pub fn restore_cached(&self) -> bool {
        self.cache
            .as_ref()
            .is_some_and(|cache| restore_from_cache(&self.engine, cache))
    }

    /// One fetch, parse, cache and apply cycle.
    pub fn refresh_once(&self) -> RefreshOutcome {
        let body = match self.source.fetch() {
            Ok(Some(body)) if !body.trim().is_empty() => body,
            Ok(_) => {
                debug!(source = %self.source.describe(), "empty policy response; keeping current policy");
                return RefreshOutcome::Kept;
            }
            Err(err) => {
                warn!(source = %self.source.describe(), error = %err, "policy fetch failed; keeping current policy");
                return RefreshOutcome::FetchFailed(err.to_string());
            }
        };

        match parse_policy(&body, self.engine.app_id()) {
            Ok(policy) => {
                if let Some(cache) = &self.cache {
                    if let Err(err) = cache.store(&body, self.engine.now_ms()) {
                        warn!(error = %err, "failed to cache policy document");
                    }
                }
                let change = self.engine.set_policy(policy);
                info!(source = %self.source.describe(), changed = change.changed, "policy refreshed");
                RefreshOutcome::Applied {
                    changed: change.changed,
                }
            }
            Err(err) => {
                warn!(source = %self.source.describe(), error = %err, "policy document rejected; applying fail-closed default");
                let change = self.engine.set_policy(AdPolicy::fail_closed());
                RefreshOutcome::FailClosed {
                    changed: change.changed,
                }
            }
        }
    }

    /// Refresh on the configured interval until `shutdown` flips to true or
    /// its sender is dropped. The first refresh runs immediately.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let refresher = Arc::clone(&self);
                        match tokio::task::spawn_blocking(move || refresher.refresh_once()).await {
                            Ok(outcome) => debug!(outcome = outcome.as_str(), "scheduled policy refresh"),
                            Err(err) => warn!(error = %err, "policy refresh task failed"),
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            debug!("policy refresher stopping");
                            break;
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AdError;
    use crate::kind::AdKind;
    use crate::test_utils::EngineFixture;
    use tempfile::tempdir;

    struct Unreachable;

    impl PolicySource for Unreachable {
        fn fetch(&self) -> Result<Option<String>> {
            Err(AdError::Policy("connection refused".to_string()))
        }

        fn describe(&self) -> String {
            "unreachable".to_string()
        }
    }

    const BANNER_ON: &str = r#"{"ad_banner_enabled": true}"#;

    #[test]
    fn unreachable_source_keeps_last_policy() {
        let fixture = EngineFixture::new();
        let engine = Arc::new(fixture.engine);
        engine.apply_document(BANNER_ON);

        let refresher = PolicyRefresher::new(Arc::clone(&engine), Arc::new(Unreachable));
        assert!(matches!(refresher.refresh_once(), RefreshOutcome::FetchFailed(_)));
        assert!(engine.can_show(AdKind::Banner));
    }

    #[test]
    fn empty_body_keeps_policy_but_malformed_fails_closed() {
        let engine = Arc::new(EngineFixture::new().engine);
        let source = Arc::new(StaticPolicySource::new(Some(BANNER_ON.to_string())));
        let refresher = PolicyRefresher::new(Arc::clone(&engine), source.clone());

        assert_eq!(refresher.refresh_once(), RefreshOutcome::Applied { changed: true });
        source.set_body(Some("  ".to_string()));
        assert_eq!(refresher.refresh_once(), RefreshOutcome::Kept);
        assert!(engine.can_show(AdKind::Banner));

        source.set_body(Some("{broken".to_string()));
        assert_eq!(refresher.refresh_once(), RefreshOutcome::FailClosed { changed: true });
        assert!(!engine.can_show(AdKind::Banner));
    }

    #[test]
    fn good_documents_are_cached_and_restored() {
        let dir = tempdir().unwrap();
        let cache = PolicyCache::new(dir.path().join("policy.json"), 3600);
        let source = Arc::new(StaticPolicySource::new(Some(BANNER_ON.to_string())));
        {
            let engine = Arc::new(EngineFixture::new().engine);
            let refresher = PolicyRefresher::new(engine, source.clone()).with_cache(cache.clone());
            refresher.refresh_once();
        }

        let engine = Arc::new(EngineFixture::new().engine);
        let refresher = PolicyRefresher::new(Arc::clone(&engine), source).with_cache(cache);
        assert!(refresher.restore_cached());
        assert!(engine.can_show(AdKind::Banner));
    }

    #[tokio::test]
    async fn spawned_refresher_applies_and_stops() {
        let engine = Arc::new(EngineFixture::new().engine);
        let source = Arc::new(StaticPolicySource::new(Some(BANNER_ON.to_string())));
        let (_sub, rx) = engine.subscribe_channel(crate::engine::Topics::only(&[
            crate::engine::Topic::BannerReload,
        ]));
        let refresher = Arc::new(
            PolicyRefresher::new(Arc::clone(&engine), source).with_interval(Duration::from_millis(10)),
        );
        let (tx, shutdown) = watch::channel(false);
        let handle = refresher.spawn(shutdown);

        let event = tokio::task::spawn_blocking(move || rx.recv_timeout(Duration::from_secs(5)))
            .await
            .unwrap();
        assert!(event.is_ok());
        assert!(engine.can_show(AdKind::Banner));

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
