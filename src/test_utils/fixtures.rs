use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::TempDir;

use crate::clock::{CalendarZone, Clock, ManualClock};
use crate::engine::{AdEngine, EventReporter, ReportKind};
use crate::error::{AdError, Result};
use crate::policy::{AdPolicy, KindPolicy};
use crate::storage::{KeyValueStore, MemoryStore};

/// 2024-05-01T08:00:00Z
pub const FIXTURE_START_MS: i64 = 1_714_550_400_000;

/// Every kind enabled, no caps, no cooldowns, no gap.
#[must_use]
pub fn permissive_policy() -> AdPolicy {
    AdPolicy {
        id: Some(1),
        app_id: Some(crate::engine::DEFAULT_APP_ID.to_string()),
        active: true,
        app_open: KindPolicy::unlimited(true),
        interstitial: KindPolicy::unlimited(true),
        banner: KindPolicy::unlimited(true),
        min_fullscreen_gap_seconds: 0,
    }
}

/// Store whose every operation fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingStore;

impl KeyValueStore for FailingStore {
    fn get_int(&self, key: &str, _default: i32) -> Result<i32> {
        Err(AdError::Storage(format!("read {key}: disk unavailable")))
    }

    fn put_int(&self, key: &str, _value: i32) -> Result<()> {
        Err(AdError::Storage(format!("write {key}: disk unavailable")))
    }

    fn get_long(&self, key: &str, _default: i64) -> Result<i64> {
        Err(AdError::Storage(format!("read {key}: disk unavailable")))
    }

    fn put_long(&self, key: &str, _value: i64) -> Result<()> {
        Err(AdError::Storage(format!("write {key}: disk unavailable")))
    }
}

/// Reporter that keeps every event for assertions.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<ReportKind>>,
}

impl RecordingReporter {
    #[must_use]
    pub fn events(&self) -> Vec<ReportKind> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventReporter for RecordingReporter {
    fn report(&self, event: ReportKind) {
        self.events.lock().push(event);
    }
}

/// Engine on a manual UTC clock and a shared in-memory store.
pub struct EngineFixture {
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryStore>,
    pub reporter: Arc<RecordingReporter>,
    pub engine: AdEngine,
}

impl Default for EngineFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineFixture {
    #[must_use]
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::new(FIXTURE_START_MS));
        let store = Arc::new(MemoryStore::new());
        let reporter = Arc::new(RecordingReporter::default());
        let engine = build(&clock, &store, &reporter, None);
        Self {
            clock,
            store,
            reporter,
            engine,
        }
    }

    #[must_use]
    pub fn with_policy(policy: AdPolicy) -> Self {
        let mut fixture = Self::new();
        fixture.engine = build(&fixture.clock, &fixture.store, &fixture.reporter, Some(policy));
        fixture
    }

    /// Simulate a process restart: a fresh engine over the same store and clock.
    #[must_use]
    pub fn restart(self, policy: Option<AdPolicy>) -> Self {
        let Self {
            clock,
            store,
            reporter,
            engine,
        } = self;
        engine.flush();
        drop(engine);
        let engine = build(&clock, &store, &reporter, policy);
        Self {
            clock,
            store,
            reporter,
            engine,
        }
    }
}

fn build(
    clock: &Arc<ManualClock>,
    store: &Arc<MemoryStore>,
    reporter: &Arc<RecordingReporter>,
    policy: Option<AdPolicy>,
) -> AdEngine {
    let mut builder = AdEngine::builder()
        .clock(Arc::clone(clock) as Arc<dyn Clock>)
        .store(Arc::clone(store) as Arc<dyn KeyValueStore>)
        .reporter(Arc::clone(reporter) as Arc<dyn EventReporter>)
        .zone(CalendarZone::utc());
    if let Some(policy) = policy {
        builder = builder.policy(policy);
    }
    builder.build()
}

/// Isolated directory used as an adgate root.
pub struct RootFixture {
    pub temp_dir: TempDir,
    pub root: PathBuf,
}

impl RootFixture {
    /// Panics if the temp dir cannot be created; test-only.
    #[must_use]
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().join(".adgate");
        std::fs::create_dir_all(&root).expect("Failed to create root dir");
        Self { temp_dir, root }
    }

    /// Write a file under the root, creating parent directories.
    #[must_use]
    pub fn create_file(&self, relative_path: &str, content: &str) -> PathBuf {
        let full_path = self.root.join(relative_path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        std::fs::write(&full_path, content).expect("Failed to write file");
        full_path
    }
}

impl Default for RootFixture {
    fn default() -> Self {
        Self::new()
    }
}
