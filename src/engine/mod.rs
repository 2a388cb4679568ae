//! The ad engine: policy, limits, reservations and exclusivity behind one
//! caller-facing value.
//!
//! A caller that wants to show an ad either drives the primitives itself
//! (`can_show`, `reserve`, SDK show, then `record_shown` or `unreserve`) or
//! uses [`AdEngine::begin_show`] / [`AdEngine::abort_show`], which add the
//! optimistic banner hide for full-screen kinds.

pub mod denial;
pub mod events;
pub mod gate;
pub mod hub;
pub mod report;
pub mod reservation;

use std::sync::Arc;

use crossbeam_channel::Receiver;
use serde::Serialize;
use tracing::debug;

use crate::clock::{CalendarZone, Clock, SystemClock};
use crate::kind::AdKind;
use crate::policy::{AdPolicy, Limit, PolicyChange, PolicyStore, parse_policy_or_fail_closed};
use crate::storage::{KeyValueStore, MemoryStore, Persistence};

pub use denial::Denial;
pub use events::{AdEvent, Topic, Topics};
pub use gate::{ExclusivityGate, GateFlag, GateTransition};
pub use hub::{ListenerHub, Subscription};
pub use report::{EventReporter, ReportKind, TracingReporter};
pub use reservation::{KindState, ReservationCoordinator};

pub const DEFAULT_APP_ID: &str = "alcoholictimer";

pub struct AdEngineBuilder {
    store: Option<Arc<dyn KeyValueStore>>,
    clock: Option<Arc<dyn Clock>>,
    reporter: Option<Arc<dyn EventReporter>>,
    zone: CalendarZone,
    write_behind: bool,
    app_id: String,
    policy: Option<AdPolicy>,
}

impl Default for AdEngineBuilder {
    fn default() -> Self {
        Self {
            store: None,
            clock: None,
            reporter: None,
            zone: CalendarZone::Local,
            write_behind: false,
            app_id: DEFAULT_APP_ID.to_string(),
            policy: None,
        }
    }
}

impl AdEngineBuilder {
    #[must_use]
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    #[must_use]
    pub fn reporter(mut self, reporter: Arc<dyn EventReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    #[must_use]
    pub const fn zone(mut self, zone: CalendarZone) -> Self {
        self.zone = zone;
        self
    }

    #[must_use]
    pub const fn write_behind(mut self, enabled: bool) -> Self {
        self.write_behind = enabled;
        self
    }

    #[must_use]
    pub fn app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = app_id.into();
        self
    }

    /// Policy applied at construction instead of the fail-closed default.
    #[must_use]
    pub fn policy(mut self, policy: AdPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn build(self) -> AdEngine {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn KeyValueStore>);
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let reporter = self
            .reporter
            .unwrap_or_else(|| Arc::new(TracingReporter) as Arc<dyn EventReporter>);

        let persistence = Arc::new(if self.write_behind {
            Persistence::write_behind(store)
        } else {
            Persistence::inline(store)
        });
        let hub = ListenerHub::new();
        let policy = Arc::new(PolicyStore::new(hub.clone()));
        if let Some(initial) = self.policy {
            policy.set(initial);
        }
        let coordinator = Arc::new(ReservationCoordinator::new(
            Arc::clone(&policy),
            Arc::clone(&persistence),
            Arc::clone(&clock),
            self.zone,
        ));
        let gate = ExclusivityGate::new(Arc::clone(&coordinator), hub.clone(), Arc::clone(&clock));

        debug!(app_id = %self.app_id, write_behind = self.write_behind, "ad engine ready");
        AdEngine {
            app_id: self.app_id,
            zone: self.zone,
            clock,
            hub,
            policy,
            coordinator,
            gate,
            persistence,
            reporter,
        }
    }
}

pub struct AdEngine {
    app_id: String,
    zone: CalendarZone,
    clock: Arc<dyn Clock>,
    hub: ListenerHub,
    policy: Arc<PolicyStore>,
    coordinator: Arc<ReservationCoordinator>,
    gate: ExclusivityGate,
    persistence: Arc<Persistence>,
    reporter: Arc<dyn EventReporter>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KindSnapshot {
    pub kind: AdKind,
    pub enabled: bool,
    pub hour_count: u32,
    pub day_count: u32,
    pub max_per_hour: Limit,
    pub max_per_day: Limit,
    pub cooldown_seconds: u32,
    pub last_shown_at: i64,
    pub last_attempt_at: i64,
    pub outstanding: u32,
    pub denial: Option<Denial>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    pub now_ms: i64,
    pub app_id: String,
    pub policy_loaded: bool,
    pub policy: AdPolicy,
    pub full_screen_showing: bool,
    pub banner_force_hidden: bool,
    pub last_full_screen_dismissed_at: i64,
    pub kinds: Vec<KindSnapshot>,
    pub transitions: Vec<GateTransition>,
}

impl AdEngine {
    pub fn builder() -> AdEngineBuilder {
        AdEngineBuilder::default()
    }

    /// Engine on an in-memory store with the system clock.
    pub fn in_memory() -> Self {
        Self::builder().build()
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub const fn zone(&self) -> CalendarZone {
        self.zone
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    // --- eligibility -------------------------------------------------------

    /// Gate veto, then policy, caps, cooldown and full-screen gap.
    pub fn eligibility(&self, kind: AdKind) -> Result<(), Denial> {
        if let Some(denial) = self.gate.veto(kind) {
            return Err(denial);
        }
        self.coordinator.check(kind)
    }

    pub fn can_show(&self, kind: AdKind) -> bool {
        self.eligibility(kind).is_ok()
    }

    // --- reservations ------------------------------------------------------

    pub fn reserve(&self, kind: AdKind) -> bool {
        self.reserve_detailed(kind).is_ok()
    }

    pub fn reserve_detailed(&self, kind: AdKind) -> Result<(), Denial> {
        let result = self.coordinator.reserve_detailed(kind);
        match result {
            Ok(()) => self.reporter.report(ReportKind::Reserved { kind }),
            Err(denial) => self.reporter.report(ReportKind::ReserveDenied { kind, denial }),
        }
        result
    }

    /// Release a reservation whose show failed. Callers own this; there is
    /// no timeout that releases it for them.
    pub fn unreserve(&self, kind: AdKind) {
        self.coordinator.unreserve(kind);
        self.reporter.report(ReportKind::Unreserved { kind });
    }

    /// Confirmed show. Full-screen kinds also take the exclusivity gate.
    pub fn record_shown(&self, kind: AdKind) {
        if self.coordinator.record_shown(kind) {
            self.reporter.report(ReportKind::Shown { kind });
        } else {
            debug!(kind = %kind, "record_shown without outstanding reservation");
            self.reporter.report(ReportKind::ShownWithoutReservation { kind });
        }
        if kind.is_full_screen() {
            self.gate.set_full_screen_showing(true);
        }
    }

    /// Confirmed dismissal of the full-screen ad.
    pub fn record_dismissed(&self) {
        if !self.gate.set_full_screen_showing(false) {
            self.coordinator.record_dismissed();
            self.restore_banner();
        }
        self.reporter.report(ReportKind::Dismissed);
    }

    // --- show flow ---------------------------------------------------------

    /// Check, reserve and, for full-screen kinds, hide the banner and take
    /// the gate before the SDK show is attempted.
    pub fn begin_show(&self, kind: AdKind) -> Result<(), Denial> {
        self.eligibility(kind)?;
        self.reserve_detailed(kind)?;
        if kind.is_full_screen() && !self.gate.try_claim_full_screen() {
            self.unreserve(kind);
            return Err(Denial::FullScreenBusy);
        }
        Ok(())
    }

    /// Failure path of [`begin_show`](Self::begin_show).
    pub fn abort_show(&self, kind: AdKind) {
        self.unreserve(kind);
        if kind.is_full_screen() && !self.gate.set_full_screen_showing(false) {
            self.restore_banner();
        }
    }

    fn restore_banner(&self) {
        self.gate.force_hide_banner(false);
        self.hub.publish(AdEvent::BannerReload);
    }

    // --- policy ------------------------------------------------------------

    pub fn policy(&self) -> Arc<AdPolicy> {
        self.policy.get()
    }

    pub fn is_policy_loaded(&self) -> bool {
        self.policy.is_loaded()
    }

    pub fn set_policy(&self, policy: AdPolicy) -> PolicyChange {
        let change = self.policy.set(policy);
        self.reporter.report(ReportKind::PolicyApplied {
            changed: change.changed,
        });
        change
    }

    pub fn clear_policy(&self) -> PolicyChange {
        let change = self.policy.clear();
        self.reporter.report(ReportKind::PolicyApplied {
            changed: change.changed,
        });
        change
    }

    /// Parse a policy document for this app and apply it; malformed
    /// documents apply the fail-closed default.
    pub fn apply_document(&self, json: &str) -> PolicyChange {
        self.set_policy(parse_policy_or_fail_closed(json, &self.app_id))
    }

    // --- subscriptions -----------------------------------------------------

    pub fn subscribe<F>(&self, on_change: F) -> Subscription
    where
        F: Fn(&AdEvent) + Send + Sync + 'static,
    {
        self.hub.subscribe(on_change)
    }

    pub fn subscribe_channel(&self, topics: Topics) -> (Subscription, Receiver<AdEvent>) {
        self.hub.subscribe_channel(topics)
    }

    pub const fn hub(&self) -> &ListenerHub {
        &self.hub
    }

    pub const fn gate(&self) -> &ExclusivityGate {
        &self.gate
    }

    pub fn coordinator(&self) -> &ReservationCoordinator {
        &self.coordinator
    }

    // --- inspection --------------------------------------------------------

    /// `(hour_count, day_count)` for `kind`, after rollover.
    pub fn counters(&self, kind: AdKind) -> (u32, u32) {
        self.coordinator.peek(kind)
    }

    pub fn outstanding_reservations(&self, kind: AdKind) -> u32 {
        self.coordinator.outstanding(kind)
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let policy = self.policy();
        let kinds = AdKind::ALL
            .into_iter()
            .map(|kind| {
                let state = self.coordinator.state(kind);
                let limits = policy.kind(kind);
                KindSnapshot {
                    kind,
                    enabled: policy.is_enabled(kind),
                    hour_count: state.window.hour_count,
                    day_count: state.window.day_count,
                    max_per_hour: limits.max_per_hour,
                    max_per_day: limits.max_per_day,
                    cooldown_seconds: limits.cooldown_seconds,
                    last_shown_at: state.cooldown.last_shown_at,
                    last_attempt_at: state.cooldown.last_attempt_at,
                    outstanding: state.outstanding,
                    denial: self.eligibility(kind).err(),
                }
            })
            .collect();

        EngineSnapshot {
            now_ms: self.now_ms(),
            app_id: self.app_id.clone(),
            policy_loaded: self.is_policy_loaded(),
            policy: policy.as_ref().clone(),
            full_screen_showing: self.gate.is_full_screen_showing(),
            banner_force_hidden: self.gate.is_banner_force_hidden(),
            last_full_screen_dismissed_at: self.coordinator.last_full_screen_dismissed_at(),
            kinds,
            transitions: self.gate.transitions(),
        }
    }

    /// Zero counters and timestamps for every kind.
    pub fn reset_counters(&self) {
        self.coordinator.reset();
    }

    /// Wait for queued state writes to land.
    pub fn flush(&self) {
        self.persistence.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{EngineFixture, permissive_policy};

    #[test]
    fn unloaded_engine_denies_everything() {
        let fixture = EngineFixture::new();
        for kind in AdKind::ALL {
            assert_eq!(fixture.engine.eligibility(kind), Err(Denial::KindDisabled));
            assert!(!fixture.engine.reserve(kind));
        }
    }

    #[test]
    fn begin_show_hides_banner_before_claiming() {
        let fixture = EngineFixture::with_policy(permissive_policy());
        let engine = &fixture.engine;
        engine.begin_show(AdKind::Interstitial).unwrap();

        assert!(engine.gate().is_banner_force_hidden());
        assert!(engine.gate().is_full_screen_showing());
        assert_eq!(engine.counters(AdKind::Interstitial), (1, 1));
        assert_eq!(engine.eligibility(AdKind::Banner), Err(Denial::BannerSuppressed));
        assert_eq!(engine.begin_show(AdKind::AppOpen), Err(Denial::FullScreenBusy));
        assert_eq!(engine.counters(AdKind::AppOpen), (0, 0));
    }

    #[test]
    fn abort_show_gives_everything_back() {
        let fixture = EngineFixture::with_policy(permissive_policy());
        let engine = &fixture.engine;
        engine.begin_show(AdKind::AppOpen).unwrap();
        engine.abort_show(AdKind::AppOpen);

        assert_eq!(engine.counters(AdKind::AppOpen), (0, 0));
        assert_eq!(engine.outstanding_reservations(AdKind::AppOpen), 0);
        assert!(engine.gate().banner_visible_allowed());
    }

    #[test]
    fn record_dismissed_without_show_still_stamps_gap() {
        let mut policy = permissive_policy();
        policy.min_fullscreen_gap_seconds = 30;
        let fixture = EngineFixture::with_policy(policy);
        fixture.engine.record_dismissed();
        assert!(matches!(
            fixture.engine.eligibility(AdKind::Interstitial),
            Err(Denial::MinFullscreenGap { .. })
        ));
        assert!(fixture.engine.can_show(AdKind::Banner));
    }

    #[test]
    fn reporter_sees_the_show_flow() {
        let fixture = EngineFixture::with_policy(permissive_policy());
        let engine = &fixture.engine;
        engine.begin_show(AdKind::Interstitial).unwrap();
        engine.record_shown(AdKind::Interstitial);
        engine.record_dismissed();
        engine.record_shown(AdKind::Banner);

        let events = fixture.reporter.events();
        assert!(events.contains(&ReportKind::Reserved {
            kind: AdKind::Interstitial
        }));
        assert!(events.contains(&ReportKind::Shown {
            kind: AdKind::Interstitial
        }));
        assert!(events.contains(&ReportKind::Dismissed));
        assert!(events.contains(&ReportKind::ShownWithoutReservation {
            kind: AdKind::Banner
        }));
    }

    #[test]
    fn snapshot_reports_counts_and_denials() {
        let fixture = EngineFixture::new();
        let snapshot = fixture.engine.snapshot();
        assert!(!snapshot.policy_loaded);
        assert_eq!(snapshot.kinds.len(), 3);
        assert!(snapshot
            .kinds
            .iter()
            .all(|kind| kind.denial == Some(Denial::KindDisabled)));
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["kinds"][0]["denial"]["reason"], "kind_disabled");
    }

    #[test]
    fn apply_document_uses_configured_app_id() {
        let fixture = EngineFixture::new();
        let change = fixture.engine.apply_document(
            r#"[{"app_id": "alcoholictimer", "ad_banner_enabled": true}]"#,
        );
        assert!(change.changed);
        assert!(fixture.engine.can_show(AdKind::Banner));

        let change = fixture.engine.apply_document("garbage");
        assert!(change.changed);
        assert!(!fixture.engine.can_show(AdKind::Banner));
    }
}
