//! Full-screen exclusivity.
//!
//! At most one full-screen ad is showing, and the banner stays hidden while
//! one is showing or about to show. Flags are flipped optimistically the
//! moment a show is requested and cleared only on confirmed dismissal or
//! failure.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::clock::Clock;
use crate::kind::AdKind;
use crate::policy::AdPolicy;

use super::denial::Denial;
use super::events::AdEvent;
use super::hub::{ListenerHub, Prepared};
use super::reservation::ReservationCoordinator;

pub const TRANSITION_LOG_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateFlag {
    FullScreen,
    BannerForceHidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateTransition {
    pub seq: u64,
    pub at_ms: i64,
    pub flag: GateFlag,
    pub value: bool,
}

#[derive(Default)]
struct TransitionLog {
    next_seq: u64,
    entries: VecDeque<GateTransition>,
}

impl TransitionLog {
    fn push(&mut self, at_ms: i64, flag: GateFlag, value: bool) {
        self.next_seq += 1;
        if self.entries.len() == TRANSITION_LOG_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(GateTransition {
            seq: self.next_seq,
            at_ms,
            flag,
            value,
        });
    }
}

pub struct ExclusivityGate {
    full_screen_showing: AtomicBool,
    banner_force_hidden: AtomicBool,
    // Held across every flag change so log order, flag order and hub
    // sequence order agree.
    log: Mutex<TransitionLog>,
    coordinator: Arc<ReservationCoordinator>,
    hub: ListenerHub,
    clock: Arc<dyn Clock>,
}

impl ExclusivityGate {
    pub fn new(coordinator: Arc<ReservationCoordinator>, hub: ListenerHub, clock: Arc<dyn Clock>) -> Self {
        hub.seed(AdEvent::FullScreenChanged(false));
        hub.seed(AdEvent::BannerForceHidden(false));
        Self {
            full_screen_showing: AtomicBool::new(false),
            banner_force_hidden: AtomicBool::new(false),
            log: Mutex::new(TransitionLog::default()),
            coordinator,
            hub,
            clock,
        }
    }

    pub fn is_full_screen_showing(&self) -> bool {
        self.full_screen_showing.load(Ordering::SeqCst)
    }

    pub fn is_banner_force_hidden(&self) -> bool {
        self.banner_force_hidden.load(Ordering::SeqCst)
    }

    /// Set the full-screen flag and return its previous value.
    ///
    /// Going from showing to not showing stamps the dismissal, lifts the
    /// banner force-hide and asks the banner to reload.
    pub fn set_full_screen_showing(&self, showing: bool) -> bool {
        let mut events = Vec::new();
        let previous = {
            let mut log = self.log.lock();
            let now = self.clock.now_ms();
            let previous = self.full_screen_showing.swap(showing, Ordering::SeqCst);
            if previous != showing {
                log.push(now, GateFlag::FullScreen, showing);
            }
            events.push(self.hub.prepare(AdEvent::FullScreenChanged(showing)));

            if previous && !showing {
                self.coordinator.record_dismissed();
                self.set_force_hidden_locked(&mut log, now, false, &mut events);
                events.push(self.hub.prepare(AdEvent::BannerReload));
            }
            previous
        };
        debug!(showing, previous, "full-screen flag set");
        self.deliver(events);
        previous
    }

    /// Independent banner suppression for the window before a show starts.
    pub fn force_hide_banner(&self, hidden: bool) {
        let mut events = Vec::new();
        {
            let mut log = self.log.lock();
            let now = self.clock.now_ms();
            self.set_force_hidden_locked(&mut log, now, hidden, &mut events);
        }
        self.deliver(events);
    }

    /// Force-hide then mark full screen showing, with no observable gap between.
    pub fn hide_banner_immediately(&self) {
        let mut events = Vec::new();
        {
            let mut log = self.log.lock();
            let now = self.clock.now_ms();
            self.set_force_hidden_locked(&mut log, now, true, &mut events);
            if !self.full_screen_showing.swap(true, Ordering::SeqCst) {
                log.push(now, GateFlag::FullScreen, true);
            }
            events.push(self.hub.prepare(AdEvent::FullScreenChanged(true)));
        }
        self.deliver(events);
    }

    /// Like [`hide_banner_immediately`](Self::hide_banner_immediately) but
    /// only if no full-screen ad holds the gate. Returns whether it was claimed.
    pub fn try_claim_full_screen(&self) -> bool {
        let mut events = Vec::new();
        let claimed = {
            let mut log = self.log.lock();
            if self.full_screen_showing.load(Ordering::SeqCst) {
                false
            } else {
                let now = self.clock.now_ms();
                self.set_force_hidden_locked(&mut log, now, true, &mut events);
                self.full_screen_showing.store(true, Ordering::SeqCst);
                log.push(now, GateFlag::FullScreen, true);
                events.push(self.hub.prepare(AdEvent::FullScreenChanged(true)));
                true
            }
        };
        self.deliver(events);
        claimed
    }

    /// Gate-level reason `kind` may not show, if any.
    pub fn veto(&self, kind: AdKind) -> Option<Denial> {
        let blocked = self.is_full_screen_showing() || self.is_banner_force_hidden();
        match (blocked, kind.is_full_screen()) {
            (false, _) => None,
            (true, true) => Some(Denial::FullScreenBusy),
            (true, false) => Some(Denial::BannerSuppressed),
        }
    }

    pub fn can_show_full_screen(&self, policy: &AdPolicy) -> bool {
        !self.is_full_screen_showing()
            && !self.is_banner_force_hidden()
            && self.coordinator.gap_remaining_ms(policy) == 0
    }

    pub fn banner_visible_allowed(&self) -> bool {
        !self.is_full_screen_showing() && !self.is_banner_force_hidden()
    }

    /// Oldest first.
    pub fn transitions(&self) -> Vec<GateTransition> {
        self.log.lock().entries.iter().copied().collect()
    }

    fn set_force_hidden_locked(
        &self,
        log: &mut TransitionLog,
        now: i64,
        hidden: bool,
        events: &mut Vec<Prepared>,
    ) {
        if self.banner_force_hidden.swap(hidden, Ordering::SeqCst) != hidden {
            log.push(now, GateFlag::BannerForceHidden, hidden);
        }
        events.push(self.hub.prepare(AdEvent::BannerForceHidden(hidden)));
    }

    fn deliver(&self, events: Vec<Prepared>) {
        for event in events {
            self.hub.deliver(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{CalendarZone, ManualClock};
    use crate::policy::PolicyStore;
    use crate::storage::{MemoryStore, Persistence};
    use crate::test_utils::permissive_policy;

    fn gate() -> (ListenerHub, Arc<ReservationCoordinator>, ExclusivityGate) {
        let hub = ListenerHub::new();
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(5_000_000));
        let store = Arc::new(PolicyStore::new(hub.clone()));
        store.set(permissive_policy());
        let persistence = Arc::new(Persistence::inline(Arc::new(MemoryStore::new())));
        let coordinator = Arc::new(ReservationCoordinator::new(
            store,
            persistence,
            Arc::clone(&clock),
            CalendarZone::utc(),
        ));
        let gate = ExclusivityGate::new(Arc::clone(&coordinator), hub.clone(), clock);
        (hub, coordinator, gate)
    }

    #[test]
    fn full_screen_vetoes_banner_and_other_full_screen() {
        let (_hub, _coordinator, gate) = gate();
        assert_eq!(gate.veto(AdKind::Banner), None);
        assert!(!gate.set_full_screen_showing(true));
        assert_eq!(gate.veto(AdKind::Banner), Some(Denial::BannerSuppressed));
        assert_eq!(gate.veto(AdKind::AppOpen), Some(Denial::FullScreenBusy));
        assert!(!gate.banner_visible_allowed());
    }

    #[test]
    fn dismissal_stamps_gap_and_restores_banner() {
        let (hub, coordinator, gate) = gate();
        gate.hide_banner_immediately();
        assert!(gate.is_banner_force_hidden());

        let (_sub, rx) = hub.subscribe_channel(crate::engine::events::Topics::only(&[
            crate::engine::events::Topic::BannerReload,
        ]));
        assert!(gate.set_full_screen_showing(false));
        assert!(!gate.is_banner_force_hidden());
        assert!(gate.banner_visible_allowed());
        assert_eq!(coordinator.last_full_screen_dismissed_at(), 5_000_000);
        assert_eq!(rx.try_recv().unwrap(), AdEvent::BannerReload);
    }

    #[test]
    fn claim_is_exclusive() {
        let (_hub, _coordinator, gate) = gate();
        assert!(gate.try_claim_full_screen());
        assert!(!gate.try_claim_full_screen());
        gate.set_full_screen_showing(false);
        assert!(gate.try_claim_full_screen());
    }

    #[test]
    fn transitions_record_changes_in_order() {
        let (_hub, _coordinator, gate) = gate();
        gate.hide_banner_immediately();
        gate.set_full_screen_showing(true);
        gate.set_full_screen_showing(false);

        let log = gate.transitions();
        let flags: Vec<_> = log.iter().map(|t| (t.flag, t.value)).collect();
        assert_eq!(
            flags,
            vec![
                (GateFlag::BannerForceHidden, true),
                (GateFlag::FullScreen, true),
                (GateFlag::FullScreen, false),
                (GateFlag::BannerForceHidden, false),
            ]
        );
        assert!(log.windows(2).all(|pair| pair[0].seq < pair[1].seq));
    }

    #[test]
    fn transition_log_is_bounded() {
        let (_hub, _coordinator, gate) = gate();
        for i in 0..100 {
            gate.force_hide_banner(i % 2 == 0);
        }
        assert_eq!(gate.transitions().len(), TRANSITION_LOG_CAPACITY);
    }

    #[test]
    fn gap_blocks_full_screen_after_dismissal() {
        let (_hub, _coordinator, gate) = gate();
        let mut policy = permissive_policy();
        policy.min_fullscreen_gap_seconds = 30;
        gate.set_full_screen_showing(true);
        gate.set_full_screen_showing(false);
        assert!(!gate.can_show_full_screen(&policy));
        assert!(gate.can_show_full_screen(&permissive_policy()));
    }

    #[test]
    fn subscribers_see_optimistic_hide_in_order() {
        let (hub, _coordinator, gate) = gate();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = hub.subscribe_topics(
            crate::engine::events::Topics::only(&[
                crate::engine::events::Topic::FullScreen,
                crate::engine::events::Topic::BannerForceHidden,
            ]),
            move |event| sink.lock().push(event.clone()),
        );
        seen.lock().clear();
        gate.hide_banner_immediately();
        assert_eq!(
            seen.lock().clone(),
            vec![AdEvent::BannerForceHidden(true), AdEvent::FullScreenChanged(true)]
        );
    }
}
