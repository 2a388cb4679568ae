//! The reserve/unreserve critical section.
//!
//! Window counters, cooldown stamps and the outstanding-reservation tally
//! share one mutex so check-then-increment cannot race. The policy snapshot
//! is read inside the same section.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::clock::{CalendarZone, Clock};
use crate::kind::AdKind;
use crate::limits::{CooldownState, CooldownTracker, WindowCounter, WindowState};
use crate::policy::{AdPolicy, PolicyStore};
use crate::storage::Persistence;

use super::denial::Denial;

struct Core {
    windows: WindowCounter,
    cooldowns: CooldownTracker,
    outstanding: [u32; 3],
}

/// Point-in-time view of one kind's limits.
#[derive(Debug, Clone, Copy)]
pub struct KindState {
    pub window: WindowState,
    pub cooldown: CooldownState,
    pub outstanding: u32,
}

pub struct ReservationCoordinator {
    core: Mutex<Core>,
    policy: Arc<PolicyStore>,
    clock: Arc<dyn Clock>,
}

impl ReservationCoordinator {
    pub fn new(
        policy: Arc<PolicyStore>,
        persistence: Arc<Persistence>,
        clock: Arc<dyn Clock>,
        zone: CalendarZone,
    ) -> Self {
        let core = Core {
            windows: WindowCounter::load(Arc::clone(&persistence), zone),
            cooldowns: CooldownTracker::load(persistence),
            outstanding: [0; 3],
        };
        Self {
            core: Mutex::new(core),
            policy,
            clock,
        }
    }

    pub fn reserve(&self, kind: AdKind) -> bool {
        self.reserve_detailed(kind).is_ok()
    }

    /// Claim one unit of hourly and daily capacity for `kind`.
    pub fn reserve_detailed(&self, kind: AdKind) -> Result<(), Denial> {
        let now = self.clock.now_ms();
        let mut core = self.core.lock();
        core.windows.rollover_if_needed(kind, now);
        let policy = self.policy.get();
        check_caps(&core, kind, &policy)?;

        core.windows.increment(kind);
        core.cooldowns.record_attempt(kind, now);
        core.outstanding[kind.index()] = core.outstanding[kind.index()].saturating_add(1);
        let state = core.windows.state(kind);
        debug!(
            kind = %kind,
            hour_count = state.hour_count,
            day_count = state.day_count,
            "reserved"
        );
        Ok(())
    }

    /// Give back a reservation whose show attempt failed.
    pub fn unreserve(&self, kind: AdKind) {
        let now = self.clock.now_ms();
        let mut core = self.core.lock();
        core.windows.rollover_if_needed(kind, now);
        core.windows.decrement(kind);
        core.outstanding[kind.index()] = core.outstanding[kind.index()].saturating_sub(1);
        debug!(kind = %kind, "unreserved");
    }

    /// Policy, cap, cooldown and gap checks without claiming anything.
    pub fn check(&self, kind: AdKind) -> Result<(), Denial> {
        let now = self.clock.now_ms();
        let mut core = self.core.lock();
        core.windows.rollover_if_needed(kind, now);
        let policy = self.policy.get();
        check_caps(&core, kind, &policy)?;

        let remaining_ms = core.cooldowns.cooldown_remaining_ms(kind, &policy, now);
        if remaining_ms > 0 {
            return Err(Denial::Cooldown { remaining_ms });
        }
        if kind.is_full_screen() {
            let remaining_ms = core.cooldowns.gap_remaining_ms(&policy, now);
            if remaining_ms > 0 {
                return Err(Denial::MinFullscreenGap { remaining_ms });
            }
        }
        Ok(())
    }

    /// `(hour_count, day_count)` after rollover.
    pub fn peek(&self, kind: AdKind) -> (u32, u32) {
        let now = self.clock.now_ms();
        self.core.lock().windows.peek(kind, now)
    }

    /// Stamp a confirmed show. Returns whether a reservation backed it.
    pub fn record_shown(&self, kind: AdKind) -> bool {
        let now = self.clock.now_ms();
        let mut core = self.core.lock();
        core.cooldowns.record_shown(kind, now);
        let slot = &mut core.outstanding[kind.index()];
        if *slot > 0 {
            *slot -= 1;
            true
        } else {
            false
        }
    }

    pub fn record_dismissed(&self) {
        let now = self.clock.now_ms();
        self.core.lock().cooldowns.record_dismissed(now);
    }

    pub fn is_in_cooldown(&self, kind: AdKind) -> bool {
        let now = self.clock.now_ms();
        let policy = self.policy.get();
        self.core.lock().cooldowns.is_in_cooldown(kind, &policy, now)
    }

    pub fn is_within_min_fullscreen_gap(&self) -> bool {
        let now = self.clock.now_ms();
        let policy = self.policy.get();
        self.core
            .lock()
            .cooldowns
            .is_within_min_fullscreen_gap(&policy, now)
    }

    pub fn gap_remaining_ms(&self, policy: &AdPolicy) -> i64 {
        let now = self.clock.now_ms();
        self.core.lock().cooldowns.gap_remaining_ms(policy, now)
    }

    pub fn outstanding(&self, kind: AdKind) -> u32 {
        self.core.lock().outstanding[kind.index()]
    }

    pub fn last_full_screen_dismissed_at(&self) -> i64 {
        self.core.lock().cooldowns.last_full_screen_dismissed_at()
    }

    /// Window (after rollover), cooldown stamps and outstanding count in one read.
    pub fn state(&self, kind: AdKind) -> KindState {
        let now = self.clock.now_ms();
        let mut core = self.core.lock();
        core.windows.rollover_if_needed(kind, now);
        KindState {
            window: core.windows.state(kind),
            cooldown: core.cooldowns.state(kind),
            outstanding: core.outstanding[kind.index()],
        }
    }

    /// Zero every counter and forget all timestamps.
    pub fn reset(&self) {
        let now = self.clock.now_ms();
        let mut core = self.core.lock();
        core.windows.reset_all(now);
        core.cooldowns.reset();
        core.outstanding = [0; 3];
    }
}

fn check_caps(core: &Core, kind: AdKind, policy: &AdPolicy) -> Result<(), Denial> {
    if !policy.active {
        return Err(Denial::PolicyInactive);
    }
    let limits = policy.kind(kind);
    if !limits.enabled {
        return Err(Denial::KindDisabled);
    }
    let state = core.windows.state(kind);
    if !limits.max_per_hour.allows(state.hour_count) {
        return Err(Denial::HourlyCap);
    }
    if !limits.max_per_day.allows(state.day_count) {
        return Err(Denial::DailyCap);
    }
    Ok(())
}
