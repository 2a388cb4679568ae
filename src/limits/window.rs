//! Hourly and daily show counters per ad kind.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::clock::{CalendarZone, HOUR_MS};
use crate::kind::AdKind;
use crate::storage::Persistence;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WindowState {
    pub hour_window_start: i64,
    pub day_window_start: i64,
    pub hour_count: u32,
    pub day_count: u32,
}

pub(crate) struct WindowKeys {
    pub hour_start: String,
    pub day_start: String,
    pub hour_count: String,
    pub day_count: String,
}

impl WindowKeys {
    pub fn for_kind(kind: AdKind) -> Self {
        let prefix = format!("ads.{}", kind.as_str());
        Self {
            hour_start: format!("{prefix}.hour_window_start"),
            day_start: format!("{prefix}.day_window_start"),
            hour_count: format!("{prefix}.hour_count"),
            day_count: format!("{prefix}.day_count"),
        }
    }
}

/// Counters are only touched from inside the reservation critical section,
/// so this type carries no lock of its own.
pub struct WindowCounter {
    states: [WindowState; 3],
    zone: CalendarZone,
    persistence: Arc<Persistence>,
}

impl WindowCounter {
    /// Restore every kind's window from persistence.
    pub fn load(persistence: Arc<Persistence>, zone: CalendarZone) -> Self {
        let states = AdKind::ALL.map(|kind| {
            let keys = WindowKeys::for_kind(kind);
            WindowState {
                hour_window_start: persistence.get_long(&keys.hour_start, 0),
                day_window_start: persistence.get_long(&keys.day_start, 0),
                hour_count: non_negative(persistence.get_int(&keys.hour_count, 0)),
                day_count: non_negative(persistence.get_int(&keys.day_count, 0)),
            }
        });
        Self {
            states,
            zone,
            persistence,
        }
    }

    pub const fn zone(&self) -> CalendarZone {
        self.zone
    }

    /// Reset any window whose period has elapsed. Returns true if state changed.
    pub fn rollover_if_needed(&mut self, kind: AdKind, now: i64) -> bool {
        let day_boundary = self.zone.day_start_ms(now);
        let state = &mut self.states[kind.index()];
        let before = *state;

        if now < state.hour_window_start {
            // Clock went backwards; keep the count so no capacity is granted.
            state.hour_window_start = now;
        } else if now - state.hour_window_start >= HOUR_MS {
            state.hour_window_start = now;
            state.hour_count = 0;
        }

        if now < state.day_window_start {
            state.day_window_start = now;
        } else if state.day_window_start == 0 || day_boundary > state.day_window_start {
            state.day_window_start = now;
            state.day_count = 0;
        }

        let changed = *state != before;
        if changed {
            debug!(
                kind = %kind,
                hour_count = state.hour_count,
                day_count = state.day_count,
                "window rolled over"
            );
            self.persist(kind);
        }
        changed
    }

    /// Current `(hour_count, day_count)` after rollover.
    pub fn peek(&mut self, kind: AdKind, now: i64) -> (u32, u32) {
        self.rollover_if_needed(kind, now);
        let state = self.states[kind.index()];
        (state.hour_count, state.day_count)
    }

    #[must_use]
    pub const fn state(&self, kind: AdKind) -> WindowState {
        self.states[kind.index()]
    }

    pub fn increment(&mut self, kind: AdKind) {
        let state = &mut self.states[kind.index()];
        state.hour_count = state.hour_count.saturating_add(1);
        state.day_count = state.day_count.saturating_add(1);
        self.persist(kind);
    }

    /// Floors at zero.
    pub fn decrement(&mut self, kind: AdKind) {
        let state = &mut self.states[kind.index()];
        state.hour_count = state.hour_count.saturating_sub(1);
        state.day_count = state.day_count.saturating_sub(1);
        self.persist(kind);
    }

    /// Zero every counter and re-anchor both windows at `now`.
    pub fn reset_all(&mut self, now: i64) {
        for kind in AdKind::ALL {
            self.states[kind.index()] = WindowState {
                hour_window_start: now,
                day_window_start: now,
                hour_count: 0,
                day_count: 0,
            };
            self.persist(kind);
        }
    }

    fn persist(&self, kind: AdKind) {
        let state = self.states[kind.index()];
        let keys = WindowKeys::for_kind(kind);
        self.persistence.put_long(&keys.hour_start, state.hour_window_start);
        self.persistence.put_long(&keys.day_start, state.day_window_start);
        self.persistence.put_int(&keys.hour_count, clamp_to_int(state.hour_count));
        self.persistence.put_int(&keys.day_count, clamp_to_int(state.day_count));
    }
}

fn non_negative(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

fn clamp_to_int(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use chrono::{TimeZone, Utc};

    fn counter(store: &Arc<MemoryStore>, zone: CalendarZone) -> WindowCounter {
        WindowCounter::load(Arc::new(Persistence::inline(store.clone())), zone)
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> i64 {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap().timestamp_millis()
    }

    #[test]
    fn hour_rolls_independently_of_day() {
        let store = Arc::new(MemoryStore::new());
        let mut windows = counter(&store, CalendarZone::utc());
        let start = at(2024, 5, 1, 9, 0);

        windows.rollover_if_needed(AdKind::Interstitial, start);
        windows.increment(AdKind::Interstitial);
        windows.increment(AdKind::Interstitial);

        let later = start + HOUR_MS;
        assert_eq!(windows.peek(AdKind::Interstitial, later), (0, 2));
    }

    #[test]
    fn day_rolls_at_local_midnight_not_after_24h() {
        let store = Arc::new(MemoryStore::new());
        let seoul = CalendarZone::parse("+09:00").unwrap();
        let mut windows = counter(&store, seoul);

        // 23:50 KST on May 1st.
        let late_evening = at(2024, 5, 1, 14, 50);
        windows.rollover_if_needed(AdKind::AppOpen, late_evening);
        windows.increment(AdKind::AppOpen);

        // 23:59 KST, same day.
        assert_eq!(windows.peek(AdKind::AppOpen, at(2024, 5, 1, 14, 59)).1, 1);
        // 00:05 KST next day: twenty minutes later but a new calendar day.
        assert_eq!(windows.peek(AdKind::AppOpen, at(2024, 5, 1, 15, 5)).1, 0);
    }

    #[test]
    fn backwards_clock_keeps_counts() {
        let store = Arc::new(MemoryStore::new());
        let mut windows = counter(&store, CalendarZone::utc());
        let start = at(2024, 5, 1, 12, 0);
        windows.rollover_if_needed(AdKind::Interstitial, start);
        windows.increment(AdKind::Interstitial);

        let earlier = start - 3 * HOUR_MS;
        assert_eq!(windows.peek(AdKind::Interstitial, earlier), (1, 1));
        let state = windows.state(AdKind::Interstitial);
        assert_eq!(state.hour_window_start, earlier);
        assert_eq!(state.day_window_start, earlier);
    }

    #[test]
    fn decrement_floors_at_zero() {
        let store = Arc::new(MemoryStore::new());
        let mut windows = counter(&store, CalendarZone::utc());
        windows.rollover_if_needed(AdKind::Banner, at(2024, 5, 1, 12, 0));
        windows.decrement(AdKind::Banner);
        assert_eq!(windows.state(AdKind::Banner).hour_count, 0);
    }

    #[test]
    fn state_is_restored_from_persistence() {
        let store = Arc::new(MemoryStore::new());
        let now = at(2024, 5, 1, 12, 0);
        {
            let mut windows = counter(&store, CalendarZone::utc());
            windows.rollover_if_needed(AdKind::AppOpen, now);
            windows.increment(AdKind::AppOpen);
        }
        assert_eq!(store.raw("ads.app_open.hour_count"), Some(1));
        assert_eq!(store.raw("ads.app_open.day_window_start"), Some(now));

        let mut windows = counter(&store, CalendarZone::utc());
        assert_eq!(windows.peek(AdKind::AppOpen, now + 1_000), (1, 1));
    }

    #[test]
    fn negative_persisted_counts_load_as_zero() {
        let store = Arc::new(MemoryStore::new());
        crate::storage::KeyValueStore::put_int(store.as_ref(), "ads.banner.hour_count", -4).unwrap();
        let windows = counter(&store, CalendarZone::utc());
        assert_eq!(windows.state(AdKind::Banner).hour_count, 0);
    }
}
