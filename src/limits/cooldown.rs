//! Per-kind cooldowns and the cross-kind full-screen gap.

use std::sync::Arc;

use serde::Serialize;

use crate::clock::SECOND_MS;
use crate::kind::AdKind;
use crate::policy::AdPolicy;
use crate::storage::Persistence;

pub const DISMISSED_AT_KEY: &str = "ads.full_screen.last_dismissed_at";

fn last_shown_key(kind: AdKind) -> String {
    format!("ads.{}.last_shown_at", kind.as_str())
}

/// Timestamp view exposed in snapshots. Zero means never.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CooldownState {
    pub last_shown_at: i64,
    pub last_attempt_at: i64,
}

pub struct CooldownTracker {
    last_shown_at: [i64; 3],
    last_attempt_at: [i64; 3],
    last_full_screen_dismissed_at: i64,
    persistence: Arc<Persistence>,
}

impl CooldownTracker {
    pub fn load(persistence: Arc<Persistence>) -> Self {
        let last_shown_at = AdKind::ALL.map(|kind| persistence.get_long(&last_shown_key(kind), 0));
        let last_full_screen_dismissed_at = persistence.get_long(DISMISSED_AT_KEY, 0);
        Self {
            last_shown_at,
            last_attempt_at: [0; 3],
            last_full_screen_dismissed_at,
            persistence,
        }
    }

    pub fn is_in_cooldown(&self, kind: AdKind, policy: &AdPolicy, now: i64) -> bool {
        self.cooldown_remaining_ms(kind, policy, now) > 0
    }

    pub fn cooldown_remaining_ms(&self, kind: AdKind, policy: &AdPolicy, now: i64) -> i64 {
        remaining(
            self.last_shown_at[kind.index()],
            policy.kind(kind).cooldown_seconds,
            now,
        )
    }

    pub fn is_within_min_fullscreen_gap(&self, policy: &AdPolicy, now: i64) -> bool {
        self.gap_remaining_ms(policy, now) > 0
    }

    pub fn gap_remaining_ms(&self, policy: &AdPolicy, now: i64) -> i64 {
        remaining(
            self.last_full_screen_dismissed_at,
            policy.min_fullscreen_gap_seconds,
            now,
        )
    }

    pub fn record_shown(&mut self, kind: AdKind, now: i64) {
        self.last_shown_at[kind.index()] = now;
        self.persistence.put_long(&last_shown_key(kind), now);
    }

    /// Diagnostic only; never persisted.
    pub fn record_attempt(&mut self, kind: AdKind, now: i64) {
        self.last_attempt_at[kind.index()] = now;
    }

    pub fn record_dismissed(&mut self, now: i64) {
        self.last_full_screen_dismissed_at = now;
        self.persistence.put_long(DISMISSED_AT_KEY, now);
    }

    pub const fn state(&self, kind: AdKind) -> CooldownState {
        CooldownState {
            last_shown_at: self.last_shown_at[kind.index()],
            last_attempt_at: self.last_attempt_at[kind.index()],
        }
    }

    pub const fn last_full_screen_dismissed_at(&self) -> i64 {
        self.last_full_screen_dismissed_at
    }

    /// Forget every timestamp.
    pub fn reset(&mut self) {
        for kind in AdKind::ALL {
            self.last_shown_at[kind.index()] = 0;
            self.last_attempt_at[kind.index()] = 0;
            self.persistence.put_long(&last_shown_key(kind), 0);
        }
        self.last_full_screen_dismissed_at = 0;
        self.persistence.put_long(DISMISSED_AT_KEY, 0);
    }
}

/// Milliseconds left of a `seconds` long span that began at `since`.
fn remaining(since: i64, seconds: u32, now: i64) -> i64 {
    if since <= 0 || seconds == 0 {
        return 0;
    }
    let span = i64::from(seconds) * SECOND_MS;
    let elapsed = now - since;
    if elapsed < span { span - elapsed.max(0) } else { 0 }
}
