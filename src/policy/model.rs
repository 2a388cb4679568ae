//! Immutable policy snapshot types.

use serde::{Deserialize, Serialize};

use crate::kind::AdKind;

/// A per-window cap. Negative raw values in a policy document mean unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum Limit {
    Unbounded,
    AtMost(u32),
}

impl Limit {
    #[must_use]
    pub fn from_raw(raw: i64) -> Self {
        if raw < 0 {
            Self::Unbounded
        } else {
            Self::AtMost(u32::try_from(raw).unwrap_or(u32::MAX))
        }
    }

    /// Whether one more unit fits on top of `count`.
    #[must_use]
    pub const fn allows(self, count: u32) -> bool {
        match self {
            Self::Unbounded => true,
            Self::AtMost(max) => count < max,
        }
    }

    #[must_use]
    pub const fn as_raw(self) -> i64 {
        match self {
            Self::Unbounded => -1,
            Self::AtMost(max) => max as i64,
        }
    }
}

impl From<i64> for Limit {
    fn from(raw: i64) -> Self {
        Self::from_raw(raw)
    }
}

impl From<Limit> for i64 {
    fn from(limit: Limit) -> Self {
        limit.as_raw()
    }
}

impl std::fmt::Display for Limit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unbounded => write!(f, "unbounded"),
            Self::AtMost(max) => write!(f, "{max}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindPolicy {
    pub enabled: bool,
    pub max_per_hour: Limit,
    pub max_per_day: Limit,
    pub cooldown_seconds: u32,
}

impl KindPolicy {
    #[must_use]
    pub const fn disabled(max_per_hour: u32, max_per_day: u32, cooldown_seconds: u32) -> Self {
        Self {
            enabled: false,
            max_per_hour: Limit::AtMost(max_per_hour),
            max_per_day: Limit::AtMost(max_per_day),
            cooldown_seconds,
        }
    }

    #[must_use]
    pub const fn unlimited(enabled: bool) -> Self {
        Self {
            enabled,
            max_per_hour: Limit::Unbounded,
            max_per_day: Limit::Unbounded,
            cooldown_seconds: 0,
        }
    }
}

/// Snapshot of the remote ad policy. Replaced wholesale, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    pub active: bool,
    pub app_open: KindPolicy,
    pub interstitial: KindPolicy,
    pub banner: KindPolicy,
    pub min_fullscreen_gap_seconds: u32,
}

pub const DEFAULT_APP_OPEN_MAX_PER_HOUR: u32 = 2;
pub const DEFAULT_APP_OPEN_MAX_PER_DAY: u32 = 15;
pub const DEFAULT_APP_OPEN_COOLDOWN_SECONDS: u32 = 60;
pub const DEFAULT_INTERSTITIAL_MAX_PER_HOUR: u32 = 2;
pub const DEFAULT_INTERSTITIAL_MAX_PER_DAY: u32 = 15;
pub const DEFAULT_MIN_FULLSCREEN_GAP_SECONDS: u32 = 30;

impl AdPolicy {
    /// Conservative policy used until a real one is loaded: every kind off.
    #[must_use]
    pub const fn fail_closed() -> Self {
        Self {
            id: None,
            app_id: None,
            active: true,
            app_open: KindPolicy::disabled(
                DEFAULT_APP_OPEN_MAX_PER_HOUR,
                DEFAULT_APP_OPEN_MAX_PER_DAY,
                DEFAULT_APP_OPEN_COOLDOWN_SECONDS,
            ),
            interstitial: KindPolicy::disabled(
                DEFAULT_INTERSTITIAL_MAX_PER_HOUR,
                DEFAULT_INTERSTITIAL_MAX_PER_DAY,
                0,
            ),
            banner: KindPolicy::unlimited(false),
            min_fullscreen_gap_seconds: DEFAULT_MIN_FULLSCREEN_GAP_SECONDS,
        }
    }

    #[must_use]
    pub const fn kind(&self, kind: AdKind) -> &KindPolicy {
        match kind {
            AdKind::AppOpen => &self.app_open,
            AdKind::Interstitial => &self.interstitial,
            AdKind::Banner => &self.banner,
        }
    }

    /// Active and the kind's flag is on.
    #[must_use]
    pub const fn is_enabled(&self, kind: AdKind) -> bool {
        self.active && self.kind(kind).enabled
    }

    /// Field diff over everything that affects decisions; `id`/`app_id` are ignored.
    #[must_use]
    pub fn differs_from(&self, other: &Self) -> bool {
        self.active != other.active
            || self.app_open != other.app_open
            || self.interstitial != other.interstitial
            || self.banner != other.banner
            || self.min_fullscreen_gap_seconds != other.min_fullscreen_gap_seconds
    }
}

impl Default for AdPolicy {
    fn default() -> Self {
        Self::fail_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_from_raw_treats_negatives_as_unbounded() {
        assert_eq!(Limit::from_raw(-1), Limit::Unbounded);
        assert_eq!(Limit::from_raw(-999), Limit::Unbounded);
        assert_eq!(Limit::from_raw(0), Limit::AtMost(0));
        assert!(!Limit::AtMost(0).allows(0));
        assert!(Limit::AtMost(2).allows(1));
        assert!(!Limit::AtMost(2).allows(2));
        assert!(Limit::Unbounded.allows(u32::MAX));
    }

    #[test]
    fn fail_closed_denies_every_kind() {
        let policy = AdPolicy::fail_closed();
        for kind in AdKind::ALL {
            assert!(!policy.is_enabled(kind), "{kind} should be disabled");
        }
        assert_eq!(policy.app_open.cooldown_seconds, 60);
        assert_eq!(policy.min_fullscreen_gap_seconds, 30);
    }

    #[test]
    fn diff_ignores_metadata() {
        let base = AdPolicy::fail_closed();
        let mut renamed = base.clone();
        renamed.id = Some(4);
        renamed.app_id = Some("kr.sweetapps.alcoholictimer".to_string());
        assert!(!renamed.differs_from(&base));

        let mut tighter = base.clone();
        tighter.interstitial.max_per_hour = Limit::AtMost(1);
        assert!(tighter.differs_from(&base));
    }

    #[test]
    fn limit_serializes_as_raw_integer() {
        let json = serde_json::to_string(&KindPolicy::unlimited(true)).unwrap();
        assert!(json.contains("\"max_per_hour\":-1"));
        let back: KindPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(back.max_per_day, Limit::Unbounded);
    }
}
