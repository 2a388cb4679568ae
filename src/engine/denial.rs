use serde::Serialize;
use thiserror::Error;

/// Why an ad may not be shown right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Denial {
    #[error("a full-screen ad is already showing")]
    FullScreenBusy,
    #[error("banner is suppressed while a full-screen ad is pending")]
    BannerSuppressed,
    #[error("policy is inactive")]
    PolicyInactive,
    #[error("ad kind is disabled by policy")]
    KindDisabled,
    #[error("hourly cap reached")]
    HourlyCap,
    #[error("daily cap reached")]
    DailyCap,
    #[error("cooling down ({remaining_ms} ms left)")]
    Cooldown { remaining_ms: i64 },
    #[error("too soon after the last full-screen ad ({remaining_ms} ms left)")]
    MinFullscreenGap { remaining_ms: i64 },
}

impl Denial {
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::FullScreenBusy => "full_screen_busy",
            Self::BannerSuppressed => "banner_suppressed",
            Self::PolicyInactive => "policy_inactive",
            Self::KindDisabled => "kind_disabled",
            Self::HourlyCap => "hourly_cap",
            Self::DailyCap => "daily_cap",
            Self::Cooldown { .. } => "cooldown",
            Self::MinFullscreenGap { .. } => "min_fullscreen_gap",
        }
    }
}
