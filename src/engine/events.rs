use std::sync::Arc;

use crate::kind::AdKind;
use crate::policy::AdPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Policy,
    FullScreen,
    BannerForceHidden,
    BannerReload,
    HoldReleased,
}

impl Topic {
    pub const ALL: [Self; 5] = [
        Self::Policy,
        Self::FullScreen,
        Self::BannerForceHidden,
        Self::BannerReload,
        Self::HoldReleased,
    ];

    /// State topics hand their last value to new subscribers; signals don't.
    #[must_use]
    pub const fn is_replayed(self) -> bool {
        matches!(self, Self::Policy | Self::FullScreen | Self::BannerForceHidden)
    }

    pub(crate) const fn index(self) -> usize {
        match self {
            Self::Policy => 0,
            Self::FullScreen => 1,
            Self::BannerForceHidden => 2,
            Self::BannerReload => 3,
            Self::HoldReleased => 4,
        }
    }
}

/// Set of topics a subscriber listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topics(u8);

impl Topics {
    #[must_use]
    pub const fn all() -> Self {
        Self(0b1_1111)
    }

    #[must_use]
    pub fn only(topics: &[Topic]) -> Self {
        Self(topics.iter().fold(0, |mask, topic| mask | (1 << topic.index())))
    }

    #[must_use]
    pub const fn contains(self, topic: Topic) -> bool {
        self.0 & (1 << topic.index()) != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdEvent {
    PolicyChanged(Arc<AdPolicy>),
    FullScreenChanged(bool),
    BannerForceHidden(bool),
    /// Ask the banner host to reload its ad.
    BannerReload,
    /// Drop any hold kept for a full-screen kind that was just disabled.
    HoldReleased(AdKind),
}

impl AdEvent {
    #[must_use]
    pub const fn topic(&self) -> Topic {
        match self {
            Self::PolicyChanged(_) => Topic::Policy,
            Self::FullScreenChanged(_) => Topic::FullScreen,
            Self::BannerForceHidden(_) => Topic::BannerForceHidden,
            Self::BannerReload => Topic::BannerReload,
            Self::HoldReleased(_) => Topic::HoldReleased,
        }
    }
}
