//! adgate - Ad display policy and rate-limiting engine
//!
//! Decides whether an app-open, interstitial or banner ad may be shown right
//! now, given a remotely supplied policy, rolling hour/day caps, per-kind
//! cooldowns and a gate that keeps at most one full-screen ad on screen.

pub mod app;
pub mod cli;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod kind;
pub mod limits;
pub mod policy;
pub mod storage;
pub mod test_utils;

pub use clock::{CalendarZone, Clock, ManualClock, SystemClock};
pub use engine::{AdEngine, AdEngineBuilder, AdEvent, Denial, Subscription, Topic, Topics};
pub use error::{AdError, Result};
pub use kind::AdKind;
pub use policy::{AdPolicy, KindPolicy, Limit};
