//! Rate limits: rolling hour/day windows and cooldown timestamps.

pub mod cooldown;
pub mod window;

pub use cooldown::{CooldownState, CooldownTracker};
pub use window::{WindowCounter, WindowState};
