//! Analytics hook.

use serde::Serialize;
use tracing::{debug, info};

use crate::kind::AdKind;

use super::denial::Denial;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ReportKind {
    Reserved { kind: AdKind },
    ReserveDenied { kind: AdKind, denial: Denial },
    Unreserved { kind: AdKind },
    Shown { kind: AdKind },
    /// Confirmed show that had no matching reservation.
    ShownWithoutReservation { kind: AdKind },
    Dismissed,
    PolicyApplied { changed: bool },
}

pub trait EventReporter: Send + Sync {
    fn report(&self, event: ReportKind);
}

/// Default reporter: writes every event to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl EventReporter for TracingReporter {
    fn report(&self, event: ReportKind) {
        match &event {
            ReportKind::ReserveDenied { kind, denial } => {
                debug!(kind = %kind, reason = denial.code(), "reserve denied");
            }
            ReportKind::ShownWithoutReservation { kind } => {
                debug!(kind = %kind, "show recorded without a reservation");
            }
            other => info!(event = ?other, "ad event"),
        }
    }
}
