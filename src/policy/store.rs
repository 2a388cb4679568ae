//! Current-policy holder.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::engine::events::AdEvent;
use crate::engine::hub::ListenerHub;
use crate::kind::AdKind;

use super::model::AdPolicy;

/// Outcome of [`PolicyStore::set`].
#[derive(Debug, Clone)]
pub struct PolicyChange {
    pub changed: bool,
    pub previous: Arc<AdPolicy>,
    pub current: Arc<AdPolicy>,
    /// Full-screen kinds that went from enabled to disabled.
    pub released: Vec<AdKind>,
}

pub struct PolicyStore {
    current: RwLock<Option<Arc<AdPolicy>>>,
    fallback: Arc<AdPolicy>,
    // Serialises setters so hub sequence order is the order of swaps.
    writer: Mutex<()>,
    hub: ListenerHub,
}

impl PolicyStore {
    pub fn new(hub: ListenerHub) -> Self {
        let fallback = Arc::new(AdPolicy::fail_closed());
        hub.seed(AdEvent::PolicyChanged(Arc::clone(&fallback)));
        Self {
            current: RwLock::new(None),
            fallback,
            writer: Mutex::new(()),
            hub,
        }
    }

    /// Last loaded snapshot, or the fail-closed default.
    pub fn get(&self) -> Arc<AdPolicy> {
        self.current
            .read()
            .as_ref()
            .map_or_else(|| Arc::clone(&self.fallback), Arc::clone)
    }

    pub fn is_loaded(&self) -> bool {
        self.current.read().is_some()
    }

    /// Swap in a new snapshot. Subscribers hear about it only when a
    /// decision-relevant field differs; hold releases are delivered before
    /// this returns.
    pub fn set(&self, policy: AdPolicy) -> PolicyChange {
        self.swap(Some(Arc::new(policy)))
    }

    /// Forget the loaded policy and fall back to the fail-closed default.
    pub fn clear(&self) -> PolicyChange {
        self.swap(None)
    }

    fn swap(&self, next: Option<Arc<AdPolicy>>) -> PolicyChange {
        let (change, prepared) = {
            let _writer = self.writer.lock();
            let previous = self.get();
            let current = next.clone().unwrap_or_else(|| Arc::clone(&self.fallback));
            *self.current.write() = next;

            let changed = current.differs_from(&previous);
            let released: Vec<AdKind> = AdKind::FULL_SCREEN
                .into_iter()
                .filter(|kind| previous.is_enabled(*kind) && !current.is_enabled(*kind))
                .collect();

            let mut prepared = Vec::new();
            if changed {
                prepared.push(self.hub.prepare(AdEvent::PolicyChanged(Arc::clone(&current))));
                for kind in &released {
                    prepared.push(self.hub.prepare(AdEvent::HoldReleased(*kind)));
                }
                if current.is_enabled(AdKind::Banner) {
                    prepared.push(self.hub.prepare(AdEvent::BannerReload));
                }
            }
            (
                PolicyChange {
                    changed,
                    previous,
                    current,
                    released,
                },
                prepared,
            )
        };

        if change.changed {
            info!(
                id = ?change.current.id,
                active = change.current.active,
                app_open = change.current.app_open.enabled,
                interstitial = change.current.interstitial.enabled,
                banner = change.current.banner.enabled,
                "policy changed"
            );
        } else {
            debug!("policy unchanged");
        }
        for event in prepared {
            self.hub.deliver(event);
        }
        change
    }
}
