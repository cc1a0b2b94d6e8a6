//! Connectivity monitor.

use tokio::sync::watch;
use tracing::info;

/// Value published to subscribers.
///
/// `restores` lets a subscriber that polls late still see an offline to
/// online transition whose intermediate state it missed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkState {
    pub online: bool,
    /// Offline to online transitions so far.
    pub restores: u64,
}

/// Current online/offline state, observable by the scheduler.
#[derive(Debug, Clone)]
pub struct Connectivity {
    tx: watch::Sender<LinkState>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (tx, _) = watch::channel(LinkState {
            online,
            restores: 0,
        });
        Self { tx }
    }

    pub fn is_online(&self) -> bool {
        self.tx.borrow().online
    }

    pub fn state(&self) -> LinkState {
        *self.tx.borrow()
    }

    /// Update the state. Returns `true` if it changed.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if current.online == online {
                return false;
            }
            current.online = online;
            if online {
                current.restores += 1;
            }
            true
        });
        if changed {
            info!("Connectivity: {}", if online { "online" } else { "offline" });
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<LinkState> {
        self.tx.subscribe()
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}
