//! Connectivity signal shared between the embedder and the scheduler

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared online/offline flag.
///
/// The scheduler consults it before spending a sync attempt; platform
/// shells flip it from their reachability callbacks. A fresh handle
/// assumes online, so an embedder that never reports anything still
/// syncs and the attempt itself becomes the probe.
#[derive(Debug, Clone)]
pub struct ConnectivityHandle {
    online: Arc<AtomicBool>,
}

impl ConnectivityHandle {
    /// Handle that starts online
    #[must_use]
    pub fn assume_online() -> Self {
        Self {
            online: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Handle that starts offline until the embedder reports otherwise
    #[must_use]
    pub fn start_offline() -> Self {
        Self {
            online: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Record the current reachability
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Relaxed);
    }

    /// Whether sync attempts are currently worth making
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }
}

impl Default for ConnectivityHandle {
    fn default() -> Self {
        Self::assume_online()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_handle_assumes_online() {
        assert!(ConnectivityHandle::default().is_online());
        assert!(!ConnectivityHandle::start_offline().is_online());
    }

    #[test]
    fn test_clones_share_the_flag() {
        let handle = ConnectivityHandle::assume_online();
        let shared = handle.clone();
        shared.set_online(false);
        assert!(!handle.is_online());
        handle.set_online(true);
        assert!(shared.is_online());
    }
}
