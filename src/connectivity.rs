use std::sync::atomic::{AtomicBool, Ordering};

/// Shared online/offline flag for the whole service.
///
/// A background task flips it based on periodic CRM health probes; the
/// execution service and the offline queue read it to decide between
/// executing directly and queueing for replay.
pub struct ConnectivityMonitor {
    online: AtomicBool,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        Self {
            online: AtomicBool::new(initially_online),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Updates the flag and returns `true` when this call was an
    /// offline-to-online transition (the queue-drain trigger).
    pub fn set_online(&self, online: bool) -> bool {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        if was_online != online {
            if online {
                tracing::info!("Connectivity restored, back online");
            } else {
                tracing::warn!("Connectivity lost, entering offline mode");
            }
        }
        online && !was_online
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_to_online_reported_once() {
        let monitor = ConnectivityMonitor::new(false);
        assert!(!monitor.is_online());

        assert!(monitor.set_online(true));
        assert!(monitor.is_online());
        // Staying online is not a transition.
        assert!(!monitor.set_online(true));

        assert!(!monitor.set_online(false));
        assert!(!monitor.is_online());
    }
}
