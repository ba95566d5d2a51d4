use std::sync::RwLock;

use crate::config::{ProxyConfig, ProxyStatus};

pub type StatusListener = Box<dyn Fn(&ProxyStatus) + Send + Sync>;

/// Partial status update. `None` leaves a field alone; the inner option is
/// the new value for the nullable fields.
#[derive(Debug, Default)]
pub struct StatusUpdate {
    pub is_connected: Option<bool>,
    pub config: Option<Option<ProxyConfig>>,
    pub latency_ms: Option<Option<u64>>,
    pub last_error: Option<Option<String>>,
}

/// Single source of truth for the externally visible connection status.
/// `publish` is the only mutation path; the Health Monitor and the
/// Connection Manager are its only callers. Reads never touch the network
/// and are safe at polling frequency.
pub struct StatusPublisher {
    status: RwLock<ProxyStatus>,
    listeners: RwLock<Vec<StatusListener>>,
}

impl StatusPublisher {
    pub fn new() -> Self {
        Self {
            status: RwLock::new(ProxyStatus::default()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Last known snapshot, non-blocking.
    pub fn get(&self) -> ProxyStatus {
        self.status.read().unwrap().clone()
    }

    /// Merge the update, stamp `last_updated`, notify subscribers with the
    /// resulting snapshot.
    pub fn publish(&self, update: StatusUpdate) -> ProxyStatus {
        let snapshot = {
            let mut status = self.status.write().unwrap();
            if let Some(value) = update.is_connected {
                status.is_connected = value;
            }
            if let Some(value) = update.config {
                status.config = value.map(|c| c.sanitized());
            }
            if let Some(value) = update.latency_ms {
                status.latency_ms = value;
            }
            if let Some(value) = update.last_error {
                status.last_error = value;
            }
            status.last_updated = chrono::Utc::now().to_rfc3339();
            status.clone()
        };

        // Listeners run outside the lock so a slow subscriber cannot stall
        // status reads.
        for listener in self.listeners.read().unwrap().iter() {
            listener(&snapshot);
        }
        snapshot
    }

    pub fn subscribe(&self, listener: StatusListener) {
        self.listeners.write().unwrap().push(listener);
    }
}

impl Default for StatusPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn publish_merges_partial_updates() {
        let publisher = StatusPublisher::new();
        publisher.publish(StatusUpdate {
            is_connected: Some(true),
            latency_ms: Some(Some(42)),
            ..Default::default()
        });
        publisher.publish(StatusUpdate {
            last_error: Some(Some("probe failed".to_string())),
            ..Default::default()
        });

        let status = publisher.get();
        assert!(status.is_connected);
        assert_eq!(status.latency_ms, Some(42));
        assert_eq!(status.last_error.as_deref(), Some("probe failed"));
    }

    #[test]
    fn publish_stamps_last_updated() {
        let publisher = StatusPublisher::new();
        let before = publisher.get().last_updated;
        std::thread::sleep(std::time::Duration::from_millis(5));
        publisher.publish(StatusUpdate::default());
        let after = publisher.get().last_updated;
        assert!(after > before);
    }

    #[test]
    fn published_config_is_sanitized() {
        let publisher = StatusPublisher::new();
        let config = ProxyConfig {
            host: "h".to_string(),
            password: Some("secret".to_string()),
            ..ProxyConfig::default()
        };
        publisher.publish(StatusUpdate {
            config: Some(Some(config)),
            ..Default::default()
        });
        assert_eq!(publisher.get().config.unwrap().password, None);
    }

    #[test]
    fn subscribers_observe_every_publish() {
        let publisher = StatusPublisher::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        publisher.subscribe(Box::new(move |_| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        }));

        publisher.publish(StatusUpdate::default());
        publisher.publish(StatusUpdate {
            is_connected: Some(true),
            ..Default::default()
        });
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
