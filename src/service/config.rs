//! Service configuration

use std::time::Duration;

/// Camera service configuration options
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// How long a cached snapshot stays valid
    pub snapshot_ttl: Duration,

    /// Capacity of the service-wide event bus
    pub event_capacity: usize,

    /// Capacity of each relay's event channel
    pub relay_event_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            snapshot_ttl: Duration::from_secs(1), // Dashboards poll about once a second
            event_capacity: 64,
            relay_event_capacity: 64,
        }
    }
}

impl ServiceConfig {
    /// Set the snapshot cache TTL
    pub fn snapshot_ttl(mut self, ttl: Duration) -> Self {
        self.snapshot_ttl = ttl;
        self
    }

    /// Set the service event bus capacity
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Set the per-relay event channel capacity
    pub fn relay_event_capacity(mut self, capacity: usize) -> Self {
        self.relay_event_capacity = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServiceConfig::default();
        assert_eq!(config.snapshot_ttl, Duration::from_secs(1));
        assert_eq!(config.event_capacity, 64);
        assert_eq!(config.relay_event_capacity, 64);
    }

    #[test]
    fn test_builder() {
        let config = ServiceConfig::default()
            .snapshot_ttl(Duration::from_millis(250))
            .event_capacity(16)
            .relay_event_capacity(8);
        assert_eq!(config.snapshot_ttl, Duration::from_millis(250));
        assert_eq!(config.event_capacity, 16);
        assert_eq!(config.relay_event_capacity, 8);
    }
}
