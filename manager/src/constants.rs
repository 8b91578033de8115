//! Central repository for timeouts, intervals, and limits
//!
//! This module organizes constants by category so that the connection layer,
//! the queue adapters, and the alert engine share a single source of truth.

use std::time::Duration;

/// Reconnection backoff defaults
pub mod retry {
    use super::Duration;

    /// Attempts allowed before a connection stays in `error` until an operator reconnects
    pub const MAX_ATTEMPTS: u32 = 10;

    /// Delay before the first reconnect attempt
    pub const BASE_DELAY: Duration = Duration::from_millis(1_000);

    /// Ceiling for any reconnect delay
    pub const MAX_DELAY: Duration = Duration::from_millis(60_000);
}

/// Backend connection constants
pub mod redis {
    use super::Duration;

    /// Default key namespace used by both queue variants
    pub const DEFAULT_PREFIX: &str = "bull";

    /// Default backend port
    pub const DEFAULT_PORT: u16 = 6379;

    /// Timeout for establishing a connection to the backend
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Timeout for one-off connection tests
    pub const CONNECTION_TEST_TIMEOUT: Duration = Duration::from_secs(5);

    /// Interval between health-check pings on a live adapter
    pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(15);

    /// Consecutive failed pings after which the adapter reports a disconnect
    pub const HEALTH_CHECK_FAILURES_BEFORE_DISCONNECT: u32 = 3;

    /// COUNT hint passed to SCAN
    pub const SCAN_COUNT: usize = 500;
}

/// Job query defaults
pub mod jobs {
    /// Default page size for job listings
    pub const DEFAULT_LIMIT: usize = 100;

    /// Upper bound on jobs sampled per status by the metric evaluators
    pub const METRIC_SAMPLE_LIMIT: usize = 1_000;
}

/// Alert engine constants
pub mod alerts {
    use super::Duration;

    /// Interval between alert evaluation ticks
    pub const EVALUATION_INTERVAL: Duration = Duration::from_secs(30);

    /// Default notification cooldown in minutes
    pub const DEFAULT_COOLDOWN_MINUTES: u32 = 15;

    /// Cooldown bounds accepted on create/update
    pub const MIN_COOLDOWN_MINUTES: u32 = 1;
    pub const MAX_COOLDOWN_MINUTES: u32 = 1_440;

    /// Time window bounds for windowed alert types
    pub const MIN_TIME_WINDOW_MINUTES: u32 = 1;
    pub const MAX_TIME_WINDOW_MINUTES: u32 = 60;

    /// Default time window when none is configured
    pub const DEFAULT_TIME_WINDOW_MINUTES: u32 = 5;

    pub const MAX_NAME_LENGTH: usize = 100;
    pub const MAX_DESCRIPTION_LENGTH: usize = 500;

    /// History page size bounds
    pub const DEFAULT_HISTORY_LIMIT: u32 = 50;
    pub const MAX_HISTORY_LIMIT: u32 = 100;
}

/// Notification delivery constants
pub mod notifications {
    use super::Duration;

    /// Webhook request timeout
    pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

    /// Delivery attempts per notification
    pub const DELIVERY_ATTEMPTS: u32 = 3;

    /// Base delay for exponential delivery backoff
    pub const DELIVERY_BACKOFF: Duration = Duration::from_secs(5);

    pub const DEFAULT_SENDER: &str = "alerts@queue-manager.local";
}

/// Default configuration values
pub mod defaults {
    pub const DATABASE_PATH: &str = "data/queue-manager.db";
    pub const CONFIG_DIR: &str = "config";
}
