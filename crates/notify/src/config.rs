//! Pipeline configuration loaded from environment variables.

/// Default fast poller cadence (milliseconds).
const DEFAULT_FAST_POLLER_DELAY_MS: u64 = 1_000;

/// Default slow poller cadence (milliseconds).
const DEFAULT_SLOW_POLLER_DELAY_MS: u64 = 30_000;

/// Boundary between "fresh" rows (fast poller) and "stuck" rows (slow
/// poller), in seconds since creation.
const DEFAULT_FRESH_WINDOW_SECS: i64 = 60;

/// Default publish retry budget per outbox row.
const DEFAULT_MAX_PUBLISH_RETRIES: i32 = 3;

/// Default send attempt budget per channel row.
const DEFAULT_MAX_SEND_ATTEMPTS: i32 = 3;

/// Default claim expiry: a crashed worker's claim is ignored after this.
const DEFAULT_CLAIM_EXPIRY_SECS: i64 = 300;

/// Default rows claimed per poll.
const DEFAULT_CHANNEL_BATCH_SIZE: i64 = 50;

/// Default retention window (hours) for terminal rows.
const DEFAULT_RETENTION_HOURS: i64 = 720;

/// Default cadence of the retention job (seconds).
const DEFAULT_RETENTION_INTERVAL_SECS: u64 = 3_600;

/// Runtime configuration for the notification pipeline.
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// Fast poller cadence in milliseconds.
    pub fast_poller_delay_ms: u64,
    /// Slow poller cadence in milliseconds.
    pub slow_poller_delay_ms: u64,
    /// Whether the slow (stuck-row) pollers run at all.
    pub slow_poller_enabled: bool,
    /// Rows younger than this are the fast poller's territory; rows at
    /// least this old belong to the slow poller. The windows are disjoint.
    pub fresh_window_secs: i64,
    /// Publish retry budget for outbox rows.
    pub max_publish_retries: i32,
    /// Send attempt budget for channel rows.
    pub max_send_attempts: i32,
    /// Seconds after which an unreleased claim is treated as abandoned.
    pub claim_expiry_secs: i64,
    /// Maximum rows claimed per poll.
    pub channel_batch_size: i64,
    /// Hours terminal rows are kept before the retention job purges them.
    pub retention_hours: i64,
    /// Retention job cadence in seconds.
    pub retention_interval_secs: u64,
}

impl NotifyConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable                        | Default |
    /// |---------------------------------|---------|
    /// | `NOTIFY_FAST_POLLER_DELAY_MS`   | `1000`  |
    /// | `NOTIFY_SLOW_POLLER_DELAY_MS`   | `30000` |
    /// | `NOTIFY_SLOW_POLLER_ENABLED`    | `true`  |
    /// | `NOTIFY_FRESH_WINDOW_SECS`      | `60`    |
    /// | `NOTIFY_MAX_PUBLISH_RETRIES`    | `3`     |
    /// | `NOTIFY_MAX_SEND_ATTEMPTS`      | `3`     |
    /// | `NOTIFY_CLAIM_EXPIRY_SECS`      | `300`   |
    /// | `NOTIFY_CHANNEL_BATCH_SIZE`     | `50`    |
    /// | `NOTIFY_RETENTION_HOURS`        | `720`   |
    /// | `NOTIFY_RETENTION_INTERVAL_SECS`| `3600`  |
    pub fn from_env() -> Self {
        Self {
            fast_poller_delay_ms: env_parse(
                "NOTIFY_FAST_POLLER_DELAY_MS",
                DEFAULT_FAST_POLLER_DELAY_MS,
            ),
            slow_poller_delay_ms: env_parse(
                "NOTIFY_SLOW_POLLER_DELAY_MS",
                DEFAULT_SLOW_POLLER_DELAY_MS,
            ),
            slow_poller_enabled: env_parse("NOTIFY_SLOW_POLLER_ENABLED", true),
            fresh_window_secs: env_parse("NOTIFY_FRESH_WINDOW_SECS", DEFAULT_FRESH_WINDOW_SECS),
            max_publish_retries: env_parse(
                "NOTIFY_MAX_PUBLISH_RETRIES",
                DEFAULT_MAX_PUBLISH_RETRIES,
            ),
            max_send_attempts: env_parse("NOTIFY_MAX_SEND_ATTEMPTS", DEFAULT_MAX_SEND_ATTEMPTS),
            claim_expiry_secs: env_parse("NOTIFY_CLAIM_EXPIRY_SECS", DEFAULT_CLAIM_EXPIRY_SECS),
            channel_batch_size: env_parse("NOTIFY_CHANNEL_BATCH_SIZE", DEFAULT_CHANNEL_BATCH_SIZE),
            retention_hours: env_parse("NOTIFY_RETENTION_HOURS", DEFAULT_RETENTION_HOURS),
            retention_interval_secs: env_parse(
                "NOTIFY_RETENTION_INTERVAL_SECS",
                DEFAULT_RETENTION_INTERVAL_SECS,
            ),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            fast_poller_delay_ms: DEFAULT_FAST_POLLER_DELAY_MS,
            slow_poller_delay_ms: DEFAULT_SLOW_POLLER_DELAY_MS,
            slow_poller_enabled: true,
            fresh_window_secs: DEFAULT_FRESH_WINDOW_SECS,
            max_publish_retries: DEFAULT_MAX_PUBLISH_RETRIES,
            max_send_attempts: DEFAULT_MAX_SEND_ATTEMPTS,
            claim_expiry_secs: DEFAULT_CLAIM_EXPIRY_SECS,
            channel_batch_size: DEFAULT_CHANNEL_BATCH_SIZE,
            retention_hours: DEFAULT_RETENTION_HOURS,
            retention_interval_secs: DEFAULT_RETENTION_INTERVAL_SECS,
        }
    }
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = NotifyConfig::default();
        assert_eq!(config.fast_poller_delay_ms, 1_000);
        assert_eq!(config.slow_poller_delay_ms, 30_000);
        assert!(config.slow_poller_enabled);
        assert_eq!(config.fresh_window_secs, 60);
        assert_eq!(config.max_publish_retries, 3);
        assert_eq!(config.max_send_attempts, 3);
        assert_eq!(config.channel_batch_size, 50);
        assert_eq!(config.retention_hours, 720);
    }
}
