//! Central configuration constants for timings, endpoints and storage keys.

use std::time::Duration;

/// Host used when neither a host nor an endpoint is configured.
pub const DEFAULT_HOST: &str = "localhost:8080";

/// Path of the controller's WebSocket endpoint.
pub const DEFAULT_WS_PATH: &str = "/ws";

/// Path of the REST endpoint used for optimistic slot actions.
pub const ACTION_PATH: &str = "/api/action";

/// First reconnect delay, also the value restored after a successful open.
pub const BACKOFF_FLOOR_MS: u64 = 1_000;

/// Upper bound for the reconnect delay.
pub const BACKOFF_CEILING_MS: u64 = 30_000;

/// How long a progress bar takes to catch up with a reported percentage.
pub const PROGRESS_CATCH_UP_MS: u64 = 1_000;

/// Duration of the slow creep toward completion after a catch-up.
pub const CREEP_DURATION_MS: u64 = 10_000;

/// Share of the remaining distance covered by the creep.
pub const CREEP_FRACTION: f64 = 0.8;

/// Pause between a full progress bar and the success label.
pub const SUCCESS_SETTLE_MS: u64 = 500;

/// Timeout for the action REST call.
pub const ACTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Snapshot key inside the local store.
pub const SNAPSHOT_KEY: &str = "parking-dashboard-state";

/// Application identifiers used to resolve per-user data directories.
pub const APP_QUALIFIER: &str = "io";
pub const APP_ORGANIZATION: &str = "parkdash";
pub const APP_NAME: &str = "parkdash";

pub fn backoff_floor() -> Duration {
    Duration::from_millis(BACKOFF_FLOOR_MS)
}

pub fn backoff_ceiling() -> Duration {
    Duration::from_millis(BACKOFF_CEILING_MS)
}
