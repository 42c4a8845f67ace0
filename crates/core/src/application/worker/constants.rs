// Worker constants (no magic values)
use std::time::Duration;

/// Sleep duration when the channel is empty (100ms)
pub const IDLE_SLEEP_DURATION: Duration = Duration::from_millis(100);

/// Sleep duration after a queue error before retry (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// Interval between heartbeats on a claimed item (10s)
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// A claim without a heartbeat for this long is considered abandoned (2 minutes)
pub const DEFAULT_VISIBILITY_TIMEOUT_MS: i64 = 2 * 60 * 1000;

/// Deliveries before an abandoned item is buried
pub const DEFAULT_MAX_DELIVERIES: i32 = 3;

/// Queue channel used when none is configured
pub const DEFAULT_CHANNEL: &str = "financial_analysis";
