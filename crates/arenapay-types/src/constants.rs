//! System-wide constants for the ArenaPay settlement engine.

/// Default cap on withdrawal requests per user per server-local day.
pub const DEFAULT_DAILY_WITHDRAWAL_LIMIT: i64 = 1000;

/// Default smallest withdrawal a user may request.
pub const DEFAULT_MIN_WITHDRAWAL: i64 = 100;

/// Pending deposits/withdrawals older than this are failed by the scheduler.
pub const DEFAULT_STUCK_ENTRY_TIMEOUT_SECS: u64 = 30 * 60;

/// Default drift tolerance, in hundredths of a coin.
pub const DEFAULT_DRIFT_EPSILON_HUNDREDTHS: i64 = 1;

/// Rejected-as-fraud deposits before an account is banned.
pub const DEFAULT_FRAUD_STRIKE_BAN_THRESHOLD: u8 = 3;

/// Default scheduler tick interval.
pub const DEFAULT_SCHEDULER_INTERVAL_SECS: u64 = 60;

/// Default bounded retry count for transient store failures.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Tag carried by every reconciliation correction entry.
pub const RECONCILIATION_TAG: &str = "reconciliation-correction";

/// Description written on reconciliation correction entries.
pub const RECONCILIATION_DESCRIPTION: &str = "Balance reconciliation correction";

/// Reason recorded on entries failed by the stuck-entry timeout.
pub const STUCK_ENTRY_REASON: &str = "Timed out waiting for review";

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "ArenaPay";
