//! Configuration for the wallet engine and its scheduler.
//!
//! Every field has a default, so a config file only needs the values it
//! overrides.

use std::path::Path;

use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ArenaError, Result, constants};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Max sum of pending + approved withdrawals per server-local day.
    pub daily_withdrawal_limit: Decimal,
    pub min_withdrawal: Decimal,
    /// Age after which a pending deposit/withdrawal is failed.
    pub stuck_entry_timeout_secs: u64,
    /// Drift at or below this magnitude is ignored by the auditor.
    pub drift_epsilon: Decimal,
    pub fraud_strike_ban_threshold: u8,
    /// UTC offset of the server's calendar day, in seconds east of UTC.
    pub server_utc_offset_secs: i32,
    /// Attempts for user-initiated operations that hit a transient failure.
    pub retry_attempts: u32,
    pub scheduler: SchedulerConfig,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            daily_withdrawal_limit: Decimal::new(constants::DEFAULT_DAILY_WITHDRAWAL_LIMIT, 0),
            min_withdrawal: Decimal::new(constants::DEFAULT_MIN_WITHDRAWAL, 0),
            stuck_entry_timeout_secs: constants::DEFAULT_STUCK_ENTRY_TIMEOUT_SECS,
            drift_epsilon: Decimal::new(constants::DEFAULT_DRIFT_EPSILON_HUNDREDTHS, 2),
            fraud_strike_ban_threshold: constants::DEFAULT_FRAUD_STRIKE_BAN_THRESHOLD,
            server_utc_offset_secs: 0,
            retry_attempts: constants::DEFAULT_RETRY_ATTEMPTS,
            scheduler: SchedulerConfig::default(),
        }
    }
}

/// Scheduler trigger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub interval_secs: u64,
    /// Secret the external trigger must present. With no secret configured
    /// every trigger is refused.
    pub shared_secret: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: constants::DEFAULT_SCHEDULER_INTERVAL_SECS,
            shared_secret: None,
        }
    }
}

impl WalletConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| ArenaError::Configuration(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.daily_withdrawal_limit <= Decimal::ZERO {
            return Err(ArenaError::Configuration("daily_withdrawal_limit must be > 0".into()));
        }
        if self.min_withdrawal <= Decimal::ZERO
            || self.min_withdrawal > self.daily_withdrawal_limit
        {
            return Err(ArenaError::Configuration(
                "min_withdrawal must be in (0, daily_withdrawal_limit]".into(),
            ));
        }
        if self.drift_epsilon.is_sign_negative() {
            return Err(ArenaError::Configuration("drift_epsilon must be >= 0".into()));
        }
        if self.fraud_strike_ban_threshold == 0 {
            return Err(ArenaError::Configuration("fraud_strike_ban_threshold must be > 0".into()));
        }
        if self.retry_attempts == 0 {
            return Err(ArenaError::Configuration("retry_attempts must be > 0".into()));
        }
        if self.scheduler.interval_secs == 0 {
            return Err(ArenaError::Configuration("scheduler.interval_secs must be > 0".into()));
        }
        self.server_offset()?;
        Ok(())
    }

    pub fn server_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.server_utc_offset_secs).ok_or_else(|| {
            ArenaError::Configuration(format!(
                "server_utc_offset_secs {} out of range",
                self.server_utc_offset_secs
            ))
        })
    }

    #[must_use]
    pub fn stuck_entry_timeout(&self) -> Duration {
        Duration::seconds(i64::try_from(self.stuck_entry_timeout_secs).unwrap_or(i64::MAX / 1000))
    }

    /// `[start, end)` of the server-local calendar day containing `now`.
    pub fn day_window(&self, now: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let offset = self.server_offset()?;
        let midnight = now
            .with_timezone(&offset)
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| ArenaError::Internal("midnight out of range".into()))?;
        let start = offset
            .from_local_datetime(&midnight)
            .single()
            .ok_or_else(|| ArenaError::Internal("ambiguous local midnight".into()))?
            .with_timezone(&Utc);
        Ok((start, start + Duration::days(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = WalletConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.daily_withdrawal_limit, Decimal::new(1000, 0));
        assert_eq!(cfg.stuck_entry_timeout(), Duration::minutes(30));
        assert_eq!(cfg.scheduler.interval_secs, 60);
        assert!(cfg.scheduler.shared_secret.is_none());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = WalletConfig::from_json_str(
            r#"{"daily_withdrawal_limit": "2500", "scheduler": {"shared_secret": "s3cret"}}"#,
        )
        .unwrap();
        assert_eq!(cfg.daily_withdrawal_limit, Decimal::new(2500, 0));
        assert_eq!(cfg.min_withdrawal, Decimal::new(100, 0));
        assert_eq!(cfg.scheduler.shared_secret.as_deref(), Some("s3cret"));
        assert_eq!(cfg.scheduler.interval_secs, 60);
    }

    #[test]
    fn invalid_values_rejected() {
        let err = WalletConfig::from_json_str(r#"{"retry_attempts": 0}"#).unwrap_err();
        assert!(matches!(err, ArenaError::Configuration(_)));
        let err = WalletConfig::from_json_str(r#"{"min_withdrawal": "5000"}"#).unwrap_err();
        assert!(matches!(err, ArenaError::Configuration(_)));
        let err = WalletConfig::from_json_str("not json").unwrap_err();
        assert!(matches!(err, ArenaError::Configuration(_)));
    }

    #[test]
    fn day_window_respects_offset() {
        let now = Utc.with_ymd_and_hms(2026, 5, 10, 22, 30, 0).unwrap();

        let utc = WalletConfig::default();
        let (start, end) = utc.day_window(now).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 5, 10, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 5, 11, 0, 0, 0).unwrap());

        // UTC+05:30: 22:30 UTC is already 04:00 on the 11th locally.
        let ist = WalletConfig {
            server_utc_offset_secs: 5 * 3600 + 1800,
            ..WalletConfig::default()
        };
        let (start, _) = ist.day_window(now).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 5, 10, 18, 30, 0).unwrap());
    }
}
