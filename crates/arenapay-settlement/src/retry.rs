//! Bounded retry for transient store failures.
//!
//! Only [`arenapay_types::ArenaError::is_transient`] failures are retried. A precondition
//! violation fails the same way every time and is returned at once.

use arenapay_types::Result;

/// Run `op` up to `attempts` times (at least once).
pub fn with_retry<T, F>(attempts: u32, operation: &'static str, mut op: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Err(e) if e.is_transient() && attempt < attempts => {
                tracing::warn!(operation, attempt, error = %e, "transient failure; retrying");
                attempt += 1;
            }
            Err(e) if e.is_transient() => {
                tracing::warn!(operation, attempts, error = %e, "transient failure; giving up");
                return Err(e);
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arenapay_types::ArenaError;

    #[test]
    fn transient_failures_are_retried() {
        let mut calls = 0;
        let value = with_retry(3, "test", || {
            calls += 1;
            if calls < 3 {
                Err(ArenaError::StoreUnavailable("poisoned".into()))
            } else {
                Ok(42)
            }
        })
        .unwrap();
        assert_eq!(value, 42);
        assert_eq!(calls, 3);
    }

    #[test]
    fn gives_up_after_attempts() {
        let mut calls = 0;
        let err = with_retry(2, "test", || -> Result<()> {
            calls += 1;
            Err(ArenaError::StoreUnavailable("poisoned".into()))
        })
        .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(calls, 2);
    }

    #[test]
    fn precondition_failures_are_not_retried() {
        let mut calls = 0;
        let err = with_retry(5, "test", || -> Result<()> {
            calls += 1;
            Err(ArenaError::AlreadyJoined)
        })
        .unwrap_err();
        assert!(matches!(err, ArenaError::AlreadyJoined));
        assert_eq!(calls, 1);
    }

    #[test]
    fn zero_attempts_still_runs_once() {
        let mut calls = 0;
        with_retry(0, "test", || {
            calls += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(calls, 1);
    }
}
