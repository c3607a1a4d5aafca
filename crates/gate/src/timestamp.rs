//! 时间戳窗口校验

use crate::error::TimestampOutOfWindow;
use std::time::Duration;

/// 当前 unix 时间（秒）
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// 时间戳守卫
///
/// `now - W` 与 `now + W` 两个边界都接受
#[derive(Debug, Clone, Copy)]
pub struct TimestampGuard {
    window_secs: i64,
}

impl TimestampGuard {
    pub fn new(window: Duration) -> Self {
        Self {
            window_secs: i64::try_from(window.as_secs()).unwrap_or(i64::MAX),
        }
    }

    pub fn window_secs(&self) -> i64 {
        self.window_secs
    }

    /// 以当前时间校验
    pub fn validate(&self, ts: i64) -> Result<(), TimestampOutOfWindow> {
        self.validate_at(ts, unix_now())
    }

    /// 以给定时间校验
    pub fn validate_at(&self, ts: i64, now: i64) -> Result<(), TimestampOutOfWindow> {
        let window = self.window_secs;

        if ts > now.saturating_add(window) {
            return Err(TimestampOutOfWindow::Future { ts, now, window });
        }

        if ts < now.saturating_sub(window) {
            return Err(TimestampOutOfWindow::Stale { ts, now, window });
        }

        Ok(())
    }
}

impl Default for TimestampGuard {
    fn default() -> Self {
        Self::new(Duration::from_secs(crate::config::DEFAULT_WINDOW_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_window_boundaries() {
        let guard = TimestampGuard::default();

        assert!(guard.validate_at(NOW, NOW).is_ok());
        assert!(guard.validate_at(NOW - 300, NOW).is_ok());
        assert!(guard.validate_at(NOW + 300, NOW).is_ok());

        assert!(matches!(
            guard.validate_at(NOW - 301, NOW),
            Err(TimestampOutOfWindow::Stale { .. })
        ));
        assert!(matches!(
            guard.validate_at(NOW + 301, NOW),
            Err(TimestampOutOfWindow::Future { .. })
        ));
    }

    #[test]
    fn test_custom_window() {
        let guard = TimestampGuard::new(Duration::from_secs(10));
        assert!(guard.validate_at(NOW + 10, NOW).is_ok());
        assert!(guard.validate_at(NOW + 11, NOW).is_err());
    }

    #[test]
    fn test_extreme_values_do_not_overflow() {
        let guard = TimestampGuard::default();
        assert!(guard.validate_at(i64::MIN, NOW).is_err());
        assert!(guard.validate_at(i64::MAX, NOW).is_err());
        assert!(guard.validate_at(i64::MAX, i64::MAX).is_ok());
    }

    #[test]
    fn test_validate_uses_wall_clock() {
        let guard = TimestampGuard::default();
        assert!(guard.validate(unix_now()).is_ok());
        assert!(guard.validate(0).is_err());
    }
}
