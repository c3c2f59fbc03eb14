//! 工具模块
//!
//! 金额舍入与交易日换算

/// 配置管理
pub mod config;

use chrono::{Datelike, Duration};

/// 四舍五入到分（远离零方向）
///
/// 仅在金额落库（持仓/账户字段、成交记录）时调用，中间计算保持全精度。
pub fn round_to_cent(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// 毫秒时间戳转交易日（YYYYMMDD 整数，东八区）
///
/// A股交易时段以北京时间为准，直接按 UTC 换算会把晚间时间戳划入前一天。
pub fn timestamp_to_trading_date(timestamp_ms: i64) -> i64 {
    match chrono::DateTime::from_timestamp_millis(timestamp_ms) {
        Some(dt) => {
            let cst = dt + Duration::hours(8);
            let d = cst.date_naive();
            d.year() as i64 * 10000 + d.month() as i64 * 100 + d.day() as i64
        }
        None => 0,
    }
}

/// 当前毫秒时间戳
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_to_cent() {
        assert_eq!(round_to_cent(10.004), 10.0);
        assert_eq!(round_to_cent(10.005), 10.01);
        assert_eq!(round_to_cent(10.995), 11.0);
        assert_eq!(round_to_cent(0.0), 0.0);
    }

    #[test]
    fn test_round_to_cent_negative() {
        // 远离零：-0.005 -> -0.01
        assert_eq!(round_to_cent(-10.005), -10.01);
        assert_eq!(round_to_cent(-10.004), -10.0);
    }

    #[test]
    fn test_timestamp_to_trading_date() {
        // 2026-02-06 02:00:00 UTC = 2026-02-06 10:00 北京时间
        assert_eq!(timestamp_to_trading_date(1770343200000), 20260206);
        // 2026-02-06 17:00:00 UTC = 2026-02-07 01:00 北京时间，应归入次日
        assert_eq!(timestamp_to_trading_date(1770397200000), 20260207);
    }

    #[test]
    fn test_timestamp_invalid() {
        assert_eq!(timestamp_to_trading_date(i64::MAX), 0);
    }
}
