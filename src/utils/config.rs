//! 配置管理模块

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::{ExchangeError, Result};

/// 模拟交易所配置
///
/// 费率默认值与A股实盘惯例一致：佣金万2.5（最低5元）、印花税千一（仅卖出）、
/// 沪市过户费每股0.002分、滑点万一。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// 账户ID
    #[serde(default = "default_account_id")]
    pub account_id: String,

    /// 初始资金
    #[serde(default = "default_initial_capital")]
    pub initial_capital: f64,

    /// 佣金率
    #[serde(default = "default_commission_rate")]
    pub commission_rate: f64,

    /// 最低佣金（元）
    #[serde(default = "default_min_commission")]
    pub min_commission: f64,

    /// 印花税率（仅卖出）
    #[serde(default = "default_stamp_tax_rate")]
    pub stamp_tax_rate: f64,

    /// 过户费率（沪市，按股数，买卖双向）
    #[serde(default = "default_transfer_fee_rate")]
    pub transfer_fee_rate: f64,

    /// 滑点率
    #[serde(default = "default_slippage_rate")]
    pub slippage_rate: f64,

    /// 市价单无行情时的冻结价格上限（元/股）
    #[serde(default = "default_market_price_ceiling")]
    pub market_price_ceiling: f64,

    /// 是否启用涨跌停检查
    #[serde(default = "default_true")]
    pub check_price_limit: bool,
}

fn default_account_id() -> String {
    "sim_account".to_string()
}

fn default_initial_capital() -> f64 {
    1_000_000.0
}

fn default_commission_rate() -> f64 {
    0.00025
}

fn default_min_commission() -> f64 {
    5.0
}

fn default_stamp_tax_rate() -> f64 {
    0.001
}

fn default_transfer_fee_rate() -> f64 {
    0.00002
}

fn default_slippage_rate() -> f64 {
    0.0001
}

fn default_market_price_ceiling() -> f64 {
    1_000_000.0
}

fn default_true() -> bool {
    true
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            account_id: default_account_id(),
            initial_capital: default_initial_capital(),
            commission_rate: default_commission_rate(),
            min_commission: default_min_commission(),
            stamp_tax_rate: default_stamp_tax_rate(),
            transfer_fee_rate: default_transfer_fee_rate(),
            slippage_rate: default_slippage_rate(),
            market_price_ceiling: default_market_price_ceiling(),
            check_price_limit: default_true(),
        }
    }
}

impl ExchangeConfig {
    /// 从 TOML 文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| ExchangeError::IOError(format!("Failed to read config file: {}", e)))?;
        toml::from_str(&content)
            .map_err(|e| ExchangeError::ConfigError(format!("Failed to parse config file: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ExchangeConfig::default();
        assert_eq!(config.commission_rate, 0.00025);
        assert_eq!(config.min_commission, 5.0);
        assert_eq!(config.stamp_tax_rate, 0.001);
        assert!(config.check_price_limit);
    }

    #[test]
    fn test_parse_partial_toml() {
        // 缺省字段应回落到默认值
        let config: ExchangeConfig = toml::from_str(
            r#"
            account_id = "bt_001"
            initial_capital = 100000.0
            slippage_rate = 0.0
            "#,
        )
        .unwrap();

        assert_eq!(config.account_id, "bt_001");
        assert_eq!(config.initial_capital, 100000.0);
        assert_eq!(config.slippage_rate, 0.0);
        assert_eq!(config.commission_rate, 0.00025);
        assert_eq!(config.market_price_ceiling, 1_000_000.0);
    }

    #[test]
    fn test_load_missing_file() {
        let result = ExchangeConfig::load_from_file("/nonexistent/config.toml");
        assert!(result.is_err());
    }
}
