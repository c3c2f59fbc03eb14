//! 订单撮合引擎
//!
//! 对单笔订单与当前行情做出撮合判定：市价/限价定价、涨跌停检查、
//! 流动性限制、滑点模拟、费用计算。判定过程不修改任何共享状态，
//! 资金与持仓的落账由交易所层完成。

use rand::Rng;

use crate::exchange::exchange_types::{MatchOutcome, OrderSide, OrderType, SimulatedOrder, TickSnapshot};
use crate::utils::config::ExchangeConfig;
use crate::utils::round_to_cent;

/// 单笔委托数量上限（股）
const MAX_ORDER_VOLUME: i64 = 1_000_000;

/// 委托数量溢出保护上限（10亿股）
const VOLUME_OVERFLOW_GUARD: i64 = 1_000_000_000;

/// 买入最小交易单位（1手 = 100股）
const LOT_SIZE: i64 = 100;

/// 大单滑点放大阈值（股）
const LARGE_ORDER_VOLUME: i64 = 10_000;

/// 涨跌停价判定容差（元）
const LIMIT_PRICE_TOLERANCE: f64 = 0.01;

/// 订单撮合引擎
///
/// 费率与滑点默认值来自 [`ExchangeConfig`]，订单自带费率（>0）时优先生效。
pub struct OrderMatcher {
    default_slippage_rate: f64,
    default_commission_rate: f64,
    min_commission: f64,
    stamp_tax_rate: f64,
    transfer_fee_rate: f64,
}

impl OrderMatcher {
    pub fn new() -> Self {
        Self::from_config(&ExchangeConfig::default())
    }

    pub fn from_config(config: &ExchangeConfig) -> Self {
        Self {
            default_slippage_rate: config.slippage_rate,
            default_commission_rate: config.commission_rate,
            min_commission: config.min_commission,
            stamp_tax_rate: config.stamp_tax_rate,
            transfer_fee_rate: config.transfer_fee_rate,
        }
    }

    /// 尝试撮合订单
    ///
    /// 判定顺序：数量校验 → 行情校验 → 基准价 → 涨跌停 → 流动性 → 滑点。
    /// `check_price_limit = false` 用于涨跌停排队放行的订单：
    /// 排队到位即视为在停板价上获得成交资格，不再重查停板。
    pub fn try_match(
        &self,
        order: &SimulatedOrder,
        tick: &TickSnapshot,
        check_price_limit: bool,
    ) -> MatchOutcome {
        // 1. 数量校验
        if let Some(reason) = self.validate_volume(order.volume, order.side) {
            return MatchOutcome::Rejected { reason };
        }

        // 2. 行情校验
        if tick.last_price <= 0.0 {
            return MatchOutcome::Rejected {
                reason: "Invalid tick price".to_string(),
            };
        }
        if order.order_type == OrderType::Limit && order.price <= 0.0 {
            return MatchOutcome::Rejected {
                reason: "Invalid limit price".to_string(),
            };
        }

        // 3. 确定基准价格
        let reference = match order.order_type {
            OrderType::Market => {
                // 市价单：买入按卖一价，卖出按买一价；无报价时退化到最新价
                let quoted = match order.side {
                    OrderSide::Buy => tick.ask_price,
                    OrderSide::Sell => tick.bid_price,
                };
                if quoted > 0.0 {
                    quoted
                } else {
                    tick.last_price
                }
            }
            OrderType::Limit => match order.side {
                OrderSide::Buy => {
                    // 买入限价单：卖一价高于限价时继续等待
                    if tick.ask_price > order.price {
                        return MatchOutcome::Pending {
                            reason: "Buy limit price too low".to_string(),
                        };
                    }
                    order.price
                }
                OrderSide::Sell => {
                    // 卖出限价单：买一价低于限价时继续等待
                    if tick.bid_price < order.price {
                        return MatchOutcome::Pending {
                            reason: "Sell limit price too high".to_string(),
                        };
                    }
                    order.price
                }
            },
        };

        // 4. 涨跌停检查
        if check_price_limit && tick.last_close > 0.0 {
            let limit_pct = Self::limit_pct(&order.symbol);
            let limit_up = round_to_cent(tick.last_close * (1.0 + limit_pct));
            let limit_down = round_to_cent(tick.last_close * (1.0 - limit_pct));

            match order.side {
                OrderSide::Buy => {
                    // 触及或越过涨停价的买单进入排队
                    if reference > limit_up - LIMIT_PRICE_TOLERANCE || reference < limit_down {
                        return MatchOutcome::LimitUp;
                    }
                }
                OrderSide::Sell => {
                    if reference < limit_down + LIMIT_PRICE_TOLERANCE || reference > limit_up {
                        return MatchOutcome::LimitDown;
                    }
                }
            }
        }

        // 5. 流动性检查：单笔不超过本tick成交量的10%
        if tick.volume > 0 && order.volume > tick.volume / 10 {
            return MatchOutcome::Rejected {
                reason: "Insufficient liquidity".to_string(),
            };
        }

        // 6. 滑点：随机扰动恒为不利方向，大单放大1.5倍
        let filled_price = self.apply_slippage(order, reference);

        MatchOutcome::Filled {
            price: filled_price,
            volume: order.volume,
        }
    }

    /// 委托数量校验，返回拒绝原因
    ///
    /// 买入必须为整手（100股倍数），卖出允许零股（清掉尾仓）。
    fn validate_volume(&self, volume: i64, side: OrderSide) -> Option<String> {
        if volume <= 0 {
            return Some("Order volume must be positive".to_string());
        }
        if volume > VOLUME_OVERFLOW_GUARD {
            return Some("Order volume out of range".to_string());
        }
        if volume > MAX_ORDER_VOLUME {
            return Some("Order volume exceeds maximum limit".to_string());
        }
        if side == OrderSide::Buy && volume % LOT_SIZE != 0 {
            return Some("Buy volume must be in whole lots of 100".to_string());
        }
        None
    }

    fn apply_slippage(&self, order: &SimulatedOrder, reference: f64) -> f64 {
        let mut slippage_rate = if order.slippage_rate > 0.0 {
            order.slippage_rate
        } else {
            self.default_slippage_rate
        };

        if order.volume > LARGE_ORDER_VOLUME {
            slippage_rate *= 1.5;
        }

        let u: f64 = rand::thread_rng().gen_range(-1.0..=1.0);
        let slippage = slippage_rate * u.abs();

        let filled_price = match order.side {
            OrderSide::Buy => reference * (1.0 + slippage),
            OrderSide::Sell => reference * (1.0 - slippage),
        };

        round_to_cent(filled_price)
    }

    /// 涨跌停幅度
    ///
    /// ST 5%，科创板(688)/创业板(300) 20%，北交所(8/4开头) 30%，普通A股 10%。
    pub fn limit_pct(symbol: &str) -> f64 {
        if symbol.contains("ST") || symbol.contains("st") {
            return 0.05;
        }
        if symbol.starts_with("688") || symbol.starts_with("300") {
            return 0.20;
        }
        if symbol.starts_with('8') || symbol.starts_with('4') {
            return 0.30;
        }
        0.10
    }

    /// 计算完整交易费用：佣金（最低5元）+ 印花税（仅卖出）+ 过户费（沪市双向）
    ///
    /// `commission_rate` 为0时使用默认佣金率。返回值舍入到分。
    pub fn total_commission(
        &self,
        side: OrderSide,
        symbol: &str,
        price: f64,
        volume: i64,
        commission_rate: f64,
    ) -> f64 {
        let amount = price * volume as f64;
        let rate = if commission_rate > 0.0 {
            commission_rate
        } else {
            self.default_commission_rate
        };

        let mut fee = (amount * rate).max(self.min_commission);

        if side == OrderSide::Sell {
            fee += amount * self.stamp_tax_rate;
        }

        // 沪市过户费按股数收取，买卖双向
        if symbol.starts_with('6') || symbol.starts_with("sh.6") {
            fee += volume as f64 * self.transfer_fee_rate;
        }

        round_to_cent(fee)
    }
}

impl Default for OrderMatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_tick() -> TickSnapshot {
        TickSnapshot {
            symbol: "600519".to_string(),
            timestamp: 1770343200000,
            last_price: 100.0,
            bid_price: 99.9,
            ask_price: 100.1,
            volume: 1_000_000,
            last_close: 99.0,
        }
    }

    fn zero_slippage_matcher() -> OrderMatcher {
        let config = ExchangeConfig {
            slippage_rate: 0.0,
            ..ExchangeConfig::default()
        };
        OrderMatcher::from_config(&config)
    }

    #[test]
    fn test_rejects_zero_volume() {
        let matcher = OrderMatcher::new();
        let order = SimulatedOrder::market("600519", OrderSide::Buy, 0);

        let outcome = matcher.try_match(&order, &valid_tick(), false);
        assert!(matches!(outcome, MatchOutcome::Rejected { reason } if reason.contains("volume")));
    }

    #[test]
    fn test_rejects_negative_volume() {
        let matcher = OrderMatcher::new();
        let order = SimulatedOrder::market("600519", OrderSide::Buy, -100);

        let outcome = matcher.try_match(&order, &valid_tick(), false);
        assert!(matches!(outcome, MatchOutcome::Rejected { .. }));
    }

    #[test]
    fn test_rejects_excessive_volume() {
        let matcher = OrderMatcher::new();
        let order = SimulatedOrder::market("600519", OrderSide::Buy, 2_000_000_000);

        let outcome = matcher.try_match(&order, &valid_tick(), false);
        assert!(matches!(outcome, MatchOutcome::Rejected { reason } if reason.contains("range")));

        let order = SimulatedOrder::market("600519", OrderSide::Buy, 1_000_100);
        let outcome = matcher.try_match(&order, &valid_tick(), false);
        assert!(matches!(outcome, MatchOutcome::Rejected { reason } if reason.contains("maximum")));
    }

    #[test]
    fn test_buy_lot_rule() {
        let matcher = OrderMatcher::new();

        let order = SimulatedOrder::limit("600519", OrderSide::Buy, 100.0, 150);
        let outcome = matcher.try_match(&order, &valid_tick(), false);
        assert!(matches!(outcome, MatchOutcome::Rejected { reason } if reason.contains("lots")));

        // 卖出允许零股
        let order = SimulatedOrder::limit("600519", OrderSide::Sell, 99.0, 150);
        let outcome = matcher.try_match(&order, &valid_tick(), false);
        assert!(outcome.is_filled());
    }

    #[test]
    fn test_rejects_invalid_tick_price() {
        let matcher = OrderMatcher::new();
        let order = SimulatedOrder::market("600519", OrderSide::Buy, 100);

        let mut tick = valid_tick();
        tick.last_price = 0.0;

        let outcome = matcher.try_match(&order, &tick, false);
        assert!(matches!(outcome, MatchOutcome::Rejected { reason } if reason.contains("tick")));
    }

    #[test]
    fn test_rejects_invalid_limit_price() {
        let matcher = OrderMatcher::new();
        let order = SimulatedOrder::limit("600519", OrderSide::Buy, -10.0, 100);

        let outcome = matcher.try_match(&order, &valid_tick(), false);
        assert!(matches!(outcome, MatchOutcome::Rejected { reason } if reason.contains("limit price")));
    }

    #[test]
    fn test_market_order_fills_at_quote() {
        let matcher = zero_slippage_matcher();
        let tick = valid_tick();

        let order = SimulatedOrder::market("600519", OrderSide::Buy, 100);
        let outcome = matcher.try_match(&order, &tick, false);
        assert_eq!(
            outcome,
            MatchOutcome::Filled { price: 100.1, volume: 100 }
        );

        let order = SimulatedOrder::market("600519", OrderSide::Sell, 100);
        let outcome = matcher.try_match(&order, &tick, false);
        assert_eq!(
            outcome,
            MatchOutcome::Filled { price: 99.9, volume: 100 }
        );
    }

    #[test]
    fn test_market_order_quote_fallback() {
        let matcher = zero_slippage_matcher();
        let mut tick = valid_tick();
        tick.ask_price = 0.0;

        let order = SimulatedOrder::market("600519", OrderSide::Buy, 100);
        let outcome = matcher.try_match(&order, &tick, false);
        assert_eq!(
            outcome,
            MatchOutcome::Filled { price: 100.0, volume: 100 }
        );
    }

    #[test]
    fn test_limit_order_defer() {
        let matcher = OrderMatcher::new();
        let tick = valid_tick();

        // 买入限价低于卖一价：等待
        let order = SimulatedOrder::limit("600519", OrderSide::Buy, 99.0, 100);
        let outcome = matcher.try_match(&order, &tick, false);
        assert!(matches!(outcome, MatchOutcome::Pending { reason } if reason.contains("limit price")));

        // 卖出限价高于买一价：等待
        let order = SimulatedOrder::limit("600519", OrderSide::Sell, 101.0, 100);
        let outcome = matcher.try_match(&order, &tick, false);
        assert!(matches!(outcome, MatchOutcome::Pending { .. }));
    }

    #[test]
    fn test_limit_order_fills_at_limit_price() {
        let matcher = zero_slippage_matcher();
        let tick = valid_tick();

        // 卖一 100.1 <= 限价 100.5，按限价成交
        let order = SimulatedOrder::limit("600519", OrderSide::Buy, 100.5, 100);
        let outcome = matcher.try_match(&order, &tick, false);
        assert_eq!(
            outcome,
            MatchOutcome::Filled { price: 100.5, volume: 100 }
        );
    }

    #[test]
    fn test_price_limit_parks_buy() {
        let matcher = OrderMatcher::new();
        // 昨收10.00，涨停11.00
        let tick = TickSnapshot {
            symbol: "600000".to_string(),
            timestamp: 0,
            last_price: 11.0,
            bid_price: 11.0,
            ask_price: 11.0,
            volume: 1_000_000,
            last_close: 10.0,
        };

        let order = SimulatedOrder::limit("600000", OrderSide::Buy, 11.0, 100);
        let outcome = matcher.try_match(&order, &tick, true);
        assert_eq!(outcome, MatchOutcome::LimitUp);

        // 关闭涨跌停检查则可成交
        let outcome = matcher.try_match(&order, &tick, false);
        assert!(outcome.is_filled());
    }

    #[test]
    fn test_price_limit_parks_sell() {
        let matcher = OrderMatcher::new();
        // 昨收10.00，跌停9.00
        let tick = TickSnapshot {
            symbol: "600000".to_string(),
            timestamp: 0,
            last_price: 9.0,
            bid_price: 9.0,
            ask_price: 9.0,
            volume: 1_000_000,
            last_close: 10.0,
        };

        let order = SimulatedOrder::limit("600000", OrderSide::Sell, 9.0, 100);
        let outcome = matcher.try_match(&order, &tick, true);
        assert_eq!(outcome, MatchOutcome::LimitDown);
    }

    #[test]
    fn test_price_within_limit_fills() {
        let matcher = zero_slippage_matcher();
        let tick = TickSnapshot {
            symbol: "600000".to_string(),
            timestamp: 0,
            last_price: 10.5,
            bid_price: 10.49,
            ask_price: 10.5,
            volume: 1_000_000,
            last_close: 10.0,
        };

        let order = SimulatedOrder::limit("600000", OrderSide::Buy, 10.5, 100);
        let outcome = matcher.try_match(&order, &tick, true);
        assert!(outcome.is_filled());
    }

    #[test]
    fn test_no_limit_check_without_last_close() {
        let matcher = zero_slippage_matcher();
        let mut tick = valid_tick();
        tick.last_close = 0.0;
        tick.ask_price = 200.0; // 远超任何涨停幅度

        let order = SimulatedOrder::market("600519", OrderSide::Buy, 100);
        let outcome = matcher.try_match(&order, &tick, true);
        assert!(outcome.is_filled());
    }

    #[test]
    fn test_liquidity_cap() {
        let matcher = OrderMatcher::new();
        let mut tick = valid_tick();
        tick.volume = 5_000;

        // 5000 / 10 = 500 为上限
        let order = SimulatedOrder::market("600519", OrderSide::Buy, 600);
        let outcome = matcher.try_match(&order, &tick, false);
        assert!(matches!(outcome, MatchOutcome::Rejected { reason } if reason.contains("liquidity")));

        let order = SimulatedOrder::market("600519", OrderSide::Buy, 500);
        assert!(matcher.try_match(&order, &tick, false).is_filled());

        // 无成交量数据时不检查
        tick.volume = 0;
        let order = SimulatedOrder::market("600519", OrderSide::Buy, 600);
        assert!(matcher.try_match(&order, &tick, false).is_filled());
    }

    #[test]
    fn test_slippage_always_adverse() {
        let config = ExchangeConfig {
            slippage_rate: 0.01,
            ..ExchangeConfig::default()
        };
        let matcher = OrderMatcher::from_config(&config);
        let tick = valid_tick();

        for _ in 0..50 {
            let order = SimulatedOrder::market("600519", OrderSide::Buy, 100);
            if let MatchOutcome::Filled { price, .. } = matcher.try_match(&order, &tick, false) {
                assert!(price >= 100.1);
                assert!(price <= round_to_cent(100.1 * 1.01));
            } else {
                panic!("expected fill");
            }

            let order = SimulatedOrder::market("600519", OrderSide::Sell, 100);
            if let MatchOutcome::Filled { price, .. } = matcher.try_match(&order, &tick, false) {
                assert!(price <= 99.9);
                assert!(price >= round_to_cent(99.9 * 0.99));
            } else {
                panic!("expected fill");
            }
        }
    }

    #[test]
    fn test_large_order_slippage_amplified() {
        let config = ExchangeConfig {
            slippage_rate: 0.01,
            ..ExchangeConfig::default()
        };
        let matcher = OrderMatcher::from_config(&config);
        let mut tick = valid_tick();
        tick.volume = 10_000_000;

        // 大单滑点上界放大1.5倍
        for _ in 0..50 {
            let order = SimulatedOrder::market("600519", OrderSide::Buy, 20_000);
            if let MatchOutcome::Filled { price, .. } = matcher.try_match(&order, &tick, false) {
                assert!(price >= 100.1);
                assert!(price <= round_to_cent(100.1 * 1.015));
            } else {
                panic!("expected fill");
            }
        }
    }

    #[test]
    fn test_limit_pct_classes() {
        assert_eq!(OrderMatcher::limit_pct("600000"), 0.10);
        assert_eq!(OrderMatcher::limit_pct("000001"), 0.10);
        assert_eq!(OrderMatcher::limit_pct("688001"), 0.20);
        assert_eq!(OrderMatcher::limit_pct("300750"), 0.20);
        assert_eq!(OrderMatcher::limit_pct("830001"), 0.30);
        assert_eq!(OrderMatcher::limit_pct("430047"), 0.30);
        assert_eq!(OrderMatcher::limit_pct("ST0001"), 0.05);
        assert_eq!(OrderMatcher::limit_pct("st0001"), 0.05);
    }

    #[test]
    fn test_commission_floor() {
        let matcher = OrderMatcher::new();

        // 1000元成交额，佣金0.25元不足最低5元
        let fee = matcher.total_commission(OrderSide::Buy, "sh.600519", 10.0, 100, 0.00025);
        assert_eq!(fee, 5.0);
    }

    #[test]
    fn test_commission_sell_stamp_tax() {
        let matcher = OrderMatcher::new();

        // 卖出：佣金5.00 + 印花税1.00 + 过户费0.002 = 6.00
        let fee = matcher.total_commission(OrderSide::Sell, "sh.600519", 10.0, 100, 0.00025);
        assert_eq!(fee, 6.0);
    }

    #[test]
    fn test_commission_shanghai_transfer_fee() {
        let matcher = OrderMatcher::new();

        // 180万成交额：沪市多收 1000 * 0.00002 = 0.02 过户费
        let fee_sh = matcher.total_commission(OrderSide::Buy, "sh.600519", 1800.0, 1000, 0.00025);
        let fee_sz = matcher.total_commission(OrderSide::Buy, "sz.000001", 1800.0, 1000, 0.00025);
        assert_eq!(fee_sh, 450.02);
        assert_eq!(fee_sz, 450.0);

        // 不带交易所前缀的沪市代码同样适用
        let fee_bare = matcher.total_commission(OrderSide::Buy, "600519", 1800.0, 1000, 0.00025);
        assert_eq!(fee_bare, 450.02);
    }

    #[test]
    fn test_commission_default_rate() {
        let matcher = OrderMatcher::new();

        // rate = 0 回落到默认万2.5
        let fee = matcher.total_commission(OrderSide::Buy, "000001", 100.0, 100_000, 0.0);
        assert_eq!(fee, 2500.0);
    }
}
