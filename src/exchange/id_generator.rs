//! 交易所ID生成器
//!
//! 订单与成交各自维护严格递增的序列号，时间戳仅作为ID前缀信息，
//! 唯一性由计数器保证，与时钟精度无关。

use std::sync::atomic::{AtomicI64, Ordering};

use crate::utils::now_ms;

/// 交易所ID生成器
///
/// - 订单ID: `ORDER_<毫秒时间戳>_<symbol>_<序列号>`
/// - 成交ID: `TRADE_<毫秒时间戳>_<序列号>`
pub struct ExchangeIdGenerator {
    /// 订单序列计数器
    order_seq: AtomicI64,

    /// 成交序列计数器
    trade_seq: AtomicI64,
}

impl ExchangeIdGenerator {
    pub fn new() -> Self {
        Self {
            order_seq: AtomicI64::new(0),
            trade_seq: AtomicI64::new(0),
        }
    }

    /// 生成下一个订单ID
    pub fn next_order_id(&self, symbol: &str) -> String {
        // fetch_add返回旧值，所以返回值+1就是新值
        let seq = self.order_seq.fetch_add(1, Ordering::SeqCst) + 1;
        format!("ORDER_{}_{}_{}", now_ms(), symbol, seq)
    }

    /// 生成下一个成交ID
    pub fn next_trade_id(&self) -> String {
        let seq = self.trade_seq.fetch_add(1, Ordering::SeqCst) + 1;
        format!("TRADE_{}_{}", now_ms(), seq)
    }

    /// 当前订单序列号（用于测试/调试）
    pub fn current_order_seq(&self) -> i64 {
        self.order_seq.load(Ordering::SeqCst)
    }

    /// 当前成交序列号（用于测试/调试）
    pub fn current_trade_seq(&self) -> i64 {
        self.trade_seq.load(Ordering::SeqCst)
    }
}

impl Default for ExchangeIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
