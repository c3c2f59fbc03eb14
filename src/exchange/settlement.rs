//! 结算系统
//!
//! 日终结算：昨日卖出回款转入可取资金、当日卖出金额清零、
//! T+1持仓解锁。单账户模拟盘的结算是对台账的一次委托调用，
//! 结果汇总供宿主留档。

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::account::SimulationAccount;

/// 结算结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementResult {
    /// 结算日期（YYYYMMDD）
    pub settlement_date: i64,

    /// 结算后可取资金
    pub withdrawable_cash: f64,

    /// 本次清零前的当日卖出金额
    pub today_sell_cleared: f64,

    /// 本次解锁（T+1到期）的持仓数
    pub unlocked_positions: usize,
}

/// 结算引擎
pub struct SettlementEngine {
    account: Arc<SimulationAccount>,
}

impl SettlementEngine {
    pub fn new(account: Arc<SimulationAccount>) -> Self {
        Self { account }
    }

    /// 执行日终结算
    pub fn daily_settlement(&self, settlement_date: i64) -> SettlementResult {
        let today_sell_cleared = self.account.get_today_sell_amount();
        let unlocked_positions = self.account.daily_settlement(settlement_date);
        let withdrawable_cash = self.account.get_withdrawable_cash();

        log::info!(
            "Daily settlement done: date={}, withdrawable={:.2}, unlocked_positions={}",
            settlement_date,
            withdrawable_cash,
            unlocked_positions
        );

        SettlementResult {
            settlement_date,
            withdrawable_cash,
            today_sell_cleared,
            unlocked_positions,
        }
    }
}
