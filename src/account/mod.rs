//! 账户系统 - 资金与持仓台账
//!
//! 维护两级资金（可用/可取）、冻结资金、持仓与T+1可卖数量。
//!
//! ## 资金模型
//!
//! - `available_cash`: 当日可用于买入的资金。卖出回款实时计入。
//! - `withdrawable_cash`: 可转出资金，滞后一个结算日（T+1可取）。
//! - `frozen_cash`: 被未成交买单占用的资金。
//! - `today_sell_amount`: 当日卖出回款累计，日终结算时清零。
//!
//! 所有公开方法内部持有账户互斥锁，按值返回快照。锁不可重入，
//! 复合操作（成交落账等）由交易所层串行化保证原子可见性。

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::utils::round_to_cent;
use crate::{ExchangeError, Result};

/// 单笔持仓数量上限（10亿股）
const MAX_POSITION_VOLUME: i64 = 1_000_000_000;

/// 单价上限（100万元/股）
const MAX_PRICE: f64 = 1_000_000.0;

/// 持仓信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// 股票代码
    pub symbol: String,
    /// 总持仓数量
    pub volume: i64,
    /// 可卖数量（T+1）
    pub available_volume: i64,
    /// 冻结数量（挂单中）
    pub frozen_volume: i64,
    /// 平均成本
    pub avg_cost: f64,
    /// 当前价格
    pub current_price: f64,
    /// 市值
    pub market_value: f64,
    /// 浮动盈亏
    pub unrealized_pnl: f64,
    /// 买入日期（最早一笔，YYYYMMDD）
    pub buy_date: i64,
}

impl Position {
    fn new(symbol: &str, volume: i64, price: f64, buy_date: i64) -> Self {
        Self {
            symbol: symbol.to_string(),
            volume,
            available_volume: 0, // T+1：当日买入不可卖
            frozen_volume: 0,
            avg_cost: price,
            current_price: price,
            market_value: round_to_cent(volume as f64 * price),
            unrealized_pnl: 0.0,
            buy_date,
        }
    }

    fn refresh_valuation(&mut self) {
        self.market_value = round_to_cent(self.volume as f64 * self.current_price);
        self.unrealized_pnl =
            round_to_cent(self.market_value - self.volume as f64 * self.avg_cost);
    }
}

/// 账户内部状态（互斥锁保护）
#[derive(Debug)]
struct AccountState {
    available_cash: f64,
    withdrawable_cash: f64,
    frozen_cash: f64,
    today_sell_amount: f64,
    realized_pnl: f64,
    positions: HashMap<String, Position>,
}

/// 模拟账户
///
/// 所有资金字段落库时舍入到分，持仓市值/浮盈在价格或数量变化时重算。
pub struct SimulationAccount {
    account_id: String,
    initial_capital: f64,
    state: Mutex<AccountState>,
}

impl SimulationAccount {
    /// 创建账户，初始资金必须为正
    pub fn new(account_id: &str, initial_capital: f64) -> Result<Self> {
        if initial_capital <= 0.0 {
            return Err(ExchangeError::InvalidParameter(format!(
                "Initial capital must be positive: {}",
                initial_capital
            )));
        }

        Ok(Self {
            account_id: account_id.to_string(),
            initial_capital,
            state: Mutex::new(AccountState {
                available_cash: initial_capital,
                withdrawable_cash: initial_capital,
                frozen_cash: 0.0,
                today_sell_amount: 0.0,
                realized_pnl: 0.0,
                positions: HashMap::new(),
            }),
        })
    }

    pub fn get_account_id(&self) -> &str {
        &self.account_id
    }

    pub fn get_initial_capital(&self) -> f64 {
        self.initial_capital
    }

    // ========================================================================
    // 资金管理
    // ========================================================================

    /// 冻结资金：从可用划入冻结
    ///
    /// 可用不足返回 false，不做部分冻结。
    pub fn freeze_cash(&self, amount: f64) -> bool {
        if amount < 0.0 {
            return false;
        }

        let amount = round_to_cent(amount);
        let mut state = self.state.lock();

        if state.available_cash < amount {
            log::warn!(
                "freeze_cash rejected: available={:.2}, requested={:.2}",
                state.available_cash,
                amount
            );
            return false;
        }

        state.available_cash -= amount;
        state.frozen_cash += amount;
        true
    }

    /// 解冻资金：钳制到当前冻结金额，绝不下溢
    pub fn unfreeze_cash(&self, amount: f64) {
        if amount < 0.0 {
            return;
        }

        let amount = round_to_cent(amount);
        let mut state = self.state.lock();

        let amount = amount.min(state.frozen_cash);
        state.frozen_cash -= amount;
        state.available_cash += amount;
    }

    /// 直接扣减可用资金（成交落账用）
    ///
    /// 可用不足返回 false，调用方负责回滚此前的副作用。
    pub fn deduct_cash(&self, amount: f64) -> bool {
        if amount < 0.0 {
            return false;
        }

        let amount = round_to_cent(amount);
        let mut state = self.state.lock();

        if state.available_cash < amount {
            return false;
        }

        state.available_cash -= amount;
        true
    }

    /// 回补可用资金（成交回滚的补偿动作）
    pub fn refund_cash(&self, amount: f64) {
        if amount <= 0.0 {
            return;
        }

        let amount = round_to_cent(amount);
        let mut state = self.state.lock();
        state.available_cash += amount;
    }

    // ========================================================================
    // 持仓管理
    // ========================================================================

    /// 买入加仓
    ///
    /// 首次买入建仓（可卖数量为0，T+1），已有持仓则加权摊薄平均成本，
    /// `buy_date` 保留最早一笔买入日期（T+1解锁取保守口径）。
    pub fn add_position(&self, symbol: &str, volume: i64, price: f64, buy_date: i64) -> bool {
        if symbol.is_empty() {
            return false;
        }
        if volume <= 0 || volume > MAX_POSITION_VOLUME {
            return false;
        }
        if price <= 0.0 || price > MAX_PRICE {
            return false;
        }

        let price = round_to_cent(price);
        let cost = round_to_cent(volume as f64 * price);
        let mut state = self.state.lock();

        match state.positions.get_mut(symbol) {
            None => {
                state
                    .positions
                    .insert(symbol.to_string(), Position::new(symbol, volume, price, buy_date));
            }
            Some(pos) => {
                let total_cost = pos.volume as f64 * pos.avg_cost + cost;
                pos.volume += volume;
                pos.avg_cost = round_to_cent(total_cost / pos.volume as f64);
                pos.refresh_valuation();
                // 新买入部分次日可卖，buy_date 不前移
            }
        }

        true
    }

    /// 卖出减仓，返回本笔已实现盈亏
    ///
    /// 毛回款计入可用资金与当日卖出金额，费用由交易所层另行扣减。
    /// 持仓清零时删除该持仓。
    pub fn reduce_position(&self, symbol: &str, volume: i64, sell_price: f64) -> Option<f64> {
        if volume <= 0 || sell_price <= 0.0 {
            return None;
        }

        let sell_price = round_to_cent(sell_price);
        let mut state = self.state.lock();

        let pos = state.positions.get_mut(symbol)?;
        if pos.volume < volume {
            return None;
        }

        let cost = round_to_cent(volume as f64 * pos.avg_cost);
        let revenue = round_to_cent(volume as f64 * sell_price);
        let realized_pnl = round_to_cent(revenue - cost);

        pos.volume -= volume;
        if pos.volume == 0 {
            state.positions.remove(symbol);
        } else {
            pos.available_volume = (pos.available_volume - volume).max(0);
            pos.refresh_valuation();
        }

        state.realized_pnl += realized_pnl;
        state.available_cash += revenue;
        state.today_sell_amount += revenue;

        Some(realized_pnl)
    }

    /// 冻结持仓（挂卖单时）
    pub fn freeze_position(&self, symbol: &str, volume: i64) -> bool {
        if volume <= 0 {
            return false;
        }

        let mut state = self.state.lock();
        let Some(pos) = state.positions.get_mut(symbol) else {
            return false;
        };

        if pos.volume - pos.frozen_volume < volume {
            return false;
        }

        pos.frozen_volume += volume;
        // 可卖数量不得超过未冻结持仓
        pos.available_volume = pos.available_volume.min(pos.volume - pos.frozen_volume);
        true
    }

    /// 解冻持仓：钳制到当前冻结数量
    pub fn unfreeze_position(&self, symbol: &str, volume: i64) {
        if volume <= 0 {
            return;
        }

        let mut state = self.state.lock();
        if let Some(pos) = state.positions.get_mut(symbol) {
            pos.frozen_volume = (pos.frozen_volume - volume).max(0);
        }
    }

    /// 刷新持仓行情价与估值
    pub fn update_position_price(&self, symbol: &str, price: f64) {
        let mut state = self.state.lock();
        if let Some(pos) = state.positions.get_mut(symbol) {
            pos.current_price = round_to_cent(price);
            pos.refresh_valuation();
        }
    }

    // ========================================================================
    // T+1 相关
    // ========================================================================

    /// 是否可卖出指定数量
    ///
    /// 当日买入的持仓只能动用 `available_volume`（买入当日为0），
    /// 隔日持仓可动用未冻结部分。
    pub fn can_sell(&self, symbol: &str, volume: i64, current_date: i64) -> bool {
        if volume <= 0 {
            return false;
        }

        let state = self.state.lock();
        let Some(pos) = state.positions.get(symbol) else {
            return false;
        };

        if pos.buy_date == current_date {
            pos.available_volume >= volume
        } else {
            pos.volume - pos.frozen_volume >= volume
        }
    }

    /// 日终结算
    ///
    /// 1. 可取资金同步为可用资金（昨日卖出回款今日可取）
    /// 2. 当日卖出金额清零
    /// 3. 买入日期早于结算日的持仓全部解锁（T+1）
    ///
    /// 返回本次解锁的持仓数。
    pub fn daily_settlement(&self, current_date: i64) -> usize {
        let mut state = self.state.lock();

        state.withdrawable_cash = state.available_cash;
        state.today_sell_amount = 0.0;

        let mut unlocked = 0;
        for pos in state.positions.values_mut() {
            if pos.buy_date < current_date {
                pos.available_volume = pos.volume - pos.frozen_volume;
                unlocked += 1;
            }
        }

        unlocked
    }

    // ========================================================================
    // 查询
    // ========================================================================

    /// 总资产 = 可用 + 冻结 + 持仓市值
    pub fn get_total_assets(&self) -> f64 {
        let state = self.state.lock();
        let market_value: f64 = state.positions.values().map(|p| p.market_value).sum();
        state.available_cash + state.frozen_cash + market_value
    }

    pub fn get_available_cash(&self) -> f64 {
        self.state.lock().available_cash
    }

    pub fn get_withdrawable_cash(&self) -> f64 {
        self.state.lock().withdrawable_cash
    }

    pub fn get_frozen_cash(&self) -> f64 {
        self.state.lock().frozen_cash
    }

    pub fn get_today_sell_amount(&self) -> f64 {
        self.state.lock().today_sell_amount
    }

    pub fn get_realized_pnl(&self) -> f64 {
        self.state.lock().realized_pnl
    }

    /// 全部持仓的浮动盈亏合计
    pub fn get_unrealized_pnl(&self) -> f64 {
        let state = self.state.lock();
        round_to_cent(state.positions.values().map(|p| p.unrealized_pnl).sum())
    }

    pub fn get_position(&self, symbol: &str) -> Option<Position> {
        self.state.lock().positions.get(symbol).cloned()
    }

    pub fn get_all_positions(&self) -> Vec<Position> {
        self.state.lock().positions.values().cloned().collect()
    }
}
