//! 模拟交易所
//!
//! 对外的单一入口：`submit_order` / `on_tick` / `cancel_order` /
//! `daily_settlement` 以及只读查询。所有写入口持有交易所级互斥锁，
//! 为并发的策略线程、行情线程与结算线程提供全局串行化点。
//!
//! 撮合判定交给 [`OrderMatcher`]，停板排队交给 [`LimitQueue`]，
//! 资金与持仓落账交给 [`SimulationAccount`]；本模块负责订单登记簿、
//! 冻结/解冻的配对、成交记录与状态机推进。

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use crate::account::{Position, SimulationAccount};
use crate::exchange::exchange_types::{
    MatchOutcome, OrderSide, OrderStatus, OrderType, SimulatedOrder, TickSnapshot, TradeRecord,
};
use crate::exchange::id_generator::ExchangeIdGenerator;
use crate::exchange::settlement::{SettlementEngine, SettlementResult};
use crate::matching::engine::OrderMatcher;
use crate::matching::limit_queue::{LimitQueue, QueueDrain};
use crate::utils::config::ExchangeConfig;
use crate::utils::{now_ms, round_to_cent, timestamp_to_trading_date};
use crate::{ExchangeError, Result};

/// 买单冻结资金的费用预留系数
const FEE_RESERVE_RATIO: f64 = 1.003;

/// 订单登记信息
///
/// 登记簿中的订单附带提交时点的冻结金额与排队标记，
/// 解冻一律按登记值回退，不做重算。
#[derive(Debug, Clone)]
struct OrderEntry {
    order: SimulatedOrder,
    /// 买单提交时冻结的资金（卖单为0）
    frozen_amount: f64,
    /// 是否在涨跌停队列中排队（排队期间不参与常规撮合）
    in_limit_queue: bool,
}

/// 模拟交易所
pub struct SimulatedExchange {
    config: ExchangeConfig,

    /// 账户台账
    account: Arc<SimulationAccount>,

    /// 撮合引擎
    matcher: OrderMatcher,

    /// 涨跌停排队器
    limit_queue: LimitQueue,

    /// 结算引擎
    settlement: SettlementEngine,

    /// ID生成器
    id_generator: ExchangeIdGenerator,

    /// 交易所级互斥锁（锁序顶端：Exchange → Account → Queue）
    mutex: Mutex<()>,

    /// 订单登记簿 (order_id -> OrderEntry)
    orders: DashMap<String, Arc<RwLock<OrderEntry>>>,

    /// 每标的订单插入序索引 (symbol -> Vec<order_id>)
    ///
    /// HashMap 不保证迭代顺序，PENDING 订单的撮合顺序由该索引决定。
    symbol_orders: DashMap<String, Arc<RwLock<Vec<String>>>>,

    /// 最近行情缓存 (symbol -> TickSnapshot)，市价买单冻结估算用
    last_ticks: DashMap<String, TickSnapshot>,

    /// 成交历史（落账后不可变）
    trade_history: RwLock<Vec<TradeRecord>>,

    /// 当前时间（最近一笔tick的时间戳，毫秒）
    current_time: AtomicI64,
}

impl SimulatedExchange {
    /// 以默认费率创建交易所
    pub fn new(account_id: &str, initial_capital: f64) -> Result<Self> {
        let config = ExchangeConfig {
            account_id: account_id.to_string(),
            initial_capital,
            ..ExchangeConfig::default()
        };
        Self::with_config(config)
    }

    /// 以指定配置创建交易所
    pub fn with_config(config: ExchangeConfig) -> Result<Self> {
        if config.market_price_ceiling <= 0.0 {
            return Err(ExchangeError::InvalidParameter(
                "market_price_ceiling must be positive".to_string(),
            ));
        }

        let account = Arc::new(SimulationAccount::new(
            &config.account_id,
            config.initial_capital,
        )?);
        let matcher = OrderMatcher::from_config(&config);
        let settlement = SettlementEngine::new(account.clone());

        log::info!(
            "SimulatedExchange created: account={}, capital={:.2}",
            config.account_id,
            config.initial_capital
        );

        Ok(Self {
            config,
            account,
            matcher,
            limit_queue: LimitQueue::new(),
            settlement,
            id_generator: ExchangeIdGenerator::new(),
            mutex: Mutex::new(()),
            orders: DashMap::new(),
            symbol_orders: DashMap::new(),
            last_ticks: DashMap::new(),
            trade_history: RwLock::new(Vec::new()),
            current_time: AtomicI64::new(0),
        })
    }

    // ========================================================================
    // 订单管理
    // ========================================================================

    /// 提交订单，返回订单ID
    ///
    /// 校验失败或冻结失败的订单以 REJECTED 状态登记（保留审计痕迹），
    /// 同样返回订单ID，调用方通过 [`Self::get_order`] 查询最终状态。
    pub fn submit_order(&self, mut order: SimulatedOrder) -> String {
        let _guard = self.mutex.lock();

        // 1. 生成订单ID并初始化生命周期字段
        let order_id = self.id_generator.next_order_id(&order.symbol);
        order.order_id = order_id.clone();
        order.status = OrderStatus::Pending;
        order.filled_volume = 0;
        order.submit_time = now_ms();
        order.cancel_time = 0;
        order.filled_time = 0;
        order.reject_reason = None;
        if order.commission_rate <= 0.0 {
            order.commission_rate = self.config.commission_rate;
        }
        if order.slippage_rate <= 0.0 {
            order.slippage_rate = self.config.slippage_rate;
        }

        // 2. 基本参数校验
        if order.symbol.is_empty() {
            return self.register_rejected(order, "Empty symbol");
        }
        if order.volume <= 0 {
            return self.register_rejected(order, "Order volume must be positive");
        }
        if order.order_type == OrderType::Limit && order.price <= 0.0 {
            return self.register_rejected(order, "Invalid limit price");
        }

        // 3. 冻结资金或持仓
        let mut frozen_amount = 0.0;
        match order.side {
            OrderSide::Buy => {
                // 限价单按限价预留；市价单按最近行情价预留，
                // 无行情时回退到配置的价格上限（悲观口径）
                let ref_price = match order.order_type {
                    OrderType::Limit => order.price,
                    OrderType::Market => self
                        .last_ticks
                        .get(&order.symbol)
                        .map(|t| t.last_price)
                        .filter(|p| *p > 0.0)
                        .unwrap_or(self.config.market_price_ceiling),
                };
                frozen_amount =
                    round_to_cent(order.volume as f64 * ref_price * FEE_RESERVE_RATIO);

                if !self.account.freeze_cash(frozen_amount) {
                    return self.register_rejected(order, "Insufficient available cash");
                }
            }
            OrderSide::Sell => {
                let current_date = self.current_trading_date();
                if !self
                    .account
                    .can_sell(&order.symbol, order.volume, current_date)
                {
                    return self.register_rejected(
                        order,
                        "Sell blocked by T+1 rule or insufficient sellable volume",
                    );
                }
                if !self.account.freeze_position(&order.symbol, order.volume) {
                    return self.register_rejected(order, "Failed to freeze position");
                }
            }
        }

        // 4. 登记订单
        log::info!(
            "Order submitted: {} {:?} {:?} {} x{} @{:.2}",
            order_id,
            order.side,
            order.order_type,
            order.symbol,
            order.volume,
            order.price
        );
        self.register_order(order, frozen_amount);

        order_id
    }

    /// 行情驱动撮合
    ///
    /// 处理顺序：刷新持仓估值 → 排空涨跌停队列 → 按插入序撮合该标的
    /// 的 PENDING 订单。整个过程持有交易所锁，外部读到的始终是
    /// 完整落账后的状态。
    pub fn on_tick(&self, tick: &TickSnapshot) {
        let _guard = self.mutex.lock();

        self.current_time.store(tick.timestamp, Ordering::SeqCst);
        let current_date = timestamp_to_trading_date(tick.timestamp);
        self.last_ticks.insert(tick.symbol.clone(), tick.clone());

        // 1. 刷新该标的持仓估值
        self.account
            .update_position_price(&tick.symbol, tick.last_price);

        // 2. 涨跌停队列先于常规撮合排空
        let mut released_ids = HashSet::new();
        let up = self.limit_queue.drain_limit_up(&tick.symbol, tick);
        self.process_released(up, tick, current_date, &mut released_ids);
        let down = self.limit_queue.drain_limit_down(&tick.symbol, tick);
        self.process_released(down, tick, current_date, &mut released_ids);

        // 3. 常规撮合：按插入序遍历该标的订单
        let ids: Vec<String> = match self.symbol_orders.get(&tick.symbol) {
            Some(index) => index.value().read().clone(),
            None => Vec::new(),
        };

        for order_id in &ids {
            if released_ids.contains(order_id) {
                continue; // 本tick已在放行阶段处理
            }
            let Some(entry_arc) = self.orders.get(order_id).map(|r| r.value().clone()) else {
                continue;
            };

            let snapshot = {
                let entry = entry_arc.read();
                if entry.order.status != OrderStatus::Pending || entry.in_limit_queue {
                    continue;
                }
                entry.order.clone()
            };

            let outcome = self
                .matcher
                .try_match(&snapshot, tick, self.config.check_price_limit);
            self.dispatch_outcome(&entry_arc, outcome, tick, current_date);
        }

        // 4. 收缩索引：终态订单退出撮合遍历
        self.prune_symbol_index(&tick.symbol);
    }

    /// 撤销订单
    ///
    /// 仅 PENDING 订单可撤（含停板排队中的订单）。重复撤单返回 false
    /// 且不改变任何状态。
    pub fn cancel_order(&self, order_id: &str) -> bool {
        let _guard = self.mutex.lock();

        let Some(entry_arc) = self.orders.get(order_id).map(|r| r.value().clone()) else {
            return false;
        };

        let (order, frozen_amount) = {
            let entry = entry_arc.read();
            if entry.order.status != OrderStatus::Pending {
                return false;
            }
            (entry.order.clone(), entry.frozen_amount)
        };

        // 若在停板队列中则一并移除
        self.limit_queue.remove_from_queue(order_id);

        // 反向解冻
        match order.side {
            OrderSide::Buy => self.account.unfreeze_cash(frozen_amount),
            OrderSide::Sell => self
                .account
                .unfreeze_position(&order.symbol, order.volume - order.filled_volume),
        }

        {
            let mut entry = entry_arc.write();
            entry.order.status = OrderStatus::Cancelled;
            entry.order.cancel_time = now_ms();
            entry.frozen_amount = 0.0;
            entry.in_limit_queue = false;
        }

        log::info!("Order cancelled: {}", order_id);
        true
    }

    /// 日终结算
    pub fn daily_settlement(&self, settlement_date: i64) -> SettlementResult {
        let _guard = self.mutex.lock();
        self.settlement.daily_settlement(settlement_date)
    }

    // ========================================================================
    // 内部：放行与撮合分派
    // ========================================================================

    /// 处理从停板队列放出的订单
    ///
    /// 放行订单一律关闭涨跌停复核：封板期间的放行代表排队位次被打到，
    /// 在停板价上获得成交资格；价格打开后的放行本就不在停板价内。
    /// 其余校验（流动性、限价触及与否）照常由撮合引擎执行。
    fn process_released(
        &self,
        drain: QueueDrain,
        tick: &TickSnapshot,
        current_date: i64,
        released_ids: &mut HashSet<String>,
    ) {
        for released in drain.orders {
            released_ids.insert(released.order_id.clone());

            let Some(entry_arc) = self
                .orders
                .get(&released.order_id)
                .map(|r| r.value().clone())
            else {
                continue;
            };

            let snapshot = {
                let mut entry = entry_arc.write();
                entry.in_limit_queue = false;
                if entry.order.status != OrderStatus::Pending {
                    continue;
                }
                entry.order.clone()
            };

            log::debug!(
                "Order {} released from limit queue (opened={})",
                snapshot.order_id,
                drain.opened
            );

            let outcome = self.matcher.try_match(&snapshot, tick, false);
            self.dispatch_outcome(&entry_arc, outcome, tick, current_date);
        }
    }

    /// 按撮合结果推进订单状态机
    fn dispatch_outcome(
        &self,
        entry_arc: &Arc<RwLock<OrderEntry>>,
        outcome: MatchOutcome,
        tick: &TickSnapshot,
        current_date: i64,
    ) {
        match outcome {
            MatchOutcome::Filled { price, volume } => {
                self.process_fill(entry_arc, price, volume, tick.timestamp, current_date);
            }
            MatchOutcome::Pending { .. } => {
                // 限价未触及：保持 PENDING，等待后续行情
            }
            MatchOutcome::LimitUp => {
                let order = {
                    let mut entry = entry_arc.write();
                    entry.in_limit_queue = true;
                    entry.order.clone()
                };
                self.limit_queue.push_limit_up(order);
            }
            MatchOutcome::LimitDown => {
                let order = {
                    let mut entry = entry_arc.write();
                    entry.in_limit_queue = true;
                    entry.order.clone()
                };
                self.limit_queue.push_limit_down(order);
            }
            MatchOutcome::Rejected { reason } => {
                self.process_reject(entry_arc, &reason);
            }
        }
    }

    /// 成交落账
    ///
    /// 任一步骤失败都会回滚此前的副作用并把订单降级为 REJECTED，
    /// 不会留下部分落账的中间态。
    fn process_fill(
        &self,
        entry_arc: &Arc<RwLock<OrderEntry>>,
        price: f64,
        volume: i64,
        timestamp: i64,
        current_date: i64,
    ) {
        let (order, frozen_amount) = {
            let entry = entry_arc.read();
            (entry.order.clone(), entry.frozen_amount)
        };

        let commission = self.matcher.total_commission(
            order.side,
            &order.symbol,
            price,
            volume,
            order.commission_rate,
        );

        let mut realized_pnl = 0.0;

        match order.side {
            OrderSide::Buy => {
                // 解除提交时的预冻结，再按实际成交额扣款
                self.account.unfreeze_cash(frozen_amount);
                {
                    let mut entry = entry_arc.write();
                    entry.frozen_amount = 0.0;
                }

                let actual_cost = price * volume as f64 + commission;
                if !self.account.deduct_cash(actual_cost) {
                    self.mark_rejected(entry_arc, "Insufficient cash for fill");
                    return;
                }

                if !self
                    .account
                    .add_position(&order.symbol, volume, price, current_date)
                {
                    self.account.refund_cash(actual_cost);
                    self.mark_rejected(entry_arc, "Failed to add position");
                    return;
                }
            }
            OrderSide::Sell => {
                // 回款加可用资金须覆盖费用，否则整笔拒绝
                let revenue = round_to_cent(volume as f64 * price);
                if self.account.get_available_cash() + revenue < commission {
                    self.process_reject(entry_arc, "Commission exceeds sell proceeds");
                    return;
                }

                let Some(pnl) = self.account.reduce_position(&order.symbol, volume, price)
                else {
                    self.process_reject(entry_arc, "Failed to reduce position");
                    return;
                };
                realized_pnl = pnl;

                if !self.account.deduct_cash(commission) {
                    log::error!(
                        "Commission deduction failed after affordability check: order={}",
                        order.order_id
                    );
                }
                self.account.unfreeze_position(&order.symbol, volume);
            }
        }

        // 推进订单状态
        {
            let mut entry = entry_arc.write();
            entry.order.status = OrderStatus::Filled;
            entry.order.filled_volume = volume;
            entry.order.filled_time = timestamp;
        }

        // 生成成交记录
        let trade = TradeRecord {
            trade_id: self.id_generator.next_trade_id(),
            order_id: order.order_id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            price,
            volume,
            commission,
            trade_time: timestamp,
            realized_pnl,
        };

        log::info!(
            "Order filled: {} {:?} {} x{} @{:.2}, commission={:.2}, pnl={:.2}",
            order.order_id,
            order.side,
            order.symbol,
            volume,
            price,
            commission,
            realized_pnl
        );

        self.trade_history.write().push(trade);
    }

    /// 拒绝订单并反向解冻
    fn process_reject(&self, entry_arc: &Arc<RwLock<OrderEntry>>, reason: &str) {
        let (order, frozen_amount) = {
            let entry = entry_arc.read();
            (entry.order.clone(), entry.frozen_amount)
        };

        match order.side {
            OrderSide::Buy => self.account.unfreeze_cash(frozen_amount),
            OrderSide::Sell => self
                .account
                .unfreeze_position(&order.symbol, order.volume - order.filled_volume),
        }

        {
            let mut entry = entry_arc.write();
            entry.frozen_amount = 0.0;
            entry.in_limit_queue = false;
        }
        self.mark_rejected(entry_arc, reason);
    }

    /// 仅标记拒绝状态（冻结已在调用方处理）
    fn mark_rejected(&self, entry_arc: &Arc<RwLock<OrderEntry>>, reason: &str) {
        let mut entry = entry_arc.write();
        entry.order.status = OrderStatus::Rejected;
        entry.order.reject_reason = Some(reason.to_string());
        log::warn!("Order rejected: {} - {}", entry.order.order_id, reason);
    }

    /// 登记被拒订单并返回其ID
    fn register_rejected(&self, mut order: SimulatedOrder, reason: &str) -> String {
        let order_id = order.order_id.clone();
        order.status = OrderStatus::Rejected;
        order.reject_reason = Some(reason.to_string());
        log::warn!("Order rejected at submit: {} - {}", order_id, reason);

        self.orders.insert(
            order_id.clone(),
            Arc::new(RwLock::new(OrderEntry {
                order,
                frozen_amount: 0.0,
                in_limit_queue: false,
            })),
        );
        order_id
    }

    /// 登记正常订单并加入标的索引
    fn register_order(&self, order: SimulatedOrder, frozen_amount: f64) {
        let order_id = order.order_id.clone();
        let symbol = order.symbol.clone();

        self.orders.insert(
            order_id.clone(),
            Arc::new(RwLock::new(OrderEntry {
                order,
                frozen_amount,
                in_limit_queue: false,
            })),
        );

        let index = self
            .symbol_orders
            .entry(symbol)
            .or_insert_with(|| Arc::new(RwLock::new(Vec::new())))
            .value()
            .clone();
        index.write().push(order_id);
    }

    /// 从标的索引中剔除终态订单
    fn prune_symbol_index(&self, symbol: &str) {
        let Some(index) = self.symbol_orders.get(symbol).map(|r| r.value().clone()) else {
            return;
        };

        index.write().retain(|order_id| {
            self.orders
                .get(order_id)
                .map(|entry| !entry.read().order.status.is_terminal())
                .unwrap_or(false)
        });
    }

    /// 当前交易日（最近tick时间；无行情时取墙钟）
    fn current_trading_date(&self) -> i64 {
        let ts = self.current_time.load(Ordering::SeqCst);
        timestamp_to_trading_date(if ts > 0 { ts } else { now_ms() })
    }

    // ========================================================================
    // 只读查询（按值返回快照）
    // ========================================================================

    pub fn get_account_id(&self) -> String {
        self.account.get_account_id().to_string()
    }

    pub fn get_order(&self, order_id: &str) -> Option<SimulatedOrder> {
        self.orders.get(order_id).map(|e| e.read().order.clone())
    }

    /// 全部 PENDING 订单
    pub fn get_pending_orders(&self) -> Vec<SimulatedOrder> {
        self.orders
            .iter()
            .filter_map(|e| {
                let entry = e.read();
                (entry.order.status == OrderStatus::Pending).then(|| entry.order.clone())
            })
            .collect()
    }

    /// 指定标的的 PENDING 订单（按插入序）
    pub fn get_pending_orders_by_symbol(&self, symbol: &str) -> Vec<SimulatedOrder> {
        let Some(index) = self.symbol_orders.get(symbol).map(|r| r.value().clone()) else {
            return Vec::new();
        };
        let ids = index.read().clone();

        ids.iter()
            .filter_map(|order_id| {
                let entry = self.orders.get(order_id)?;
                let entry = entry.read();
                (entry.order.status == OrderStatus::Pending).then(|| entry.order.clone())
            })
            .collect()
    }

    pub fn get_trade_history(&self) -> Vec<TradeRecord> {
        self.trade_history.read().clone()
    }

    pub fn get_position(&self, symbol: &str) -> Option<Position> {
        self.account.get_position(symbol)
    }

    pub fn get_all_positions(&self) -> Vec<Position> {
        self.account.get_all_positions()
    }

    pub fn get_total_assets(&self) -> f64 {
        self.account.get_total_assets()
    }

    pub fn get_available_cash(&self) -> f64 {
        self.account.get_available_cash()
    }

    pub fn get_withdrawable_cash(&self) -> f64 {
        self.account.get_withdrawable_cash()
    }

    pub fn get_frozen_cash(&self) -> f64 {
        self.account.get_frozen_cash()
    }

    pub fn get_realized_pnl(&self) -> f64 {
        self.account.get_realized_pnl()
    }

    /// 涨停队列长度（测试/监控用）
    pub fn limit_up_queue_size(&self, symbol: &str) -> usize {
        self.limit_queue.limit_up_queue_size(symbol)
    }

    /// 跌停队列长度（测试/监控用）
    pub fn limit_down_queue_size(&self, symbol: &str) -> usize {
        self.limit_queue.limit_down_queue_size(symbol)
    }
}
