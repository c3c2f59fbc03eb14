//! 交易所类型定义（订单 / 成交 / 行情快照 / 撮合结果）

use serde::{Deserialize, Serialize};

/// 订单方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// 订单类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    Limit,
}

/// 订单状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// 待成交
    Pending,
    /// 部分成交
    PartialFilled,
    /// 全部成交
    Filled,
    /// 已撤销
    Cancelled,
    /// 已拒绝
    Rejected,
}

impl OrderStatus {
    /// 终态不可再迁移
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }
}

/// 模拟订单
///
/// 由 [`crate::SimulatedExchange::submit_order`] 创建并登记，
/// 终态订单保留在登记簿中供审计查询。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedOrder {
    /// 订单ID（交易所生成）
    pub order_id: String,
    /// 股票代码
    pub symbol: String,
    /// 买卖方向
    pub side: OrderSide,
    /// 订单类型
    pub order_type: OrderType,
    /// 价格（限价单使用，市价单为0）
    pub price: f64,
    /// 委托数量（股）
    pub volume: i64,
    /// 已成交数量
    pub filled_volume: i64,
    /// 订单状态
    pub status: OrderStatus,
    /// 提交时间（毫秒时间戳）
    pub submit_time: i64,
    /// 撤销时间（0表示未撤销）
    pub cancel_time: i64,
    /// 成交时间（0表示未成交）
    pub filled_time: i64,
    /// 佣金率（0表示使用交易所默认）
    pub commission_rate: f64,
    /// 滑点率（0表示使用交易所默认）
    pub slippage_rate: f64,
    /// 拒绝原因
    pub reject_reason: Option<String>,
}

impl SimulatedOrder {
    /// 市价单
    pub fn market(symbol: &str, side: OrderSide, volume: i64) -> Self {
        Self::with_price(symbol, side, OrderType::Market, 0.0, volume)
    }

    /// 限价单
    pub fn limit(symbol: &str, side: OrderSide, price: f64, volume: i64) -> Self {
        Self::with_price(symbol, side, OrderType::Limit, price, volume)
    }

    fn with_price(
        symbol: &str,
        side: OrderSide,
        order_type: OrderType,
        price: f64,
        volume: i64,
    ) -> Self {
        Self {
            order_id: String::new(),
            symbol: symbol.to_string(),
            side,
            order_type,
            price,
            volume,
            filled_volume: 0,
            status: OrderStatus::Pending,
            submit_time: 0,
            cancel_time: 0,
            filled_time: 0,
            commission_rate: 0.0,
            slippage_rate: 0.0,
            reject_reason: None,
        }
    }
}

/// 成交记录（落账后不可变）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    /// 成交ID
    pub trade_id: String,
    /// 关联订单ID
    pub order_id: String,
    /// 股票代码
    pub symbol: String,
    /// 买卖方向
    pub side: OrderSide,
    /// 成交价格
    pub price: f64,
    /// 成交数量
    pub volume: i64,
    /// 总费用（佣金+印花税+过户费）
    pub commission: f64,
    /// 成交时间（毫秒时间戳）
    pub trade_time: i64,
    /// 已实现盈亏（仅卖出有效）
    pub realized_pnl: f64,
}

/// 行情快照（仅消费，字段以外的数据忽略）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickSnapshot {
    /// 股票代码
    pub symbol: String,
    /// 时间戳（毫秒）
    pub timestamp: i64,
    /// 最新价
    pub last_price: f64,
    /// 买一价
    pub bid_price: f64,
    /// 卖一价
    pub ask_price: f64,
    /// 本笔成交量
    pub volume: i64,
    /// 昨收价（涨跌停基准）
    pub last_close: f64,
}

/// 撮合结果
///
/// 类型化的判定结果：交易所按变体分派，不再解析原因字符串。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MatchOutcome {
    /// 成交（本模型内单笔全量成交）
    Filled { price: f64, volume: i64 },
    /// 限价未触及，订单保持等待
    Pending { reason: String },
    /// 触及涨停，应进入涨停排队
    LimitUp,
    /// 触及跌停，应进入跌停排队
    LimitDown,
    /// 硬性拒绝
    Rejected { reason: String },
}

impl MatchOutcome {
    pub fn is_filled(&self) -> bool {
        matches!(self, MatchOutcome::Filled { .. })
    }
}
