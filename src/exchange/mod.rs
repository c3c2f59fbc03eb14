//! 交易所核心业务模块

/// 交易所类型定义（订单 / 成交 / 行情 / 撮合结果）
pub mod exchange_types;

/// 交易所ID生成器
pub mod id_generator;

/// 结算系统
pub mod settlement;

/// 模拟交易所（对外单一入口）
pub mod simulator;

// 重导出核心类型
pub use exchange_types::{
    MatchOutcome, OrderSide, OrderStatus, OrderType, SimulatedOrder, TickSnapshot, TradeRecord,
};
pub use id_generator::ExchangeIdGenerator;
pub use settlement::{SettlementEngine, SettlementResult};
pub use simulator::SimulatedExchange;
