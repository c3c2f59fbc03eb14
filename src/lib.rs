//! # QASIMEXCHANGE
//!
//! A股模拟交易所核心 - 回测系统的撮合与账户引擎
//!
//! ## 核心能力
//!
//! - **账户系统**: 可用/可取两级资金、冻结资金、持仓冻结、T+1可卖数量
//! - **订单系统**: 下单/撤单/订单登记簿（全生命周期留档）
//! - **撮合引擎**: 市价/限价撮合、滑点模拟、流动性限制、涨跌停检查
//! - **涨跌停排队**: 每标的 FIFO 排队、打开放行、封板期间部分放行
//! - **结算系统**: 日终结算（可取资金滚动、T+1解锁）
//! - **费用模型**: 佣金（最低5元）、印花税（卖出千一）、沪市过户费
//!
//! ## 架构设计
//!
//! ```text
//! 策略线程 / 行情线程 / 调度线程
//!     ↓ submit_order / on_tick / daily_settlement
//! SimulatedExchange (exchange/)     ← 全局串行化入口
//!     ↓
//! OrderMatcher + LimitQueue (matching/)
//!     ↓
//! SimulationAccount (account/)      ← 资金与持仓台账
//! ```
//!
//! ## 并发模型
//!
//! 锁序固定为 Exchange → Account → Queue。账户锁不可重入，
//! 复合操作的正确性由交易所级互斥锁串行化所有写入口保证。

#![allow(dead_code)]

// ============================================================================
// 外部依赖
// ============================================================================

// 并发工具
pub use dashmap;
pub use parking_lot;

// 序列化
pub use serde;
pub use serde_json;

// 时间
pub use chrono;

// 日志
pub use log;

// 错误处理
pub use anyhow;
pub use thiserror;

// ============================================================================
// 内部模块
// ============================================================================

/// 账户系统 - 资金与持仓台账
pub mod account;

/// 交易所核心业务逻辑
pub mod exchange;

/// 撮合引擎与涨跌停排队
pub mod matching;

/// 工具模块
pub mod utils;

// ============================================================================
// 重导出常用类型
// ============================================================================

pub use account::{Position, SimulationAccount};
pub use exchange::exchange_types::{
    MatchOutcome, OrderSide, OrderStatus, OrderType, SimulatedOrder, TickSnapshot, TradeRecord,
};
pub use exchange::id_generator::ExchangeIdGenerator;
pub use exchange::settlement::{SettlementEngine, SettlementResult};
pub use exchange::simulator::SimulatedExchange;
pub use matching::engine::OrderMatcher;
pub use matching::limit_queue::LimitQueue;
pub use utils::config::ExchangeConfig;

// ============================================================================
// 全局错误类型
// ============================================================================

/// 交易所错误类型
///
/// 业务层面的失败（资金不足、T+1限制、涨跌停等）不走该类型，
/// 而是通过订单状态 / bool 返回值 / [`MatchOutcome`] 表达。
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("Account error: {0}")]
    AccountError(String),

    #[error("Order error: {0}")]
    OrderError(String),

    #[error("Matching error: {0}")]
    MatchingError(String),

    #[error("Settlement error: {0}")]
    SettlementError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("IO error: {0}")]
    IOError(String),
}

pub type Result<T> = std::result::Result<T, ExchangeError>;

// ============================================================================
// 测试模块
// ============================================================================
