//! 撮合引擎与涨跌停排队

/// 订单撮合引擎
pub mod engine;

/// 涨跌停订单排队
pub mod limit_queue;

pub use engine::OrderMatcher;
pub use limit_queue::{LimitQueue, QueueDrain};
