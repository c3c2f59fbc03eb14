//! 涨跌停订单排队
//!
//! 停板期间无法成交的订单按到达顺序进入每标的 FIFO 队列：
//! 涨停队列收买单，跌停队列收卖单。新 tick 到来时由交易所先排空队列
//! 再做常规撮合。
//!
//! 放行规则：
//! - 价格打开（不再处于停板价附近）：整队按序放出，交由撮合引擎复核；
//! - 仍在停板：从队首放出 `max(1, 队长/10)` 笔，模拟排队订单在
//!   封板期间被打到的概率。

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::exchange::exchange_types::{SimulatedOrder, TickSnapshot};
use crate::matching::engine::OrderMatcher;
use crate::utils::round_to_cent;

/// 停板价判定容差（元）
const LIMIT_PRICE_TOLERANCE: f64 = 0.01;

/// 队列排空结果
#[derive(Debug)]
pub struct QueueDrain {
    /// 放出的订单（保持入队顺序）
    pub orders: Vec<SimulatedOrder>,
    /// 价格是否已打开（true = 整队放出）
    pub opened: bool,
}

impl QueueDrain {
    fn empty() -> Self {
        Self {
            orders: Vec::new(),
            opened: false,
        }
    }
}

/// 涨跌停排队器
///
/// 队列持有自身互斥锁；锁序上位于交易所锁与账户锁之后。
pub struct LimitQueue {
    /// 涨停排队 (symbol -> 买单FIFO)
    limit_up_queues: Mutex<HashMap<String, VecDeque<SimulatedOrder>>>,

    /// 跌停排队 (symbol -> 卖单FIFO)
    limit_down_queues: Mutex<HashMap<String, VecDeque<SimulatedOrder>>>,
}

impl LimitQueue {
    pub fn new() -> Self {
        Self {
            limit_up_queues: Mutex::new(HashMap::new()),
            limit_down_queues: Mutex::new(HashMap::new()),
        }
    }

    /// 买单入涨停队列（队尾）
    pub fn push_limit_up(&self, order: SimulatedOrder) {
        log::debug!(
            "Order {} queued at limit up for {}",
            order.order_id,
            order.symbol
        );
        self.limit_up_queues
            .lock()
            .entry(order.symbol.clone())
            .or_default()
            .push_back(order);
    }

    /// 卖单入跌停队列（队尾）
    pub fn push_limit_down(&self, order: SimulatedOrder) {
        log::debug!(
            "Order {} queued at limit down for {}",
            order.order_id,
            order.symbol
        );
        self.limit_down_queues
            .lock()
            .entry(order.symbol.clone())
            .or_default()
            .push_back(order);
    }

    /// 排空涨停队列
    pub fn drain_limit_up(&self, symbol: &str, tick: &TickSnapshot) -> QueueDrain {
        let mut queues = self.limit_up_queues.lock();
        let Some(queue) = queues.get_mut(symbol) else {
            return QueueDrain::empty();
        };
        if queue.is_empty() {
            return QueueDrain::empty();
        }

        let still_at_limit = Self::is_at_limit_up(symbol, tick.last_price, tick.last_close);
        let drain = Self::drain_queue(queue, still_at_limit);
        if queue.is_empty() {
            queues.remove(symbol);
        }
        drain
    }

    /// 排空跌停队列
    pub fn drain_limit_down(&self, symbol: &str, tick: &TickSnapshot) -> QueueDrain {
        let mut queues = self.limit_down_queues.lock();
        let Some(queue) = queues.get_mut(symbol) else {
            return QueueDrain::empty();
        };
        if queue.is_empty() {
            return QueueDrain::empty();
        }

        let still_at_limit = Self::is_at_limit_down(symbol, tick.last_price, tick.last_close);
        let drain = Self::drain_queue(queue, still_at_limit);
        if queue.is_empty() {
            queues.remove(symbol);
        }
        drain
    }

    fn drain_queue(queue: &mut VecDeque<SimulatedOrder>, still_at_limit: bool) -> QueueDrain {
        if !still_at_limit {
            // 价格打开，整队放出
            return QueueDrain {
                orders: queue.drain(..).collect(),
                opened: true,
            };
        }

        // 封板期间仅放出队首一部分
        let release = (queue.len() / 10).max(1).min(queue.len());
        QueueDrain {
            orders: queue.drain(..release).collect(),
            opened: false,
        }
    }

    /// 从两侧队列中移除订单（撤单路径）
    pub fn remove_from_queue(&self, order_id: &str) -> bool {
        {
            let mut queues = self.limit_up_queues.lock();
            for queue in queues.values_mut() {
                if let Some(idx) = queue.iter().position(|o| o.order_id == order_id) {
                    let _ = queue.remove(idx);
                    return true;
                }
            }
        }

        let mut queues = self.limit_down_queues.lock();
        for queue in queues.values_mut() {
            if let Some(idx) = queue.iter().position(|o| o.order_id == order_id) {
                queue.remove(idx);
                return true;
            }
        }

        false
    }

    pub fn limit_up_queue_size(&self, symbol: &str) -> usize {
        self.limit_up_queues
            .lock()
            .get(symbol)
            .map(|q| q.len())
            .unwrap_or(0)
    }

    pub fn limit_down_queue_size(&self, symbol: &str) -> usize {
        self.limit_down_queues
            .lock()
            .get(symbol)
            .map(|q| q.len())
            .unwrap_or(0)
    }

    pub fn clear_all(&self) {
        self.limit_up_queues.lock().clear();
        self.limit_down_queues.lock().clear();
    }

    /// 涨停价（按分取整）
    pub fn limit_up_price(symbol: &str, last_close: f64) -> f64 {
        round_to_cent(last_close * (1.0 + OrderMatcher::limit_pct(symbol)))
    }

    /// 跌停价（按分取整）
    pub fn limit_down_price(symbol: &str, last_close: f64) -> f64 {
        round_to_cent(last_close * (1.0 - OrderMatcher::limit_pct(symbol)))
    }

    /// 最新价是否处于涨停价附近（容差0.01元）
    pub fn is_at_limit_up(symbol: &str, price: f64, last_close: f64) -> bool {
        if last_close <= 0.0 {
            return false;
        }
        (price - Self::limit_up_price(symbol, last_close)).abs() < LIMIT_PRICE_TOLERANCE
    }

    /// 最新价是否处于跌停价附近（容差0.01元）
    pub fn is_at_limit_down(symbol: &str, price: f64, last_close: f64) -> bool {
        if last_close <= 0.0 {
            return false;
        }
        (price - Self::limit_down_price(symbol, last_close)).abs() < LIMIT_PRICE_TOLERANCE
    }
}

impl Default for LimitQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::exchange_types::OrderSide;

    fn order(id: &str, symbol: &str, side: OrderSide, volume: i64) -> SimulatedOrder {
        let mut o = SimulatedOrder::limit(symbol, side, 11.0, volume);
        o.order_id = id.to_string();
        o
    }

    fn tick(symbol: &str, last_price: f64, last_close: f64) -> TickSnapshot {
        TickSnapshot {
            symbol: symbol.to_string(),
            timestamp: 0,
            last_price,
            bid_price: last_price,
            ask_price: last_price,
            volume: 1_000_000,
            last_close,
        }
    }

    #[test]
    fn test_limit_prices() {
        assert_eq!(LimitQueue::limit_up_price("600000", 10.0), 11.0);
        assert_eq!(LimitQueue::limit_down_price("600000", 10.0), 9.0);
        assert_eq!(LimitQueue::limit_up_price("688001", 10.0), 12.0);
        assert_eq!(LimitQueue::limit_up_price("830001", 10.0), 13.0);
    }

    #[test]
    fn test_at_limit_detection() {
        assert!(LimitQueue::is_at_limit_up("600000", 11.0, 10.0));
        assert!(LimitQueue::is_at_limit_up("600000", 10.995, 10.0));
        assert!(!LimitQueue::is_at_limit_up("600000", 10.98, 10.0));
        assert!(LimitQueue::is_at_limit_down("600000", 9.0, 10.0));
        assert!(!LimitQueue::is_at_limit_down("600000", 9.5, 10.0));
        // 无昨收价不判定
        assert!(!LimitQueue::is_at_limit_up("600000", 11.0, 0.0));
    }

    #[test]
    fn test_drain_opened_releases_all_in_order() {
        let queue = LimitQueue::new();
        queue.push_limit_up(order("A", "600000", OrderSide::Buy, 100));
        queue.push_limit_up(order("B", "600000", OrderSide::Buy, 200));
        queue.push_limit_up(order("C", "600000", OrderSide::Buy, 300));

        // 价格打开
        let drain = queue.drain_limit_up("600000", &tick("600000", 10.5, 10.0));
        assert!(drain.opened);
        let ids: Vec<&str> = drain.orders.iter().map(|o| o.order_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
        assert_eq!(queue.limit_up_queue_size("600000"), 0);
    }

    #[test]
    fn test_drain_still_at_limit_releases_front() {
        let queue = LimitQueue::new();
        queue.push_limit_up(order("A", "600000", OrderSide::Buy, 100));
        queue.push_limit_up(order("B", "600000", OrderSide::Buy, 200));

        // 仍在涨停：max(1, 2/10) = 1 笔放出，先入先出
        let drain = queue.drain_limit_up("600000", &tick("600000", 11.0, 10.0));
        assert!(!drain.opened);
        assert_eq!(drain.orders.len(), 1);
        assert_eq!(drain.orders[0].order_id, "A");
        assert_eq!(queue.limit_up_queue_size("600000"), 1);
    }

    #[test]
    fn test_drain_release_fraction() {
        let queue = LimitQueue::new();
        for i in 0..25 {
            queue.push_limit_up(order(&format!("O{}", i), "600000", OrderSide::Buy, 100));
        }

        // max(1, 25/10) = 2
        let drain = queue.drain_limit_up("600000", &tick("600000", 11.0, 10.0));
        assert_eq!(drain.orders.len(), 2);
        assert_eq!(drain.orders[0].order_id, "O0");
        assert_eq!(drain.orders[1].order_id, "O1");
        assert_eq!(queue.limit_up_queue_size("600000"), 23);
    }

    #[test]
    fn test_drain_down_queue() {
        let queue = LimitQueue::new();
        queue.push_limit_down(order("S1", "600000", OrderSide::Sell, 100));

        // 仍在跌停
        let drain = queue.drain_limit_down("600000", &tick("600000", 9.0, 10.0));
        assert!(!drain.opened);
        assert_eq!(drain.orders.len(), 1);

        // 队列已空
        let drain = queue.drain_limit_down("600000", &tick("600000", 9.5, 10.0));
        assert!(drain.orders.is_empty());
    }

    #[test]
    fn test_drain_unknown_symbol() {
        let queue = LimitQueue::new();
        let drain = queue.drain_limit_up("600000", &tick("600000", 10.5, 10.0));
        assert!(drain.orders.is_empty());
        assert!(!drain.opened);
    }

    #[test]
    fn test_remove_from_queue() {
        let queue = LimitQueue::new();
        queue.push_limit_up(order("A", "600000", OrderSide::Buy, 100));
        queue.push_limit_down(order("B", "000001", OrderSide::Sell, 100));

        assert!(queue.remove_from_queue("A"));
        assert_eq!(queue.limit_up_queue_size("600000"), 0);

        assert!(queue.remove_from_queue("B"));
        assert!(!queue.remove_from_queue("B"));
        assert!(!queue.remove_from_queue("missing"));
    }

    #[test]
    fn test_clear_all() {
        let queue = LimitQueue::new();
        queue.push_limit_up(order("A", "600000", OrderSide::Buy, 100));
        queue.push_limit_down(order("B", "600000", OrderSide::Sell, 100));

        queue.clear_all();
        assert_eq!(queue.limit_up_queue_size("600000"), 0);
        assert_eq!(queue.limit_down_queue_size("600000"), 0);
    }
}
