use chrono::{DateTime, Utc};

use crate::orders::{Order, Side};

/// Authoritative list of every order the engine has accepted, in arrival order.
///
/// The ledger only stores orders; the [`MatchingEngine`](crate::engine::MatchingEngine)
/// owns all status and quantity changes and applies them in place through
/// [`OrderLedger::get_mut`]. Filled orders stay in the ledger for history, they just
/// stop showing up in [`OrderLedger::resting`].
///
/// Positions of resting orders are also indexed per side, so matching and
/// aggregation only touch open orders instead of the full history.
#[derive(Debug)]
pub struct OrderLedger {
    orders: Vec<Order>,
    /// Ledger positions of resting bids, in arrival order.
    bids: Vec<usize>,
    /// Ledger positions of resting asks, in arrival order.
    asks: Vec<usize>,
    next_id: u64,
    last_stamp: Option<DateTime<Utc>>,
}

impl OrderLedger {
    pub fn new() -> Self {
        Self {
            orders: Vec::new(),
            bids: Vec::new(),
            asks: Vec::new(),
            next_id: 1,
            last_stamp: None,
        }
    }

    /// Hands out the next order id. Ids start at 1 and are never reused.
    pub(crate) fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Wall-clock time that never runs backwards within this ledger.
    ///
    /// If the system clock steps back, the previous stamp is reused; equal stamps are
    /// then ordered by id.
    pub(crate) fn stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_stamp {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_stamp = Some(ts);
        ts
    }

    /// Appends an order. Each order is recorded exactly once, after its matching walk,
    /// and enters the side index only if it still has size left.
    pub(crate) fn record(&mut self, order: Order) {
        debug_assert!(
            self.orders.last().is_none_or(|o| o.id < order.id),
            "order ids must be recorded in increasing order"
        );
        let pos = self.orders.len();
        if order.is_resting() {
            self.side_index_mut(order.side).push(pos);
        }
        self.orders.push(order);
    }

    fn side_index(&self, side: Side) -> &Vec<usize> {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    fn side_index_mut(&mut self, side: Side) -> &mut Vec<usize> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    /// Drops orders that are no longer resting from the side index.
    pub(crate) fn prune(&mut self, side: Side) {
        let Self {
            orders, bids, asks, ..
        } = self;
        let index = match side {
            Side::Buy => bids,
            Side::Sell => asks,
        };
        index.retain(|&pos| orders[pos].is_resting());
    }

    /// All orders in insertion order.
    pub fn all(&self) -> &[Order] {
        &self.orders
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Orders that still rest in the book (open or partially filled).
    pub fn resting(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter().filter(|o| o.is_resting())
    }

    /// Resting orders on one side, in arrival order.
    pub fn resting_on(&self, side: Side) -> impl Iterator<Item = &Order> {
        self.side_index(side)
            .iter()
            .map(|&pos| &self.orders[pos])
            .filter(|o| o.is_resting())
    }

    /// Ledger positions of resting orders on one side, in arrival order.
    pub(crate) fn resting_positions(&self, side: Side) -> Vec<usize> {
        self.side_index(side)
            .iter()
            .copied()
            .filter(|&pos| self.orders[pos].is_resting())
            .collect()
    }

    pub(crate) fn get(&self, pos: usize) -> &Order {
        &self.orders[pos]
    }

    pub(crate) fn get_mut(&mut self, pos: usize) -> &mut Order {
        &mut self.orders[pos]
    }
}

impl Default for OrderLedger {
    fn default() -> Self {
        Self::new()
    }
}
