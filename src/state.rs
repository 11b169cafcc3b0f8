use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::trace;

use crate::{
    api::MarketMessage,
    book::OrderBookSnapshot,
    engine::MatchingEngine,
    errors::EngineResult,
    instrument::Instrument,
    orders::{Order, Side},
    trade::TradesSnapshot,
};

pub const DEFAULT_FEED_CAPACITY: usize = 1024;
/// Upper bound on the feed depth; `broadcast::channel` refuses anything near `usize::MAX`.
pub const MAX_FEED_CAPACITY: usize = 1 << 20;

/// Shared gateway state.
///
/// The engine sits behind one mutex that covers both placements and snapshot reads,
/// so readers never observe an order halfway through its matching walk.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<Mutex<MatchingEngine>>,
    feed: broadcast::Sender<MarketMessage>,
}

impl AppState {
    /// `feed_capacity` is clamped to `1..=MAX_FEED_CAPACITY`.
    pub fn new(instrument: Instrument, feed_capacity: usize) -> Self {
        let (feed, _) = broadcast::channel(feed_capacity.clamp(1, MAX_FEED_CAPACITY));
        Self {
            engine: Arc::new(Mutex::new(MatchingEngine::new(instrument))),
            feed,
        }
    }

    // Every mutation is validated before it starts, so a poisoned lock still guards
    // a consistent engine.
    fn engine(&self) -> MutexGuard<'_, MatchingEngine> {
        self.engine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Places the order, then publishes fresh book and trade snapshots.
    ///
    /// Publishing happens before the lock is released, so subscribers see updates in
    /// placement order and only ever after the placement has fully applied.
    pub fn place_order(&self, side: Side, price: f64, quantity: f64) -> EngineResult<Order> {
        let mut engine = self.engine();
        let order = engine.place_order(side, price, quantity)?;

        let book = engine.build_orderbook_snapshot();
        let trades = engine.build_trades_snapshot();
        let book_receivers = self.publish(MarketMessage::Orderbook(book));
        let trade_receivers = self.publish(MarketMessage::Trades(trades));
        trace!(book_receivers, trade_receivers, "published market update");
        Ok(order)
    }

    /// Sends one frame and returns how many subscribers got it. A send only fails
    /// when nobody is subscribed, which counts as zero.
    fn publish(&self, frame: MarketMessage) -> usize {
        self.feed.send(frame).unwrap_or(0)
    }

    /// Copy of every order in the ledger, in arrival order.
    pub fn orders(&self) -> Vec<Order> {
        self.engine().orders().to_vec()
    }

    pub fn orderbook(&self) -> OrderBookSnapshot {
        self.engine().build_orderbook_snapshot()
    }

    pub fn trades(&self) -> TradesSnapshot {
        self.engine().build_trades_snapshot()
    }

    /// Current snapshots plus a feed receiver, taken under one lock so the receiver
    /// picks up exactly where the snapshots leave off.
    pub fn subscribe(&self) -> (OrderBookSnapshot, TradesSnapshot, broadcast::Receiver<MarketMessage>) {
        let engine = self.engine();
        let rx = self.feed.subscribe();
        (
            engine.build_orderbook_snapshot(),
            engine.build_trades_snapshot(),
            rx,
        )
    }
}

impl Default for AppState {
    fn default() -> Self {
        AppState::new(Instrument::default(), DEFAULT_FEED_CAPACITY)
    }
}
