use tracing::{debug, info, warn};

use crate::{
    book::OrderBookSnapshot,
    errors::{EngineError, EngineResult},
    instrument::Instrument,
    ledger::OrderLedger,
    orders::{Order, Side},
    trade::{Trade, TradeLog, TradesSnapshot},
};

/// Continuous double-auction engine for a single instrument.
///
/// Owns the [`OrderLedger`], the [`TradeLog`] and the last traded price. Every
/// mutation goes through [`MatchingEngine::place_order`], which takes `&mut self`;
/// hosts that share an engine across tasks wrap it in one lock (see
/// [`AppState`](crate::state::AppState)) so each placement, with all of its fills,
/// completes before the next starts and no read sees a half-applied match.
#[derive(Debug)]
pub struct MatchingEngine {
    instrument: Instrument,
    ledger: OrderLedger,
    trades: TradeLog,
    last_traded_price: Option<f64>,
}

fn validate(price: f64, quantity: f64) -> EngineResult<()> {
    if !(price.is_finite() && price > 0.0) {
        return Err(EngineError::InvalidOrder {
            reason: format!("price must be > 0, got {}", price),
        });
    }
    if !(quantity.is_finite() && quantity > 0.0) {
        return Err(EngineError::InvalidOrder {
            reason: format!("quantity must be > 0, got {}", quantity),
        });
    }
    Ok(())
}

impl MatchingEngine {
    /// Creates an engine with an empty book and no trades.
    pub fn new(instrument: Instrument) -> Self {
        Self {
            instrument,
            ledger: OrderLedger::new(),
            trades: TradeLog::new(),
            last_traded_price: None,
        }
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn last_traded_price(&self) -> Option<f64> {
        self.last_traded_price
    }

    /// Every order ever accepted, in arrival order.
    pub fn orders(&self) -> &[Order] {
        self.ledger.all()
    }

    pub fn trade_log(&self) -> &TradeLog {
        &self.trades
    }

    /// Places a limit order, matching it against the opposite side first.
    ///
    /// # Behavior
    /// - A buy walks the asks cheapest first, a sell walks the bids richest first;
    ///   equal prices are taken oldest first.
    /// - The walk stops once the order is filled or the next maker no longer crosses
    ///   the limit. Since makers are price sorted, nothing behind it can cross either.
    /// - Each fill trades `min(taker remaining, maker remaining)` at the maker's price.
    /// - The incoming order is recorded in the ledger exactly once, after the walk,
    ///   whatever its final status. Only a remainder keeps it in the book.
    ///
    /// # Errors
    /// [`EngineError::InvalidOrder`] if price or quantity is not a positive finite
    /// number, or if resting it would overflow its price level total. Nothing is
    /// mutated in that case, not even the id counter.
    pub fn place_order(&mut self, side: Side, price: f64, quantity: f64) -> EngineResult<Order> {
        let checked = validate(price, quantity).and_then(|()| self.check_level(side, price, quantity));
        if let Err(err) = checked {
            warn!(?side, price, quantity, %err, "rejecting order");
            return Err(err);
        }

        let id = self.ledger.next_id();
        let timestamp = self.ledger.stamp();
        let mut incoming = Order::new(id, side, price, quantity, timestamp);
        info!(id, ?side, price, quantity, "placing order");

        let fills = self.match_incoming(&mut incoming);

        self.ledger.record(incoming.clone());
        info!(
            id,
            fills,
            remaining = incoming.remaining_quantity,
            status = ?incoming.status,
            "order placed"
        );
        Ok(incoming)
    }

    /// Rejects an order whose size would push its own price level past `f64::MAX`.
    ///
    /// Only a remainder can rest, and it never exceeds `quantity`, so checking the
    /// full size keeps every published level total finite.
    fn check_level(&self, side: Side, price: f64, quantity: f64) -> EngineResult<()> {
        let level_total: f64 = self
            .ledger
            .resting_on(side)
            .filter(|o| o.price == price)
            .map(|o| o.remaining_quantity)
            .sum();
        if (level_total + quantity).is_finite() {
            Ok(())
        } else {
            Err(EngineError::InvalidOrder {
                reason: format!(
                    "quantity {} would overflow the {} resting at {}",
                    quantity, level_total, price
                ),
            })
        }
    }

    /// Walks the opposite side in price-time order, filling `incoming` as far as its
    /// limit allows. Returns the number of trades emitted.
    fn match_incoming(&mut self, incoming: &mut Order) -> usize {
        let side = incoming.side;
        let mut candidates = self.ledger.resting_positions(side.opposite());
        candidates.sort_by(|&a, &b| side.priority(self.ledger.get(a), self.ledger.get(b)));

        let mut fills = 0;
        for pos in candidates {
            if incoming.remaining_quantity <= 0.0 {
                break;
            }
            let (maker_id, maker_price, qty) = {
                let maker = self.ledger.get_mut(pos);
                if maker.remaining_quantity <= 0.0 {
                    continue;
                }
                if !side.crosses(incoming.price, maker.price) {
                    break;
                }
                let qty = incoming.remaining_quantity.min(maker.remaining_quantity);
                maker.fill(qty);
                (maker.id, maker.price, qty)
            };
            incoming.fill(qty);

            let trade = Trade {
                price: maker_price,
                quantity: qty,
                side,
                timestamp: self.ledger.stamp(),
                ticker: self.instrument.clone(),
            };
            debug!(
                maker_id,
                taker_id = incoming.id,
                price = trade.price,
                quantity = trade.quantity,
                "trade executed"
            );
            self.trades.append(trade);
            self.last_traded_price = Some(maker_price);
            fills += 1;
        }
        if fills > 0 {
            self.ledger.prune(side.opposite());
        }
        fills
    }

    /// Aggregated price levels for both sides plus the last traded price.
    pub fn build_orderbook_snapshot(&self) -> OrderBookSnapshot {
        OrderBookSnapshot::from_ledger(&self.ledger, self.last_traded_price)
    }

    /// All trades, most recent first.
    pub fn build_trades_snapshot(&self) -> TradesSnapshot {
        self.trades.snapshot()
    }
}

impl Default for MatchingEngine {
    fn default() -> Self {
        Self::new(Instrument::default())
    }
}

//tests
#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::OrderStatus;

    /// Tests a buy that sweeps two ask levels, best price first.
    #[test]
    fn test_buy_sweeps_asks_cheapest_first() {
        let mut engine = MatchingEngine::default();
        engine.place_order(Side::Sell, 101.0, 5.0).unwrap();
        engine.place_order(Side::Sell, 102.0, 3.0).unwrap();

        let buy = engine.place_order(Side::Buy, 102.0, 6.0).unwrap();
        assert_eq!(buy.status, OrderStatus::Filled);

        let trades = engine.build_trades_snapshot().trades;
        assert_eq!(trades.len(), 2);
        // newest first
        assert_eq!((trades[1].price, trades[1].quantity), (101.0, 5.0));
        assert_eq!((trades[0].price, trades[0].quantity), (102.0, 1.0));

        let book = engine.build_orderbook_snapshot();
        assert_eq!(book.asks.len(), 1);
        assert_eq!(book.asks[0].price, 102.0);
        assert_eq!(book.asks[0].total_quantity, 2.0);
        assert_eq!(book.last_traded_price, Some(102.0));
    }

    /// Tests a sell that partially fills against a smaller bid and rests the rest.
    #[test]
    fn test_partial_fill_sell_rests_remainder() {
        let mut engine = MatchingEngine::default();
        engine.place_order(Side::Buy, 100.0, 4.0).unwrap();

        let sell = engine.place_order(Side::Sell, 100.0, 10.0).unwrap();
        assert_eq!(sell.status, OrderStatus::PartiallyFilled);
        assert_eq!(sell.remaining_quantity, 6.0);

        let book = engine.build_orderbook_snapshot();
        assert!(book.bids.is_empty());
        assert_eq!(book.asks[0].price, 100.0);
        assert_eq!(book.asks[0].total_quantity, 6.0);
    }

    /// Tests that an order with no crossing liquidity just rests.
    #[test]
    fn test_no_cross_rests_order() {
        let mut engine = MatchingEngine::default();
        engine.place_order(Side::Sell, 99.0, 1.0).unwrap();

        let buy = engine.place_order(Side::Buy, 98.0, 2.0).unwrap();
        assert_eq!(buy.status, OrderStatus::Open);
        assert_eq!(buy.remaining_quantity, 2.0);
        assert!(engine.trade_log().is_empty());
        assert_eq!(engine.last_traded_price(), None);

        let book = engine.build_orderbook_snapshot();
        assert_eq!(book.bids[0].price, 98.0);
        assert_eq!(book.asks[0].price, 99.0);
    }

    /// Tests that FIFO order is respected for multiple orders at the same price.
    #[test]
    fn test_queue_fairness_fifo_fill_order() {
        let mut engine = MatchingEngine::default();
        let first = engine.place_order(Side::Sell, 100.0, 4.0).unwrap();
        let second = engine.place_order(Side::Sell, 100.0, 6.0).unwrap();

        engine.place_order(Side::Buy, 100.0, 9.0).unwrap();

        let orders = engine.orders();
        let first = orders.iter().find(|o| o.id == first.id).unwrap();
        let second = orders.iter().find(|o| o.id == second.id).unwrap();
        assert_eq!(first.status, OrderStatus::Filled);
        assert_eq!(second.status, OrderStatus::PartiallyFilled);
        assert_eq!(second.remaining_quantity, 1.0);
    }

    /// Tests that the taker gets the maker's price, never its own limit.
    #[test]
    fn test_trade_prints_at_maker_price() {
        let mut engine = MatchingEngine::default();
        engine.place_order(Side::Buy, 100.0, 1.0).unwrap();
        engine.place_order(Side::Sell, 90.0, 1.0).unwrap();

        let trades = engine.build_trades_snapshot().trades;
        assert_eq!(trades[0].price, 100.0);
        assert_eq!(trades[0].side, Side::Sell);
        assert_eq!(engine.last_traded_price(), Some(100.0));
    }

    #[test]
    fn test_filled_taker_is_recorded_once() {
        let mut engine = MatchingEngine::default();
        engine.place_order(Side::Sell, 100.0, 5.0).unwrap();
        let buy = engine.place_order(Side::Buy, 100.0, 5.0).unwrap();

        let copies = engine.orders().iter().filter(|o| o.id == buy.id).count();
        assert_eq!(copies, 1);
        assert_eq!(engine.orders().len(), 2);
    }

    #[test]
    fn test_rejects_non_positive_and_non_finite() {
        let mut engine = MatchingEngine::default();
        engine.place_order(Side::Sell, 100.0, 1.0).unwrap();

        for (price, qty) in [
            (0.0, 5.0),
            (-1.0, 5.0),
            (100.0, 0.0),
            (100.0, -3.0),
            (f64::NAN, 1.0),
            (f64::INFINITY, 1.0),
            (100.0, f64::NAN),
        ] {
            let err = engine.place_order(Side::Buy, price, qty).unwrap_err();
            assert!(matches!(err, EngineError::InvalidOrder { .. }));
        }

        assert_eq!(engine.orders().len(), 1);
        assert!(engine.trade_log().is_empty());
        // the rejected attempts did not burn ids
        let next = engine.place_order(Side::Buy, 1.0, 1.0).unwrap();
        assert_eq!(next.id, 2);
    }

    #[test]
    fn test_rejects_level_overflow() {
        let mut engine = MatchingEngine::default();
        engine.place_order(Side::Buy, 1.0, f64::MAX).unwrap();

        let err = engine.place_order(Side::Buy, 1.0, f64::MAX).unwrap_err();
        assert!(matches!(err, EngineError::InvalidOrder { .. }));
        assert_eq!(engine.orders().len(), 1);

        // other prices are separate levels
        engine.place_order(Side::Buy, 2.0, f64::MAX).unwrap();

        let book = engine.build_orderbook_snapshot();
        assert!(book.bids.iter().all(|l| l.total_quantity.is_finite()));
        let json = serde_json::to_value(&book).unwrap();
        assert_eq!(json["bids"][1]["total_quantity"], f64::MAX);
    }

    #[test]
    fn test_filled_makers_leave_side_index() {
        let mut engine = MatchingEngine::default();
        engine.place_order(Side::Sell, 100.0, 1.0).unwrap();
        engine.place_order(Side::Sell, 101.0, 1.0).unwrap();
        engine.place_order(Side::Buy, 100.0, 1.0).unwrap();

        assert_eq!(engine.ledger.resting_positions(Side::Sell), vec![1]);
        assert!(engine.ledger.resting_positions(Side::Buy).is_empty());
    }

    #[test]
    fn test_trades_carry_configured_ticker() {
        let mut engine = MatchingEngine::new("ETH-USD".parse().unwrap());
        engine.place_order(Side::Sell, 10.0, 1.0).unwrap();
        engine.place_order(Side::Buy, 10.0, 1.0).unwrap();
        assert_eq!(engine.build_trades_snapshot().trades[0].ticker.code(), "ETH-USD");
    }
}
