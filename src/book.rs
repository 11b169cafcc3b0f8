//! Level-2 view of the book.
//!
//! Nothing here is stored: every snapshot is recomputed from the resting orders in
//! the [`OrderLedger`], so two builds with no order placed in between are identical.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{ledger::OrderLedger, orders::Side};

/// Summed remaining quantity of every resting order at one exact price, on one side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub total_quantity: f64,
}

/// Bids best (highest) first, asks best (lowest) first, plus the last trade price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    /// `None` until the first trade happens.
    pub last_traded_price: Option<f64>,
}

impl OrderBookSnapshot {
    /// Aggregates the ledger's resting orders into price levels.
    pub fn from_ledger(ledger: &OrderLedger, last_traded_price: Option<f64>) -> Self {
        let snapshot = Self {
            bids: levels(ledger, Side::Buy),
            asks: levels(ledger, Side::Sell),
            last_traded_price,
        };
        trace!(
            bids = snapshot.bids.len(),
            asks = snapshot.asks.len(),
            "built order book snapshot"
        );
        snapshot
    }

    /// Get the best bid level
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }

    /// Get the best ask level
    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }

    /// Get the spread (best ask - best bid)
    pub fn spread(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask.price - bid.price),
            _ => None,
        }
    }
}

/// One side of the book, sorted best price first.
///
/// Bids are listed in descending price, asks in ascending price. The sort is stable,
/// so quantities at a level are summed in arrival order and repeated builds agree
/// bit for bit.
fn levels(ledger: &OrderLedger, side: Side) -> Vec<PriceLevel> {
    let mut resting: Vec<(f64, f64)> = ledger
        .resting_on(side)
        .map(|o| (o.price, o.remaining_quantity))
        .collect();

    match side {
        Side::Buy => resting.sort_by(|a, b| b.0.total_cmp(&a.0)),
        Side::Sell => resting.sort_by(|a, b| a.0.total_cmp(&b.0)),
    }

    let mut out: Vec<PriceLevel> = Vec::new();
    for (price, qty) in resting {
        match out.last_mut() {
            Some(level) if level.price == price => level.total_quantity += qty,
            _ => out.push(PriceLevel {
                price,
                total_quantity: qty,
            }),
        }
    }
    out.retain(|level| level.total_quantity > 0.0);
    out
}
