use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Represents which side of the market the order is on.
///
/// # Intuition
/// - `Buy` (Bid): The trader wants to purchase the asset. Resting bids are ranked from
///   **highest to lowest price** because a higher price is more aggressive.
/// - `Sell` (Ask): The trader wants to sell the asset. Resting asks are ranked from
///   **lowest to highest price** because a lower price is more aggressive.
///
/// The side of the *incoming* order decides which half of the book it walks and how
/// crossing is judged, see [`Side::crosses`] and [`Side::priority`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,  // Bid
    Sell, // Ask
}

impl Side {
    /// The side an incoming order of this side trades against.
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Whether a taker on this side with limit `limit` may trade against a maker
    /// resting at `resting`.
    ///
    /// - Buy: the ask must be at or below the limit.
    /// - Sell: the bid must be at or above the limit.
    pub fn crosses(self, limit: f64, resting: f64) -> bool {
        match self {
            Side::Buy => resting <= limit,
            Side::Sell => resting >= limit,
        }
    }

    /// Price-time priority of two makers, as seen by a taker on this side.
    ///
    /// A buy taker wants the cheapest ask first, a sell taker the richest bid
    /// first. Equal prices fall back to arrival: earlier timestamp, then lower id.
    pub fn priority(self, a: &Order, b: &Order) -> Ordering {
        let by_price = match self {
            Side::Buy => a.price.total_cmp(&b.price),
            Side::Sell => b.price.total_cmp(&a.price),
        };
        by_price
            .then_with(|| a.timestamp.cmp(&b.timestamp))
            .then_with(|| a.id.cmp(&b.id))
    }
}

/// Lifecycle state of an order.
///
/// `Cancelled` is part of the model, but nothing in the engine ever moves an
/// order into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
}

impl OrderStatus {
    /// Orders in these states still rest in the book.
    pub fn is_resting(self) -> bool {
        matches!(self, OrderStatus::Open | OrderStatus::PartiallyFilled)
    }
}

/// A limit order submitted to the engine.
///
/// - `quantity` is the original size and never changes.
/// - `remaining_quantity` shrinks with every fill, `0 <= remaining <= quantity`.
/// - `timestamp` is used for time-priority (FIFO within a price) and display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    pub side: Side,
    pub price: f64,
    pub quantity: f64,
    pub remaining_quantity: f64,
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
}

impl Order {
    /// A fresh, never-matched order.
    pub fn new(id: u64, side: Side, price: f64, quantity: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            side,
            price,
            quantity,
            remaining_quantity: quantity,
            status: OrderStatus::Open,
            timestamp,
        }
    }

    pub fn is_resting(&self) -> bool {
        self.status.is_resting()
    }

    pub fn filled_quantity(&self) -> f64 {
        self.quantity - self.remaining_quantity
    }

    /// Takes `qty` off the remaining size and re-derives the status from it.
    ///
    /// Callers never fill more than what remains; the result is clamped at zero so
    /// floating point noise cannot leave a sliver of negative size behind.
    pub(crate) fn fill(&mut self, qty: f64) {
        self.remaining_quantity = (self.remaining_quantity - qty).max(0.0);
        self.status = if self.remaining_quantity == 0.0 {
            OrderStatus::Filled
        } else if self.remaining_quantity < self.quantity {
            OrderStatus::PartiallyFilled
        } else {
            OrderStatus::Open
        };
    }
}
