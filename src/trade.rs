use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{instrument::Instrument, orders::Side};

/// A trade represents one match between an incoming order and a resting one.
///
/// # Terminology
/// - **Maker**: The order that was already resting in the book (providing liquidity).
/// - **Taker**: The incoming order that triggered the trade (taking liquidity).
///
/// # Behavior
/// - The trade always executes at the **maker's price** (book price), so any price
///   improvement goes to the taker.
/// - Partial fills may occur: one incoming order can generate several trades.
/// - `side` is the taker's side.
///
/// Example:
/// - A limit buy at 105 (taker) matches a resting sell at 102 (maker).
/// - A trade is created at price 102.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub price: f64,
    pub quantity: f64,
    #[serde(with = "taker_side")]
    pub side: Side,
    pub timestamp: DateTime<Utc>,
    pub ticker: Instrument,
}

// Trades report the aggressor side in lower case ("buy"/"sell"), unlike orders.
mod taker_side {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    use crate::orders::Side;

    pub fn serialize<S: Serializer>(side: &Side, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(match side {
            Side::Buy => "buy",
            Side::Sell => "sell",
        })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Side, D::Error> {
        let raw = String::deserialize(d)?;
        match raw.to_ascii_lowercase().as_str() {
            "buy" => Ok(Side::Buy),
            "sell" => Ok(Side::Sell),
            other => Err(D::Error::custom(format!("unknown side `{}`", other))),
        }
    }
}

/// Newest-first view of the trade log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradesSnapshot {
    pub trades: Vec<Trade>,
}

/// Append-only record of every executed trade, oldest first internally.
#[derive(Debug, Default)]
pub struct TradeLog {
    trades: Vec<Trade>,
}

impl TradeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn append(&mut self, trade: Trade) {
        self.trades.push(trade);
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    /// The most recent trade, if any.
    pub fn last(&self) -> Option<&Trade> {
        self.trades.last()
    }

    /// Most recent first.
    pub fn snapshot(&self) -> TradesSnapshot {
        TradesSnapshot {
            trades: self.trades.iter().rev().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(price: f64) -> Trade {
        Trade {
            price,
            quantity: 1.0,
            side: Side::Sell,
            timestamp: Utc::now(),
            ticker: Instrument::default(),
        }
    }

    #[test]
    fn snapshot_is_newest_first() {
        let mut log = TradeLog::new();
        log.append(trade(1.0));
        log.append(trade(2.0));
        log.append(trade(3.0));

        let prices: Vec<f64> = log.snapshot().trades.iter().map(|t| t.price).collect();
        assert_eq!(prices, vec![3.0, 2.0, 1.0]);
        assert_eq!(log.last().unwrap().price, 3.0);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn empty_log_gives_empty_snapshot() {
        let log = TradeLog::new();
        assert!(log.is_empty());
        assert!(log.snapshot().trades.is_empty());
    }

    #[test]
    fn trade_wire_shape() {
        let v = serde_json::to_value(trade(100.5)).unwrap();
        assert_eq!(v["side"], "sell");
        assert_eq!(v["ticker"], "BTC-USD");
        assert_eq!(v["price"], 100.5);
        assert!(v["timestamp"].is_string());

        let back: Trade = serde_json::from_value(v).unwrap();
        assert_eq!(back.side, Side::Sell);
    }
}
