//! Single-instrument continuous double-auction matching engine.
//!
//! The core ([`engine`], [`ledger`], [`book`], [`trade`]) is synchronous and free of
//! I/O. [`api`] and [`state`] wrap it in an axum gateway that serializes placements
//! behind one lock and fans snapshots out over WebSocket.

pub mod api;
pub mod book;
pub mod cli;
pub mod engine;
pub mod errors;
pub mod instrument;
pub mod ledger;
pub mod orders;
pub mod simulate;
pub mod state;
pub mod trade;
pub mod utils;
