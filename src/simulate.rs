//! Randomized order flow against a running gateway.
//!
//! Posts limit orders to `POST /exchange/orders` so the book, the trade log and the
//! WebSocket feed have something to show.
//!
//! - Inter-arrival times are drawn from `Exp(rate_hz)`, i.e. a Poisson stream.
//! - Each order's size is an `Exp1` draw times `mean_qty`, floored at 0.01.
//! - The simulator's local mid price takes a `N(0, noise_sigma)` step per order.
//! - Buys are quoted at `mid - spread`, sells at `mid + spread`, side picked 50/50.
//!
//! Fills are read back from the returned order (`quantity - remaining_quantity`).
//! The loop ends after `run_secs` or when the cancellation token fires.

use anyhow::{Context, ensure};
use clap::Args;
use rand::Rng;
use rand_distr::{Distribution, Exp, Exp1, Normal};
use reqwest::Client;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::orders::{Order, Side};

#[derive(Args, Debug, Clone)]
pub struct SimConfig {
    /// Base URL of the gateway
    #[arg(long, default_value = "http://127.0.0.1:8000")]
    pub api_base: String,
    /// Stop after this many seconds (runs until Ctrl-C otherwise)
    #[arg(long)]
    pub run_secs: Option<u64>,
    /// Mean orders per second
    #[arg(long, default_value_t = 5.0)]
    pub rate_hz: f64,
    /// Std-dev of the mid price step per order
    #[arg(long, default_value_t = 0.25)]
    pub noise_sigma: f64,
    /// Mean order size
    #[arg(long, default_value_t = 1.0)]
    pub mean_qty: f64,
    /// Starting mid price
    #[arg(long, default_value_t = 100.0)]
    pub start_mid: f64,
    /// Distance of each quote from the mid
    #[arg(long, default_value_t = 0.5)]
    pub spread: f64,
}

/// Running totals for the final summary.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SimStats {
    pub orders: u64,
    pub bought: f64,
    pub sold: f64,
}

impl SimStats {
    pub fn record(&mut self, order: &Order) {
        self.orders += 1;
        match order.side {
            Side::Buy => self.bought += order.filled_quantity(),
            Side::Sell => self.sold += order.filled_quantity(),
        }
    }
}

/// Longest single sleep between orders; the loop re-checks `run_secs` after each.
const MAX_WAIT: Duration = Duration::from_secs(60);

/// Turns a sampled inter-arrival time into a sleep, capped at [`MAX_WAIT`].
/// Very small rates can draw waits too large for a `Duration`.
fn next_wait(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs)
        .map(|wait| wait.min(MAX_WAIT))
        .unwrap_or(MAX_WAIT)
}

fn round_cents(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Posts one limit order and returns the engine's view of it.
pub async fn send_one_order(
    client: &Client,
    api_base: &str,
    side: Side,
    price: f64,
    quantity: f64,
) -> anyhow::Result<Order> {
    let side = match side {
        Side::Buy => "BUY",
        Side::Sell => "SELL",
    };
    let order = client
        .post(format!("{}/exchange/orders", api_base))
        .query(&[
            ("side", side.to_string()),
            ("price", price.to_string()),
            ("quantity", quantity.to_string()),
        ])
        .send()
        .await?
        .error_for_status()?
        .json::<Order>()
        .await?;
    Ok(order)
}

/// Drives the simulation until `run_secs` elapse or `cancel_token` is cancelled.
///
/// # Errors
/// Invalid distribution parameters, or any failed HTTP request.
pub async fn run_simulation(cfg: SimConfig, cancel_token: CancellationToken) -> anyhow::Result<()> {
    ensure!(cfg.rate_hz > 0.0, "rate_hz must be > 0");
    ensure!(cfg.mean_qty > 0.0, "mean_qty must be > 0");
    ensure!(cfg.spread >= 0.0, "spread must be >= 0");

    let client = Client::new();
    let arrivals = Exp::new(cfg.rate_hz).context("invalid arrival rate")?;
    let drift = Normal::new(0.0, cfg.noise_sigma).context("invalid noise sigma")?;

    // quotes must stay strictly positive
    let floor = cfg.spread + 0.01;
    let mut mid_price = cfg.start_mid.max(floor);
    let mut stats = SimStats::default();
    let start = Instant::now();
    info!(api_base = %cfg.api_base, rate_hz = cfg.rate_hz, "starting order flow simulation");

    loop {
        if let Some(max_secs) = cfg.run_secs {
            if start.elapsed().as_secs() >= max_secs {
                break;
            }
        }
        let wait_secs: f64 = arrivals.sample(&mut rand::rng());
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("received shutdown, stopping simulation");
                break;
            }
            _ = sleep(next_wait(wait_secs)) => {
                let raw: f64 = Exp1.sample(&mut rand::rng());
                let qty = round_cents(raw * cfg.mean_qty).max(0.01);
                mid_price = (mid_price + drift.sample(&mut rand::rng())).max(floor);
                let (side, price) = if rand::rng().random_bool(0.5) {
                    (Side::Buy, mid_price - cfg.spread)
                } else {
                    (Side::Sell, mid_price + cfg.spread)
                };
                let price = round_cents(price).max(0.01);

                let order = send_one_order(&client, &cfg.api_base, side, price, qty).await?;
                stats.record(&order);

                println!(
                    "[{:.1}s] #{} {:?} {:.2}@{:.2} -> {:?} filled={:.2} mid={:.2}",
                    start.elapsed().as_secs_f64(),
                    order.id,
                    side,
                    qty,
                    price,
                    order.status,
                    order.filled_quantity(),
                    mid_price
                );
            }
        }
    }
    println!(
        "--- done --- orders={} bought={:.2} sold={:.2}",
        stats.orders, stats.bought, stats.sold
    );
    Ok(())
}
