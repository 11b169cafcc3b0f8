use std::net::SocketAddr;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    api::router_with_origins,
    instrument::Instrument,
    simulate::{SimConfig, run_simulation},
    state::{AppState, DEFAULT_FEED_CAPACITY, MAX_FEED_CAPACITY},
    utils::shutdown_token,
};

/// Single-instrument limit order matching engine
#[derive(Parser, Debug)]
#[command(name = "matching_engine", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the exchange gateway (REST + WebSocket)
    Serve(ServeConfig),
    /// Send randomized limit orders to a running gateway
    Simulate(SimConfig),
}

/// Gateway configuration. Every flag can also come from the environment.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    /// Address to listen on
    #[arg(long, env = "ENGINE_ADDR", default_value = "127.0.0.1:8000")]
    pub addr: SocketAddr,

    /// Instrument traded by this engine, BASE-QUOTE
    #[arg(long, env = "ENGINE_TICKER", default_value = "BTC-USD")]
    pub ticker: Instrument,

    /// Browser origins allowed by CORS (repeat or comma separate)
    #[arg(
        long = "allowed-origin",
        env = "ENGINE_ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_values = ["http://localhost:5173", "http://127.0.0.1:5173"]
    )]
    pub allowed_origins: Vec<String>,

    /// Frames buffered per WebSocket subscriber before it starts skipping
    #[arg(
        long,
        env = "ENGINE_FEED_CAPACITY",
        default_value_t = DEFAULT_FEED_CAPACITY,
        value_parser = parse_feed_capacity
    )]
    pub feed_capacity: usize,
}

fn parse_feed_capacity(raw: &str) -> Result<usize, String> {
    let n: usize = raw.parse().map_err(|e| format!("`{}` is not a number: {}", raw, e))?;
    if (1..=MAX_FEED_CAPACITY).contains(&n) {
        Ok(n)
    } else {
        Err(format!("must be between 1 and {}", MAX_FEED_CAPACITY))
    }
}

/// Binds the listener and serves until `shutdown` fires.
pub async fn serve(cfg: ServeConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let state = AppState::new(cfg.ticker.clone(), cfg.feed_capacity);
    let app = router_with_origins(state, &cfg.allowed_origins);

    let listener = TcpListener::bind(cfg.addr)
        .await
        .with_context(|| format!("failed to bind {}", cfg.addr))?;
    info!(
        addr = %listener.local_addr()?,
        ticker = %cfg.ticker,
        origins = ?cfg.allowed_origins,
        "exchange gateway listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("gateway server failed")?;
    info!("exchange gateway stopped");
    Ok(())
}

pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let shutdown = shutdown_token();
    match cli.command {
        Commands::Serve(cfg) => serve(cfg, shutdown).await,
        Commands::Simulate(cfg) => run_simulation(cfg, shutdown).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_defaults() {
        let cli = Cli::try_parse_from(["matching_engine", "serve"]).unwrap();
        let Commands::Serve(cfg) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(cfg.addr, "127.0.0.1:8000".parse::<SocketAddr>().unwrap());
        assert_eq!(cfg.ticker.code(), "BTC-USD");
        assert_eq!(cfg.allowed_origins.len(), 2);
        assert_eq!(cfg.feed_capacity, DEFAULT_FEED_CAPACITY);
    }

    #[test]
    fn serve_overrides() {
        let cli = Cli::try_parse_from([
            "matching_engine",
            "serve",
            "--addr",
            "0.0.0.0:9000",
            "--ticker",
            "eth-usd",
            "--allowed-origin",
            "http://a.test,http://b.test",
        ])
        .unwrap();
        let Commands::Serve(cfg) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(cfg.addr.port(), 9000);
        assert_eq!(cfg.ticker.code(), "ETH-USD");
        assert_eq!(cfg.allowed_origins, vec!["http://a.test", "http://b.test"]);
    }

    #[test]
    fn feed_capacity_is_bounded() {
        let parse = |cap: &str| {
            Cli::try_parse_from(["matching_engine", "serve", "--feed-capacity", cap])
        };
        assert!(parse("0").is_err());
        assert!(parse(&(MAX_FEED_CAPACITY + 1).to_string()).is_err());
        assert!(parse(&usize::MAX.to_string()).is_err());
        assert!(parse("lots").is_err());

        let Commands::Serve(cfg) = parse("64").unwrap().command else {
            panic!("expected serve");
        };
        assert_eq!(cfg.feed_capacity, 64);
    }

    #[test]
    fn bad_ticker_is_rejected() {
        assert!(Cli::try_parse_from(["matching_engine", "serve", "--ticker", "BTCUSD"]).is_err());
    }

    #[test]
    fn simulate_parses() {
        let cli = Cli::try_parse_from([
            "matching_engine",
            "simulate",
            "--run-secs",
            "5",
            "--rate-hz",
            "20",
        ])
        .unwrap();
        let Commands::Simulate(cfg) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!(cfg.run_secs, Some(5));
        assert_eq!(cfg.rate_hz, 20.0);
        assert_eq!(cfg.api_base, "http://127.0.0.1:8000");
    }
}
