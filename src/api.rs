use axum::{
    Json, Router, debug_handler,
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::HeaderValue,
    response::IntoResponse,
    routing::{get, post},
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::broadcast::error::RecvError;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info, warn};

use crate::{
    book::OrderBookSnapshot,
    errors::ApiError,
    orders::{Order, Side},
    state::AppState,
    trade::TradesSnapshot,
};

/// Origins of the bundled web client during development.
pub const DEFAULT_ALLOWED_ORIGINS: [&str; 2] = ["http://localhost:5173", "http://127.0.0.1:5173"];

/// Query string of `POST /exchange/orders`.
#[derive(Debug, Serialize, Deserialize)]
pub struct NewOrder {
    pub side: Side,
    pub price: f64,
    pub quantity: f64,
}

/// Frames pushed over `/exchange/ws/market`:
/// `{"type": "orderbook", "data": {...}}` and `{"type": "trades", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum MarketMessage {
    Orderbook(OrderBookSnapshot),
    Trades(TradesSnapshot),
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[debug_handler]
pub async fn create_order(
    State(state): State<AppState>,
    Query(payload): Query<NewOrder>,
) -> Result<Json<Order>, ApiError> {
    let order = state.place_order(payload.side, payload.price, payload.quantity)?;
    Ok(Json(order))
}

async fn get_orderbook(State(state): State<AppState>) -> Json<OrderBookSnapshot> {
    Json(state.orderbook())
}

async fn get_trades(State(state): State<AppState>) -> Json<TradesSnapshot> {
    Json(state.trades())
}

async fn market_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| market_socket(socket, state))
}

async fn send_frame(
    sink: &mut SplitSink<WebSocket, Message>,
    frame: &MarketMessage,
) -> Result<(), axum::Error> {
    match serde_json::to_string(frame) {
        Ok(text) => sink.send(Message::Text(text.into())).await,
        Err(e) => {
            warn!("failed to encode market frame: {}", e);
            Ok(())
        }
    }
}

/// Sends the current book and trades, then relays every update until the client
/// goes away. Anything the client sends besides a close is ignored.
async fn market_socket(socket: WebSocket, state: AppState) {
    let (book, trades, mut feed) = state.subscribe();
    let (mut sink, mut stream) = socket.split();
    info!("market subscriber connected");

    for frame in [MarketMessage::Orderbook(book), MarketMessage::Trades(trades)] {
        if send_frame(&mut sink, &frame).await.is_err() {
            debug!("market subscriber dropped during greeting");
            return;
        }
    }

    loop {
        tokio::select! {
            update = feed.recv() => match update {
                Ok(frame) => {
                    if send_frame(&mut sink, &frame).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "market subscriber lagged, resuming with newest frames");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    info!("market subscriber disconnected");
}

/// CORS for the given browser origins. Methods and headers are mirrored from the
/// preflight, since wildcards cannot be combined with credentials.
pub fn cors_layer<S: AsRef<str>>(origins: &[S]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o.as_ref()) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = o.as_ref(), "ignoring unparsable CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// Gateway with the default development origins.
pub fn router(state: AppState) -> Router {
    router_with_origins(state, &DEFAULT_ALLOWED_ORIGINS)
}

pub fn router_with_origins<S: AsRef<str>>(state: AppState, origins: &[S]) -> Router {
    let exchange = Router::new()
        .route("/orders", post(create_order))
        .route("/orderbook", get(get_orderbook))
        .route("/trades", get(get_trades))
        .route("/ws/market", get(market_ws));

    Router::new()
        .route("/health", get(health))
        .nest("/exchange", exchange)
        .layer(cors_layer(origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
