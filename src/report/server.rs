//! HTTP endpoints serving the report views as JSON

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::config::TradeConfig;
use crate::exchange::Exchange;
use crate::execution::PositionLedger;
use crate::persistence::LedgerStore;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:5014";

/// Shared by every request; the ledger is re-read from disk each time
pub struct ReportState {
    pub trade: TradeConfig,
    pub store: LedgerStore,
    pub exchange: Box<dyn Exchange>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

struct ReportError(String);

impl IntoResponse for ReportError {
    fn into_response(self) -> Response {
        tracing::warn!("Report request failed: {}", self.0);
        (StatusCode::BAD_GATEWAY, Json(ErrorBody { error: self.0 })).into_response()
    }
}

impl ReportState {
    async fn snapshot(&self) -> Result<(f64, PositionLedger), ReportError> {
        let price = self
            .exchange
            .fetch_last_price(&self.trade.pair)
            .await
            .map_err(|e| ReportError(format!("fetching price for {}: {}", self.trade.pair, e)))?;
        Ok((price, self.store.load_or_default()))
    }
}

pub fn router(state: Arc<ReportState>) -> Router {
    Router::new()
        .route("/DCA/current_price", get(current_price))
        .route("/DCA/existing_orders", get(existing_orders))
        .route("/DCA/sell_threshold_eval", get(sell_threshold_eval))
        .route("/DCA/summary", get(summary))
        .with_state(state)
}

/// Serve the report routes on `listener` until `shutdown` resolves
pub async fn serve<F>(
    listener: TcpListener,
    state: Arc<ReportState>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("📊 Report server listening on http://{}", addr);
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn current_price(State(state): State<Arc<ReportState>>) -> Response {
    match state.exchange.fetch_last_price(&state.trade.pair).await {
        Ok(price) => Json(super::current_price_view(&state.trade.pair, price)).into_response(),
        Err(e) => {
            ReportError(format!("fetching price for {}: {}", state.trade.pair, e)).into_response()
        }
    }
}

async fn existing_orders(State(state): State<Arc<ReportState>>) -> Response {
    match state.snapshot().await {
        Ok((price, ledger)) => Json(super::existing_orders(
            &ledger,
            price,
            state.trade.rise_percent,
            Utc::now(),
        ))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

async fn sell_threshold_eval(State(state): State<Arc<ReportState>>) -> Response {
    match state.snapshot().await {
        Ok((price, ledger)) => Json(super::sell_threshold_eval(
            &ledger,
            price,
            state.trade.rise_percent,
            Utc::now(),
        ))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

async fn summary(State(state): State<Arc<ReportState>>) -> Response {
    match state.snapshot().await {
        Ok((price, ledger)) => Json(super::ledger_summary(
            &state.trade.pair,
            &ledger,
            price,
            state.trade.drop_percent,
        ))
        .into_response(),
        Err(e) => e.into_response(),
    }
}
