use crate::analytics::greeks::{explain, Greek};
use crate::errors::{EngineError, EngineResult, ValidationError};
use crate::portfolio::is_positive;
use crate::state::{Action, AppState, PositionDraft, SessionSnapshot};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use std::sync::Arc;

type ApiResponse = (StatusCode, Json<serde_json::Value>);

#[derive(serde::Deserialize)]
pub struct TickersQuery {
    pub search: Option<String>,
    pub limit: Option<usize>,
}

#[derive(serde::Deserialize)]
pub struct SelectBody {
    pub ticker: String,
}

#[derive(serde::Deserialize)]
pub struct OverrideBody {
    pub price: f64,
}

#[derive(serde::Deserialize)]
pub struct MarketBody {
    pub risk_free_rate: Option<f64>,
    pub volatility: Option<f64>,
}

#[derive(serde::Deserialize)]
pub struct GreekQuery {
    pub value: f64,
}

/// Map an engine outcome onto an HTTP reply. On success the committed
/// snapshot is returned so the dashboard can re-render in one round trip.
fn respond(state: &AppState, result: EngineResult<()>) -> ApiResponse {
    match result {
        Ok(()) => {
            let snapshot = state.snapshot_rx.borrow().clone();
            (StatusCode::OK, Json(serde_json::json!(snapshot)))
        }
        Err(e) => error_response(&e),
    }
}

fn error_response(e: &EngineError) -> ApiResponse {
    let status = match e {
        EngineError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::IndexOutOfBounds { .. } => StatusCode::NOT_FOUND,
        EngineError::RequestPending(_) => StatusCode::CONFLICT,
        EngineError::Network(_) | EngineError::Service { .. } | EngineError::Parse(_) => StatusCode::BAD_GATEWAY,
        EngineError::Config(_) | EngineError::ChannelClosed(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(serde_json::json!({ "error": e.to_string() })))
}

/// GET /api/state -- committed session snapshot (from watch channel, no lock)
pub async fn get_state(State(state): State<Arc<AppState>>) -> Json<SessionSnapshot> {
    let snapshot = state.snapshot_rx.borrow().clone();
    Json(snapshot)
}

/// GET /api/tickers -- catalog filtered by symbol or brand name
pub async fn get_tickers(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TickersQuery>,
) -> Json<serde_json::Value> {
    let catalog = state.catalog_rx.borrow().clone();
    let limit = params.limit.unwrap_or(500).min(5000);
    let tickers: Vec<_> = catalog
        .filter(params.search.as_deref().unwrap_or(""))
        .take(limit)
        .collect();
    Json(serde_json::json!({ "tickers": tickers }))
}

/// POST /api/tickers/refresh -- reload the catalog from the pricing service
pub async fn refresh_tickers(State(state): State<Arc<AppState>>) -> ApiResponse {
    let result = state.dispatch(Action::RefreshCatalog).await;
    respond(&state, result)
}

/// POST /api/select
pub async fn select_ticker(State(state): State<Arc<AppState>>, Json(body): Json<SelectBody>) -> ApiResponse {
    let result = state.dispatch(Action::SelectTicker(body.ticker)).await;
    respond(&state, result)
}

/// PUT /api/overrides/{symbol} -- manual price, must be finite and positive
pub async fn set_override(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Json(body): Json<OverrideBody>,
) -> ApiResponse {
    if symbol.trim().is_empty() {
        return error_response(&EngineError::from(ValidationError::MissingTicker));
    }
    if !is_positive(body.price) {
        return error_response(&EngineError::from(ValidationError::InvalidField("price")));
    }
    let result = state
        .dispatch(Action::SetPriceOverride { symbol, price: body.price })
        .await;
    respond(&state, result)
}

/// PUT /api/market -- risk-free rate and/or volatility
pub async fn set_market(State(state): State<Arc<AppState>>, Json(body): Json<MarketBody>) -> ApiResponse {
    let result = state
        .dispatch(Action::SetMarket {
            risk_free_rate: body.risk_free_rate,
            volatility: body.volatility,
        })
        .await;
    respond(&state, result)
}

/// POST /api/positions
pub async fn add_position(State(state): State<Arc<AppState>>, Json(draft): Json<PositionDraft>) -> ApiResponse {
    let result = state.dispatch(Action::AddPosition(draft)).await;
    respond(&state, result)
}

/// DELETE /api/positions/{index}
pub async fn remove_position(State(state): State<Arc<AppState>>, Path(index): Path<usize>) -> ApiResponse {
    let result = state.dispatch(Action::RemovePosition(index)).await;
    respond(&state, result)
}

/// POST /api/analyze -- 200 once the request is in flight; the summary
/// arrives with a later state message
pub async fn analyze(State(state): State<Arc<AppState>>) -> ApiResponse {
    let result = state.dispatch(Action::RequestAnalysis).await;
    respond(&state, result)
}

/// POST /api/simulate
pub async fn simulate(State(state): State<Arc<AppState>>) -> ApiResponse {
    let result = state.dispatch(Action::RequestSimulation).await;
    respond(&state, result)
}

/// GET /api/greeks/{name}?value= -- pure interpretation, no engine round trip
pub async fn get_greek(Path(name): Path<String>, Query(params): Query<GreekQuery>) -> ApiResponse {
    match name.parse::<Greek>() {
        Ok(greek) => (StatusCode::OK, Json(serde_json::json!(explain(greek, params.value)))),
        Err(e) => (StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": e }))),
    }
}

/// GET /api/counters -- performance counters (lock-free reads)
pub async fn get_counters(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    use portable_atomic::Ordering::Relaxed;
    Json(serde_json::json!({
        "actions_processed": state.counters.actions_processed.load(Relaxed),
        "validation_rejections": state.counters.validation_rejections.load(Relaxed),
        "requests_issued": state.counters.requests_issued.load(Relaxed),
        "requests_failed": state.counters.requests_failed.load(Relaxed),
        "ws_messages_sent": state.counters.ws_messages_sent.load(Relaxed),
    }))
}
