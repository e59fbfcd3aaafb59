pub mod routes;
pub mod ws;

use crate::state::AppState;
use axum::routing::{delete, get, post, put};
use axum::Router;
use std::sync::Arc;

/// Dashboard API plus static assets. CORS is open for the dev-server UI.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/state", get(routes::get_state))
        .route("/api/tickers", get(routes::get_tickers))
        .route("/api/tickers/refresh", post(routes::refresh_tickers))
        .route("/api/select", post(routes::select_ticker))
        .route("/api/overrides/{symbol}", put(routes::set_override))
        .route("/api/market", put(routes::set_market))
        .route("/api/positions", post(routes::add_position))
        .route("/api/positions/{index}", delete(routes::remove_position))
        .route("/api/analyze", post(routes::analyze))
        .route("/api/simulate", post(routes::simulate))
        .route("/api/greeks/{name}", get(routes::get_greek))
        .route("/api/counters", get(routes::get_counters))
        .route("/ws", get(ws::ws_handler))
        .fallback_service(
            tower_http::services::ServeDir::new("dashboard/dist")
                .fallback(tower_http::services::ServeFile::new("dashboard/dist/index.html")),
        )
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::{spawn_engine, wait_for};
    use crate::pricing::mock::{summary, MockPricing};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn call(app: &Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(v) => Body::from(v.to_string()),
                None => Body::empty(),
            })
            .expect("request");
        let resp = app.clone().oneshot(req).await.expect("response");
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.expect("body");
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_position_lifecycle_over_http() {
        let mock = MockPricing::new();
        mock.summaries.lock().expect("lock").push(Ok(summary(5.0)));
        let (state, _service) = spawn_engine(mock);
        let mut rx = state.snapshot_rx.clone();
        let app = router(state.clone());

        let (status, _) = call(&app, "POST", "/api/tickers/refresh", None).await;
        assert_eq!(status, StatusCode::OK);
        wait_for(&mut rx, |s| s.catalog.count == 2).await;

        let (status, body) = call(&app, "GET", "/api/tickers?search=app", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tickers"][0]["ticker"], "AAPL");

        let (status, body) = call(&app, "POST", "/api/analyze", None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().is_some_and(|e| e.contains("empty")));

        let first = serde_json::json!({"ticker": "AAPL", "type": "call", "side": "long",
                                       "quantity": 2, "strike": 105.0, "time_to_expiry": 0.5});
        let second = serde_json::json!({"ticker": "AAPL", "type": "put", "side": "short",
                                        "quantity": 1, "strike": 95.0, "time_to_expiry": 0.25,
                                        "volatility": 0.3});
        let (status, _) = call(&app, "POST", "/api/positions", Some(first)).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = call(&app, "POST", "/api/positions", Some(second)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["positions"].as_array().map(Vec::len), Some(2));

        let (status, _) = call(&app, "DELETE", "/api/positions/5", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(&app, "DELETE", "/api/positions/0", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["positions"][0]["type"], "put");
        assert_eq!(body["positions"][0]["strike"], 95.0);
        assert_eq!(body["positions"][0]["signed_quantity"], -1);

        let (status, _) = call(&app, "POST", "/api/analyze", None).await;
        assert_eq!(status, StatusCode::OK);
        let snap = wait_for(&mut rx, |s| s.analysis.summary.is_some()).await;
        assert_eq!(snap.analysis.explanations.len(), 5);
    }

    #[tokio::test]
    async fn test_override_validation() {
        let (state, _service) = spawn_engine(MockPricing::new());
        let app = router(state);

        let (status, _) = call(&app, "PUT", "/api/overrides/AAPL", Some(serde_json::json!({"price": -3.0}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, body) = call(&app, "PUT", "/api/overrides/AAPL", Some(serde_json::json!({"price": 150.0}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["overrides"]["AAPL"], 150.0);
    }

    #[tokio::test]
    async fn test_greek_endpoint() {
        let (state, _service) = spawn_engine(MockPricing::new());
        let app = router(state);

        let (status, body) = call(&app, "GET", "/api/greeks/theta?value=-365", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["direction"], "negative");
        assert_eq!(body["magnitude"], 1.0);

        let (status, _) = call(&app, "GET", "/api/greeks/omega?value=1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
