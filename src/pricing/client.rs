use super::types::*;
use super::PricingService;
use crate::catalog::Ticker;
use crate::errors::{EngineError, EngineResult};
use reqwest::Client;

/// REST client for the pricing service. All methods return Result, never panic.
#[derive(Clone)]
pub struct PricingClient {
    client: Client,
    base_url: String,
}

impl PricingClient {
    /// No request timeout unless one is configured; a hung call leaves the
    /// cycle in `requesting` until the user retries.
    pub fn new(base_url: &str, timeout_secs: Option<u64>) -> EngineResult<Self> {
        let mut builder = Client::builder().pool_max_idle_per_host(4);
        if let Some(secs) = timeout_secs {
            builder = builder.timeout(std::time::Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| EngineError::Config(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        resp: reqwest::Response,
        what: &str,
    ) -> EngineResult<T> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EngineError::Service {
                status: status.as_u16(),
                body,
            });
        }

        resp.json::<T>().await.map_err(|e| EngineError::Parse(format!("{what}: {e}")))
    }

    async fn post<B: serde::Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> EngineResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.client.post(&url).json(body).send().await?;
        Self::read_json(resp, &format!("POST {path}")).await
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> EngineResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.client.get(&url).send().await?;
        Self::read_json(resp, &format!("GET {path}")).await
    }
}

impl PricingService for PricingClient {
    async fn analyze(&self, request: AnalysisRequest) -> EngineResult<Summary> {
        tracing::debug!(
            ticker = %request.ticker,
            positions = request.positions.len(),
            "POST /portfolio/analyze"
        );
        self.post("/portfolio/analyze", &request).await
    }

    async fn simulate(&self, request: SimulationRequest) -> EngineResult<SimulationResult> {
        tracing::debug!(
            ticker = %request.ticker,
            positions = request.positions.len(),
            n_simulations = request.n_simulations,
            "POST /portfolio/simulate"
        );
        self.post("/portfolio/simulate", &request).await
    }

    async fn fetch_tickers(&self) -> EngineResult<Vec<Ticker>> {
        self.get("/tickers").await
    }
}
