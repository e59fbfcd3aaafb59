pub mod client;
pub mod types;

use crate::catalog::Ticker;
use crate::errors::EngineResult;
use std::future::Future;
use types::{AnalysisRequest, SimulationRequest, SimulationResult, Summary};

/// The remote valuation/simulation collaborator.
/// Implementations are fallible black boxes: no retries, no backoff.
/// Send + Sync + 'static required so calls can run on spawned tokio tasks.
pub trait PricingService: Send + Sync + 'static {
    fn analyze(&self, request: AnalysisRequest) -> impl Future<Output = EngineResult<Summary>> + Send;

    fn simulate(
        &self,
        request: SimulationRequest,
    ) -> impl Future<Output = EngineResult<SimulationResult>> + Send;

    fn fetch_tickers(&self) -> impl Future<Output = EngineResult<Vec<Ticker>>> + Send;
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use crate::errors::EngineError;
    use portable_atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Semaphore;

    /// Scripted service. Responses are popped per call; an empty script
    /// answers with a network error. `gate` holds calls until permits are
    /// added so tests can observe the requesting phase.
    pub struct MockPricing {
        pub summaries: Mutex<Vec<EngineResult<Summary>>>,
        pub simulations: Mutex<Vec<EngineResult<SimulationResult>>>,
        pub tickers: Mutex<Vec<EngineResult<Vec<Ticker>>>>,
        pub calls: AtomicU64,
        pub last_analysis: Mutex<Option<AnalysisRequest>>,
        pub last_simulation: Mutex<Option<SimulationRequest>>,
        pub gate: Option<Semaphore>,
    }

    impl MockPricing {
        pub fn new() -> Self {
            Self {
                summaries: Mutex::new(Vec::new()),
                simulations: Mutex::new(Vec::new()),
                tickers: Mutex::new(Vec::new()),
                calls: AtomicU64::new(0),
                last_analysis: Mutex::new(None),
                last_simulation: Mutex::new(None),
                gate: None,
            }
        }

        pub fn gated() -> Self {
            Self {
                gate: Some(Semaphore::new(0)),
                ..Self::new()
            }
        }

        pub fn release(&self, n: usize) {
            if let Some(g) = &self.gate {
                g.add_permits(n);
            }
        }

        pub fn calls(&self) -> u64 {
            self.calls.load(Ordering::Relaxed)
        }

        async fn wait(&self) {
            if let Some(g) = &self.gate {
                if let Ok(permit) = g.acquire().await {
                    permit.forget();
                }
            }
        }

        fn pop<T>(script: &Mutex<Vec<EngineResult<T>>>) -> EngineResult<T> {
            let mut s = script.lock().expect("mock lock");
            if s.is_empty() {
                Err(EngineError::Network("no scripted response".into()))
            } else {
                s.remove(0)
            }
        }
    }

    impl PricingService for MockPricing {
        async fn analyze(&self, request: AnalysisRequest) -> EngineResult<Summary> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            *self.last_analysis.lock().expect("mock lock") = Some(request);
            self.wait().await;
            Self::pop(&self.summaries)
        }

        async fn simulate(&self, request: SimulationRequest) -> EngineResult<SimulationResult> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            *self.last_simulation.lock().expect("mock lock") = Some(request);
            self.wait().await;
            Self::pop(&self.simulations)
        }

        async fn fetch_tickers(&self) -> EngineResult<Vec<Ticker>> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Self::pop(&self.tickers)
        }
    }

    pub fn summary(total_value: f64) -> Summary {
        Summary {
            total_value,
            total_delta: 0.55,
            total_gamma: 0.02,
            total_theta: -365.0,
            total_vega: 20.0,
            total_rho: -4.0,
            positions: Vec::new(),
        }
    }

    pub fn simulation(values: Vec<f64>) -> SimulationResult {
        SimulationResult {
            mean: 0.0,
            std: 1.0,
            var_5: -1.6,
            var_1: -2.3,
            portfolio_values: values,
        }
    }
}
