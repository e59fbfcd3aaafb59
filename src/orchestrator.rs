use crate::errors::{EngineError, EngineResult, ValidationError};
use crate::portfolio::{is_positive, Position};
use crate::pricing::types::{AnalysisRequest, SimulationRequest, SimulationResult, Summary};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

// ── Request cycle state machine ──
//
//   idle ──prepare──▶ requesting ──complete(Ok)──▶ idle + result
//                          │
//                          └──complete(Err)──▶ idle + error (result kept)
//
// `prepare` while requesting is rejected, so at most one call per kind is
// ever in flight.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestPhase {
    Idle,
    Requesting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleStatus {
    Idle,
    Requesting,
    Ready,
    Failed,
}

/// Outcome of feeding a service response back into a cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Stored,
    Failed(EngineError),
    /// No matching request in flight; the response was dropped.
    Ignored,
}

#[derive(Debug, Clone)]
pub struct RequestCycle<T> {
    kind: &'static str,
    phase: RequestPhase,
    in_flight: Option<Uuid>,
    result: Option<T>,
    error: Option<String>,
    completed_at: Option<DateTime<Utc>>,
}

impl<T> RequestCycle<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            phase: RequestPhase::Idle,
            in_flight: None,
            result: None,
            error: None,
            completed_at: None,
        }
    }

    pub(crate) fn ensure_idle(&self) -> EngineResult<()> {
        match self.phase {
            RequestPhase::Idle => Ok(()),
            RequestPhase::Requesting => Err(EngineError::RequestPending(self.kind)),
        }
    }

    pub(crate) fn start(&mut self) -> Uuid {
        let id = Uuid::new_v4();
        self.phase = RequestPhase::Requesting;
        self.in_flight = Some(id);
        id
    }

    pub(crate) fn finish(&mut self, id: Uuid, outcome: EngineResult<T>) -> Completion {
        if self.in_flight != Some(id) {
            tracing::warn!(kind = self.kind, request_id = %id, "stale response ignored");
            return Completion::Ignored;
        }
        self.phase = RequestPhase::Idle;
        self.in_flight = None;
        self.completed_at = Some(Utc::now());

        match outcome {
            Ok(value) => {
                self.result = Some(value);
                self.error = None;
                Completion::Stored
            }
            Err(e) => {
                self.error = Some(e.to_string());
                Completion::Failed(e)
            }
        }
    }

    #[inline]
    pub fn result(&self) -> Option<&T> {
        self.result.as_ref()
    }

    #[inline]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    #[inline]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn status(&self) -> CycleStatus {
        match (self.phase, &self.error, &self.result) {
            (RequestPhase::Requesting, _, _) => CycleStatus::Requesting,
            (RequestPhase::Idle, Some(_), _) => CycleStatus::Failed,
            (RequestPhase::Idle, None, Some(_)) => CycleStatus::Ready,
            (RequestPhase::Idle, None, None) => CycleStatus::Idle,
        }
    }
}

// ── Inputs ──

/// Everything the valuation call needs, gathered from the session.
/// `current_price` is `None` when neither an override nor a catalog price exists.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisInputs<'a> {
    pub positions: &'a [Position],
    pub ticker: &'a str,
    pub current_price: Option<f64>,
    pub risk_free_rate: f64,
}

impl AnalysisInputs<'_> {
    /// Local pre-check. Runs before any request is issued.
    fn validate(&self) -> Result<(String, f64), ValidationError> {
        if self.positions.is_empty() {
            return Err(ValidationError::EmptyPortfolio);
        }
        let ticker = self.ticker.trim();
        if ticker.is_empty() {
            return Err(ValidationError::UnresolvedTicker);
        }
        let price = self
            .current_price
            .ok_or_else(|| ValidationError::MissingPrice(ticker.to_string()))?;
        if !is_positive(price) {
            return Err(ValidationError::InvalidField("current_price"));
        }
        if !self.risk_free_rate.is_finite() {
            return Err(ValidationError::InvalidField("risk_free_rate"));
        }
        Ok((ticker.to_string(), price))
    }

    fn to_request(self) -> Result<AnalysisRequest, ValidationError> {
        let (ticker, current_price) = self.validate()?;
        Ok(AnalysisRequest {
            positions: self.positions.to_vec(),
            current_price,
            risk_free_rate: self.risk_free_rate,
            ticker,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SimulationInputs<'a> {
    pub base: AnalysisInputs<'a>,
    pub volatility: Option<f64>,
}

impl SimulationInputs<'_> {
    fn to_request(self, settings: &SimulationSettings) -> Result<SimulationRequest, ValidationError> {
        let (ticker, current_price) = self.base.validate()?;
        let volatility = self
            .volatility
            .ok_or_else(|| ValidationError::MissingVolatility(ticker.clone()))?;
        if !is_positive(volatility) {
            return Err(ValidationError::InvalidField("volatility"));
        }
        Ok(SimulationRequest {
            positions: self.base.positions.to_vec(),
            current_price,
            risk_free_rate: self.base.risk_free_rate,
            volatility,
            horizon: settings.horizon,
            n_simulations: settings.n_simulations,
            ticker,
        })
    }
}

// ── Analysis ──

#[derive(Debug, Clone)]
pub struct AnalysisOrchestrator {
    cycle: RequestCycle<Summary>,
    /// Positions sent with the in-flight request.
    pending: Option<Vec<Position>>,
    /// Positions the stored summary was computed for. The summary's
    /// per-position breakdown lines up with this list, not the live portfolio.
    analyzed: Vec<Position>,
}

impl Default for AnalysisOrchestrator {
    fn default() -> Self {
        Self {
            cycle: RequestCycle::new("analysis"),
            pending: None,
            analyzed: Vec::new(),
        }
    }
}

impl AnalysisOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and enter `requesting`. Nothing changes on error.
    pub fn prepare(&mut self, inputs: AnalysisInputs<'_>) -> EngineResult<(Uuid, AnalysisRequest)> {
        self.cycle.ensure_idle()?;
        let request = inputs.to_request()?;
        let id = self.cycle.start();
        self.pending = Some(request.positions.clone());
        tracing::info!(
            request_id = %id,
            ticker = %request.ticker,
            positions = request.positions.len(),
            current_price = request.current_price,
            "analysis requested"
        );
        Ok((id, request))
    }

    pub fn complete(&mut self, id: Uuid, outcome: EngineResult<Summary>) -> Completion {
        let completion = self.cycle.finish(id, outcome);
        match &completion {
            Completion::Stored => {
                self.analyzed = self.pending.take().unwrap_or_default();
                tracing::info!(request_id = %id, "analysis stored");
            }
            Completion::Failed(e) => {
                self.pending = None;
                tracing::warn!(request_id = %id, error = %e, "analysis failed");
            }
            Completion::Ignored => {}
        }
        completion
    }

    #[inline]
    pub fn analyzed_positions(&self) -> &[Position] {
        &self.analyzed
    }

    #[inline]
    pub fn cycle(&self) -> &RequestCycle<Summary> {
        &self.cycle
    }
}

// ── Simulation ──

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationSettings {
    /// Years.
    pub horizon: f64,
    pub n_simulations: u32,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            horizon: 0.5,
            n_simulations: 10_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulationOrchestrator {
    cycle: RequestCycle<SimulationResult>,
    settings: SimulationSettings,
}

impl SimulationOrchestrator {
    pub fn new(settings: SimulationSettings) -> Self {
        Self {
            cycle: RequestCycle::new("simulation"),
            settings,
        }
    }

    pub fn prepare(&mut self, inputs: SimulationInputs<'_>) -> EngineResult<(Uuid, SimulationRequest)> {
        self.cycle.ensure_idle()?;
        let request = inputs.to_request(&self.settings)?;
        let id = self.cycle.start();
        tracing::info!(
            request_id = %id,
            ticker = %request.ticker,
            volatility = request.volatility,
            horizon = request.horizon,
            n_simulations = request.n_simulations,
            "simulation requested"
        );
        Ok((id, request))
    }

    pub fn complete(&mut self, id: Uuid, outcome: EngineResult<SimulationResult>) -> Completion {
        let completion = self.cycle.finish(id, outcome);
        match &completion {
            Completion::Stored => tracing::info!(request_id = %id, "simulation stored"),
            Completion::Failed(e) => tracing::warn!(request_id = %id, error = %e, "simulation failed"),
            Completion::Ignored => {}
        }
        completion
    }

    #[inline]
    pub fn cycle(&self) -> &RequestCycle<SimulationResult> {
        &self.cycle
    }

    #[inline]
    pub fn settings(&self) -> SimulationSettings {
        self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portfolio::{position, OptionType, Side};
    use crate::pricing::mock::{simulation, summary, MockPricing};
    use crate::pricing::PricingService;

    async fn run_analysis<S: PricingService>(
        orch: &mut AnalysisOrchestrator,
        service: &S,
        inputs: AnalysisInputs<'_>,
    ) -> EngineResult<()> {
        let (id, request) = orch.prepare(inputs)?;
        let outcome = service.analyze(request).await;
        match orch.complete(id, outcome) {
            Completion::Failed(e) => Err(e),
            Completion::Stored | Completion::Ignored => Ok(()),
        }
    }

    async fn run_simulation<S: PricingService>(
        orch: &mut SimulationOrchestrator,
        service: &S,
        inputs: SimulationInputs<'_>,
    ) -> EngineResult<()> {
        let (id, request) = orch.prepare(inputs)?;
        let outcome = service.simulate(request).await;
        match orch.complete(id, outcome) {
            Completion::Failed(e) => Err(e),
            Completion::Stored | Completion::Ignored => Ok(()),
        }
    }

    fn book() -> Vec<Position> {
        vec![
            position("AAPL", OptionType::Call, Side::Long, 2, 105.0),
            position("AAPL", OptionType::Put, Side::Short, 1, 95.0),
        ]
    }

    fn inputs(positions: &[Position]) -> AnalysisInputs<'_> {
        AnalysisInputs {
            positions,
            ticker: "AAPL",
            current_price: Some(100.0),
            risk_free_rate: -0.01,
        }
    }

    #[tokio::test]
    async fn test_validation_blocks_request() {
        let svc = MockPricing::new();
        let mut orch = AnalysisOrchestrator::new();

        let err = run_analysis(&mut orch, &svc, inputs(&[])).await.expect_err("empty");
        assert_eq!(err, EngineError::Validation(ValidationError::EmptyPortfolio));

        let positions = book();
        let unresolved = AnalysisInputs { ticker: "", ..inputs(&positions) };
        let err = run_analysis(&mut orch, &svc, unresolved).await.expect_err("no ticker");
        assert_eq!(err, EngineError::Validation(ValidationError::UnresolvedTicker));

        let no_price = AnalysisInputs { current_price: None, ..inputs(&positions) };
        let err = run_analysis(&mut orch, &svc, no_price).await.expect_err("no price");
        assert_eq!(err, EngineError::Validation(ValidationError::MissingPrice("AAPL".into())));

        assert_eq!(svc.calls(), 0);
        assert_eq!(orch.cycle().status(), CycleStatus::Idle);
    }

    #[tokio::test]
    async fn test_success_then_failure_keeps_summary() {
        let svc = MockPricing::new();
        svc.summaries.lock().expect("lock").push(Ok(summary(12.5)));
        svc.summaries
            .lock()
            .expect("lock")
            .push(Err(EngineError::Service { status: 500, body: "boom".into() }));

        let positions = book();
        let mut orch = AnalysisOrchestrator::new();
        run_analysis(&mut orch, &svc, inputs(&positions)).await.expect("first ok");
        assert_eq!(orch.cycle().status(), CycleStatus::Ready);
        assert_eq!(orch.cycle().result().map(|s| s.total_value), Some(12.5));

        let err = run_analysis(&mut orch, &svc, inputs(&positions)).await.expect_err("second fails");
        assert!(err.is_transport());
        assert_eq!(orch.cycle().status(), CycleStatus::Failed);
        assert_eq!(orch.cycle().result().map(|s| s.total_value), Some(12.5));
        assert!(orch.cycle().error().is_some_and(|e| e.contains("boom")));

        let sent = svc.last_analysis.lock().expect("lock").clone().expect("request sent");
        assert_eq!(sent.positions, positions);
        assert_eq!(sent.risk_free_rate, -0.01);
    }

    #[test]
    fn test_second_prepare_rejected_while_requesting() {
        let positions = book();
        let mut orch = AnalysisOrchestrator::new();
        let (id, _) = orch.prepare(inputs(&positions)).expect("first");
        assert_eq!(orch.cycle.phase, RequestPhase::Requesting);

        let err = orch.prepare(inputs(&positions)).expect_err("pending");
        assert_eq!(err, EngineError::RequestPending("analysis"));
        assert_eq!(orch.cycle.in_flight, Some(id));

        assert_eq!(orch.complete(id, Ok(summary(1.0))), Completion::Stored);
        assert!(orch.prepare(inputs(&positions)).is_ok());
    }

    #[test]
    fn test_stale_completion_ignored() {
        let positions = book();
        let mut orch = AnalysisOrchestrator::new();
        let (id, _) = orch.prepare(inputs(&positions)).expect("first");
        assert_eq!(orch.complete(Uuid::new_v4(), Ok(summary(9.0))), Completion::Ignored);
        assert_eq!(orch.cycle.phase, RequestPhase::Requesting);
        assert!(orch.cycle().result().is_none());
        assert_eq!(orch.complete(id, Ok(summary(3.0))), Completion::Stored);
        assert_eq!(orch.cycle().result().map(|s| s.total_value), Some(3.0));
    }

    #[test]
    fn test_analyzed_positions_follow_stored_summary() {
        let first = book();
        let mut orch = AnalysisOrchestrator::new();
        let (id, _) = orch.prepare(inputs(&first)).expect("first");
        assert!(orch.analyzed_positions().is_empty());
        orch.complete(id, Ok(summary(1.0)));
        assert_eq!(orch.analyzed_positions(), first.as_slice());

        // a failed re-analysis leaves the previous pairing intact
        let second = vec![position("MSFT", OptionType::Put, Side::Long, 1, 400.0)];
        let (id, _) = orch.prepare(inputs(&second)).expect("second");
        orch.complete(id, Err(EngineError::Network("down".into())));
        assert_eq!(orch.analyzed_positions(), first.as_slice());

        let (id, _) = orch.prepare(inputs(&second)).expect("third");
        orch.complete(id, Ok(summary(2.0)));
        assert_eq!(orch.analyzed_positions(), second.as_slice());
    }

    #[tokio::test]
    async fn test_simulation_uses_settings() {
        let svc = MockPricing::new();
        svc.simulations.lock().expect("lock").push(Ok(simulation(vec![1.0, 2.0])));

        let positions = book();
        let mut orch = SimulationOrchestrator::new(SimulationSettings::default());
        let sim_inputs = SimulationInputs {
            base: inputs(&positions),
            volatility: Some(0.3),
        };
        run_simulation(&mut orch, &svc, sim_inputs).await.expect("ok");

        let sent = svc.last_simulation.lock().expect("lock").clone().expect("request sent");
        assert_eq!(sent.horizon, 0.5);
        assert_eq!(sent.n_simulations, 10_000);
        assert_eq!(sent.volatility, 0.3);
        assert_eq!(orch.cycle().result().map(|r| r.portfolio_values.len()), Some(2));
    }

    #[tokio::test]
    async fn test_simulation_missing_volatility() {
        let svc = MockPricing::new();
        let positions = book();
        let mut orch = SimulationOrchestrator::new(SimulationSettings { horizon: 1.0, n_simulations: 500 });
        let err = run_simulation(&mut orch, &svc, SimulationInputs { base: inputs(&positions), volatility: None })
            .await
            .expect_err("no vol");
        assert_eq!(err, EngineError::Validation(ValidationError::MissingVolatility("AAPL".into())));
        assert_eq!(svc.calls(), 0);
    }

    #[tokio::test]
    async fn test_simulation_failure_keeps_previous_result() {
        let svc = MockPricing::new();
        svc.simulations.lock().expect("lock").push(Ok(simulation(vec![4.0])));
        // second call has no scripted response: network error

        let positions = book();
        let mut orch = SimulationOrchestrator::new(SimulationSettings::default());
        let si = SimulationInputs { base: inputs(&positions), volatility: Some(0.25) };
        run_simulation(&mut orch, &svc, si).await.expect("ok");
        assert!(run_simulation(&mut orch, &svc, si).await.is_err());
        assert_eq!(orch.cycle().result().map(|r| r.portfolio_values.clone()), Some(vec![4.0]));
        assert_eq!(orch.cycle().status(), CycleStatus::Failed);
    }
}
