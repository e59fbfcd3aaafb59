use crate::analytics::greeks::{explain_summary, GreekExplanation};
use crate::analytics::histogram::{histogram, Histogram};
use crate::catalog::{Ticker, TickerCatalog};
use crate::config::AppConfig;
use crate::errors::{EngineError, EngineResult, ValidationError};
use crate::orchestrator::{
    AnalysisInputs, AnalysisOrchestrator, Completion, CycleStatus, RequestCycle, SimulationInputs,
    SimulationOrchestrator, SimulationSettings,
};
use crate::portfolio::{is_positive, OptionType, Position, PortfolioBuilder, PriceOverrideStore, Side};
use crate::pricing::types::{AnalysisRequest, PositionBreakdown, SimulationRequest, SimulationResult, Summary};
use portable_atomic::{AtomicU64, Ordering};
use smallvec::SmallVec;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use uuid::Uuid;

// ── Messages INTO the engine (bounded channel) ──

/// A position as entered in the dashboard form. Ticker and volatility are
/// optional and default from the effective ticker and its catalog entry.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct PositionDraft {
    #[serde(default)]
    pub ticker: Option<String>,
    #[serde(rename = "type")]
    pub option_type: OptionType,
    pub side: Side,
    pub quantity: i64,
    pub strike: f64,
    pub time_to_expiry: f64,
    #[serde(default)]
    pub volatility: Option<f64>,
}

#[derive(Debug, Clone)]
pub enum Action {
    RefreshCatalog,
    CatalogLoaded { id: Uuid, outcome: EngineResult<Vec<Ticker>> },
    SelectTicker(String),
    SetPriceOverride { symbol: String, price: f64 },
    SetMarket { risk_free_rate: Option<f64>, volatility: Option<f64> },
    AddPosition(PositionDraft),
    RemovePosition(usize),
    RequestAnalysis,
    AnalysisFinished { id: Uuid, outcome: EngineResult<Summary> },
    RequestSimulation,
    SimulationFinished { id: Uuid, outcome: EngineResult<SimulationResult> },
}

impl Action {
    pub fn label(&self) -> &'static str {
        match self {
            Self::RefreshCatalog => "refresh_catalog",
            Self::CatalogLoaded { .. } => "catalog_loaded",
            Self::SelectTicker(_) => "select_ticker",
            Self::SetPriceOverride { .. } => "set_price_override",
            Self::SetMarket { .. } => "set_market",
            Self::AddPosition(_) => "add_position",
            Self::RemovePosition(_) => "remove_position",
            Self::RequestAnalysis => "request_analysis",
            Self::AnalysisFinished { .. } => "analysis_finished",
            Self::RequestSimulation => "request_simulation",
            Self::SimulationFinished { .. } => "simulation_finished",
        }
    }
}

/// An action plus an optional reply slot for callers that want the
/// validation outcome inline.
#[derive(Debug)]
pub struct Command {
    pub action: Action,
    pub reply: Option<oneshot::Sender<EngineResult<()>>>,
}

/// Remote work requested by a committed transition. Executed by the engine.
#[derive(Debug, Clone)]
pub enum Effect {
    FetchCatalog { id: Uuid },
    Analyze { id: Uuid, request: AnalysisRequest },
    Simulate { id: Uuid, request: SimulationRequest },
}

pub type Effects = SmallVec<[Effect; 2]>;

// ── Session state (owned by the engine task only) ──

#[derive(Debug, Clone)]
pub struct Session {
    pub catalog: Arc<TickerCatalog>,
    pub catalog_cycle: RequestCycle<()>,
    pub selected_ticker: String,
    pub overrides: PriceOverrideStore,
    pub portfolio: PortfolioBuilder,
    pub risk_free_rate: f64,
    /// Set from the catalog on selection, editable afterwards.
    pub volatility: Option<f64>,
    pub analysis: AnalysisOrchestrator,
    pub simulation: SimulationOrchestrator,
    pub histogram_bins: usize,
    /// Last user-facing failure from an asynchronous completion.
    pub notice: Option<String>,
    pub revision: u64,
}

impl Session {
    pub fn new(risk_free_rate: f64, settings: SimulationSettings, histogram_bins: usize) -> Self {
        Self {
            catalog: Arc::new(TickerCatalog::default()),
            catalog_cycle: RequestCycle::new("catalog"),
            selected_ticker: String::new(),
            overrides: PriceOverrideStore::new(),
            portfolio: PortfolioBuilder::new(),
            risk_free_rate,
            volatility: None,
            analysis: AnalysisOrchestrator::new(),
            simulation: SimulationOrchestrator::new(settings),
            histogram_bins,
            notice: None,
            revision: 0,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.default_risk_free_rate, config.simulation, config.histogram_bins)
    }

    #[inline]
    pub fn effective_ticker(&self) -> &str {
        self.portfolio.effective_ticker(&self.selected_ticker)
    }

    /// Override first, then the catalog's latest price.
    pub fn current_price(&self) -> Option<f64> {
        let ticker = self.effective_ticker();
        if ticker.is_empty() {
            return None;
        }
        match self.catalog.lookup(ticker) {
            Some(t) => Some(self.overrides.resolve_price(ticker, t.latest_price)),
            None => self.overrides.get(ticker),
        }
    }

    pub fn current_volatility(&self) -> Option<f64> {
        self.volatility
            .or_else(|| self.catalog.lookup(self.effective_ticker()).map(|t| t.volatility))
    }

    fn resolve_draft(&self, draft: PositionDraft) -> Position {
        let ticker = match draft.ticker.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => self.effective_ticker().to_string(),
        };
        let volatility = draft
            .volatility
            .or_else(|| self.catalog.lookup(&ticker).map(|t| t.volatility))
            .or(self.volatility)
            .unwrap_or(0.0);
        Position {
            ticker,
            option_type: draft.option_type,
            side: draft.side,
            quantity: draft.quantity,
            strike: draft.strike,
            time_to_expiry: draft.time_to_expiry,
            volatility,
        }
    }

    fn breakdown(&self, summary: &Summary) -> Vec<BreakdownRow> {
        let positions = self.analysis.analyzed_positions();
        if summary.positions.len() != positions.len() {
            return Vec::new();
        }
        positions
            .iter()
            .zip(summary.positions.iter())
            .enumerate()
            .map(|(index, (p, g))| BreakdownRow {
                index,
                ticker: p.ticker.clone(),
                option_type: p.option_type,
                side: p.side,
                signed_quantity: p.signed_quantity(),
                greeks: g.clone(),
            })
            .collect()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let analysis = self.analysis.cycle();
        let simulation = self.simulation.cycle();
        let settings = self.simulation.settings();
        let sim = simulation.result();

        SessionSnapshot {
            revision: self.revision,
            selected_ticker: self.selected_ticker.clone(),
            effective_ticker: self.effective_ticker().to_string(),
            current_price: self.current_price(),
            risk_free_rate: self.risk_free_rate,
            volatility: self.current_volatility(),
            positions: self
                .portfolio
                .positions()
                .iter()
                .map(|p| PositionView {
                    signed_quantity: p.signed_quantity(),
                    position: p.clone(),
                })
                .collect(),
            overrides: self.overrides.clone(),
            catalog: CatalogView {
                status: self.catalog_cycle.status(),
                count: self.catalog.len(),
                error: self.catalog_cycle.error().map(str::to_string),
            },
            analysis: AnalysisView {
                status: analysis.status(),
                summary: analysis.result().cloned(),
                breakdown: analysis.result().map(|s| self.breakdown(s)).unwrap_or_default(),
                explanations: analysis.result().map(explain_summary).unwrap_or_default(),
                error: analysis.error().map(str::to_string),
                completed_at: analysis.completed_at().map(|t| t.to_rfc3339()),
            },
            simulation: SimulationView {
                status: simulation.status(),
                horizon: settings.horizon,
                n_simulations: settings.n_simulations,
                stats: sim.map(|r| SimulationStats {
                    mean: r.mean,
                    std: r.std,
                    var_5: r.var_5,
                    var_1: r.var_1,
                    sample_count: r.portfolio_values.len(),
                }),
                histogram: sim
                    .map(|r| histogram(&r.portfolio_values, self.histogram_bins))
                    .unwrap_or_default(),
                error: simulation.error().map(str::to_string),
                completed_at: simulation.completed_at().map(|t| t.to_rfc3339()),
            },
            notice: self.notice.clone(),
        }
    }
}

// ── Reducer ──

/// Apply one action to the session. On `Err` the session is unchanged; on
/// `Ok` the transition is committed (revision bumped) and the returned
/// effects must be executed by the caller.
pub fn reduce(session: &mut Session, action: Action) -> EngineResult<Effects> {
    let mut effects = Effects::new();

    match action {
        Action::RefreshCatalog => {
            session.catalog_cycle.ensure_idle()?;
            let id = session.catalog_cycle.start();
            effects.push(Effect::FetchCatalog { id });
        }

        Action::CatalogLoaded { id, outcome } => {
            let (records, outcome) = match outcome {
                Ok(records) => (Some(records), Ok(())),
                Err(e) => (None, Err(e)),
            };
            match session.catalog_cycle.finish(id, outcome) {
                Completion::Stored => {
                    let catalog = TickerCatalog::from_records(records.unwrap_or_default());
                    if catalog.is_empty() {
                        tracing::warn!("ticker catalog loaded with no entries");
                    } else {
                        tracing::info!(tickers = catalog.len(), "ticker catalog loaded");
                    }
                    session.catalog = Arc::new(catalog);
                }
                Completion::Failed(e) => {
                    tracing::warn!(error = %e, "ticker catalog load failed, keeping previous");
                    session.notice = Some(format!("ticker catalog unavailable: {e}"));
                }
                Completion::Ignored => return Ok(effects),
            }
        }

        Action::SelectTicker(symbol) => {
            let symbol = symbol.trim();
            if symbol.is_empty() {
                session.selected_ticker.clear();
                session.volatility = None;
            } else {
                let ticker = session
                    .catalog
                    .lookup(symbol)
                    .ok_or_else(|| ValidationError::UnknownTicker(symbol.to_string()))?;
                session.volatility = Some(ticker.volatility);
                session.selected_ticker = symbol.to_string();
            }
        }

        Action::SetPriceOverride { symbol, price } => {
            session.overrides.set(symbol.trim(), price);
        }

        Action::SetMarket { risk_free_rate, volatility } => {
            if risk_free_rate.is_some_and(|r| !r.is_finite()) {
                return Err(ValidationError::InvalidField("risk_free_rate").into());
            }
            if volatility.is_some_and(|v| !is_positive(v)) {
                return Err(ValidationError::InvalidField("volatility").into());
            }
            if let Some(r) = risk_free_rate {
                session.risk_free_rate = r;
            }
            if volatility.is_some() {
                session.volatility = volatility;
            }
        }

        Action::AddPosition(draft) => {
            let position = session.resolve_draft(draft);
            session.portfolio.add(position)?;
        }

        Action::RemovePosition(index) => {
            session.portfolio.remove(index)?;
        }

        Action::RequestAnalysis => {
            let inputs = AnalysisInputs {
                current_price: session.current_price(),
                ..analysis_inputs(&session.portfolio, &session.selected_ticker, session.risk_free_rate)
            };
            let (id, request) = session.analysis.prepare(inputs)?;
            session.notice = None;
            effects.push(Effect::Analyze { id, request });
        }

        Action::AnalysisFinished { id, outcome } => match session.analysis.complete(id, outcome) {
            Completion::Stored => {}
            Completion::Failed(e) => session.notice = Some(format!("analysis failed: {e}")),
            Completion::Ignored => return Ok(effects),
        },

        Action::RequestSimulation => {
            let inputs = SimulationInputs {
                base: AnalysisInputs {
                    current_price: session.current_price(),
                    ..analysis_inputs(&session.portfolio, &session.selected_ticker, session.risk_free_rate)
                },
                volatility: session.current_volatility(),
            };
            let (id, request) = session.simulation.prepare(inputs)?;
            session.notice = None;
            effects.push(Effect::Simulate { id, request });
        }

        Action::SimulationFinished { id, outcome } => match session.simulation.complete(id, outcome) {
            Completion::Stored => {}
            Completion::Failed(e) => session.notice = Some(format!("simulation failed: {e}")),
            Completion::Ignored => return Ok(effects),
        },
    }

    session.revision += 1;
    Ok(effects)
}

/// Inputs borrowed from the portfolio fields only, so the orchestrators can
/// be borrowed mutably alongside. The price is filled in by the caller.
fn analysis_inputs<'a>(
    portfolio: &'a PortfolioBuilder,
    selected: &'a str,
    risk_free_rate: f64,
) -> AnalysisInputs<'a> {
    AnalysisInputs {
        positions: portfolio.positions(),
        ticker: portfolio.effective_ticker(selected),
        current_price: None,
        risk_free_rate,
    }
}

// ── Snapshot for the dashboard (sent via watch channel) ──

#[derive(Debug, Clone, serde::Serialize)]
pub struct PositionView {
    #[serde(flatten)]
    pub position: Position,
    pub signed_quantity: i64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CatalogView {
    pub status: CycleStatus,
    pub count: usize,
    pub error: Option<String>,
}

/// One summary breakdown entry next to the position it was computed for.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BreakdownRow {
    pub index: usize,
    pub ticker: String,
    #[serde(rename = "type")]
    pub option_type: OptionType,
    pub side: Side,
    pub signed_quantity: i64,
    #[serde(flatten)]
    pub greeks: PositionBreakdown,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AnalysisView {
    pub status: CycleStatus,
    pub summary: Option<Summary>,
    /// Rows pair the summary with the positions it was requested for.
    /// Empty when the service returned a different number of entries.
    pub breakdown: Vec<BreakdownRow>,
    pub explanations: Vec<GreekExplanation>,
    pub error: Option<String>,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SimulationStats {
    pub mean: f64,
    pub std: f64,
    #[serde(rename = "VaR_5")]
    pub var_5: f64,
    #[serde(rename = "VaR_1")]
    pub var_1: f64,
    pub sample_count: usize,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SimulationView {
    pub status: CycleStatus,
    pub horizon: f64,
    pub n_simulations: u32,
    pub stats: Option<SimulationStats>,
    pub histogram: Histogram,
    pub error: Option<String>,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionSnapshot {
    pub revision: u64,
    pub selected_ticker: String,
    pub effective_ticker: String,
    pub current_price: Option<f64>,
    pub risk_free_rate: f64,
    pub volatility: Option<f64>,
    pub positions: Vec<PositionView>,
    pub overrides: PriceOverrideStore,
    pub catalog: CatalogView,
    pub analysis: AnalysisView,
    pub simulation: SimulationView,
    pub notice: Option<String>,
}

// ── Messages OUT of the engine ──

#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type")]
pub enum WsMessage {
    /// Committed session state, sent after every successful transition.
    #[serde(rename = "state")]
    State { action: &'static str, snapshot: Box<SessionSnapshot> },

    #[serde(rename = "notice")]
    Notice { action: &'static str, message: String },
}

// ── Performance Counters (lock-free) ──

pub struct PerfCounters {
    pub actions_processed: AtomicU64,
    pub validation_rejections: AtomicU64,
    pub requests_issued: AtomicU64,
    pub requests_failed: AtomicU64,
    pub ws_messages_sent: AtomicU64,
}

impl PerfCounters {
    pub fn new() -> Self {
        Self {
            actions_processed: AtomicU64::new(0),
            validation_rejections: AtomicU64::new(0),
            requests_issued: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            ws_messages_sent: AtomicU64::new(0),
        }
    }
}

// ── Application shared state (channels, not locks) ──

pub struct AppState {
    // Engine -> Dashboard: latest committed snapshot
    pub snapshot_tx: watch::Sender<SessionSnapshot>,
    pub snapshot_rx: watch::Receiver<SessionSnapshot>,

    // Engine -> Dashboard: catalog contents, replaced on successful load
    pub catalog_tx: watch::Sender<Arc<TickerCatalog>>,
    pub catalog_rx: watch::Receiver<Arc<TickerCatalog>>,

    // Engine -> Dashboard: event stream (broadcast for WS clients)
    pub ws_tx: broadcast::Sender<WsMessage>,

    // Dashboard/effects -> Engine: bounded command channel
    pub engine_tx: mpsc::Sender<Command>,

    pub counters: PerfCounters,
}

impl AppState {
    pub fn new(initial: &Session, engine_tx: mpsc::Sender<Command>) -> Arc<Self> {
        let (ws_tx, _) = broadcast::channel(256);
        let (snapshot_tx, snapshot_rx) = watch::channel(initial.snapshot());
        let (catalog_tx, catalog_rx) = watch::channel(initial.catalog.clone());

        Arc::new(Self {
            snapshot_tx,
            snapshot_rx,
            catalog_tx,
            catalog_rx,
            ws_tx,
            engine_tx,
            counters: PerfCounters::new(),
        })
    }

    #[inline]
    pub fn broadcast(&self, msg: WsMessage) {
        self.counters.ws_messages_sent.fetch_add(1, Ordering::Relaxed);
        let _ = self.ws_tx.send(msg);
    }

    /// Send an action to the engine and wait for its validation outcome.
    pub async fn dispatch(&self, action: Action) -> EngineResult<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.engine_tx
            .send(Command { action, reply: Some(reply_tx) })
            .await
            .map_err(|_| EngineError::ChannelClosed("engine command channel".into()))?;
        reply_rx
            .await
            .map_err(|_| EngineError::ChannelClosed("engine reply dropped".into()))?
    }
}
