use crate::analytics::histogram::DEFAULT_BINS;
use crate::errors::{EngineError, EngineResult};
use crate::orchestrator::SimulationSettings;

/// Upper bound on histogram resolution; every snapshot rebuilds the bins.
pub const MAX_HISTOGRAM_BINS: usize = 1_000;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub pricing_base_url: String,
    pub pricing_timeout_secs: Option<u64>,
    pub server_host: String,
    pub server_port: u16,
    pub default_risk_free_rate: f64,
    pub simulation: SimulationSettings,
    pub histogram_bins: usize,
}

impl AppConfig {
    pub fn from_env() -> EngineResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> EngineResult<Self> {
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let pricing_timeout_secs = match lookup("PRICING_TIMEOUT_SECS") {
            Some(v) => Some(
                v.parse::<u64>()
                    .map_err(|e| EngineError::Config(format!("PRICING_TIMEOUT_SECS: {e}")))?,
            ),
            None => None,
        };

        let server_port = var_or("SERVER_PORT", "3001")
            .parse::<u16>()
            .map_err(|e| EngineError::Config(format!("SERVER_PORT: {e}")))?;

        let default_risk_free_rate = var_or("DEFAULT_RISK_FREE_RATE", "0.03")
            .parse::<f64>()
            .map_err(|e| EngineError::Config(format!("DEFAULT_RISK_FREE_RATE: {e}")))?;
        if !default_risk_free_rate.is_finite() {
            return Err(EngineError::Config(format!(
                "DEFAULT_RISK_FREE_RATE must be finite, got {default_risk_free_rate}"
            )));
        }

        let horizon = var_or("SIM_HORIZON", "0.5")
            .parse::<f64>()
            .map_err(|e| EngineError::Config(format!("SIM_HORIZON: {e}")))?;
        if !(horizon.is_finite() && horizon > 0.0) {
            return Err(EngineError::Config(format!("SIM_HORIZON must be positive, got {horizon}")));
        }

        let n_simulations = var_or("SIM_N_SIMULATIONS", "10000")
            .parse::<u32>()
            .map_err(|e| EngineError::Config(format!("SIM_N_SIMULATIONS: {e}")))?;
        if n_simulations == 0 {
            return Err(EngineError::Config("SIM_N_SIMULATIONS must be nonzero".into()));
        }

        let histogram_bins = var_or("HISTOGRAM_BINS", &DEFAULT_BINS.to_string())
            .parse::<usize>()
            .map_err(|e| EngineError::Config(format!("HISTOGRAM_BINS: {e}")))?;
        if !(1..=MAX_HISTOGRAM_BINS).contains(&histogram_bins) {
            return Err(EngineError::Config(format!(
                "HISTOGRAM_BINS must be in 1..={MAX_HISTOGRAM_BINS}, got {histogram_bins}"
            )));
        }

        Ok(Self {
            pricing_base_url: var_or("PRICING_API_BASE_URL", "http://127.0.0.1:5000"),
            pricing_timeout_secs,
            server_host: var_or("SERVER_HOST", "127.0.0.1"),
            server_port,
            default_risk_free_rate,
            simulation: SimulationSettings { horizon, n_simulations },
            histogram_bins,
        })
    }
}
