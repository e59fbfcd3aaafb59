use crate::portfolio::Position;
use serde::{Deserialize, Serialize};

// ── Requests ──

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisRequest {
    pub positions: Vec<Position>,
    pub current_price: f64,
    pub risk_free_rate: f64,
    pub ticker: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationRequest {
    pub positions: Vec<Position>,
    pub current_price: f64,
    pub risk_free_rate: f64,
    pub volatility: f64,
    /// Years.
    pub horizon: f64,
    pub n_simulations: u32,
    pub ticker: String,
}

// ── Responses ──

/// Value and Greeks of one position, signed and scaled by quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionBreakdown {
    pub value: f64,
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub rho: f64,
}

/// Valuation response. `positions` is aligned with the request's positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total_value: f64,
    pub total_delta: f64,
    pub total_gamma: f64,
    pub total_theta: f64,
    pub total_vega: f64,
    pub total_rho: f64,
    #[serde(default)]
    pub positions: Vec<PositionBreakdown>,
}

/// Monte Carlo response: P&L statistics plus one terminal value per path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub mean: f64,
    pub std: f64,
    #[serde(rename = "VaR_5")]
    pub var_5: f64,
    #[serde(rename = "VaR_1")]
    pub var_1: f64,
    #[serde(default)]
    pub portfolio_values: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_summary() {
        let json = r#"{
            "total_value": 7.41, "total_delta": 0.55, "total_gamma": 0.02,
            "total_theta": -9.1, "total_vega": 21.0, "total_rho": 12.4,
            "positions": [
                {"value": 9.0, "delta": 0.7, "gamma": 0.03, "theta": -11.0, "vega": 26.0, "rho": 15.0},
                {"value": -1.59, "delta": -0.15, "gamma": -0.01, "theta": 1.9, "vega": -5.0, "rho": -2.6}
            ]
        }"#;
        let s: Summary = serde_json::from_str(json).expect("parse");
        assert_eq!(s.positions.len(), 2);
        assert_eq!(s.total_theta, -9.1);
    }

    #[test]
    fn test_parse_simulation_result() {
        let json = r#"{"portfolio_values":[1.0,-2.5,3.0],"mean":0.5,"std":2.2,"VaR_5":-2.4,"VaR_1":-2.49}"#;
        let r: SimulationResult = serde_json::from_str(json).expect("parse");
        assert_eq!(r.var_5, -2.4);
        assert_eq!(r.var_1, -2.49);
        assert_eq!(r.portfolio_values.len(), 3);
    }

    #[test]
    fn test_simulation_request_wire() {
        let req = SimulationRequest {
            positions: Vec::new(),
            current_price: 100.0,
            risk_free_rate: -0.005,
            volatility: 0.25,
            horizon: 0.5,
            n_simulations: 10_000,
            ticker: "AAPL".into(),
        };
        let v = serde_json::to_value(&req).expect("serialize");
        assert_eq!(v["n_simulations"], 10_000);
        assert_eq!(v["risk_free_rate"], -0.005);
        assert_eq!(v["ticker"], "AAPL");
    }
}
