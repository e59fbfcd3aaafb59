use crate::pricing::types::Summary;
use serde::Serialize;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Greek {
    Delta,
    Gamma,
    Vega,
    Theta,
    Rho,
}

impl Greek {
    pub const ALL: [Greek; 5] = [Greek::Delta, Greek::Gamma, Greek::Vega, Greek::Theta, Greek::Rho];

    /// Convert a raw aggregate into the figure users reason about:
    /// Theta per day, Vega and Rho per 1% move, Delta and Gamma per $1.
    #[inline]
    pub fn scale(self, value: f64) -> f64 {
        match self {
            Greek::Theta => value / 365.0,
            Greek::Vega | Greek::Rho => value / 100.0,
            Greek::Delta | Greek::Gamma => value,
        }
    }

    #[inline]
    pub fn unit(self) -> &'static str {
        match self {
            Greek::Theta => "per day",
            Greek::Vega | Greek::Rho => "per 1%",
            Greek::Delta | Greek::Gamma => "per $1",
        }
    }
}

impl FromStr for Greek {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "delta" => Ok(Greek::Delta),
            "gamma" => Ok(Greek::Gamma),
            "vega" => Ok(Greek::Vega),
            "theta" => Ok(Greek::Theta),
            "rho" => Ok(Greek::Rho),
            other => Err(format!("unknown greek: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Positive,
    Negative,
    Flat,
}

impl Direction {
    #[inline]
    pub fn of(value: f64) -> Self {
        if value == 0.0 {
            Direction::Flat
        } else if value > 0.0 {
            Direction::Positive
        } else {
            Direction::Negative
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GreekExplanation {
    pub greek: Greek,
    pub value: f64,
    pub direction: Direction,
    /// Unit-converted absolute value.
    pub magnitude: f64,
    pub unit: &'static str,
    pub text: String,
}

/// Qualitative reading of one portfolio Greek. Pure function.
pub fn explain(greek: Greek, value: f64) -> GreekExplanation {
    let direction = Direction::of(value);
    let m = greek.scale(value.abs());

    let text = match (greek, direction) {
        (Greek::Delta, Direction::Flat) => {
            "Delta neutral: small moves in the underlying leave the portfolio value unchanged.".to_string()
        }
        (Greek::Delta, Direction::Positive) => format!(
            "Bullish exposure: the portfolio gains about ${m:.2} for every $1 rise in the underlying."
        ),
        (Greek::Delta, Direction::Negative) => format!(
            "Bearish exposure: the portfolio loses about ${m:.2} for every $1 rise in the underlying."
        ),

        (Greek::Gamma, Direction::Flat) => {
            "No convexity: delta stays constant as the underlying moves.".to_string()
        }
        (Greek::Gamma, Direction::Positive) => format!(
            "Long convexity: delta rises by {m:.4} for every $1 rise in the underlying, so large moves in either direction help."
        ),
        (Greek::Gamma, Direction::Negative) => format!(
            "Short convexity: delta falls by {m:.4} for every $1 rise in the underlying, so large moves in either direction hurt."
        ),

        (Greek::Vega, Direction::Flat) => {
            "Volatility neutral: changes in implied volatility leave the portfolio value unchanged.".to_string()
        }
        (Greek::Vega, Direction::Positive) => format!(
            "Long volatility: the portfolio gains about ${m:.2} for every 1% rise in implied volatility."
        ),
        (Greek::Vega, Direction::Negative) => format!(
            "Short volatility: the portfolio loses about ${m:.2} for every 1% rise in implied volatility."
        ),

        (Greek::Theta, Direction::Flat) => {
            "No time decay: the passage of time leaves the portfolio value unchanged.".to_string()
        }
        (Greek::Theta, Direction::Positive) => format!(
            "Time works for you: the portfolio earns about ${m:.2} per day from time decay."
        ),
        (Greek::Theta, Direction::Negative) => format!(
            "Time works against you: the portfolio loses about ${m:.2} per day from time decay."
        ),

        (Greek::Rho, Direction::Flat) => {
            "Rate neutral: changes in interest rates leave the portfolio value unchanged.".to_string()
        }
        (Greek::Rho, Direction::Positive) => format!(
            "Rates up helps: the portfolio gains about ${m:.2} for every 1% rise in interest rates."
        ),
        (Greek::Rho, Direction::Negative) => format!(
            "Rates up hurts: the portfolio loses about ${m:.2} for every 1% rise in interest rates."
        ),
    };

    GreekExplanation {
        greek,
        value,
        direction,
        magnitude: m,
        unit: greek.unit(),
        text,
    }
}

/// Explanations for every total in a summary, in `Greek::ALL` order.
pub fn explain_summary(summary: &Summary) -> Vec<GreekExplanation> {
    Greek::ALL
        .iter()
        .map(|&g| {
            let v = match g {
                Greek::Delta => summary.total_delta,
                Greek::Gamma => summary.total_gamma,
                Greek::Vega => summary.total_vega,
                Greek::Theta => summary.total_theta,
                Greek::Rho => summary.total_rho,
            };
            explain(g, v)
        })
        .collect()
}
