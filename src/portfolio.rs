use crate::errors::{EngineError, EngineResult, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Position ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

/// One option leg. Field names match the pricing service's wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub ticker: String,
    #[serde(rename = "type")]
    pub option_type: OptionType,
    pub side: Side,
    pub quantity: i64,
    pub strike: f64,
    /// Years.
    pub time_to_expiry: f64,
    pub volatility: f64,
}

impl Position {
    /// Quantity with the side's sign applied: long is positive, short negative.
    #[inline]
    pub fn signed_quantity(&self) -> i64 {
        match self.side {
            Side::Long => self.quantity.abs(),
            Side::Short => -self.quantity.abs(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.ticker.trim().is_empty() {
            return Err(ValidationError::MissingTicker);
        }
        if self.quantity == 0 {
            return Err(ValidationError::InvalidQuantity);
        }
        if !is_positive(self.strike) {
            return Err(ValidationError::InvalidField("strike"));
        }
        if !is_positive(self.time_to_expiry) {
            return Err(ValidationError::InvalidField("time_to_expiry"));
        }
        if !is_positive(self.volatility) {
            return Err(ValidationError::InvalidField("volatility"));
        }
        Ok(())
    }
}

#[inline]
pub fn is_positive(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

// ── Portfolio ──

/// Ordered, append/remove-only collection of positions.
#[derive(Debug, Clone, Default)]
pub struct PortfolioBuilder {
    positions: Vec<Position>,
}

impl PortfolioBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and append. On error the portfolio is unchanged.
    pub fn add(&mut self, position: Position) -> EngineResult<()> {
        position.validate()?;
        self.positions.push(position);
        Ok(())
    }

    /// Remove by index, keeping the relative order of the rest.
    pub fn remove(&mut self, index: usize) -> EngineResult<Position> {
        let len = self.positions.len();
        if index >= len {
            return Err(EngineError::IndexOutOfBounds { index, len });
        }
        Ok(self.positions.remove(index))
    }

    /// The underlying being analyzed: the selected ticker when set, otherwise
    /// the first position's ticker, otherwise empty.
    pub fn effective_ticker<'a>(&'a self, selected: &'a str) -> &'a str {
        if !selected.trim().is_empty() {
            return selected;
        }
        self.positions.first().map(|p| p.ticker.as_str()).unwrap_or("")
    }

    #[inline]
    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

}

#[cfg(test)]
impl PortfolioBuilder {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

// ── Price overrides ──

/// Manually entered spot prices keyed by symbol. Entries outlive ticker
/// selection changes. Callers validate the price before `set`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct PriceOverrideStore {
    prices: BTreeMap<String, f64>,
}

impl PriceOverrideStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, symbol: &str, price: f64) {
        self.prices.insert(symbol.to_string(), price);
    }

    #[inline]
    pub fn get(&self, symbol: &str) -> Option<f64> {
        self.prices.get(symbol).copied()
    }

    #[inline]
    pub fn resolve_price(&self, symbol: &str, fallback: f64) -> f64 {
        self.get(symbol).unwrap_or(fallback)
    }
}

#[cfg(test)]
pub(crate) fn position(ticker: &str, option_type: OptionType, side: Side, quantity: i64, strike: f64) -> Position {
    Position {
        ticker: ticker.to_string(),
        option_type,
        side,
        quantity,
        strike,
        time_to_expiry: 0.5,
        volatility: 0.25,
    }
}
