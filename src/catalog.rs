use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Underlying reference data as served by the catalog endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    #[serde(rename = "ticker")]
    pub symbol: String,
    /// Annualized standard deviation of returns.
    pub volatility: f64,
    pub latest_price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_name: Option<String>,
}

impl Ticker {
    fn matches(&self, needle: &str) -> bool {
        self.symbol.to_lowercase().contains(needle)
            || self
                .brand_name
                .as_deref()
                .is_some_and(|b| b.to_lowercase().contains(needle))
    }
}

/// Read-only view over the tickers the catalog service returned.
/// Service order is kept for display; lookups go through the index.
#[derive(Debug, Clone, Default)]
pub struct TickerCatalog {
    tickers: Vec<Ticker>,
    index: HashMap<String, usize>,
}

impl TickerCatalog {
    /// Build from service records. Duplicate symbols keep their first record.
    pub fn from_records(records: Vec<Ticker>) -> Self {
        let mut tickers = Vec::with_capacity(records.len());
        let mut index = HashMap::with_capacity(records.len());
        for t in records {
            if index.contains_key(&t.symbol) {
                tracing::debug!(ticker = %t.symbol, "duplicate catalog entry dropped");
                continue;
            }
            index.insert(t.symbol.clone(), tickers.len());
            tickers.push(t);
        }
        Self { tickers, index }
    }

    #[inline]
    pub fn lookup(&self, symbol: &str) -> Option<&Ticker> {
        self.index.get(symbol).map(|&i| &self.tickers[i])
    }

    /// Case-insensitive substring match on symbol or brand name.
    /// An empty search term yields every ticker.
    pub fn filter<'a>(&'a self, search: &str) -> impl Iterator<Item = &'a Ticker> + 'a {
        let needle = search.trim().to_lowercase();
        self.tickers
            .iter()
            .filter(move |t| needle.is_empty() || t.matches(&needle))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }
}

#[cfg(test)]
pub(crate) fn ticker(symbol: &str, volatility: f64, latest_price: f64, brand: Option<&str>) -> Ticker {
    Ticker {
        symbol: symbol.to_string(),
        volatility,
        latest_price,
        brand_name: brand.map(str::to_string),
    }
}
