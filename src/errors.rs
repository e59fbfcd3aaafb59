/// Domain-specific error types for the portfolio session.
/// Every failure is recovered at the orchestrator boundary. The engine must:
/// - Leave session state untouched on validation failures
/// - Keep the last good result on transport failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("index {index} out of bounds for portfolio of {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("network error: {0}")]
    Network(String),

    #[error("pricing service error: {status} {body}")]
    Service { status: u16, body: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("{0} request already in flight")]
    RequestPending(&'static str),

    #[error("config error: {0}")]
    Config(String),

    #[error("channel closed: {0}")]
    ChannelClosed(String),
}

/// Input problems detected locally, before any remote call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("missing ticker")]
    MissingTicker,

    #[error("invalid quantity")]
    InvalidQuantity,

    #[error("invalid field: {0}")]
    InvalidField(&'static str),

    #[error("portfolio is empty")]
    EmptyPortfolio,

    #[error("no ticker resolved for the portfolio")]
    UnresolvedTicker,

    #[error("unknown ticker: {0}")]
    UnknownTicker(String),

    #[error("missing price for {0}")]
    MissingPrice(String),

    #[error("missing volatility for {0}")]
    MissingVolatility(String),
}

impl EngineError {
    /// Remote-call failures: retryable, prior results stay visible.
    #[inline]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            EngineError::Network(_) | EngineError::Service { .. } | EngineError::Parse(_)
        )
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        EngineError::Network(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Parse(e.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        assert!(EngineError::Network("refused".into()).is_transport());
        assert!(EngineError::Service { status: 500, body: String::new() }.is_transport());
        assert!(!EngineError::Validation(ValidationError::EmptyPortfolio).is_transport());
        assert!(!EngineError::RequestPending("analysis").is_transport());
    }

    #[test]
    fn test_validation_messages() {
        let e: EngineError = ValidationError::MissingTicker.into();
        assert_eq!(e.to_string(), "validation error: missing ticker");
        assert_eq!(ValidationError::InvalidQuantity.to_string(), "invalid quantity");
    }
}
