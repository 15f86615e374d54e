use thiserror::Error;

/// Unified error type for the entire fxfusion-core library.
/// Every fallible public function returns `Result<T, CoreError>`.
///
/// Transient feed problems are absorbed by the price service and the
/// tracker; only configuration errors are meant to reach the UI.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Price feeds ─────────────────────────────────────────────────
    #[error("Price feed unavailable: {0}")]
    FeedUnavailable(String),

    #[error("Invalid rate for {symbol}: {reason}")]
    InvalidRate { symbol: String, reason: String },

    #[error("API error ({provider}): {message}")]
    Api {
        provider: String,
        message: String,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // ── Configuration ───────────────────────────────────────────────
    #[error("Missing configuration: {0}")]
    ConfigMissing(String),

    // ── Business Logic ──────────────────────────────────────────────
    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error("Basket not found: {0}")]
    BasketNotFound(String),
}

impl CoreError {
    /// Whether this error should be shown to the user as an actionable
    /// failure. Everything else is recovered from locally.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, CoreError::ConfigMissing(_))
    }
}

// ── Conversion helpers (From impls) ─────────────────────────────────

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Deserialization(e.to_string())
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        // Feed ids travel in the query string; keep them out of logs.
        let msg = e.to_string();
        let sanitized = if let Some(idx) = msg.find('?') {
            format!("{}?<query redacted>", &msg[..idx])
        } else {
            msg
        };
        CoreError::Network(sanitized)
    }
}
