use thiserror::Error;

/// Errors raised by the trading pipeline.
///
/// Only [`BotError::Config`] is fatal. Everything else aborts at most one
/// symbol's pass for the current tick.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("failed to fetch history for {symbol}: {reason}")]
    TransientFetch { symbol: String, reason: String },

    #[error("insufficient history for {symbol}: {available} usable candles, need {required}")]
    InsufficientHistory {
        symbol: String,
        available: usize,
        required: usize,
    },

    #[error("invalid history for {symbol}: {reason}")]
    InvalidHistory { symbol: String, reason: String },

    #[error("order rejected for {symbol}: {reason}")]
    OrderRejected { symbol: String, reason: String },

    #[error("gateway timed out after {secs}s for {symbol}")]
    GatewayTimeout { symbol: String, secs: u64 },

    #[error("position already open for {0}")]
    PositionExists(String),

    #[error("no open position for {0}")]
    NoPosition(String),

    #[error("invalid position: {0}")]
    InvalidPosition(String),

    #[error("ledger persistence failed: {0}")]
    Persistence(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("symbol pass task failed: {0}")]
    TaskFailed(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl BotError {
    /// Whether this error should stop the process instead of a single pass.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BotError::Config(_))
    }

    /// Whether the error is a skip condition rather than a failure.
    pub fn is_skip(&self) -> bool {
        matches!(self, BotError::InsufficientHistory { .. })
    }
}

impl From<config::ConfigError> for BotError {
    fn from(e: config::ConfigError) -> Self {
        BotError::Config(e.to_string())
    }
}
