use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::RestClientConfig;
use crate::error::BotError;
use crate::execution::{ExecutorConfig, OrderType};
use crate::indicators::IndicatorConfig;
use crate::strategy::SignalConfig;
use crate::Result;

const ENV_PREFIX: &str = "TRENDBOT";
const DEFAULT_CONFIG_FILE: &str = "trendbot";
/// Upper bound on `exchange.fetch_retries`
pub const MAX_FETCH_RETRIES: u32 = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    #[default]
    Paper,
    Live,
}

impl TradingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradingMode::Paper => "paper",
            TradingMode::Live => "live",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BotSection {
    pub mode: TradingMode,
    pub tick_interval_secs: u64,
    pub candle_interval_minutes: u32,
    pub history_days: u32,
    pub min_candles: usize,
    /// Run symbol passes concurrently within a tick
    pub fan_out: bool,
}

impl Default for BotSection {
    fn default() -> Self {
        Self {
            mode: TradingMode::Paper,
            tick_interval_secs: 10,
            candle_interval_minutes: 5,
            history_days: 2,
            min_candles: 200,
            fan_out: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SymbolConfig {
    pub name: String,
    #[serde(default)]
    pub quantity: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrderSection {
    pub order_type: OrderType,
    pub timeout_secs: u64,
    pub default_quantity: Option<f64>,
    pub cancel_open_orders_before_entry: bool,
}

impl Default for OrderSection {
    fn default() -> Self {
        Self {
            order_type: OrderType::Limit,
            timeout_secs: 10,
            default_quantity: None,
            cancel_open_orders_before_entry: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LedgerSection {
    /// JSON ledger file. Unset means one file per trading mode.
    pub path: Option<PathBuf>,
    /// Use Postgres instead of the JSON file when set
    pub database_url: Option<String>,
}

impl LedgerSection {
    /// JSON ledger location for `mode`
    ///
    /// Paper and live positions never share a default file, so switching
    /// modes cannot turn simulated fills into positions the bot tries to sell.
    pub fn json_path(&self, mode: TradingMode) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("positions.{}.json", mode.as_str())))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExchangeSection {
    pub base_url: String,
    pub exchange: String,
    pub api_key: String,
    pub requests_per_second: u32,
    pub fetch_retries: u32,
    pub retry_backoff_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for ExchangeSection {
    fn default() -> Self {
        let rest = RestClientConfig::default();
        Self {
            base_url: rest.base_url,
            exchange: rest.exchange,
            api_key: rest.api_key,
            requests_per_second: rest.requests_per_second,
            fetch_retries: rest.fetch_retries,
            retry_backoff_ms: rest.retry_backoff.as_millis() as u64,
            request_timeout_secs: rest.request_timeout.as_secs(),
        }
    }
}

impl From<&ExchangeSection> for RestClientConfig {
    fn from(section: &ExchangeSection) -> Self {
        Self {
            base_url: section.base_url.clone(),
            exchange: section.exchange.clone(),
            api_key: section.api_key.clone(),
            requests_per_second: section.requests_per_second,
            fetch_retries: section.fetch_retries,
            retry_backoff: Duration::from_millis(section.retry_backoff_ms),
            request_timeout: Duration::from_secs(section.request_timeout_secs),
        }
    }
}

impl From<&OrderSection> for ExecutorConfig {
    fn from(section: &OrderSection) -> Self {
        Self {
            order_type: section.order_type,
            order_timeout: Duration::from_secs(section.timeout_secs),
            cancel_open_orders_before_entry: section.cancel_open_orders_before_entry,
        }
    }
}

/// Immutable runtime configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub bot: BotSection,
    /// Processed in this order every tick
    pub symbols: Vec<SymbolConfig>,
    pub risk: SignalConfig,
    pub orders: OrderSection,
    pub indicators: IndicatorConfig,
    pub ledger: LedgerSection,
    pub exchange: ExchangeSection,
}

impl BotConfig {
    /// Load from a TOML file layered under `TRENDBOT_*` environment variables
    ///
    /// Without an explicit path, `trendbot.toml` in the working directory is
    /// used if present. Nested keys use `__`, e.g. `TRENDBOT_EXCHANGE__API_KEY`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let config: BotConfig = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Parse and validate an inline TOML document
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: BotConfig = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(BotError::Config(reason));

        if self.symbols.is_empty() {
            return invalid("no symbols configured".to_string());
        }

        let mut seen = HashSet::new();
        for symbol in &self.symbols {
            let name = symbol.name.trim();
            if name.is_empty() {
                return invalid("symbol with an empty name".to_string());
            }
            if !seen.insert(name.to_uppercase()) {
                return invalid(format!("duplicate symbol {}", name));
            }
            match symbol.quantity.or(self.orders.default_quantity) {
                Some(quantity) if quantity.is_finite() && quantity > 0.0 => {}
                Some(quantity) => {
                    return invalid(format!("{}: quantity must be positive, got {}", name, quantity))
                }
                None => {
                    return invalid(format!(
                        "{}: no quantity and no orders.default_quantity",
                        name
                    ))
                }
            }
        }

        let pct_ok = |pct: f64| pct > 0.0 && pct < 1.0;
        if !pct_ok(self.risk.stop_loss_pct) {
            return invalid(format!(
                "risk.stop_loss_pct must be in (0, 1), got {}",
                self.risk.stop_loss_pct
            ));
        }
        if !pct_ok(self.risk.target_pct) {
            return invalid(format!(
                "risk.target_pct must be in (0, 1), got {}",
                self.risk.target_pct
            ));
        }

        if self.bot.tick_interval_secs == 0 {
            return invalid("bot.tick_interval_secs must be positive".to_string());
        }
        if self.bot.candle_interval_minutes == 0 || self.bot.history_days == 0 {
            return invalid("bot.candle_interval_minutes and bot.history_days must be positive".to_string());
        }
        if self.exchange.fetch_retries > MAX_FETCH_RETRIES {
            return invalid(format!(
                "exchange.fetch_retries must be at most {}, got {}",
                MAX_FETCH_RETRIES, self.exchange.fetch_retries
            ));
        }
        if self.orders.timeout_secs == 0 {
            return invalid("orders.timeout_secs must be positive".to_string());
        }

        let ind = &self.indicators;
        if ind.dema_length == 0
            || ind.macd_fast == 0
            || ind.macd_slow == 0
            || ind.macd_signal == 0
            || ind.supertrend_length == 0
        {
            return invalid("indicator lengths must be positive".to_string());
        }
        if ind.macd_fast >= ind.macd_slow {
            return invalid(format!(
                "indicators.macd_fast ({}) must be below macd_slow ({})",
                ind.macd_fast, ind.macd_slow
            ));
        }
        if !(ind.supertrend_multiplier.is_finite() && ind.supertrend_multiplier > 0.0) {
            return invalid("indicators.supertrend_multiplier must be positive".to_string());
        }

        if self.bot.mode == TradingMode::Live && self.exchange.api_key.trim().is_empty() {
            return invalid("live mode requires exchange.api_key".to_string());
        }

        Ok(())
    }

    /// Symbol names in processing order
    pub fn symbol_names(&self) -> Vec<String> {
        self.symbols.iter().map(|s| s.name.trim().to_string()).collect()
    }

    /// Order quantity per symbol, falling back to the default
    pub fn quantities(&self) -> HashMap<String, f64> {
        self.symbols
            .iter()
            .filter_map(|s| {
                s.quantity
                    .or(self.orders.default_quantity)
                    .map(|q| (s.name.trim().to_string(), q))
            })
            .collect()
    }

    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.bot.history_days))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.bot.tick_interval_secs)
    }

    /// Log the effective configuration, without secrets
    pub fn log_summary(&self) {
        tracing::info!("📊 Configuration:");
        tracing::info!("  Mode: {}", self.bot.mode.as_str());
        tracing::info!(
            "  Tick: every {}s, {}m candles over {} days",
            self.bot.tick_interval_secs,
            self.bot.candle_interval_minutes,
            self.bot.history_days
        );
        tracing::info!(
            "  Stop loss: {:.1}%, target: {:.1}%",
            self.risk.stop_loss_pct * 100.0,
            self.risk.target_pct * 100.0
        );
        tracing::info!(
            "  Orders: {} (timeout {}s)",
            self.orders.order_type.as_str(),
            self.orders.timeout_secs
        );
        let quantities = self.quantities();
        for symbol in self.symbol_names() {
            tracing::info!(
                "    - {} x {}",
                symbol,
                quantities.get(&symbol).copied().unwrap_or_default()
            );
        }
    }
}
