use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::Instrument;

use crate::api::HistoryFetcher;
use crate::error::BotError;
use crate::execution::{ExecutionOutcome, Executor, PositionLedger};
use crate::models::Signal;
use crate::strategy::{validate_candle_order, Strategy};
use crate::Result;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub candle_interval_minutes: u32,
    pub lookback: chrono::Duration,
}

/// Result of one completed symbol pass
#[derive(Debug, Clone, PartialEq)]
pub struct PassOutcome {
    pub signal: Signal,
    pub close: f64,
    /// `None` when the signal was `Hold`
    pub execution: Option<ExecutionOutcome>,
}

/// Fetch, compute, evaluate and act for one symbol
pub struct Pipeline {
    fetcher: Arc<dyn HistoryFetcher>,
    strategy: Arc<dyn Strategy>,
    ledger: Arc<PositionLedger>,
    executor: Arc<Executor>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        fetcher: Arc<dyn HistoryFetcher>,
        strategy: Arc<dyn Strategy>,
        ledger: Arc<PositionLedger>,
        executor: Arc<Executor>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            fetcher,
            strategy,
            ledger,
            executor,
            config,
        }
    }

    pub fn ledger(&self) -> &Arc<PositionLedger> {
        &self.ledger
    }

    pub async fn run_pass(&self, symbol: &str) -> Result<PassOutcome> {
        let mut candles = self
            .fetcher
            .fetch(symbol, self.config.candle_interval_minutes, self.config.lookback)
            .await
            .map_err(|e| match e {
                BotError::TransientFetch { .. } => e,
                other => BotError::TransientFetch {
                    symbol: symbol.to_string(),
                    reason: other.to_string(),
                },
            })?;

        candles.retain(|c| c.is_usable());
        validate_candle_order(&candles).map_err(|e| BotError::InvalidHistory {
            symbol: symbol.to_string(),
            reason: e.to_string(),
        })?;

        let required = self.strategy.min_candles_required();
        if candles.len() < required {
            return Err(BotError::InsufficientHistory {
                symbol: symbol.to_string(),
                available: candles.len(),
                required,
            });
        }

        let position = self.ledger.get(symbol).await;
        let signal = self.strategy.generate_signal(&candles, position.as_ref())?;
        let close = candles[candles.len() - 1].close;

        tracing::info!(
            "{} close {} -> {} ({})",
            self.strategy.name(),
            close,
            signal,
            if position.is_some() { "open" } else { "flat" }
        );

        if signal.is_hold() {
            return Ok(PassOutcome {
                signal,
                close,
                execution: None,
            });
        }

        let execution = self.executor.process_signal(&signal, symbol, close).await?;
        Ok(PassOutcome {
            signal,
            close,
            execution: Some(execution),
        })
    }
}

/// Per-symbol results of one tick, in configured symbol order
#[derive(Debug)]
pub struct TickReport {
    pub tick: u64,
    pub results: Vec<(String, Result<PassOutcome>)>,
}

impl TickReport {
    pub fn result(&self, symbol: &str) -> Option<&Result<PassOutcome>> {
        self.results
            .iter()
            .find(|(s, _)| s == symbol)
            .map(|(_, result)| result)
    }

    pub fn failures(&self) -> usize {
        self.results
            .iter()
            .filter(|(_, r)| matches!(r, Err(e) if !e.is_skip()))
            .count()
    }
}

/// Drives the pipeline across all symbols on a fixed cadence
///
/// A symbol's pass never overlaps its previous pass. Failures are logged and
/// only abort that symbol for the current tick.
pub struct Scheduler {
    pipeline: Arc<Pipeline>,
    symbols: Vec<String>,
    tick_interval: Duration,
    fan_out: bool,
    symbol_locks: HashMap<String, Arc<Mutex<()>>>,
    ticks: AtomicU64,
}

impl Scheduler {
    pub fn new(pipeline: Arc<Pipeline>, symbols: Vec<String>, tick_interval: Duration, fan_out: bool) -> Self {
        let symbol_locks = symbols
            .iter()
            .map(|s| (s.clone(), Arc::new(Mutex::new(()))))
            .collect();

        Self {
            pipeline,
            symbols,
            tick_interval,
            fan_out,
            symbol_locks,
            ticks: AtomicU64::new(0),
        }
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Run one pass for every symbol
    pub async fn run_tick(&self) -> TickReport {
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!("⏱️  Tick {} over {} symbols", tick, self.symbols.len());

        let mut results = Vec::with_capacity(self.symbols.len());

        if self.fan_out {
            let handles: Vec<_> = self
                .symbols
                .iter()
                .map(|symbol| {
                    let pipeline = self.pipeline.clone();
                    let lock = self.lock_for(symbol);
                    let symbol = symbol.clone();
                    tokio::spawn(async move { guarded_pass(&pipeline, &lock, &symbol, tick).await })
                })
                .collect();

            for (symbol, handle) in self.symbols.iter().zip(handles) {
                let result = handle
                    .await
                    .unwrap_or_else(|e| Err(BotError::TaskFailed(e.to_string())));
                results.push((symbol.clone(), result));
            }
        } else {
            for symbol in &self.symbols {
                let lock = self.lock_for(symbol);
                let result = guarded_pass(&self.pipeline, &lock, symbol, tick).await;
                results.push((symbol.clone(), result));
            }
        }

        for (symbol, result) in &results {
            log_result(symbol, result);
        }

        let report = TickReport { tick, results };
        tracing::info!(
            "Tick {} done: {} open positions, {} failures",
            tick,
            self.pipeline.ledger().len().await,
            report.failures()
        );
        report
    }

    /// Tick until `shutdown` resolves. An in-flight tick always completes.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, stopping scheduler");
                    break;
                }
                _ = interval.tick() => {
                    self.run_tick().await;
                }
            }
        }
    }

    fn lock_for(&self, symbol: &str) -> Arc<Mutex<()>> {
        self.symbol_locks
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| Arc::new(Mutex::new(())))
    }
}

async fn guarded_pass(
    pipeline: &Pipeline,
    lock: &Mutex<()>,
    symbol: &str,
    tick: u64,
) -> Result<PassOutcome> {
    let _guard = lock.lock().await;
    pipeline
        .run_pass(symbol)
        .instrument(tracing::info_span!("pass", symbol, tick))
        .await
}

fn log_result(symbol: &str, result: &Result<PassOutcome>) {
    match result {
        Ok(PassOutcome {
            execution: Some(ExecutionOutcome::Opened(position)),
            ..
        }) => tracing::info!(
            "✅ {} entered @ {} (order {})",
            symbol,
            position.entry_price,
            position.order_id
        ),
        Ok(PassOutcome {
            execution: Some(ExecutionOutcome::Closed {
                exit_price, reason, ..
            }),
            ..
        }) => tracing::info!("✅ {} exited @ {} ({:?})", symbol, exit_price, reason),
        Ok(_) => {}
        Err(e) if e.is_skip() || matches!(e, BotError::TransientFetch { .. }) => {
            tracing::warn!("Skipping {}: {}", symbol, e)
        }
        Err(e) => tracing::error!("❌ Pass failed for {}: {}", symbol, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{ExecutorConfig, PaperGateway};
    use crate::models::{Candle, Position, SignalReason};
    use crate::persistence::JsonFileStore;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::AtomicUsize;

    struct FixedFetcher {
        candles: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl HistoryFetcher for FixedFetcher {
        async fn fetch(&self, _symbol: &str, _interval: u32, _lookback: chrono::Duration) -> Result<Vec<Candle>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let base = Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap();
            Ok((0..self.candles)
                .map(|i| Candle {
                    timestamp: base + chrono::Duration::minutes(5 * i as i64),
                    open: 100.0,
                    high: 101.0,
                    low: 99.0,
                    close: 100.0,
                    volume: 1.0,
                })
                .collect())
        }
    }

    struct AlwaysEnter;

    impl Strategy for AlwaysEnter {
        fn generate_signal(&self, _candles: &[Candle], position: Option<&Position>) -> Result<Signal> {
            Ok(match position {
                None => Signal::Enter(SignalReason::DemaMacdCross),
                Some(_) => Signal::Hold,
            })
        }

        fn name(&self) -> &str {
            "AlwaysEnter"
        }

        fn min_candles_required(&self) -> usize {
            200
        }
    }

    async fn scheduler(dir: &tempfile::TempDir, candles: usize, fan_out: bool) -> (Scheduler, Arc<PaperGateway>) {
        let store = Arc::new(JsonFileStore::new(dir.path().join("positions.json")));
        let ledger = Arc::new(PositionLedger::load(store).await.unwrap());
        let gateway = Arc::new(PaperGateway::new());
        let quantities = HashMap::from([("BTC/INR".to_string(), 0.01), ("ETH/INR".to_string(), 0.5)]);
        let executor = Arc::new(Executor::new(
            gateway.clone(),
            ledger.clone(),
            quantities,
            ExecutorConfig::default(),
        ));
        let pipeline = Arc::new(Pipeline::new(
            Arc::new(FixedFetcher {
                candles,
                calls: AtomicUsize::new(0),
            }),
            Arc::new(AlwaysEnter),
            ledger,
            executor,
            PipelineConfig {
                candle_interval_minutes: 5,
                lookback: chrono::Duration::days(2),
            },
        ));
        let symbols = vec!["BTC/INR".to_string(), "ETH/INR".to_string()];
        (
            Scheduler::new(pipeline, symbols, Duration::from_millis(10), fan_out),
            gateway,
        )
    }

    #[tokio::test]
    async fn test_tick_reports_in_symbol_order() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, _) = scheduler(&dir, 250, true).await;

        let report = scheduler.run_tick().await;

        assert_eq!(report.tick, 1);
        let symbols: Vec<&str> = report.results.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(symbols, vec!["BTC/INR", "ETH/INR"]);
        assert_eq!(report.failures(), 0);
    }

    #[tokio::test]
    async fn test_sequential_and_fan_out_agree() {
        for fan_out in [false, true] {
            let dir = tempfile::tempdir().unwrap();
            let (scheduler, gateway) = scheduler(&dir, 250, fan_out).await;

            scheduler.run_tick().await;
            scheduler.run_tick().await;

            assert_eq!(gateway.accepted_count(), 2, "fan_out = {}", fan_out);
        }
    }

    #[tokio::test]
    async fn test_short_history_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, gateway) = scheduler(&dir, 150, false).await;

        let report = scheduler.run_tick().await;

        assert!(matches!(
            report.result("BTC/INR"),
            Some(Err(BotError::InsufficientHistory {
                available: 150,
                required: 200,
                ..
            }))
        ));
        assert_eq!(report.failures(), 0);
        assert_eq!(gateway.accepted_count(), 0);
    }

    #[tokio::test]
    async fn test_run_until_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, gateway) = scheduler(&dir, 250, true).await;

        scheduler
            .run_until(tokio::time::sleep(Duration::from_millis(100)))
            .await;

        assert!(scheduler.ticks.load(Ordering::SeqCst) >= 1);
        // Later ticks see the open positions and hold
        assert_eq!(gateway.accepted_count(), 2);
    }
}
