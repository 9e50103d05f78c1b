use std::fs::{self, OpenOptions};
use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::execution::engine::ThresholdEngine;

/// Runs engine cycles on a fixed timer, one at a time
///
/// Shutdown is only checked between cycles, so a cycle in flight always completes.
pub struct Scheduler {
    period: Duration,
}

impl Scheduler {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Run until Ctrl-C
    pub async fn run(&self, engine: &mut ThresholdEngine) -> usize {
        self.run_until(engine, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run until `shutdown` resolves; returns the number of completed cycles
    pub async fn run_until<F>(&self, engine: &mut ThresholdEngine, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut cycles = 0;
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("🛑 Shutdown requested, stopping after {} cycle(s)", cycles);
                    break;
                }
                _ = ticker.tick() => {}
            }

            cycles += 1;
            tracing::info!("{} Cycle {} {}", ">".repeat(20), cycles, "<".repeat(20));
            let started = tokio::time::Instant::now();

            let report = engine.run_cycle().await;
            match &report.aborted {
                Some(reason) => tracing::warn!("Cycle {} aborted: {}", cycles, reason),
                None => tracing::info!(
                    "Cycle {} done in {:.2}s: {} buy(s), {} sell(s)",
                    cycles,
                    started.elapsed().as_secs_f64(),
                    report.buys(),
                    report.sells()
                ),
            }
        }

        cycles
    }
}

/// Marker file guarding a ledger against a second running instance
///
/// Created next to the ledger as `<ledger>.lock`; removed on drop.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
}

impl InstanceLock {
    pub fn acquire(ledger_path: &Path) -> io::Result<Self> {
        let mut name = ledger_path.as_os_str().to_owned();
        name.push(".lock");
        let path = PathBuf::from(name);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::AlreadyExists {
                    io::Error::new(
                        e.kind(),
                        format!(
                            "{} exists: another instance is using this ledger (remove it if that instance is gone)",
                            path.display()
                        ),
                    )
                } else {
                    e
                }
            })?;
        writeln!(file, "{}", std::process::id())?;

        tracing::debug!("Acquired instance lock {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!("Failed to remove lock {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TradeConfig;
    use crate::exchange::{MarketData, PaperExchange};
    use crate::execution::PositionLedger;
    use crate::exchange::ExchangeError;
    use crate::models::Candle;
    use crate::notify::LogNotifier;
    use crate::persistence::LedgerStore;
    use crate::strategy::DowntrendSupportSignal;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingPrice(Arc<AtomicUsize>);

    #[async_trait]
    impl MarketData for CountingPrice {
        async fn last_price(&self, _pair: &str) -> Result<f64, ExchangeError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(100.0)
        }

        async fn candles(
            &self,
            _pair: &str,
            _timeframe: &str,
            _limit: usize,
        ) -> Result<Vec<Candle>, ExchangeError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_lock_is_exclusive_and_released() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = dir.path().join("orders.json");

        let lock = InstanceLock::acquire(&ledger).unwrap();
        assert_eq!(lock.path(), dir.path().join("orders.json.lock"));

        let second = InstanceLock::acquire(&ledger).unwrap_err();
        assert_eq!(second.kind(), io::ErrorKind::AlreadyExists);

        drop(lock);
        assert!(!dir.path().join("orders.json.lock").exists());
        assert!(InstanceLock::acquire(&ledger).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_cycles_until_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let fetches = Arc::new(AtomicUsize::new(0));
        let exchange = PaperExchange::new("paper", CountingPrice(fetches.clone()), 0.0);
        let mut engine = ThresholdEngine::new(
            TradeConfig::new("BTC/USDT", "binance", 2.0, 3.0, 1.0),
            PositionLedger::new(),
            LedgerStore::new(dir.path().join("orders.json")),
            Box::new(exchange),
            Box::new(DowntrendSupportSignal::new(2.0, 50.0)),
            Box::new(LogNotifier),
        );

        let scheduler = Scheduler::new(Duration::from_secs(60));
        // Ticks at 0s, 60s, 120s; shutdown lands before the 180s tick
        let cycles = scheduler
            .run_until(&mut engine, tokio::time::sleep(Duration::from_secs(150)))
            .await;

        assert_eq!(cycles, 3);
        assert_eq!(fetches.load(Ordering::SeqCst), 3);
    }
}
