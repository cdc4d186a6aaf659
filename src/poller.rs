//! Periodic driver
//!
//! Runs discovery until it succeeds, then one reconciliation pass per
//! interval tick until Ctrl-C or an explicit shutdown request.

use crate::config::Config;
use crate::discovery::discover;
use crate::error::Result;
use crate::logging::{StructuredLogger, get_logger};
use crate::reconciler::{Reconciler, TickReport};
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::{Duration, MissedTickBehavior, interval};

pub struct Poller {
    reconciler: Reconciler,
    config: Config,
    discovered: bool,
    total_ticks: u64,
    overrun_count: u64,
    shutdown_tx: mpsc::UnboundedSender<()>,
    shutdown_rx: mpsc::UnboundedReceiver<()>,
    logger: StructuredLogger,
}

impl Poller {
    pub fn new(reconciler: Reconciler, config: Config) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();
        Self {
            reconciler,
            config,
            discovered: false,
            total_ticks: 0,
            overrun_count: 0,
            shutdown_tx,
            shutdown_rx,
            logger: get_logger("poller"),
        }
    }

    /// Sender that stops [`Poller::run`] when signalled
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<()> {
        self.shutdown_tx.clone()
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn total_ticks(&self) -> u64 {
        self.total_ticks
    }

    /// Run discovery unless it already succeeded. Only configuration errors
    /// are returned; anything else is logged and retried next tick.
    pub async fn ensure_discovered(&mut self) -> Result<bool> {
        if self.discovered {
            return Ok(true);
        }
        match discover(&mut self.reconciler, &self.config, Utc::now()).await {
            Ok(report) => {
                if !report.unsupported_models.is_empty() {
                    self.logger.warn(&format!(
                        "Skipped unsupported inverter models: {}",
                        report.unsupported_models.join(", ")
                    ));
                }
                self.discovered = true;
                Ok(true)
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                self.logger
                    .warn(&format!("Discovery failed, retrying next tick: {}", e));
                Ok(false)
            }
        }
    }

    /// One scheduling tick; `None` while discovery has not succeeded yet
    pub async fn tick(&mut self) -> Result<Option<TickReport>> {
        if !self.ensure_discovered().await? {
            return Ok(None);
        }
        let report = self.reconciler.tick(Utc::now()).await;
        self.total_ticks = self.total_ticks.saturating_add(1);
        Ok(Some(report))
    }

    /// Tick until shutdown, then release the API connection
    pub async fn run(mut self) -> Result<()> {
        let period = Duration::from_secs(self.config.poll_interval_secs.max(1));
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        self.logger.info(&format!(
            "Polling every {}s, rate limit {} min",
            period.as_secs(),
            self.config.rate_limit_minutes
        ));

        let result = loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let started = std::time::Instant::now();
                    match self.tick().await {
                        Ok(Some(report)) => self.logger.info(&format!("Tick: {}", report)),
                        Ok(None) => {}
                        Err(e) => break Err(e),
                    }
                    if started.elapsed() > period {
                        self.overrun_count = self.overrun_count.saturating_add(1);
                        self.logger.warn(&format!(
                            "Tick took {} ms, longer than the poll interval",
                            started.elapsed().as_millis()
                        ));
                    }
                }
                _ = &mut ctrl_c => {
                    self.logger.info("Interrupt received");
                    break Ok(());
                }
                _ = self.shutdown_rx.recv() => {
                    self.logger.info("Shutdown signal received");
                    break Ok(());
                }
            }
        };

        self.reconciler.api().close().await;
        self.logger.info(&format!(
            "Poller stopped after {} ticks ({} overruns)",
            self.total_ticks, self.overrun_count
        ));
        result
    }
}
