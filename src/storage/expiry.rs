//! Background Expiry Sweeper
//!
//! This module implements the janitor: a background task that sweeps the TTL
//! index on a fixed cadence and removes keys whose expiration has passed.
//! Reads never expire keys on their own, so without a running sweeper expired
//! keys stay readable.
//!
//! ## Design
//!
//! The sweeper runs as a Tokio task and, once per interval:
//! 1. Sweeps the engine (one write-locked pass over the TTL index)
//! 2. Measures how long the sweep took
//! 3. Sleeps for the rest of the interval, or not at all if the sweep overran
//! 4. Stops as soon as its handle is stopped or dropped

use crate::storage::StorageEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// Default time between the start of two sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Interval between sweep starts (default: 1s)
    pub interval: Duration,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl ExpiryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sweep interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// A handle to the running expiry sweeper.
///
/// When this handle is dropped, the sweeper task will be stopped.
#[derive(Debug)]
pub struct ExpirySweeper {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,
    /// The sweeper task, taken by `shutdown`
    task: Option<JoinHandle<()>>,
}

impl ExpirySweeper {
    /// Starts the expiry sweeper as a background task.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use duokv::storage::{ExpiryConfig, ExpirySweeper, StorageEngine};
    /// use std::sync::Arc;
    ///
    /// let engine = Arc::new(StorageEngine::new());
    /// let sweeper = ExpirySweeper::start(engine, ExpiryConfig::default());
    ///
    /// // Sweeper runs in the background...
    ///
    /// sweeper.shutdown().await;
    /// ```
    pub fn start(engine: Arc<StorageEngine>, config: ExpiryConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            interval_ms = config.interval.as_millis() as u64,
            "Background expiry sweeper started"
        );
        let task = tokio::spawn(sweeper_loop(engine, config, shutdown_rx));

        Self {
            shutdown_tx,
            task: Some(task),
        }
    }

    /// Signals the sweeper to stop. Does not wait for the task to exit.
    ///
    /// This is called automatically when the handle is dropped.
    pub fn stop(&self) {
        let already_stopped = self.shutdown_tx.send_replace(true);
        if !already_stopped {
            info!("Background expiry sweeper stopped");
        }
    }

    /// Stops the sweeper and waits until its task has exited.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Expiry sweeper task ended abnormally");
            }
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The main sweeper loop.
async fn sweeper_loop(
    engine: Arc<StorageEngine>,
    config: ExpiryConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow_and_update() {
            debug!("Expiry sweeper received shutdown signal");
            return;
        }

        let started = Instant::now();

        match engine.sweep_expired() {
            Ok(report) if report.drained > 0 => {
                debug!(
                    drained = report.drained,
                    evicted = report.evicted,
                    keys_remaining = engine.len(),
                    "Expired keys swept"
                );
            }
            Ok(_) => trace!("Sweep found nothing due"),
            Err(e) => {
                error!(error = %e, "Expiry sweep failed, stopping sweeper");
                return;
            }
        }

        // Sleep only what is left of the interval so sweeps don't drift
        let pause = config.interval.saturating_sub(started.elapsed());

        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry sweeper received shutdown signal");
                    return;
                }
            }
        }
    }
}
