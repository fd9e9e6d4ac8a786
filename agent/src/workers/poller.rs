//! Scheduled poll worker

use std::future::Future;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::reconciler::Reconciler;
use crate::models::lock::Outcome;
use crate::workers::ShutdownSignal;

/// Poller worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Polling interval
    pub interval: Duration,

    /// Initial delay before first poll
    pub initial_delay: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            initial_delay: Duration::from_secs(5),
        }
    }
}

/// Run the poller worker. Failed cycles are retried on the next tick only.
pub async fn run<S, F>(
    options: &Options,
    reconciler: &Reconciler,
    sleep_fn: S,
    mut shutdown_signal: ShutdownSignal,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Poller worker starting...");

    let mut wait = options.initial_delay;
    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Poller worker shutting down...");
                return;
            }
            _ = sleep_fn(wait) => {}
        }
        wait = options.interval;

        debug!("Polling for status...");

        // A shutdown mid-cycle abandons the cycle; the store is only ever
        // replaced atomically so nothing is left half-written.
        let outcome = tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Poller worker shutting down...");
                return;
            }
            outcome = reconciler.poll_cycle() => outcome,
        };

        match outcome.outcome {
            Outcome::Failed => warn!(
                "Poll cycle failed after {}ms, retrying in {:?}: {}",
                outcome.duration_millis, options.interval, outcome.error_detail
            ),
            Outcome::Applied => info!("Poll cycle applied a command in {}ms", outcome.duration_millis),
            Outcome::NoData => debug!("Poll cycle finished: {:?}", outcome.skipped),
        }
    }
}
