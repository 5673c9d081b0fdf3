// src/cron/mod.rs
pub mod cron_parser;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::error::SweepError;
use crate::relay::RelaySweeper;

pub use cron_parser::CronParser;

/// Runs a relay sweep every `period`, first one `period` from now, until the
/// shutdown signal flips.
pub fn spawn_relay_schedule(
    sweeper: Arc<RelaySweeper>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(period_secs = period.as_secs(), "relay schedule started");
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while !*shutdown.borrow() {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            match sweeper.sweep().await {
                Ok(report) if !report.is_clean() => warn!(
                    corrupt = report.corrupt.len(),
                    failed = report.failed.len(),
                    "relay sweep left records behind"
                ),
                Ok(_) => {}
                Err(SweepError::AlreadyRunning) => warn!("previous relay sweep still running, tick skipped"),
                Err(err) => error!(error = %err, "relay sweep failed"),
            }
        }
    })
}
