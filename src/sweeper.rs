// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Expired Record Sweeper
//!
//! Background task that periodically removes expired sessions, codes, and
//! pending authorizations. Reads already ignore expired records; sweeping
//! only bounds how long they stay on disk or in memory.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::SWEEP_INTERVAL_SECS;

/// Something with expired records to remove.
pub trait SweepTarget: Send + Sync + 'static {
    /// Name used in log lines.
    fn name(&self) -> &'static str;

    /// Remove records expired at `now`; returns how many were removed.
    fn sweep(&self, now: DateTime<Utc>) -> impl Future<Output = usize> + Send;
}

/// Periodic sweeper over one target.
pub struct Sweeper<T> {
    target: T,
    interval: Duration,
}

impl<T: SweepTarget> Sweeper<T> {
    pub fn new(target: T) -> Self {
        Self {
            target,
            interval: Duration::from_secs(SWEEP_INTERVAL_SECS),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(Sweeper::new(target).run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            target_name = self.target.name(),
            interval_secs = self.interval.as_secs(),
            "Sweeper starting"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!(target_name = self.target.name(), "Sweeper shutting down");
                    return;
                }
            }

            let removed = self.target.sweep(Utc::now()).await;
            if removed > 0 {
                info!(target_name = self.target.name(), removed, "Swept expired records");
            } else {
                debug!(target_name = self.target.name(), "Nothing to sweep");
            }
        }
    }
}
