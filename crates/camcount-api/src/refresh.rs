//! Periodic download-and-process loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use camcount_worker::Pipeline;

use crate::metrics;

/// Background refresh of the configured groups.
pub struct AutoRefresh {
    pipeline: Arc<Pipeline>,
    interval: Duration,
    groups: Option<Vec<String>>,
}

impl AutoRefresh {
    pub fn new(pipeline: Arc<Pipeline>, interval: Duration, groups: Option<Vec<String>>) -> Self {
        Self {
            pipeline,
            interval,
            groups,
        }
    }

    /// Run one cycle per interval, forever. A failed cycle is logged and the
    /// next one runs on schedule.
    pub async fn run(self) {
        info!(
            interval_secs = self.interval.as_secs(),
            groups = ?self.groups,
            "Auto-refresh enabled"
        );

        let mut ticker = tokio::time::interval(self.interval);
        // A slow cycle delays the next one rather than triggering a burst
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.run_once().await;
        }
    }

    async fn run_once(&self) {
        match self.pipeline.refresh(self.groups.as_deref()).await {
            Ok(reports) => {
                let processed: usize = reports.iter().map(|r| r.processed_count()).sum();
                info!(groups = reports.len(), processed, "Auto-refresh cycle finished");
                metrics::record_refresh("ok");
            }
            Err(e) => {
                error!("Auto-refresh cycle failed: {}", e);
                metrics::record_refresh("error");
            }
        }
    }
}
