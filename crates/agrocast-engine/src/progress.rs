//! Day callback that reports run progress through `tracing`.

use agrocast_core::orchestrator::{DayCallback, DaySummary};
use agrocast_types::StageCode;
use tracing::{debug, info};

/// Logs every day at `debug` and every stage change at `info`.
#[derive(Debug, Default)]
pub struct LogProgress {
    last_stage: Option<StageCode>,
    days: u32,
}

impl LogProgress {
    /// Days seen so far.
    pub const fn days(&self) -> u32 {
        self.days
    }
}

impl DayCallback for LogProgress {
    fn on_day(&mut self, summary: &DaySummary) {
        self.days = self.days.saturating_add(1);
        debug!(
            day = %summary.day,
            stage = %summary.stage,
            dvs = summary.development_index,
            weather_alerts = summary.weather_alerts,
            management_alerts = summary.management_alerts,
            "Day complete"
        );
        if self.last_stage.as_ref() != Some(&summary.stage) {
            info!(day = %summary.day, stage = %summary.stage, "Stage reached");
            self.last_stage = Some(summary.stage.clone());
        }
        if summary.terminated {
            info!(day = %summary.day, "Run terminated");
        }
    }
}
