pub mod board_cache;
pub mod classify;
pub mod lifecycle;
pub mod stages;
pub mod stats;
pub mod timeseries;
pub mod weeks;

use chrono::{DateTime, Utc};
use log::info;

use crate::config::Config;
use crate::insights::ImportSnapshot;

use self::stages::ComputedIssue;
use self::timeseries::{
    BoardStock, ChangeRequestStats, MonthlySummary, ThroughputWeek, WeeklyStock,
};

/// Every metric derived from one import snapshot.
#[derive(Debug, Clone)]
pub struct FlowReport {
    pub issues: Vec<ComputedIssue>,
    pub monthly: Vec<MonthlySummary>,
    pub throughput: Vec<ThroughputWeek>,
    pub stocks: Vec<BoardStock>,
    pub weekly_stocks: Vec<WeeklyStock>,
    pub change_requests: Vec<ChangeRequestStats>,
}

/// Runs stage mapping and every time-series aggregation.
///
/// `now` decides which throughput week is still accumulating.
pub fn build_report(snapshot: &ImportSnapshot, config: &Config, now: DateTime<Utc>) -> FlowReport {
    let issues = stages::compute_all(&snapshot.issues, config);
    info!(
        "Computed {} of {} issues ({} excluded)",
        issues.len(),
        snapshot.issues.len(),
        snapshot.issues.len() - issues.len()
    );

    FlowReport {
        monthly: timeseries::monthly_summary(&issues),
        throughput: timeseries::weekly_throughput(&issues, now),
        stocks: timeseries::current_stocks(&issues),
        weekly_stocks: timeseries::weekly_stocks(&issues),
        change_requests: timeseries::change_request_stats(
            &snapshot.pull_requests,
            &snapshot.reviews,
        ),
        issues,
    }
}
