mod change_requests;
mod monthly;
mod stocks;
mod throughput;

use chrono::{DateTime, Utc};

pub use change_requests::{change_request_stats, ChangeRequestStats};
pub use monthly::{monthly_summary, MonthlySummary};
pub use stocks::{current_stocks, weekly_stocks, BoardStock, StockCounts, WeeklyStock};
pub use throughput::{weekly_throughput, ThroughputWeek};

#[allow(clippy::cast_precision_loss)]
fn days_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_seconds() as f64 / 86_400.0
}
