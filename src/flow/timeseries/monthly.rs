use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::days_between;
use crate::flow::stages::ComputedIssue;
use crate::flow::stats::mean;

/// Average lead and cycle time of the issues completed in one month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlySummary {
    /// `YYYY-MM` of the completion timestamp, UTC
    pub month: String,
    pub issue_count: usize,
    pub lead_avg_days: f64,
    pub lead_count: usize,
    pub cycle_avg_days: f64,
    pub cycle_count: usize,
    pub time_to_review_avg: f64,
}

#[derive(Default)]
struct Totals {
    issues: usize,
    lead: Vec<f64>,
    cycle: Vec<f64>,
    review_wait: Vec<f64>,
}

/// Groups completed issues by completion month.
///
/// Each average skips issues missing the stage it measures from.
/// `time_to_review_avg` averages `review_start - dev_start` where both exist
/// and the difference is not negative.
pub fn monthly_summary(issues: &[ComputedIssue]) -> Vec<MonthlySummary> {
    let mut months: BTreeMap<String, Totals> = BTreeMap::new();

    for issue in issues {
        let Some(end) = issue.stages.end else {
            continue;
        };
        let totals = months.entry(end.format("%Y-%m").to_string()).or_default();
        totals.issues += 1;

        if let Some(start) = issue.stages.lead_start {
            totals.lead.push(days_between(start, end));
        }
        if let Some(start) = issue.stages.cycle_start {
            totals.cycle.push(days_between(start, end));
        }
        if let Some(wait) = review_wait(issue.stages.dev_start, issue.stages.review_start) {
            totals.review_wait.push(wait);
        }
    }

    months
        .into_iter()
        .map(|(month, totals)| MonthlySummary {
            month,
            issue_count: totals.issues,
            lead_avg_days: mean(&totals.lead),
            lead_count: totals.lead.len(),
            cycle_avg_days: mean(&totals.cycle),
            cycle_count: totals.cycle.len(),
            time_to_review_avg: mean(&totals.review_wait),
        })
        .collect()
}

fn review_wait(dev: Option<DateTime<Utc>>, review: Option<DateTime<Utc>>) -> Option<f64> {
    let wait = days_between(dev?, review?);
    (wait >= 0.0).then_some(wait)
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::flow::stages::compute;
    use crate::flow::stages::fixtures::{moved, report};

    #[test]
    fn cycle_time_of_january_scenario_is_ten_days() {
        let issue = report(
            "2025-01-01T00:00:00Z",
            vec![
                moved("B9", "In Progress", "2025-01-05T00:00:00Z"),
                moved("B9", "In Review", "2025-01-10T00:00:00Z"),
            ],
            &["2025-01-15T00:00:00Z"],
        );
        let computed = compute(&issue, &Config::default()).unwrap();

        let summary = monthly_summary(&[computed]);
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].month, "2025-01");
        assert_eq!(summary[0].issue_count, 1);
        assert_eq!(summary[0].cycle_count, 1);
        assert_eq!(summary[0].cycle_avg_days, 10.0);
        assert_eq!(summary[0].time_to_review_avg, 5.0);
    }

    #[test]
    fn open_issues_are_ignored_and_months_sorted() {
        let feb = report(
            "2025-01-20T00:00:00Z",
            vec![moved("B9", "Backlog", "2025-01-21T00:00:00Z")],
            &["2025-02-04T00:00:00Z"],
        );
        let jan = report("2025-01-01T00:00:00Z", vec![], &["2025-01-03T00:00:00Z"]);
        let open = report("2025-01-01T00:00:00Z", vec![], &[]);

        let computed: Vec<_> = [feb, jan, open]
            .iter()
            .filter_map(|r| compute(r, &Config::default()))
            .collect();
        let summary = monthly_summary(&computed);

        let months: Vec<_> = summary.iter().map(|m| m.month.as_str()).collect();
        assert_eq!(months, ["2025-01", "2025-02"]);
        // January issue has no board history, so no stage to measure from
        assert_eq!(summary[0].lead_count, 0);
        assert_eq!(summary[0].lead_avg_days, 0.0);
        assert_eq!(summary[1].lead_count, 1);
        assert_eq!(summary[1].lead_avg_days, 14.0);
    }

    #[test]
    fn negative_review_wait_is_skipped() {
        let dev = "2025-01-10T00:00:00Z".parse().ok();
        let review = "2025-01-05T00:00:00Z".parse().ok();
        assert_eq!(review_wait(dev, review), None);
        assert_eq!(review_wait(review, dev), Some(5.0));
        assert_eq!(review_wait(None, dev), None);
    }
}
