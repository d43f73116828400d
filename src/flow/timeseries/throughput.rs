use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::flow::stages::ComputedIssue;
use crate::flow::stats::{mean, ControlLimits};
use crate::flow::weeks::{monday_of, mondays_between, WeeklyBucket};

/// Weeks per control-limit block.
pub const BLOCK_WEEKS: usize = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputWeek {
    pub bucket: WeeklyBucket,
    pub count: usize,
    pub limits: ControlLimits,
}

impl ThroughputWeek {
    #[allow(clippy::cast_precision_loss)]
    pub fn out_of_control(&self) -> bool {
        !self.limits.contains(self.count as f64)
    }
}

/// Completed issues per ISO week with c-chart limits.
///
/// The axis runs without gaps from the first to the last completion week.
/// The week containing `now` is still accumulating and is left out.
pub fn weekly_throughput(issues: &[ComputedIssue], now: DateTime<Utc>) -> Vec<ThroughputWeek> {
    let current_week = monday_of(now);

    let mut per_week = HashMap::new();
    for end in issues.iter().filter_map(|i| i.stages.end) {
        let monday = monday_of(end);
        if monday < current_week {
            *per_week.entry(monday).or_insert(0usize) += 1;
        }
    }

    let (Some(first), Some(last)) = (
        per_week.keys().min().copied(),
        per_week.keys().max().copied(),
    ) else {
        return Vec::new();
    };

    let axis: Vec<_> = mondays_between(first, last).collect();
    let counts: Vec<usize> = axis
        .iter()
        .map(|monday| per_week.get(monday).copied().unwrap_or(0))
        .collect();
    let limits = control_limits(&counts);

    axis.into_iter()
        .zip(counts)
        .zip(limits)
        .map(|((monday, count), limits)| ThroughputWeek {
            bucket: WeeklyBucket::from_monday(monday),
            count,
            limits,
        })
        .collect()
}

/// Limits for each position of a weekly count series.
///
/// Under [`BLOCK_WEEKS`] weeks a single mean covers the whole series. Otherwise
/// every complete block gets limits from its own mean and a trailing partial
/// block reuses the limits of the block before it.
#[allow(clippy::cast_precision_loss)]
pub fn control_limits(counts: &[usize]) -> Vec<ControlLimits> {
    let values: Vec<f64> = counts.iter().map(|&c| c as f64).collect();

    if values.len() < BLOCK_WEEKS {
        let limits = ControlLimits::c_chart(mean(&values));
        return vec![limits; values.len()];
    }

    let mut out = Vec::with_capacity(values.len());
    let mut last = ControlLimits::c_chart(0.0);
    for block in values.chunks(BLOCK_WEEKS) {
        if block.len() == BLOCK_WEEKS {
            last = ControlLimits::c_chart(mean(block));
        }
        out.extend(std::iter::repeat(last).take(block.len()));
    }
    out
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::flow::stages::fixtures::at;
    use crate::flow::stages::StageTimestamps;

    fn completed(end: &str) -> ComputedIssue {
        ComputedIssue {
            id: format!("acme/api#{end}"),
            name: String::new(),
            board_id: String::new(),
            board_name: String::new(),
            created_at: at("2024-01-01T00:00:00Z"),
            stages: StageTimestamps {
                end: Some(at(end)),
                ..StageTimestamps::default()
            },
            observed: StageTimestamps::default(),
            is_bug: false,
            issue_type: "task".into(),
        }
    }

    const NOW: &str = "2025-06-01T12:00:00Z";

    mod control_limits {
        use super::*;

        #[test]
        fn spike_after_five_quiet_weeks_is_out_of_control() {
            let limits = control_limits(&[2, 3, 2, 4, 3, 20]);
            assert_eq!(limits.len(), 6);
            assert!((limits[0].center - 34.0 / 6.0).abs() < 1e-9);
            assert!(limits[5].ucl < 20.0);
            assert!(limits[0].contains(4.0));
        }

        #[test]
        fn short_series_shares_one_set_of_limits() {
            let limits = control_limits(&[1, 5, 0, 2]);
            assert!(limits.windows(2).all(|w| w[0] == w[1]));
            assert_eq!(limits[0].center, 2.0);
        }

        #[test]
        fn limits_change_only_at_block_boundaries() {
            let counts = [1, 1, 1, 1, 1, 1, 9, 9, 9, 9, 9, 9, 4, 4];
            let limits = control_limits(&counts);

            assert!(limits[..6].windows(2).all(|w| w[0] == w[1]));
            assert!(limits[6..].windows(2).all(|w| w[0] == w[1]));
            assert_ne!(limits[5], limits[6]);
            assert_eq!(limits[6].center, 9.0);
            assert_eq!(limits[13], limits[6]);
        }

        #[test]
        fn lower_limit_is_never_negative() {
            let limits = control_limits(&[0, 1, 0, 2, 1, 0, 3]);
            assert!(limits.iter().all(|l| l.lcl >= 0.0));
        }

        #[test]
        fn empty_series_has_no_limits() {
            assert!(control_limits(&[]).is_empty());
        }
    }

    #[test]
    fn axis_is_contiguous_across_empty_weeks() {
        // Weeks of 2025-01-06, 2025-01-13 (none), 2025-01-20 (none), 2025-01-27
        let issues = vec![
            completed("2025-01-07T10:00:00Z"),
            completed("2025-01-09T10:00:00Z"),
            completed("2025-01-29T10:00:00Z"),
        ];

        let weeks = weekly_throughput(&issues, at(NOW));
        let counts: Vec<_> = weeks.iter().map(|w| w.count).collect();
        assert_eq!(counts, [2, 0, 0, 1]);
        assert_eq!(
            weeks[0].bucket,
            WeeklyBucket {
                iso_year: 2025,
                iso_week: 2
            }
        );
        assert_eq!(weeks[3].bucket.iso_week, 5);
        assert!(weeks.iter().all(|w| w.limits.lcl >= 0.0));
    }

    #[test]
    fn current_week_is_excluded() {
        let issues = vec![
            completed("2025-05-20T10:00:00Z"),
            completed("2025-05-27T10:00:00Z"),
            // same week as NOW (Monday 2025-05-26)
            completed("2025-05-31T10:00:00Z"),
        ];

        let weeks = weekly_throughput(&issues, at(NOW));
        assert_eq!(weeks.len(), 1);
        assert_eq!(weeks[0].count, 1);
    }

    #[test]
    fn open_issues_do_not_count() {
        let mut open = completed("2025-01-07T10:00:00Z");
        open.stages.end = None;
        assert!(weekly_throughput(&[open], at(NOW)).is_empty());
    }

    #[test]
    fn spike_week_is_flagged() {
        let mut issues = Vec::new();
        let mondays = [
            "2025-01-06", "2025-01-13", "2025-01-20", "2025-01-27", "2025-02-03", "2025-02-10",
        ];
        for (monday, count) in mondays.iter().zip([2, 3, 2, 4, 3, 20]) {
            for _ in 0..count {
                issues.push(completed(&format!("{monday}T12:00:00Z")));
            }
        }

        let weeks = weekly_throughput(&issues, at(NOW));
        let flagged: Vec<_> = weeks.iter().map(ThroughputWeek::out_of_control).collect();
        assert_eq!(flagged, [false, false, false, false, false, true]);
    }
}
