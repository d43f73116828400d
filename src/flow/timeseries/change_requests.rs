use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::flow::stats::{mean, percentile};
use crate::flow::weeks::WeeklyBucket;
use crate::insights::{PullRequestRecord, ReviewRecord};

/// Repository label of the cross-repository rollup row.
pub const ALL_REPOS: &str = "ALL";

const CHANGES_REQUESTED: &str = "CHANGES_REQUESTED";

/// Distribution of "changes requested" reviews per pull request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRequestStats {
    pub bucket: WeeklyBucket,
    pub repo: String,
    pub mean: f64,
    pub median: f64,
    pub p90: f64,
    pub pr_count: usize,
    pub total_change_requests: usize,
}

/// Per ISO week of PR creation and per repository, followed by an
/// [`ALL_REPOS`] row for the week.
pub fn change_request_stats(
    pull_requests: &[PullRequestRecord],
    reviews: &[ReviewRecord],
) -> Vec<ChangeRequestStats> {
    let mut requested: HashMap<(&str, &str, u64), usize> = HashMap::new();
    for review in reviews
        .iter()
        .filter(|r| r.state.eq_ignore_ascii_case(CHANGES_REQUESTED))
    {
        *requested
            .entry((review.org.as_str(), review.repo.as_str(), review.number))
            .or_default() += 1;
    }

    let mut weeks: BTreeMap<WeeklyBucket, BTreeMap<&str, Vec<usize>>> = BTreeMap::new();
    for pr in pull_requests {
        let count = requested
            .get(&(pr.org.as_str(), pr.repo.as_str(), pr.number))
            .copied()
            .unwrap_or(0);
        weeks
            .entry(WeeklyBucket::of(pr.created_at))
            .or_default()
            .entry(pr.repo.as_str())
            .or_default()
            .push(count);
    }

    let mut out = Vec::new();
    for (bucket, repos) in weeks {
        let mut all = Vec::new();
        for (repo, counts) in repos {
            all.extend_from_slice(&counts);
            out.push(summarize(bucket, repo, &counts));
        }
        out.push(summarize(bucket, ALL_REPOS, &all));
    }
    out
}

#[allow(clippy::cast_precision_loss)]
fn summarize(bucket: WeeklyBucket, repo: &str, counts: &[usize]) -> ChangeRequestStats {
    let values: Vec<f64> = counts.iter().map(|&c| c as f64).collect();
    ChangeRequestStats {
        bucket,
        repo: repo.to_string(),
        mean: mean(&values),
        median: percentile(&values, 50),
        p90: percentile(&values, 90),
        pr_count: counts.len(),
        total_change_requests: counts.iter().sum(),
    }
}
