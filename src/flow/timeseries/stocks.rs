use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::flow::stages::{ComputedIssue, StageTimestamps};
use crate::flow::weeks::{monday_of, mondays_between, week_cutoff, WeeklyBucket};

/// Work-in-progress bucket of an open issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StockStage {
    Backlog,
    Ready,
    Dev,
    Review,
    Qa,
    WaitingToProd,
}

impl StockStage {
    /// Furthest stage reached, considering only timestamps at or before `cutoff`.
    pub fn classify(stages: &StageTimestamps, cutoff: Option<DateTime<Utc>>) -> Self {
        let reached = |ts: Option<DateTime<Utc>>| ts.is_some_and(|t| cutoff.map_or(true, |c| t <= c));

        if reached(stages.waiting_to_prod_start) {
            Self::WaitingToProd
        } else if reached(stages.qa_start) {
            Self::Qa
        } else if reached(stages.review_start) {
            Self::Review
        } else if reached(stages.dev_start) {
            Self::Dev
        } else if reached(stages.ready_start) {
            Self::Ready
        } else {
            Self::Backlog
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockCounts {
    /// Open issues flagged as bugs, whatever their stage
    pub defects: usize,
    pub backlog: usize,
    pub ready: usize,
    pub dev: usize,
    pub review: usize,
    pub qa: usize,
    pub waiting_to_prod: usize,
}

impl StockCounts {
    pub fn add(&mut self, stage: StockStage, is_bug: bool) {
        if is_bug {
            self.defects += 1;
        }
        let bucket = match stage {
            StockStage::Backlog => &mut self.backlog,
            StockStage::Ready => &mut self.ready,
            StockStage::Dev => &mut self.dev,
            StockStage::Review => &mut self.review,
            StockStage::Qa => &mut self.qa,
            StockStage::WaitingToProd => &mut self.waiting_to_prod,
        };
        *bucket += 1;
    }

    /// Issues across all stage buckets.
    pub fn total(&self) -> usize {
        self.backlog + self.ready + self.dev + self.review + self.qa + self.waiting_to_prod
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardStock {
    pub board_id: String,
    pub board_name: String,
    pub counts: StockCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyStock {
    pub bucket: WeeklyBucket,
    pub board_id: String,
    pub board_name: String,
    pub counts: StockCounts,
}

fn tally<'a>(
    issues: impl Iterator<Item = &'a ComputedIssue>,
    cutoff: Option<DateTime<Utc>>,
) -> Vec<BoardStock> {
    let mut boards: BTreeMap<&str, BoardStock> = BTreeMap::new();

    for issue in issues {
        let stock = boards
            .entry(issue.board_id.as_str())
            .or_insert_with(|| BoardStock {
                board_id: issue.board_id.clone(),
                board_name: String::new(),
                counts: StockCounts::default(),
            });
        if stock.board_name.is_empty() {
            stock.board_name.clone_from(&issue.board_name);
        }
        stock
            .counts
            .add(StockStage::classify(&issue.observed, cutoff), issue.is_bug);
    }

    boards.into_values().collect()
}

/// Open issues per board, each in its furthest reached stage.
pub fn current_stocks(issues: &[ComputedIssue]) -> Vec<BoardStock> {
    tally(issues.iter().filter(|i| i.stages.end.is_none()), None)
}

/// Stock per board as it stood at the end of every week.
///
/// Weeks run from the earliest creation to the latest timestamp seen on any
/// issue. For each Sunday 23:59:59 UTC cutoff, issues not yet created or
/// already completed are skipped and the rest are classified using only the
/// stage timestamps known by then.
pub fn weekly_stocks(issues: &[ComputedIssue]) -> Vec<WeeklyStock> {
    let first = issues.iter().map(|i| i.created_at).min();
    let last = issues
        .iter()
        .filter_map(|i| i.stages.latest().max(Some(i.created_at)))
        .max();
    let (Some(first), Some(last)) = (first, last) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for monday in mondays_between(monday_of(first), monday_of(last)) {
        let cutoff = week_cutoff(monday);
        let in_progress = issues.iter().filter(|i| {
            i.created_at <= cutoff && i.stages.end.map_or(true, |end| end > cutoff)
        });

        let bucket = WeeklyBucket::from_monday(monday);
        out.extend(
            tally(in_progress, Some(cutoff))
                .into_iter()
                .map(|stock| WeeklyStock {
                    bucket,
                    board_id: stock.board_id,
                    board_name: stock.board_name,
                    counts: stock.counts,
                }),
        );
    }
    out
}
