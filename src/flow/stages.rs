use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::{BoardConfig, Config};
use crate::insights::{BoardMoveEvent, IssueReport, MoveKind, StatusKind};

/// Process stages a board column can mark the start of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Lead,
    Cycle,
    Dev,
    Review,
    Qa,
    Ready,
    WaitingToProd,
    InProd,
}

/// Default column vocabulary for boards without a mapping.
fn fallback_columns(stage: Stage) -> &'static [&'static str] {
    match stage {
        Stage::Lead => &["Backlog", "Ready"],
        Stage::Cycle | Stage::Dev => &["In Progress"],
        Stage::Review => &["In Review"],
        Stage::Qa => &[],
        Stage::Ready => &["Ready"],
        Stage::WaitingToProd => &["Done"],
        Stage::InProd => &["Archive"],
    }
}

fn same_column(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Column to stage rules in effect for one board.
#[derive(Debug, Clone, Copy)]
pub enum StageRules<'a> {
    Configured(&'a BoardConfig),
    /// No mapping exists for the board.
    Fallback,
}

impl<'a> StageRules<'a> {
    pub fn for_board(config: &'a Config, board_id: &str, board_name: &str) -> Self {
        match config.board(board_id, board_name) {
            Some(board) => Self::Configured(board),
            None => {
                debug!("No stage mapping for board '{board_name}' ({board_id}), using defaults");
                Self::Fallback
            }
        }
    }

    pub fn accepts(&self, stage: Stage, column: &str) -> bool {
        match self {
            Self::Configured(board) => board.columns(stage).iter().any(|c| same_column(c, column)),
            Self::Fallback => fallback_columns(stage)
                .iter()
                .any(|c| same_column(c, column)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTimestamps {
    pub lead_start: Option<DateTime<Utc>>,
    pub cycle_start: Option<DateTime<Utc>>,
    pub dev_start: Option<DateTime<Utc>>,
    pub review_start: Option<DateTime<Utc>>,
    pub qa_start: Option<DateTime<Utc>>,
    pub ready_start: Option<DateTime<Utc>>,
    pub waiting_to_prod_start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl StageTimestamps {
    /// Missing earlier stages inherit from later ones on completed issues.
    fn backfill(&mut self) {
        self.lead_start = self.lead_start.or(self.cycle_start).or(self.dev_start);
        self.cycle_start = self.cycle_start.or(self.lead_start);
        self.dev_start = self.dev_start.or(self.cycle_start);
    }

    /// Latest timestamp of any stage, including completion.
    pub fn latest(&self) -> Option<DateTime<Utc>> {
        [
            self.lead_start,
            self.cycle_start,
            self.dev_start,
            self.review_start,
            self.qa_start,
            self.ready_start,
            self.waiting_to_prod_start,
            self.end,
        ]
        .into_iter()
        .flatten()
        .max()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedIssue {
    /// `org/repo#number`
    pub id: String,
    pub name: String,
    pub board_id: String,
    pub board_name: String,
    pub created_at: DateTime<Utc>,
    /// Stage starts with gaps backfilled on completed issues, for durations.
    pub stages: StageTimestamps,
    /// Stage starts exactly as seen on the board, for stock reconstruction.
    pub observed: StageTimestamps,
    pub is_bug: bool,
    pub issue_type: String,
}

/// Maps an issue's board history onto stage timestamps.
///
/// The board of the first `moved` event decides which mapping applies, so a
/// board that only ever added the issue does not hide the one it moves on.
/// Each stage takes the time of the earliest `moved` event, on any of the
/// issue's boards, into one of its columns.
/// Returns `None` when the board is excluded or the issue type is filtered out.
pub fn compute(report: &IssueReport, config: &Config) -> Option<ComputedIssue> {
    let mut history: Vec<&BoardMoveEvent> = report.lifecycle.board_history.iter().collect();
    history.sort_by_key(|e| e.at);

    let (board_id, board_name) = history
        .iter()
        .find(|e| e.kind == MoveKind::Moved)
        .or_else(|| history.first())
        .map(|e| (e.board_id.clone(), e.board_name.clone()))
        .unwrap_or_default();

    let rules = StageRules::for_board(config, &board_id, &board_name);
    if let StageRules::Configured(board) = rules {
        if board.exclude {
            debug!("{}: board '{}' is excluded", report.record.key(), board.name);
            return None;
        }
        if !board.allows_type(&report.issue_type) {
            debug!(
                "{}: type '{}' filtered out by board '{}'",
                report.record.key(),
                report.issue_type,
                board.name
            );
            return None;
        }
    }

    let moves: Vec<&BoardMoveEvent> = history
        .into_iter()
        .filter(|e| e.kind == MoveKind::Moved)
        .collect();
    let first_move = |stage: Stage| {
        moves
            .iter()
            .find(|e| rules.accepts(stage, &e.to_stage))
            .map(|e| e.at)
    };

    let first_closed = report
        .lifecycle
        .status_history
        .iter()
        .filter(|e| e.kind == StatusKind::Closed)
        .map(|e| e.at)
        .min();

    let observed = StageTimestamps {
        lead_start: first_move(Stage::Lead),
        cycle_start: first_move(Stage::Cycle),
        dev_start: first_move(Stage::Dev),
        review_start: first_move(Stage::Review),
        qa_start: first_move(Stage::Qa),
        ready_start: first_move(Stage::Ready),
        waiting_to_prod_start: first_move(Stage::WaitingToProd),
        end: earliest(first_move(Stage::InProd), first_closed),
    };
    let mut stages = observed.clone();
    if stages.end.is_some() {
        stages.backfill();
    }

    Some(ComputedIssue {
        id: report.record.key(),
        name: report.record.title.clone(),
        board_id,
        board_name,
        created_at: report.record.created_at,
        stages,
        observed,
        is_bug: report.is_bug,
        issue_type: report.issue_type.clone(),
    })
}

/// Computes every issue that survives exclusion, sorted by id.
pub fn compute_all(reports: &[IssueReport], config: &Config) -> Vec<ComputedIssue> {
    let mut computed: Vec<ComputedIssue> = reports
        .iter()
        .filter_map(|report| compute(report, config))
        .collect();
    computed.sort_by(|a, b| a.id.cmp(&b.id));
    computed
}

fn earliest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{at, moved, report};
    use super::*;

    fn configured(board: BoardConfig) -> Config {
        let mut config = Config::default();
        config.github.boards = vec![board];
        config
    }

    fn delivery_board() -> BoardConfig {
        BoardConfig {
            id: "B1".into(),
            name: "Delivery".into(),
            lead_time_columns: vec!["Todo".into()],
            cycle_time_columns: vec!["Doing".into()],
            dev_start_columns: vec!["Doing".into()],
            review_start_columns: vec!["Review".into()],
            in_prod_columns: vec!["Shipped".into()],
            ..BoardConfig::default()
        }
    }

    #[test]
    fn fallback_vocabulary_reproduces_cycle_time_scenario() {
        let issue = report(
            "2025-01-01T00:00:00Z",
            vec![
                moved("B9", "In Progress", "2025-01-05T00:00:00Z"),
                moved("B9", "In Review", "2025-01-10T00:00:00Z"),
            ],
            &["2025-01-15T00:00:00Z"],
        );

        let computed = compute(&issue, &Config::default()).unwrap();
        let stages = &computed.stages;
        assert_eq!(stages.cycle_start, Some(at("2025-01-05T00:00:00Z")));
        assert_eq!(stages.review_start, Some(at("2025-01-10T00:00:00Z")));
        assert_eq!(stages.end, Some(at("2025-01-15T00:00:00Z")));

        let cycle = stages.end.unwrap() - stages.cycle_start.unwrap();
        assert_eq!(cycle.num_days(), 10);
    }

    #[test]
    fn first_match_wins_by_time_not_list_order() {
        let issue = report(
            "2025-01-01T00:00:00Z",
            vec![
                moved("B1", "Doing", "2025-01-09T00:00:00Z"),
                moved("B1", "Doing", "2025-01-03T00:00:00Z"),
            ],
            &[],
        );

        let computed = compute(&issue, &configured(delivery_board())).unwrap();
        assert_eq!(computed.stages.dev_start, Some(at("2025-01-03T00:00:00Z")));
        assert_eq!(computed.stages.end, None);
    }

    #[test]
    fn end_is_the_earlier_of_in_prod_and_first_close() {
        let config = configured(delivery_board());

        let shipped_first = report(
            "2025-01-01T00:00:00Z",
            vec![moved("B1", "Shipped", "2025-01-10T00:00:00Z")],
            &["2025-01-12T00:00:00Z", "2025-01-20T00:00:00Z"],
        );
        let closed_first = report(
            "2025-01-01T00:00:00Z",
            vec![moved("B1", "Shipped", "2025-01-10T00:00:00Z")],
            &["2025-01-08T00:00:00Z"],
        );

        let a = compute(&shipped_first, &config).unwrap();
        let b = compute(&closed_first, &config).unwrap();
        assert_eq!(a.stages.end, Some(at("2025-01-10T00:00:00Z")));
        assert_eq!(b.stages.end, Some(at("2025-01-08T00:00:00Z")));
    }

    #[test]
    fn column_names_match_trimmed_and_case_insensitive() {
        let issue = report(
            "2025-01-01T00:00:00Z",
            vec![moved("B1", "  review ", "2025-01-04T00:00:00Z")],
            &[],
        );
        let computed = compute(&issue, &configured(delivery_board())).unwrap();
        assert_eq!(computed.stages.review_start, Some(at("2025-01-04T00:00:00Z")));
    }

    #[test]
    fn empty_stage_list_never_matches() {
        let issue = report(
            "2025-01-01T00:00:00Z",
            vec![moved("B1", "QA", "2025-01-04T00:00:00Z")],
            &[],
        );
        let computed = compute(&issue, &configured(delivery_board())).unwrap();
        assert_eq!(computed.stages.qa_start, None);
    }

    #[test]
    fn completed_issue_backfills_missing_earlier_stages() {
        let issue = report(
            "2025-01-01T00:00:00Z",
            vec![moved("B1", "Todo", "2025-01-02T00:00:00Z")],
            &["2025-01-09T00:00:00Z"],
        );
        let computed = compute(&issue, &configured(delivery_board())).unwrap();
        let stages = computed.stages;
        assert_eq!(stages.cycle_start, stages.lead_start);
        assert_eq!(stages.dev_start, stages.lead_start);

        let skipped_lead = report(
            "2025-01-01T00:00:00Z",
            vec![moved("B1", "Doing", "2025-01-04T00:00:00Z")],
            &["2025-01-09T00:00:00Z"],
        );
        let computed = compute(&skipped_lead, &configured(delivery_board())).unwrap();
        assert_eq!(computed.stages.lead_start, Some(at("2025-01-04T00:00:00Z")));
    }

    #[test]
    fn open_issue_is_not_backfilled() {
        let issue = report(
            "2025-01-01T00:00:00Z",
            vec![moved("B1", "Todo", "2025-01-02T00:00:00Z")],
            &[],
        );
        let computed = compute(&issue, &configured(delivery_board())).unwrap();
        assert!(computed.stages.dev_start.is_none());
        assert!(computed.stages.cycle_start.is_none());
    }

    #[test]
    fn excluded_board_drops_issue() {
        let board = BoardConfig {
            exclude: true,
            ..delivery_board()
        };
        let issue = report(
            "2025-01-01T00:00:00Z",
            vec![moved("B1", "Todo", "2025-01-02T00:00:00Z")],
            &[],
        );
        assert!(compute(&issue, &configured(board)).is_none());
    }

    #[test]
    fn type_filter_drops_other_types() {
        let board = BoardConfig {
            types: vec!["bug".into()],
            ..delivery_board()
        };
        let mut issue = report(
            "2025-01-01T00:00:00Z",
            vec![moved("B1", "Todo", "2025-01-02T00:00:00Z")],
            &[],
        );
        assert!(compute(&issue, &configured(board.clone())).is_none());

        issue.issue_type = "Bug".into();
        assert!(compute(&issue, &configured(board)).is_some());
    }

    #[test]
    fn fallback_archive_completes_issue() {
        let issue = report(
            "2025-01-01T00:00:00Z",
            vec![moved("B9", "Archive", "2025-01-06T00:00:00Z")],
            &[],
        );
        let computed = compute(&issue, &Config::default()).unwrap();
        assert_eq!(computed.stages.end, Some(at("2025-01-06T00:00:00Z")));
    }

    #[test]
    fn added_only_board_does_not_hide_moves_elsewhere() {
        let mut roadmap = moved("R1", "Q1", "2025-01-01T12:00:00Z");
        roadmap.kind = MoveKind::Added;
        let issue = report(
            "2025-01-01T00:00:00Z",
            vec![
                roadmap,
                moved("B1", "Doing", "2025-01-03T00:00:00Z"),
                moved("B1", "Review", "2025-01-06T00:00:00Z"),
            ],
            &[],
        );

        let computed = compute(&issue, &configured(delivery_board())).unwrap();
        assert_eq!(computed.board_id, "B1");
        assert_eq!(computed.stages.dev_start, Some(at("2025-01-03T00:00:00Z")));
        assert_eq!(computed.stages.review_start, Some(at("2025-01-06T00:00:00Z")));
    }

    #[test]
    fn issue_without_board_events_uses_close_only() {
        let issue = report("2025-01-01T00:00:00Z", vec![], &["2025-01-03T00:00:00Z"]);
        let computed = compute(&issue, &Config::default()).unwrap();
        assert_eq!(computed.board_id, "");
        assert_eq!(computed.stages.end, Some(at("2025-01-03T00:00:00Z")));
        assert_eq!(computed.stages.lead_start, None);
    }

    #[test]
    fn compute_all_sorts_by_id() {
        let mut a = report("2025-01-01T00:00:00Z", vec![], &[]);
        a.record.number = 20;
        let mut b = report("2025-01-01T00:00:00Z", vec![], &[]);
        b.record.number = 3;

        let computed = compute_all(&[a, b], &Config::default());
        let ids: Vec<_> = computed.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["acme/api#20", "acme/api#3"]);
    }
}
