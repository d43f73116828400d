use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub org: String,
    pub name: String,
    pub owner: String,
    pub private: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
}

impl IssueState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

/// Issue as delivered by the source at ingestion time. Never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueRecord {
    pub org: String,
    pub repo: String,
    pub number: u64,
    pub title: String,
    pub url: String,
    pub creator: String,
    pub assignees: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub state: IssueState,
    pub closed_at: Option<DateTime<Utc>>,
    pub labels: Vec<String>,
    /// Structured issue type, when the tracker provides one.
    pub issue_type: Option<String>,
}

impl IssueRecord {
    /// Stable identifier in the form `org/repo#number`.
    pub fn key(&self) -> String {
        format!("{}/{}#{}", self.org, self.repo, self.number)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Opened,
    Closed,
    Reopened,
}

impl StatusKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Opened => "opened",
            Self::Closed => "closed",
            Self::Reopened => "reopened",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub kind: StatusKind,
    pub at: DateTime<Utc>,
    pub actor: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveKind {
    Added,
    Moved,
    Removed,
}

impl MoveKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Moved => "moved",
            Self::Removed => "removed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardMoveEvent {
    pub board_id: String,
    pub board_name: String,
    pub from_stage: String,
    pub to_stage: String,
    pub at: DateTime<Utc>,
    pub actor: String,
    pub kind: MoveKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentBoardPlacement {
    pub board_id: String,
    pub board_name: String,
    pub stage: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lifecycle {
    pub status_history: Vec<StatusEvent>,
    pub board_history: Vec<BoardMoveEvent>,
    pub current_placements: Vec<CurrentBoardPlacement>,
    /// Actor of the first `closed` event.
    pub completer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueReport {
    pub record: IssueRecord,
    pub lifecycle: Lifecycle,
    pub issue_type: String,
    pub is_bug: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequestRecord {
    pub org: String,
    pub repo: String,
    pub number: u64,
    pub title: String,
    pub url: String,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
    pub creator: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub org: String,
    pub repo: String,
    pub number: u64,
    pub state: String,
    pub submitted_at: Option<DateTime<Utc>>,
    pub reviewer: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImportScope {
    Issues,
    PullRequests,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryFailure {
    pub repo: String,
    pub scope: ImportScope,
    pub error: String,
}

/// Everything one `import` run collected, persisted for `calculate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSnapshot {
    pub org: String,
    pub collected_at: DateTime<Utc>,
    pub repositories: Vec<Repository>,
    pub issues: Vec<IssueReport>,
    pub pull_requests: Vec<PullRequestRecord>,
    pub reviews: Vec<ReviewRecord>,
    #[serde(default)]
    pub failures: Vec<RepositoryFailure>,
}
