//! Wire shapes of the GitHub REST and GraphQL payloads and their mapping
//! onto the domain records.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::flow::board_cache::{BoardInfo, ColumnInfo};
use crate::flow::lifecycle::{BoardAddress, TimelineEvent};
use crate::insights::{
    IssueRecord, IssueState, MoveKind, PullRequestRecord, Repository, ReviewRecord,
};

/// Login GitHub shows for deleted accounts.
pub const GHOST: &str = "ghost";

#[derive(Debug, Clone, Deserialize)]
pub struct Actor {
    pub login: String,
}

fn login(actor: Option<Actor>) -> String {
    actor.map_or_else(|| GHOST.to_string(), |a| a.login)
}

#[derive(Debug, Clone, Deserialize)]
pub struct Nodes<T> {
    #[serde(default = "Vec::new")]
    pub nodes: Vec<Option<T>>,
}

impl<T> Default for Nodes<T> {
    fn default() -> Self {
        Self { nodes: Vec::new() }
    }
}

impl<T> Nodes<T> {
    fn into_vec(self) -> Vec<T> {
        self.nodes.into_iter().flatten().collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Named {
    pub name: String,
}

// ---------------------------------------------------------------------------
// GraphQL
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryNode {
    pub name: String,
    #[serde(default)]
    pub is_private: bool,
    pub owner: Actor,
}

impl RepositoryNode {
    pub fn into_repository(self, org: &str) -> Repository {
        Repository {
            org: org.to_string(),
            name: self.name,
            owner: self.owner.login,
            private: self.is_private,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueNode {
    pub number: u64,
    pub title: String,
    pub state: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub author: Option<Actor>,
    #[serde(default)]
    pub assignees: Nodes<Actor>,
    #[serde(default)]
    pub labels: Nodes<Named>,
    pub issue_type: Option<Named>,
}

impl IssueNode {
    pub fn into_record(self, org: &str, repo: &str) -> IssueRecord {
        let state = if self.state.eq_ignore_ascii_case("closed") {
            IssueState::Closed
        } else {
            IssueState::Open
        };

        IssueRecord {
            org: org.to_string(),
            repo: repo.to_string(),
            number: self.number,
            title: self.title,
            url: self.url,
            creator: login(self.author),
            assignees: self.assignees.into_vec().into_iter().map(|a| a.login).collect(),
            created_at: self.created_at,
            state,
            closed_at: self.closed_at,
            labels: self.labels.into_vec().into_iter().map(|l| l.name).collect(),
            issue_type: self.issue_type.map(|t| t.name),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRef {
    /// `BigInt` scalar, delivered as a string
    pub full_database_id: Option<serde_json::Value>,
    pub title: Option<String>,
}

impl ProjectRef {
    fn id(&self) -> String {
        match &self.full_database_id {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => String::new(),
        }
    }
}

/// One entry of the status-field board timeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectTimelineNode {
    #[serde(rename = "__typename")]
    pub typename: String,
    pub created_at: Option<DateTime<Utc>>,
    pub actor: Option<Actor>,
    pub project: Option<ProjectRef>,
    pub status: Option<String>,
    pub previous_status: Option<String>,
}

impl ProjectTimelineNode {
    pub fn into_event(self) -> Option<TimelineEvent> {
        let kind = match self.typename.as_str() {
            "AddedToProjectV2Event" => MoveKind::Added,
            "ProjectV2ItemStatusChangedEvent" => MoveKind::Moved,
            "RemovedFromProjectV2Event" => MoveKind::Removed,
            _ => return None,
        };
        let at = self.created_at?;
        let project = self.project?;

        Some(TimelineEvent::Board {
            at,
            actor: login(self.actor),
            kind,
            address: BoardAddress::Status {
                board_id: project.id(),
                board_name: project.title.unwrap_or_default(),
                status: self.status.filter(|s| !s.is_empty()),
                previous_status: self.previous_status.filter(|s| !s.is_empty()),
            },
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestNode {
    pub number: u64,
    pub title: String,
    pub url: String,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
    pub author: Option<Actor>,
}

impl PullRequestNode {
    pub fn into_record(self, org: &str, repo: &str) -> PullRequestRecord {
        PullRequestRecord {
            org: org.to_string(),
            repo: repo.to_string(),
            number: self.number,
            title: self.title,
            url: self.url,
            state: self.state.to_uppercase(),
            created_at: self.created_at,
            closed_at: self.closed_at,
            merged_at: self.merged_at,
            creator: login(self.author),
        }
    }
}

// ---------------------------------------------------------------------------
// REST
// ---------------------------------------------------------------------------

/// Legacy project card attached to a timeline event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectCard {
    pub column_id: Option<u64>,
    pub project_id: Option<u64>,
    pub column_name: Option<String>,
    pub previous_column_name: Option<String>,
    pub project_url: Option<String>,
}

/// Everything is optional: the timeline mixes dozens of event shapes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RestTimelineEvent {
    pub event: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub actor: Option<Actor>,
    pub project_card: Option<ProjectCard>,
}

impl RestTimelineEvent {
    pub fn into_event(self) -> Option<TimelineEvent> {
        let at = self.created_at?;
        let actor = login(self.actor);

        match self.event.as_deref()? {
            "closed" => Some(TimelineEvent::Closed { at, actor }),
            "reopened" => Some(TimelineEvent::Reopened { at, actor }),
            name => {
                let kind = match name {
                    "added_to_project" => MoveKind::Added,
                    "moved_columns_in_project" => MoveKind::Moved,
                    "removed_from_project" => MoveKind::Removed,
                    _ => return None,
                };
                let card = self.project_card.unwrap_or_default();
                let board_id = card
                    .project_id
                    .or_else(|| card.project_url.as_deref().and_then(trailing_id));

                Some(TimelineEvent::Board {
                    at,
                    actor,
                    kind,
                    address: BoardAddress::Column {
                        column_id: card.column_id,
                        board_id,
                        column_name: card.column_name.filter(|s| !s.is_empty()),
                        previous_column_name: card.previous_column_name.filter(|s| !s.is_empty()),
                    },
                })
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestReview {
    pub state: String,
    pub submitted_at: Option<DateTime<Utc>>,
    pub user: Option<Actor>,
}

impl RestReview {
    pub fn into_record(self, org: &str, repo: &str, number: u64) -> ReviewRecord {
        ReviewRecord {
            org: org.to_string(),
            repo: repo.to_string(),
            number,
            state: self.state.to_uppercase(),
            submitted_at: self.submitted_at,
            reviewer: login(self.user),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestColumn {
    pub id: u64,
    pub name: String,
    pub project_url: Option<String>,
}

impl From<RestColumn> for ColumnInfo {
    fn from(column: RestColumn) -> Self {
        Self {
            id: column.id,
            name: column.name,
            board_id: column.project_url.as_deref().and_then(trailing_id),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestProject {
    pub id: u64,
    pub name: String,
}

impl From<RestProject> for BoardInfo {
    fn from(project: RestProject) -> Self {
        Self {
            id: project.id,
            name: project.name,
        }
    }
}

/// Numeric id at the end of an API URL such as `.../projects/120`.
fn trailing_id(url: &str) -> Option<u64> {
    url.trim_end_matches('/').rsplit('/').next()?.parse().ok()
}
