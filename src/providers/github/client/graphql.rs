use chrono::{DateTime, Utc};
use graphql_client::QueryBody;
use reqwest::RequestBuilder;
use serde::Deserialize;
use serde_json::{json, Value};

use super::core::{decode_graphql, GitHubClient};
use super::pagination::{after, Cursor, Endpoint, Listing, Page};
use crate::error::{FlowLensError, Result};
use crate::flow::lifecycle::TimelineEvent;
use crate::providers::github::types::{
    IssueNode, ProjectTimelineNode, PullRequestNode, RepositoryNode,
};

const ORGANIZATION_REPOSITORIES: &str = r"
query OrganizationRepositories($org: String!, $first: Int!, $after: String) {
  organization(login: $org) {
    repositories(first: $first, after: $after, orderBy: {field: NAME, direction: ASC}) {
      pageInfo { hasNextPage endCursor }
      nodes { name isPrivate owner { login } }
    }
  }
}
";

const REPOSITORY_ISSUES: &str = r"
query RepositoryIssues($owner: String!, $repo: String!, $first: Int!, $after: String, $since: DateTime) {
  repository(owner: $owner, name: $repo) {
    issues(first: $first, after: $after, states: [OPEN, CLOSED], filterBy: {since: $since}, orderBy: {field: CREATED_AT, direction: ASC}) {
      pageInfo { hasNextPage endCursor }
      nodes {
        number title state url createdAt closedAt
        author { login }
        assignees(first: 20) { nodes { login } }
        labels(first: 50) { nodes { name } }
        issueType { name }
      }
    }
  }
}
";

const ISSUE_BOARD_TIMELINE: &str = r"
query IssueBoardTimeline($owner: String!, $repo: String!, $number: Int!, $first: Int!, $after: String) {
  repository(owner: $owner, name: $repo) {
    issue(number: $number) {
      timelineItems(first: $first, after: $after, itemTypes: [ADDED_TO_PROJECT_V2_EVENT, PROJECT_V2_ITEM_STATUS_CHANGED_EVENT, REMOVED_FROM_PROJECT_V2_EVENT]) {
        pageInfo { hasNextPage endCursor }
        nodes {
          __typename
          ... on AddedToProjectV2Event { createdAt actor { login } project { fullDatabaseId title } }
          ... on ProjectV2ItemStatusChangedEvent { createdAt actor { login } project { fullDatabaseId title } status previousStatus }
          ... on RemovedFromProjectV2Event { createdAt actor { login } project { fullDatabaseId title } }
        }
      }
    }
  }
}
";

const REPOSITORY_PULL_REQUESTS: &str = r"
query RepositoryPullRequests($owner: String!, $repo: String!, $first: Int!, $after: String) {
  repository(owner: $owner, name: $repo) {
    pullRequests(first: $first, after: $after, orderBy: {field: CREATED_AT, direction: DESC}) {
      pageInfo { hasNextPage endCursor }
      nodes { number title url state createdAt closedAt mergedAt author { login } }
    }
  }
}
";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Connection<T> {
    page_info: PageInfo,
    #[serde(default = "Vec::new")]
    nodes: Vec<Option<T>>,
}

impl<T> Connection<T> {
    /// An empty page ends the listing even when the server claims more.
    fn into_page(self) -> Page<T> {
        let next = if self.page_info.has_next_page && !self.nodes.is_empty() {
            self.page_info.end_cursor.map(Cursor::After)
        } else {
            None
        };
        Page {
            items: self.nodes.into_iter().flatten().collect(),
            next,
        }
    }
}

fn request(
    client: &GitHubClient,
    operation: &'static str,
    query: &'static str,
    variables: Value,
) -> RequestBuilder {
    client.post_graphql(&QueryBody {
        variables,
        query,
        operation_name: operation,
    })
}

fn not_found(what: String) -> FlowLensError {
    FlowLensError::GraphQl {
        query: what,
        errors: "not found".to_string(),
    }
}

// ---------------------------------------------------------------------------

pub struct OrganizationRepositories {
    pub org: String,
}

#[derive(Deserialize)]
struct OrganizationData {
    organization: Option<OrganizationNode>,
}

#[derive(Deserialize)]
struct OrganizationNode {
    repositories: Connection<RepositoryNode>,
}

impl Listing for OrganizationRepositories {
    type Item = RepositoryNode;

    fn describe(&self) -> String {
        format!("repositories of {}", self.org)
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint::GraphQl
    }

    fn request(&self, client: &GitHubClient, cursor: Option<&Cursor>) -> Result<RequestBuilder> {
        Ok(request(
            client,
            "OrganizationRepositories",
            ORGANIZATION_REPOSITORIES,
            json!({
                "org": self.org,
                "first": client.page_size(),
                "after": after(cursor),
            }),
        ))
    }

    fn parse(&self, body: &str, _: Option<&Cursor>, _: u32) -> Result<Page<RepositoryNode>> {
        let data: OrganizationData = decode_graphql("OrganizationRepositories", body)?;
        let org = data
            .organization
            .ok_or_else(|| not_found(format!("organization {}", self.org)))?;
        Ok(org.repositories.into_page())
    }
}

// ---------------------------------------------------------------------------

pub struct RepositoryIssues {
    pub owner: String,
    pub repo: String,
    pub since: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct RepositoryData<T> {
    repository: Option<T>,
}

#[derive(Deserialize)]
struct IssuesNode {
    issues: Connection<IssueNode>,
}

impl Listing for RepositoryIssues {
    type Item = IssueNode;

    fn describe(&self) -> String {
        format!("issues of {}/{}", self.owner, self.repo)
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint::GraphQl
    }

    fn request(&self, client: &GitHubClient, cursor: Option<&Cursor>) -> Result<RequestBuilder> {
        Ok(request(
            client,
            "RepositoryIssues",
            REPOSITORY_ISSUES,
            json!({
                "owner": self.owner,
                "repo": self.repo,
                "first": client.page_size(),
                "after": after(cursor),
                "since": self.since.map(|s| s.to_rfc3339()),
            }),
        ))
    }

    fn parse(&self, body: &str, _: Option<&Cursor>, _: u32) -> Result<Page<IssueNode>> {
        let data: RepositoryData<IssuesNode> = decode_graphql("RepositoryIssues", body)?;
        let repo = data
            .repository
            .ok_or_else(|| not_found(format!("repository {}/{}", self.owner, self.repo)))?;
        Ok(repo.issues.into_page())
    }
}

// ---------------------------------------------------------------------------

/// Status-field board events of one issue.
pub struct IssueBoardTimeline {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

#[derive(Deserialize)]
struct IssueTimelineHolder {
    issue: Option<TimelineItems>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimelineItems {
    timeline_items: Connection<ProjectTimelineNode>,
}

impl Listing for IssueBoardTimeline {
    type Item = TimelineEvent;

    fn describe(&self) -> String {
        format!("board timeline of {}/{}#{}", self.owner, self.repo, self.number)
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint::GraphQl
    }

    fn request(&self, client: &GitHubClient, cursor: Option<&Cursor>) -> Result<RequestBuilder> {
        Ok(request(
            client,
            "IssueBoardTimeline",
            ISSUE_BOARD_TIMELINE,
            json!({
                "owner": self.owner,
                "repo": self.repo,
                "number": self.number,
                "first": client.page_size(),
                "after": after(cursor),
            }),
        ))
    }

    fn parse(&self, body: &str, _: Option<&Cursor>, _: u32) -> Result<Page<TimelineEvent>> {
        let data: RepositoryData<IssueTimelineHolder> =
            decode_graphql("IssueBoardTimeline", body)?;
        let Some(issue) = data.repository.and_then(|r| r.issue) else {
            return Err(not_found(self.describe()));
        };

        let page = issue.timeline_items.into_page();
        Ok(Page {
            items: page
                .items
                .into_iter()
                .filter_map(ProjectTimelineNode::into_event)
                .collect(),
            next: page.next,
        })
    }
}

// ---------------------------------------------------------------------------

/// Pull requests, newest first. Anything created before `since` is dropped
/// and ends the listing.
pub struct RepositoryPullRequests {
    pub owner: String,
    pub repo: String,
    pub since: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullRequestsNode {
    pull_requests: Connection<PullRequestNode>,
}

impl Listing for RepositoryPullRequests {
    type Item = PullRequestNode;

    fn describe(&self) -> String {
        format!("pull requests of {}/{}", self.owner, self.repo)
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint::GraphQl
    }

    fn request(&self, client: &GitHubClient, cursor: Option<&Cursor>) -> Result<RequestBuilder> {
        Ok(request(
            client,
            "RepositoryPullRequests",
            REPOSITORY_PULL_REQUESTS,
            json!({
                "owner": self.owner,
                "repo": self.repo,
                "first": client.page_size(),
                "after": after(cursor),
            }),
        ))
    }

    fn parse(&self, body: &str, _: Option<&Cursor>, _: u32) -> Result<Page<PullRequestNode>> {
        let data: RepositoryData<PullRequestsNode> =
            decode_graphql("RepositoryPullRequests", body)?;
        let repo = data
            .repository
            .ok_or_else(|| not_found(format!("repository {}/{}", self.owner, self.repo)))?;

        let mut page = repo.pull_requests.into_page();
        if let Some(since) = self.since {
            let before = page.items.len();
            page.items.retain(|pr| pr.created_at >= since);
            if page.items.len() < before {
                page.next = None;
            }
        }
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_without_next_page_ends() {
        let conn: Connection<u32> = serde_json::from_str(
            r#"{"pageInfo": {"hasNextPage": false, "endCursor": "c9"}, "nodes": [1, null, 2]}"#,
        )
        .unwrap();
        let page = conn.into_page();
        assert_eq!(page.items, [1, 2]);
        assert_eq!(page.next, None);
    }

    #[test]
    fn connection_with_next_page_carries_cursor() {
        let conn: Connection<u32> = serde_json::from_str(
            r#"{"pageInfo": {"hasNextPage": true, "endCursor": "c1"}, "nodes": [null]}"#,
        )
        .unwrap();
        let page = conn.into_page();
        assert!(page.items.is_empty());
        assert_eq!(page.next, Some(Cursor::After("c1".into())));
    }

    #[test]
    fn empty_page_ends_listing_despite_next_flag() {
        let listing = RepositoryIssues {
            owner: "acme".into(),
            repo: "api".into(),
            since: None,
        };
        let page = listing
            .parse(
                r#"{"data": {"repository": {"issues": {
                    "pageInfo": {"hasNextPage": true, "endCursor": "c1"},
                    "nodes": []}}}}"#,
                None,
                100,
            )
            .unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.next, None);
    }

    #[test]
    fn missing_repository_is_reported() {
        let listing = RepositoryIssues {
            owner: "acme".into(),
            repo: "gone".into(),
            since: None,
        };
        let err = listing
            .parse(r#"{"data": {"repository": null}}"#, None, 100)
            .unwrap_err();
        assert!(err.to_string().contains("acme/gone"));
    }

    #[test]
    fn pull_requests_older_than_since_end_the_listing() {
        let listing = RepositoryPullRequests {
            owner: "acme".into(),
            repo: "api".into(),
            since: Some("2025-01-10T00:00:00Z".parse().unwrap()),
        };
        let body = r#"{"data": {"repository": {"pullRequests": {
            "pageInfo": {"hasNextPage": true, "endCursor": "c1"},
            "nodes": [
                {"number": 2, "title": "b", "url": "u", "state": "OPEN",
                 "createdAt": "2025-01-12T00:00:00Z", "closedAt": null, "mergedAt": null,
                 "author": {"login": "alice"}},
                {"number": 1, "title": "a", "url": "u", "state": "MERGED",
                 "createdAt": "2025-01-02T00:00:00Z", "closedAt": null, "mergedAt": null,
                 "author": {"login": "alice"}}
            ]}}}}"#;

        let page = listing.parse(body, None, 100).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].number, 2);
        assert!(page.next.is_none());
    }

    #[test]
    fn board_timeline_keeps_only_board_events() {
        let listing = IssueBoardTimeline {
            owner: "acme".into(),
            repo: "api".into(),
            number: 7,
        };
        let body = r#"{"data": {"repository": {"issue": {"timelineItems": {
            "pageInfo": {"hasNextPage": false, "endCursor": null},
            "nodes": [
                {"__typename": "AddedToProjectV2Event", "createdAt": "2025-01-02T00:00:00Z",
                 "actor": {"login": "alice"}, "project": {"fullDatabaseId": "77", "title": "Delivery"}},
                {"__typename": "SomethingElse"}
            ]}}}}}"#;

        let page = listing.parse(body, None, 100).unwrap();
        assert_eq!(page.items.len(), 1);
        assert!(matches!(page.items[0], TimelineEvent::Board { .. }));
    }
}
