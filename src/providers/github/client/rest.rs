use reqwest::RequestBuilder;

use super::core::GitHubClient;
use super::pagination::{next_rest_page, page_number, Cursor, Endpoint, Listing, Page};
use crate::error::{FlowLensError, Result};
use crate::flow::board_cache::{BoardDirectory, BoardInfo, ColumnInfo};
use crate::flow::lifecycle::TimelineEvent;
use crate::providers::github::types::{RestColumn, RestProject, RestReview, RestTimelineEvent};

fn paged(client: &GitHubClient, segments: &[&str], cursor: Option<&Cursor>) -> Result<RequestBuilder> {
    let url = client.rest_url(segments)?;
    Ok(client.get(url).query(&[
        ("per_page", client.page_size()),
        ("page", page_number(cursor)),
    ]))
}

/// Status changes and legacy column-board events of one issue.
pub struct IssueTimeline {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

impl Listing for IssueTimeline {
    type Item = TimelineEvent;

    fn describe(&self) -> String {
        format!("timeline of {}/{}#{}", self.owner, self.repo, self.number)
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint::Rest
    }

    fn request(&self, client: &GitHubClient, cursor: Option<&Cursor>) -> Result<RequestBuilder> {
        let number = self.number.to_string();
        paged(
            client,
            &["repos", &self.owner, &self.repo, "issues", &number, "timeline"],
            cursor,
        )
    }

    fn parse(&self, body: &str, cursor: Option<&Cursor>, page_size: u32) -> Result<Page<TimelineEvent>> {
        let raw: Vec<RestTimelineEvent> = serde_json::from_str(body)?;
        let next = next_rest_page(cursor, raw.len(), page_size);
        Ok(Page {
            items: raw
                .into_iter()
                .filter_map(RestTimelineEvent::into_event)
                .collect(),
            next,
        })
    }
}

pub struct PullRequestReviews {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

impl Listing for PullRequestReviews {
    type Item = RestReview;

    fn describe(&self) -> String {
        format!("reviews of {}/{}#{}", self.owner, self.repo, self.number)
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint::Rest
    }

    fn request(&self, client: &GitHubClient, cursor: Option<&Cursor>) -> Result<RequestBuilder> {
        let number = self.number.to_string();
        paged(
            client,
            &["repos", &self.owner, &self.repo, "pulls", &number, "reviews"],
            cursor,
        )
    }

    fn parse(&self, body: &str, cursor: Option<&Cursor>, page_size: u32) -> Result<Page<RestReview>> {
        let items: Vec<RestReview> = serde_json::from_str(body)?;
        let next = next_rest_page(cursor, items.len(), page_size);
        Ok(Page { items, next })
    }
}

fn lookup_miss(kind: &'static str, id: u64, err: FlowLensError) -> FlowLensError {
    match err {
        FlowLensError::Upstream { status: 404 | 410, .. } => FlowLensError::LookupMiss { kind, id },
        other => other,
    }
}

impl BoardDirectory for GitHubClient {
    async fn column(&self, id: u64) -> Result<ColumnInfo> {
        let column: RestColumn = self
            .get_json(&["projects", "columns", &id.to_string()])
            .await
            .map_err(|e| lookup_miss("column", id, e))?;
        Ok(column.into())
    }

    async fn board(&self, id: u64) -> Result<BoardInfo> {
        let project: RestProject = self
            .get_json(&["projects", &id.to_string()])
            .await
            .map_err(|e| lookup_miss("board", id, e))?;
        Ok(project.into())
    }
}
