use chrono::{DateTime, Utc};
use futures::{pin_mut, TryStreamExt};
use log::{error, info, warn};

use crate::error::{FlowLensError, Result};
use crate::flow::board_cache::{BoardNameCache, NameStore};
use crate::flow::classify::classify;
use crate::flow::lifecycle::{aggregate, TimelineEvent};
use crate::insights::{
    ImportScope, ImportSnapshot, IssueRecord, IssueReport, PullRequestRecord, Repository,
    RepositoryFailure, ReviewRecord,
};
use crate::output::PhaseProgress;

use super::client::graphql::{
    IssueBoardTimeline, OrganizationRepositories, RepositoryIssues, RepositoryPullRequests,
};
use super::client::rest::{IssueTimeline, PullRequestReviews};
use super::client::GitHubClient;

/// What one import run collects.
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Repository allow-list; empty means every repository of the org
    pub repos: Vec<String>,
    /// Only issues updated since, and pull requests created since, this instant
    pub since: Option<DateTime<Utc>>,
    pub issues: bool,
    pub pull_requests: bool,
}

/// Collects issue and pull-request flow data for one GitHub organization.
///
/// Repositories are processed one after the other. A repository whose import
/// fails is recorded in [`ImportSnapshot::failures`] and the run moves on; only
/// cancellation stops it.
pub struct GitHubProvider {
    client: GitHubClient,
    org: String,
}

impl GitHubProvider {
    pub fn new(client: GitHubClient, org: impl Into<String>) -> Self {
        Self {
            client,
            org: org.into(),
        }
    }

    /// Runs a full import.
    ///
    /// # Errors
    ///
    /// Fails when the repository list cannot be fetched or the run is cancelled.
    pub async fn import<S: NameStore>(
        &self,
        options: &ImportOptions,
        cache: &mut BoardNameCache<S>,
    ) -> Result<ImportSnapshot> {
        info!("Importing {} (since: {:?})", self.org, options.since);
        let progress = PhaseProgress::start_phase_1(&self.org);

        let repositories = self.repositories(&options.repos).await?;
        let progress = progress.finish_phase_1_start_phase_2(repositories.len());

        let mut failures = Vec::new();
        let mut issues = Vec::new();
        if options.issues {
            for repo in &repositories {
                progress.detail(&repo.name);
                let before = issues.len();
                match self.import_issues(repo, options.since, cache, &mut issues).await {
                    Ok(()) => info!("{}/{}: {} issues", self.org, repo.name, issues.len() - before),
                    Err(err) => failures.push(self.failure(repo, ImportScope::Issues, err)?),
                }
            }
        }
        let progress = progress.finish_phase_2_start_phase_3(issues.len());

        let mut pull_requests = Vec::new();
        let mut reviews = Vec::new();
        if options.pull_requests {
            for repo in &repositories {
                progress.detail(&repo.name);
                let result = self
                    .import_pull_requests(repo, options.since, &mut pull_requests, &mut reviews)
                    .await;
                if let Err(err) = result {
                    failures.push(self.failure(repo, ImportScope::PullRequests, err)?);
                }
            }
        }
        progress.finish_phase_3(pull_requests.len(), failures.len());

        if let Err(err) = cache.persist() {
            warn!("Could not persist board name cache: {err}");
        }

        Ok(ImportSnapshot {
            org: self.org.clone(),
            collected_at: Utc::now(),
            repositories,
            issues,
            pull_requests,
            reviews,
            failures,
        })
    }

    /// Turns a repository-level error into a recorded failure, or passes a
    /// fatal one through.
    fn failure(
        &self,
        repo: &Repository,
        scope: ImportScope,
        err: FlowLensError,
    ) -> Result<RepositoryFailure> {
        if err.is_fatal() {
            return Err(err);
        }
        error!("{}/{}: {scope:?} import failed: {err}", self.org, repo.name);
        Ok(RepositoryFailure {
            repo: repo.name.clone(),
            scope,
            error: err.to_string(),
        })
    }

    async fn repositories(&self, allow: &[String]) -> Result<Vec<Repository>> {
        let nodes = self
            .client
            .list_all(OrganizationRepositories {
                org: self.org.clone(),
            })
            .await?;

        let mut repositories: Vec<Repository> = nodes
            .into_iter()
            .map(|node| node.into_repository(&self.org))
            .collect();

        if !allow.is_empty() {
            repositories.retain(|r| allow.iter().any(|a| a.eq_ignore_ascii_case(&r.name)));
            for wanted in allow {
                if !repositories.iter().any(|r| r.name.eq_ignore_ascii_case(wanted)) {
                    warn!("Repository {}/{wanted} not found, skipping", self.org);
                }
            }
        }

        Ok(repositories)
    }

    /// Issues of one repository, each fully resolved before the next page is
    /// requested. Issues finished before an error stay in `out`.
    async fn import_issues<S: NameStore>(
        &self,
        repo: &Repository,
        since: Option<DateTime<Utc>>,
        cache: &mut BoardNameCache<S>,
        out: &mut Vec<IssueReport>,
    ) -> Result<()> {
        let issues = self.client.list(RepositoryIssues {
            owner: repo.owner.clone(),
            repo: repo.name.clone(),
            since,
        });
        pin_mut!(issues);

        while let Some(node) = issues.try_next().await? {
            let record = node.into_record(&self.org, &repo.name);
            let events = self.timeline(repo, &record).await?;
            let lifecycle = aggregate(&record, events, cache, &self.client).await?;
            let (issue_type, is_bug) = classify(&record);

            out.push(IssueReport {
                record,
                lifecycle,
                issue_type,
                is_bug,
            });
        }
        Ok(())
    }

    /// Both timeline feeds of an issue, unmerged.
    ///
    /// The status-field feed is optional: a GraphQL error there (typically a
    /// token without project scope) is logged and the issue keeps its REST
    /// events.
    async fn timeline(&self, repo: &Repository, issue: &IssueRecord) -> Result<Vec<TimelineEvent>> {
        let mut events = self
            .client
            .list_all(IssueTimeline {
                owner: repo.owner.clone(),
                repo: repo.name.clone(),
                number: issue.number,
            })
            .await?;

        let board_events = self
            .client
            .list_all(IssueBoardTimeline {
                owner: repo.owner.clone(),
                repo: repo.name.clone(),
                number: issue.number,
            })
            .await;
        match board_events {
            Ok(board_events) => events.extend(board_events),
            Err(err @ FlowLensError::GraphQl { .. }) => {
                warn!("{}: board timeline unavailable: {err}", issue.key());
            }
            Err(err) => return Err(err),
        }

        Ok(events)
    }

    async fn import_pull_requests(
        &self,
        repo: &Repository,
        since: Option<DateTime<Utc>>,
        pull_requests: &mut Vec<PullRequestRecord>,
        reviews: &mut Vec<ReviewRecord>,
    ) -> Result<()> {
        let nodes = self
            .client
            .list_all(RepositoryPullRequests {
                owner: repo.owner.clone(),
                repo: repo.name.clone(),
                since,
            })
            .await?;
        info!("{}/{}: {} pull requests", self.org, repo.name, nodes.len());

        for node in nodes {
            let pr = node.into_record(&self.org, &repo.name);
            let pr_reviews = self
                .client
                .list_all(PullRequestReviews {
                    owner: repo.owner.clone(),
                    repo: repo.name.clone(),
                    number: pr.number,
                })
                .await?;

            reviews.extend(
                pr_reviews
                    .into_iter()
                    .map(|r| r.into_record(&self.org, &repo.name, pr.number)),
            );
            pull_requests.push(pr);
        }
        Ok(())
    }
}
