use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::Token;
use crate::cancel::CancelToken;
use crate::config::Config;
use crate::flow::board_cache::{BoardNameCache, FileStore};
use crate::flow::build_report;
use crate::output::{export_import, export_report, print_summary, read_snapshot};
use crate::providers::{GitHubClient, GitHubProvider, ImportOptions};

#[derive(Parser)]
#[command(name = "flowlens")]
#[command(author, version, about = "Issue flow metrics for GitHub organizations", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML, JSON or YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory for CSV outputs and the import snapshot
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Abort network work after this many minutes
    #[arg(long, global = true)]
    deadline_minutes: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch issues, timelines, pull requests and reviews
    Import {
        #[arg(short, long)]
        org: Option<String>,

        #[arg(short, long, env = "GITHUB_TOKEN", hide_env_values = true)]
        token: Option<String>,

        #[arg(long)]
        api_url: Option<String>,

        /// Only issues updated and pull requests created since (RFC3339)
        #[arg(long)]
        since: Option<DateTime<Utc>>,

        /// Comma-separated repository allow-list
        #[arg(short, long, value_delimiter = ',')]
        repo: Vec<String>,

        /// Import issues (default: both issues and pull requests)
        #[arg(long)]
        issues: bool,

        /// Import pull requests (default: both issues and pull requests)
        #[arg(long)]
        prs: bool,

        #[arg(short, long)]
        pretty: bool,
    },

    /// Compute stage timestamps and flow metrics from the last import
    Calculate {
        /// Reference instant for the still-running week (RFC3339)
        #[arg(long)]
        now: Option<DateTime<Utc>>,

        #[arg(long)]
        no_summary: bool,
    },
}

impl Cli {
    /// Cancellation token honouring `--deadline-minutes`.
    pub fn cancel_token(&self) -> CancelToken {
        match self.deadline_minutes {
            Some(minutes) => CancelToken::with_timeout(Duration::from_secs(minutes * 60)),
            None => CancelToken::new(),
        }
    }

    pub async fn execute(&self, cancel: CancelToken) -> Result<()> {
        let config = Config::load(self.config.as_deref())?;
        let data_dir = self
            .data_dir
            .clone()
            .unwrap_or_else(|| config.output.data_dir.clone());

        match &self.command {
            Commands::Import {
                org,
                token,
                api_url,
                since,
                repo,
                issues,
                prs,
                pretty,
            } => {
                let org = org
                    .clone()
                    .or_else(|| config.github.org.clone())
                    .context("No organization given (use --org or github.org in the config)")?;
                let token = token.clone().or_else(|| config.github.token.clone());
                let api_url = api_url.as_deref().unwrap_or(&config.github.api_url);
                let both = !issues && !prs;
                let options = ImportOptions {
                    repos: if repo.is_empty() {
                        config.github.repos.clone()
                    } else {
                        repo.clone()
                    },
                    since: since.or(config.github.since),
                    issues: *issues || both,
                    pull_requests: *prs || both,
                };

                let client = GitHubClient::new(
                    api_url,
                    token.as_deref().map(Token::from),
                    &config.fetch,
                    cancel,
                )?;
                let provider = GitHubProvider::new(client, org.as_str());

                let store = FileStore::for_org(&org).unwrap_or_else(|err| {
                    warn!("{err}, keeping board names next to the data instead");
                    FileStore::at(data_dir.join(format!(".board_names_{org}.json")))
                });
                let mut cache = BoardNameCache::new(store);

                let snapshot = provider.import(&options, &mut cache).await?;
                info!(
                    "Imported {} issues and {} pull requests from {} repositories ({} board lookups)",
                    snapshot.issues.len(),
                    snapshot.pull_requests.len(),
                    snapshot.repositories.len(),
                    cache.lookups()
                );
                for failure in &snapshot.failures {
                    warn!(
                        "{org}/{}: {:?} skipped: {}",
                        failure.repo, failure.scope, failure.error
                    );
                }

                let written = export_import(&data_dir, &snapshot, *pretty || config.output.pretty)?;
                report_written(&data_dir, written.len());
            }
            Commands::Calculate { now, no_summary } => {
                let snapshot = read_snapshot(&data_dir)?;
                let report = build_report(&snapshot, &config, now.unwrap_or_else(Utc::now));

                let written = export_report(&data_dir, &report)?;
                report_written(&data_dir, written.len());

                if !no_summary {
                    print_summary(&snapshot.org, &report);
                }
            }
        }

        Ok(())
    }
}

fn report_written(dir: &Path, files: usize) {
    info!("{files} files written to: {}", dir.display());
}
