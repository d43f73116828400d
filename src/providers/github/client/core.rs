use std::time::Duration;

use chrono::Utc;
use graphql_client::{QueryBody, Response as GraphQLResponse};
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use super::pagination::Endpoint;
use super::rate_limit::{
    is_exhausted, is_graphql_quota_error, pacing_delay, quota_wait, RatePolicy, RateWindow,
};
use crate::auth::Token;
use crate::cancel::CancelToken;
use crate::config::FetchConfig;
use crate::error::{FlowLensError, Result};

const MAX_NETWORK_RETRIES: u32 = 3;
const RETRY_DELAY_SECONDS: u64 = 5;
const API_VERSION: &str = "2022-11-28";

pub struct GitHubClient {
    client: Client,
    api_url: Url,
    graphql_url: Url,
    token: Option<Token>,
    policy: RatePolicy,
    page_size: u32,
    cancel: CancelToken,
}

impl GitHubClient {
    /// Builds a client for a GitHub (or GitHub Enterprise) API root.
    ///
    /// The GraphQL endpoint is resolved relative to `api_url`, so
    /// `https://api.github.com` maps to `/graphql` and an Enterprise
    /// `https://host/api/v3` maps to `/api/graphql`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(
        api_url: &str,
        token: Option<Token>,
        fetch: &FetchConfig,
        cancel: CancelToken,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));

        let client = Client::builder()
            .user_agent(concat!("FlowLens/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(|e| FlowLensError::Config(format!("Failed to create HTTP client: {e}")))?;

        let root = Url::parse(api_url)
            .map_err(|e| FlowLensError::Config(format!("Invalid API URL: {e}")))?;
        let graphql_url = root
            .join("graphql")
            .map_err(|e| FlowLensError::Config(format!("Invalid GraphQL URL: {e}")))?;

        let mut api_url = root;
        if !api_url.path().ends_with('/') {
            let path = format!("{}/", api_url.path());
            api_url.set_path(&path);
        }

        Ok(Self {
            client,
            api_url,
            graphql_url,
            token,
            policy: RatePolicy::from(fetch),
            page_size: fetch.page_size.clamp(1, 100),
            cancel,
        })
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn auth_request(&self, request: RequestBuilder) -> RequestBuilder {
        if let Some(token) = &self.token {
            request.bearer_auth(token.as_str())
        } else {
            request
        }
    }

    /// REST URL below the API root, one path segment per element.
    pub fn rest_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                FlowLensError::Config(format!("API URL {} cannot be a base", self.api_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub fn get(&self, url: Url) -> RequestBuilder {
        self.auth_request(self.client.get(url))
    }

    pub fn post_graphql<V: Serialize>(&self, body: &QueryBody<V>) -> RequestBuilder {
        self.auth_request(self.client.post(self.graphql_url.clone()).json(body))
    }

    /// Sends a request until it yields a usable body.
    ///
    /// `build` is called again for every attempt. Quota exhaustion, whether
    /// signalled by status and headers or by a GraphQL error message, waits
    /// for the reported reset and retries. Connection failures retry a few
    /// times. Any other non-success status becomes [`FlowLensError::Upstream`].
    ///
    /// # Errors
    ///
    /// `Cancelled` when the run is cancelled before or during a wait,
    /// `RateLimited` when the quota is gone without a reset time.
    pub async fn execute<F>(&self, endpoint: Endpoint, build: F) -> Result<String>
    where
        F: Fn() -> Result<RequestBuilder>,
    {
        let mut network_retries = 0;
        loop {
            self.cancel.check()?;

            let request = build()?.build()?;
            let url = request.url().to_string();
            debug!("{} {url}", request.method());

            let response = match self.client.execute(request).await {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    if network_retries >= MAX_NETWORK_RETRIES {
                        return Err(e.into());
                    }
                    network_retries += 1;
                    warn!(
                        "Network error ({e}), retrying in {RETRY_DELAY_SECONDS}s ({network_retries}/{MAX_NETWORK_RETRIES})..."
                    );
                    self.cancel
                        .sleep(Duration::from_secs(RETRY_DELAY_SECONDS))
                        .await?;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();
            let window = RateWindow::from_headers(response.headers(), Utc::now());

            if is_exhausted(status, &window) {
                let wait = quota_wait(window.reset_at, Utc::now(), &self.policy)?;
                warn!(
                    "Rate limit exhausted (HTTP {status}), waiting {}s before retrying {url}",
                    wait.as_secs()
                );
                self.cancel.sleep(wait).await?;
                continue;
            }

            let body = response.text().await?;

            if !status.is_success() {
                return Err(FlowLensError::Upstream {
                    status: status.as_u16(),
                    url,
                    body,
                });
            }

            if endpoint == Endpoint::GraphQl && reports_quota_error(&body) {
                let wait = quota_wait(window.reset_at, Utc::now(), &self.policy)?;
                warn!(
                    "GraphQL rate limit reached, waiting {}s before retrying",
                    wait.as_secs()
                );
                self.cancel.sleep(wait).await?;
                continue;
            }

            if let Some(delay) = pacing_delay(&window, Utc::now(), &self.policy) {
                debug!(
                    "{} requests left in window, pacing for {}ms",
                    window.remaining.unwrap_or_default(),
                    delay.as_millis()
                );
                self.cancel.sleep(delay).await?;
            }

            return Ok(body);
        }
    }

    /// GET a single REST resource and decode it.
    pub async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let url = self.rest_url(segments)?;
        let body = self
            .execute(Endpoint::Rest, || Ok(self.get(url.clone())))
            .await?;
        Ok(serde_json::from_str(&body)?)
    }
}

fn reports_quota_error(body: &str) -> bool {
    serde_json::from_str::<GraphQLResponse<serde_json::Value>>(body)
        .ok()
        .and_then(|r| r.errors)
        .is_some_and(|errors| errors.iter().any(|e| is_graphql_quota_error(&e.message)))
}

/// Decodes a GraphQL response body, surfacing server-side errors.
///
/// # Errors
///
/// `GraphQl` when the response lists errors, `NoResponseData` when it has
/// neither errors nor data.
pub fn decode_graphql<T: DeserializeOwned>(operation: &str, body: &str) -> Result<T> {
    let response: GraphQLResponse<T> = serde_json::from_str(body)?;

    if let Some(errors) = response.errors.filter(|e| !e.is_empty()) {
        return Err(FlowLensError::GraphQl {
            query: operation.to_string(),
            errors: errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        });
    }

    response.data.ok_or(FlowLensError::NoResponseData)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(api_url: &str) -> GitHubClient {
        GitHubClient::new(api_url, None, &FetchConfig::default(), CancelToken::new()).unwrap()
    }

    #[test]
    fn public_api_urls() {
        let client = client("https://api.github.com");
        assert_eq!(client.graphql_url.as_str(), "https://api.github.com/graphql");
        assert_eq!(
            client
                .rest_url(&["repos", "acme", "api", "issues", "7", "timeline"])
                .unwrap()
                .as_str(),
            "https://api.github.com/repos/acme/api/issues/7/timeline"
        );
    }

    #[test]
    fn enterprise_api_urls() {
        let client = client("https://ghe.example.com/api/v3");
        assert_eq!(
            client.graphql_url.as_str(),
            "https://ghe.example.com/api/graphql"
        );
        assert_eq!(
            client.rest_url(&["projects", "12"]).unwrap().as_str(),
            "https://ghe.example.com/api/v3/projects/12"
        );
    }

    #[test]
    fn path_segments_are_escaped() {
        let client = client("https://api.github.com/");
        assert_eq!(
            client.rest_url(&["repos", "acme", "a b"]).unwrap().as_str(),
            "https://api.github.com/repos/acme/a%20b"
        );
    }

    #[test]
    fn invalid_url_is_a_config_error() {
        let result = GitHubClient::new(
            "not a url",
            None,
            &FetchConfig::default(),
            CancelToken::new(),
        );
        assert!(matches!(result, Err(FlowLensError::Config(_))));
    }

    #[test]
    fn page_size_is_clamped_to_api_maximum() {
        let fetch = FetchConfig {
            page_size: 500,
            ..FetchConfig::default()
        };
        let client =
            GitHubClient::new("https://api.github.com", None, &fetch, CancelToken::new()).unwrap();
        assert_eq!(client.page_size(), 100);
    }

    mod decode_graphql {
        use super::*;

        #[derive(Debug, serde::Deserialize)]
        struct Viewer {
            login: String,
        }

        #[test]
        fn returns_data() {
            let viewer: Viewer =
                decode_graphql("Viewer", r#"{"data":{"login":"octo"}}"#).unwrap();
            assert_eq!(viewer.login, "octo");
        }

        #[test]
        fn joins_error_messages() {
            let err = decode_graphql::<Viewer>(
                "Viewer",
                r#"{"data":null,"errors":[{"message":"a"},{"message":"b"}]}"#,
            )
            .unwrap_err();
            match err {
                FlowLensError::GraphQl { query, errors } => {
                    assert_eq!(query, "Viewer");
                    assert_eq!(errors, "a, b");
                }
                other => panic!("unexpected error: {other}"),
            }
        }

        #[test]
        fn missing_data_is_reported() {
            assert!(matches!(
                decode_graphql::<Viewer>("Viewer", r#"{"data":null}"#),
                Err(FlowLensError::NoResponseData)
            ));
        }

        #[test]
        fn quota_errors_are_recognized() {
            assert!(reports_quota_error(
                r#"{"errors":[{"type":"RATE_LIMITED","message":"API rate limit exceeded for user ID 1."}]}"#
            ));
            assert!(!reports_quota_error(r#"{"data":{"login":"octo"}}"#));
            assert!(!reports_quota_error("not json"));
        }
    }
}
