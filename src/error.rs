use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowLensError {
    #[error("Rate limit exhausted and no usable reset time was reported")]
    RateLimited,

    #[error("Request to {url} failed (HTTP {status}): {body}")]
    Upstream {
        status: u16,
        url: String,
        body: String,
    },

    #[error("GraphQL query {query} returned errors: {errors}")]
    GraphQl { query: String, errors: String },

    #[error("No data in response")]
    NoResponseData,

    #[error("Could not resolve {kind} {id}")]
    LookupMiss { kind: &'static str, id: u64 },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FlowLensError {
    /// Errors that must stop the whole run instead of only the current repository.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, FlowLensError>;
