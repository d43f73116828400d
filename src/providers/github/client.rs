mod core;
pub(super) mod graphql;
mod pagination;
mod rate_limit;
pub(super) mod rest;

pub use self::core::GitHubClient;
