mod github;

pub use github::{GitHubClient, GitHubProvider, ImportOptions};
