pub mod client;
pub mod commits;
pub mod repos;

pub use client::{ApiFailure, GitHubClient, DEFAULT_API_URL};
pub use commits::RepoCommits;
pub use repos::parse_full_name;
