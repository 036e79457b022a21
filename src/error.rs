use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, WrappedError>;

#[derive(Error, Debug)]
pub enum WrappedError {
    #[error("Authentication failed: the GitHub token is invalid or expired ({0})")]
    Authentication(String),
    #[error("Authorization failed: the GitHub token lacks the required scope ({0})")]
    Authorization(String),
    #[error("GitHub rate limit exceeded{}", format_reset(.reset))]
    RateLimit { reset: Option<DateTime<Utc>> },
    #[error("Repository {repo} is not accessible: {reason}")]
    RepositoryAccess { repo: String, reason: String },
    #[error("Cache entry {} is corrupt: {reason}", .path.display())]
    CacheCorruption { path: PathBuf, reason: String },
    #[error("Failed to write cache entry {}: {source}", .path.display())]
    CacheWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("No GitHub token found; pass --token or set GITHUB_TOKEN")]
    MissingToken,
    #[error("GitHub API error ({status}) while trying to {context}")]
    Api { status: u16, context: String },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid date: {0}")]
    InvalidDate(String),
    #[error("Collection cancelled")]
    Cancelled,
}

impl WrappedError {
    /// Fatal kinds abort the whole run; the rest are absorbed as warnings
    /// by the component that produced them.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            WrappedError::RepositoryAccess { .. }
                | WrappedError::CacheCorruption { .. }
                | WrappedError::CacheWrite { .. }
        )
    }
}

fn format_reset(reset: &Option<DateTime<Utc>>) -> String {
    match reset {
        Some(at) => format!("; retry after {}", at.to_rfc3339()),
        None => "; retry later".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn non_fatal_kinds() {
        let access = WrappedError::RepositoryAccess {
            repo: "me/a".into(),
            reason: "404".into(),
        };
        assert!(!access.is_fatal());
        assert!(WrappedError::Authentication("401".into()).is_fatal());
        assert!(WrappedError::RateLimit { reset: None }.is_fatal());
        assert!(WrappedError::Validation("bad".into()).is_fatal());
    }

    #[test]
    fn rate_limit_message_names_reset_time() {
        let reset = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let msg = WrappedError::RateLimit { reset: Some(reset) }.to_string();
        assert!(msg.contains("rate limit"));
        assert!(msg.contains("2024-03-01T12:00:00+00:00"));
    }
}
