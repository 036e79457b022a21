use super::client::{ApiFailure, GitHubClient};
use super::repos::parse_full_name;
use crate::error::{Result, WrappedError};
use crate::model::{CommitRecord, YearWindow};
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Outcome of fetching one repository. Only cross-cutting failures are
/// returned as errors; anything scoped to the repository becomes `Skipped`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoCommits {
    Fetched(Vec<CommitRecord>),
    Skipped { reason: String },
}

impl RepoCommits {
    pub fn commits(&self) -> &[CommitRecord] {
        match self {
            RepoCommits::Fetched(commits) => commits,
            RepoCommits::Skipped { .. } => &[],
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub(crate) struct ApiCommit {
    pub sha: String,
    pub commit: ApiCommitDetail,
}

#[derive(Debug, Deserialize, Serialize)]
pub(crate) struct ApiCommitDetail {
    pub message: String,
    pub author: Option<ApiSignature>,
    pub committer: Option<ApiSignature>,
}

#[derive(Debug, Deserialize, Serialize)]
pub(crate) struct ApiSignature {
    pub date: Option<DateTime<Utc>>,
}

impl ApiCommit {
    fn into_record(self, repo_full_name: &str) -> Option<CommitRecord> {
        let authored_at = self
            .commit
            .author
            .as_ref()
            .and_then(|a| a.date)
            .or_else(|| self.commit.committer.as_ref().and_then(|c| c.date))?;
        Some(CommitRecord {
            sha: self.sha,
            message: self.commit.message,
            authored_at,
            repo_full_name: repo_full_name.to_string(),
        })
    }
}

impl GitHubClient {
    /// All commits of `repo_full_name` authored inside `window`, optionally
    /// restricted to `author`.
    pub async fn fetch_commits(
        &self,
        repo_full_name: &str,
        window: &YearWindow,
        author: Option<&str>,
    ) -> Result<RepoCommits> {
        let (owner, name) = parse_full_name(repo_full_name)?;
        let mut params = vec![
            ("since", window.since.to_rfc3339()),
            ("until", window.until.to_rfc3339()),
        ];
        if let Some(author) = author {
            params.push(("author", author.to_string()));
        }

        let raw: Vec<ApiCommit> = match self
            .get_all(&format!("repos/{owner}/{name}/commits"), &params)
            .await
        {
            Ok(raw) => raw,
            Err(failure) => return classify_failure(repo_full_name, failure),
        };

        let commits: Vec<CommitRecord> = raw
            .into_iter()
            .filter_map(|c| c.into_record(repo_full_name))
            .filter(|c| window.contains(&c.authored_at))
            .collect();
        debug!(repo = repo_full_name, commits = commits.len(), "fetched commits");
        Ok(RepoCommits::Fetched(commits))
    }
}

fn classify_failure(repo: &str, failure: ApiFailure) -> Result<RepoCommits> {
    if failure.is_cross_cutting() {
        return Err(failure.into_fatal(&format!("list commits for {repo}")));
    }
    let reason = match failure.status() {
        Some(StatusCode::NOT_FOUND) => "repository not found".to_string(),
        Some(StatusCode::CONFLICT) => "repository is empty".to_string(),
        Some(StatusCode::FORBIDDEN) => "access denied".to_string(),
        _ => failure.to_string(),
    };
    let err = WrappedError::RepositoryAccess {
        repo: repo.to_string(),
        reason,
    };
    warn!("{err}");
    Ok(RepoCommits::Skipped {
        reason: err.to_string(),
    })
}
