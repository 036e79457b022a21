use super::client::GitHubClient;
use crate::error::{Result, WrappedError};
use crate::model::{FilterSet, Repository};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) struct ApiRepository {
    pub name: String,
    pub full_name: String,
    pub language: Option<String>,
    #[serde(default)]
    pub private: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<ApiRepository> for Repository {
    fn from(r: ApiRepository) -> Self {
        Repository {
            name: r.name,
            full_name: r.full_name,
            language: r.language,
            is_private: r.private,
            created_at: r.created_at,
        }
    }
}

/// Validates an `owner/name` repository reference.
pub fn parse_full_name(raw: &str) -> Result<(String, String)> {
    let invalid = || WrappedError::Validation(format!("Repository must be owner/name, got '{raw}'"));
    let mut parts = raw.trim().split('/');
    let owner = parts.next().filter(|s| is_name_segment(s)).ok_or_else(invalid)?;
    let name = parts.next().filter(|s| is_name_segment(s)).ok_or_else(invalid)?;
    if parts.next().is_some() {
        return Err(invalid());
    }
    Ok((owner.to_string(), name.to_string()))
}

fn is_name_segment(s: &str) -> bool {
    !s.is_empty()
        && s != "."
        && s != ".."
        && s.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

impl GitHubClient {
    /// Every repository owned by the authenticated principal, with
    /// `filters` applied. Pagination is followed to the end.
    pub async fn list_repositories(&self, filters: &FilterSet) -> Result<Vec<Repository>> {
        let params = [
            ("affiliation", "owner".to_string()),
            ("visibility", "all".to_string()),
            ("sort", "full_name".to_string()),
        ];
        let raw: Vec<ApiRepository> = self
            .get_all("user/repos", &params)
            .await
            .map_err(|e| e.into_fatal("list repositories"))?;

        let mut seen = HashSet::new();
        let repos: Vec<Repository> = raw
            .into_iter()
            .filter(|r| seen.insert(r.full_name.clone()))
            .map(Repository::from)
            .filter(|r| filters.admits(r))
            .collect();

        info!(count = repos.len(), "listed repositories");
        Ok(repos)
    }

    /// Metadata for an explicitly targeted repository. Missing or
    /// inaccessible repositories degrade to [`Repository::bare`].
    pub async fn repository(&self, full_name: &str) -> Result<Repository> {
        let (owner, name) = parse_full_name(full_name)?;
        match self.get_one::<ApiRepository>(&format!("repos/{owner}/{name}")).await {
            Ok(repo) => Ok(repo.into()),
            Err(failure) if failure.is_cross_cutting() => Err(failure.into_fatal("fetch repository")),
            Err(failure) => {
                warn!(repo = full_name, error = %failure, "repository metadata unavailable");
                Ok(Repository::bare(full_name))
            }
        }
    }
}
