use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WrappedError};

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub name: String,
    pub full_name: String,
    pub language: Option<String>,
    pub is_private: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Repository {
    /// Placeholder for an explicitly targeted repository whose metadata
    /// could not be fetched.
    pub fn bare(full_name: &str) -> Self {
        let name = full_name.rsplit('/').next().unwrap_or(full_name).to_string();
        Self {
            name,
            full_name: full_name.to_string(),
            language: None,
            is_private: false,
            created_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRecord {
    pub sha: String,
    pub message: String,
    pub authored_at: DateTime<Utc>,
    pub repo_full_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionResult {
    pub repos: Vec<Repository>,
    pub commits: Vec<CommitRecord>,
}

/// Repository visibility and exclusion filters applied to a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSet {
    pub public_only: bool,
    pub exclude: Vec<String>,
}

impl FilterSet {
    pub fn new(public_only: bool, exclude: impl IntoIterator<Item = String>) -> Self {
        let mut exclude: Vec<String> = exclude.into_iter().collect();
        exclude.sort();
        exclude.dedup();
        Self { public_only, exclude }
    }

    pub fn admits(&self, repo: &Repository) -> bool {
        if self.public_only && repo.is_private {
            return false;
        }
        !self.exclude.iter().any(|e| e == &repo.full_name)
    }

    /// True when data produced under `self` is a superset of what `other`
    /// would have produced, so `other` can be re-applied on top of it.
    pub fn covers(&self, other: &FilterSet) -> bool {
        if self.public_only && !other.public_only {
            return false;
        }
        self.exclude.iter().all(|e| other.exclude.contains(e))
    }

    pub fn apply(&self, result: CollectionResult) -> CollectionResult {
        let repos: Vec<Repository> = result
            .repos
            .into_iter()
            .filter(|r| self.admits(r))
            .collect();
        let commits = result
            .commits
            .into_iter()
            .filter(|c| repos.iter().any(|r| r.full_name == c.repo_full_name))
            .collect();
        CollectionResult { repos, commits }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub principal: String,
    pub year: i32,
    /// Epoch milliseconds.
    pub fetched_at: Option<i64>,
    #[serde(default)]
    pub filters: FilterSet,
    pub repos: Vec<Repository>,
    pub commits: Vec<CommitRecord>,
}

impl CacheEntry {
    pub fn into_result(self) -> CollectionResult {
        CollectionResult {
            repos: self.repos,
            commits: self.commits,
        }
    }
}

/// Inclusive bounds of one calendar year, stored as UTC instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearWindow {
    pub year: i32,
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl YearWindow {
    /// `[Jan 1 00:00:00, Dec 31 23:59:59]` in UTC.
    pub fn new(year: i32) -> Result<Self> {
        Self::in_timezone(year, &Utc)
    }

    /// The year as a calendar in `tz` sees it, so every commit inside the
    /// window lands on a date of `year` when bucketed in `tz`.
    pub fn in_timezone<Tz: TimeZone>(year: i32, tz: &Tz) -> Result<Self> {
        let invalid = || WrappedError::InvalidDate(format!("Invalid year: {year}"));
        let since = tz
            .with_ymd_and_hms(year, 1, 1, 0, 0, 0)
            .earliest()
            .ok_or_else(invalid)?
            .with_timezone(&Utc);
        let next = tz
            .with_ymd_and_hms(year.checked_add(1).ok_or_else(invalid)?, 1, 1, 0, 0, 0)
            .earliest()
            .ok_or_else(invalid)?
            .with_timezone(&Utc);
        Ok(Self {
            year,
            since,
            until: next - chrono::Duration::seconds(1),
        })
    }

    pub fn contains(&self, timestamp: &DateTime<Utc>) -> bool {
        timestamp >= &self.since && timestamp <= &self.until
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakInterval {
    pub length_days: u32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoCount {
    pub repo: String,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayCount {
    pub date: NaiveDate,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthCount {
    /// `YYYY-MM`
    pub month: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekdayCount {
    pub weekday: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourCount {
    pub hour: u32,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageCount {
    pub language: String,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total: usize,
    pub top_repos: Vec<RepoCount>,
    pub most_active_day: Option<DayCount>,
    pub most_active_month: Option<MonthCount>,
    pub longest_streak: Option<StreakInterval>,
    pub by_weekday: Vec<WeekdayCount>,
    pub by_hour: Vec<HourCount>,
    pub language_breakdown: Vec<LanguageCount>,
    pub active_days: usize,
    pub repos_with_commits: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordCount {
    pub word: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageAnalysis {
    pub top_words: Vec<WordCount>,
    pub avg_length: f64,
    pub shortest_message: Option<String>,
    pub longest_message: Option<String>,
    pub top_first_words: Vec<WordCount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrappedOutput {
    pub version: u32,
    pub generated_at: DateTime<Utc>,
    pub principal: String,
    pub year: i32,
    pub from_cache: bool,
    pub statistics: Statistics,
    pub messages: MessageAnalysis,
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(full_name: &str, is_private: bool) -> Repository {
        Repository {
            is_private,
            ..Repository::bare(full_name)
        }
    }

    #[test]
    fn year_window_follows_the_timezone() {
        let plus_two = chrono::FixedOffset::east_opt(2 * 3600).unwrap();
        let w = YearWindow::in_timezone(2024, &plus_two).unwrap();
        assert_eq!(w.since, Utc.with_ymd_and_hms(2023, 12, 31, 22, 0, 0).unwrap());
        assert_eq!(w.until, Utc.with_ymd_and_hms(2024, 12, 31, 21, 59, 59).unwrap());
        // Already Jan 1 2025 at UTC+2.
        assert!(!w.contains(&Utc.with_ymd_and_hms(2024, 12, 31, 23, 30, 0).unwrap()));
        assert!(w.contains(&Utc.with_ymd_and_hms(2023, 12, 31, 23, 30, 0).unwrap()));
        assert_eq!(YearWindow::in_timezone(2024, &Utc).unwrap(), YearWindow::new(2024).unwrap());
    }

    #[test]
    fn year_window_bounds() {
        let w = YearWindow::new(2024).unwrap();
        assert_eq!(w.since.to_rfc3339(), "2024-01-01T00:00:00+00:00");
        assert_eq!(w.until.to_rfc3339(), "2024-12-31T23:59:59+00:00");
        assert!(w.contains(&Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap()));
        assert!(!w.contains(&Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()));
    }

    #[test]
    fn filter_set_admits() {
        let f = FilterSet::new(true, vec!["me/skip".to_string()]);
        assert!(f.admits(&repo("me/open", false)));
        assert!(!f.admits(&repo("me/secret", true)));
        assert!(!f.admits(&repo("me/skip", false)));
    }

    #[test]
    fn broader_filters_cover_narrower() {
        let all = FilterSet::default();
        let public = FilterSet::new(true, Vec::new());
        let public_excl = FilterSet::new(true, vec!["me/a".to_string()]);
        assert!(all.covers(&public));
        assert!(public.covers(&public_excl));
        assert!(!public.covers(&all));
        assert!(!public_excl.covers(&public));
    }

    #[test]
    fn apply_drops_commits_of_filtered_repos() {
        let result = CollectionResult {
            repos: vec![repo("me/open", false), repo("me/secret", true)],
            commits: vec![
                CommitRecord {
                    sha: "a".into(),
                    message: "x".into(),
                    authored_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                    repo_full_name: "me/open".into(),
                },
                CommitRecord {
                    sha: "b".into(),
                    message: "y".into(),
                    authored_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                    repo_full_name: "me/secret".into(),
                },
            ],
        };
        let filtered = FilterSet::new(true, Vec::new()).apply(result);
        assert_eq!(filtered.repos.len(), 1);
        assert_eq!(filtered.commits.len(), 1);
        assert_eq!(filtered.commits[0].sha, "a");
    }

    #[test]
    fn bare_repository_name() {
        let r = Repository::bare("octo/cat");
        assert_eq!(r.name, "cat");
        assert_eq!(r.full_name, "octo/cat");
    }
}
