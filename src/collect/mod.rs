//! Batched collection of a principal's commits for one year.
//!
//! Repositories are fetched in consecutive batches of `batch_size`; the
//! members of a batch run concurrently and the next batch starts only
//! once every member of the current one has resolved.

pub mod progress;

use crate::cache::CacheStore;
use crate::config::CollectOptions;
use crate::error::{Result, WrappedError};
use crate::github::{parse_full_name, GitHubClient, RepoCommits};
use crate::model::{CollectionResult, CommitRecord, FilterSet, Repository, YearWindow};
use async_trait::async_trait;
use chrono::Local;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub use progress::{BarProgress, NoProgress, ProgressEvent, ProgressSink};

/// Remote side of the collector.
#[async_trait]
pub trait CommitSource: Send + Sync {
    async fn list_repositories(&self, filters: &FilterSet) -> Result<Vec<Repository>>;

    async fn repository(&self, full_name: &str) -> Result<Repository>;

    async fn fetch_commits(
        &self,
        repo_full_name: &str,
        window: &YearWindow,
        author: Option<&str>,
    ) -> Result<RepoCommits>;
}

#[async_trait]
impl CommitSource for GitHubClient {
    async fn list_repositories(&self, filters: &FilterSet) -> Result<Vec<Repository>> {
        GitHubClient::list_repositories(self, filters).await
    }

    async fn repository(&self, full_name: &str) -> Result<Repository> {
        GitHubClient::repository(self, full_name).await
    }

    async fn fetch_commits(
        &self,
        repo_full_name: &str,
        window: &YearWindow,
        author: Option<&str>,
    ) -> Result<RepoCommits> {
        GitHubClient::fetch_commits(self, repo_full_name, window, author).await
    }
}

#[derive(Debug, Clone, Default)]
pub struct Collection {
    pub repos: Vec<Repository>,
    pub commits: Vec<CommitRecord>,
    pub warnings: Vec<String>,
    pub from_cache: bool,
    pub batches: usize,
}

pub struct Collector<'a, S: CommitSource + ?Sized> {
    source: &'a S,
    cache: &'a CacheStore,
    progress: &'a dyn ProgressSink,
    cancel: CancellationToken,
}

impl<'a, S: CommitSource + ?Sized> Collector<'a, S> {
    pub fn new(source: &'a S, cache: &'a CacheStore) -> Self {
        Self {
            source,
            cache,
            progress: &NoProgress,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    /// Checked between batches; an in-flight batch always completes.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn collect(&self, options: &CollectOptions) -> Result<Collection> {
        if options.batch_size == 0 {
            return Err(WrappedError::Validation("batch size must be at least 1".to_string()));
        }
        // Same calendar as the statistics, which bucket in local time.
        let window = YearWindow::in_timezone(options.year, &Local)?;
        if let Some(repo) = &options.explicit_repo {
            parse_full_name(repo)?;
        }

        if options.use_cache && options.explicit_repo.is_none() {
            if let Some(collection) = self.from_cache(options).await {
                return Ok(collection);
            }
        }

        let repos = match &options.explicit_repo {
            Some(full_name) => vec![self.source.repository(full_name).await?],
            None => self.source.list_repositories(&options.filters).await?,
        };
        self.progress.report(&ProgressEvent::ReposResolved { total: repos.len() });

        let (commits, mut warnings, batches) = self.fetch_batches(&repos, &window, options).await?;

        let result = CollectionResult { repos, commits };
        if options.explicit_repo.is_none() {
            match self
                .cache
                .save(&options.principal, options.year, &options.filters, &result)
                .await
            {
                Ok(_) => {}
                Err(e) if !e.is_fatal() => {
                    warn!("{e}");
                    warnings.push(e.to_string());
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            repos = result.repos.len(),
            commits = result.commits.len(),
            batches,
            skipped = warnings.len(),
            "collection finished"
        );
        self.progress.report(&ProgressEvent::Finished {
            commits: result.commits.len(),
            repos: result.repos.len(),
        });

        Ok(Collection {
            repos: result.repos,
            commits: result.commits,
            warnings,
            from_cache: false,
            batches,
        })
    }

    async fn from_cache(&self, options: &CollectOptions) -> Option<Collection> {
        let status = self
            .cache
            .is_valid(&options.principal, options.year, options.cache_max_age_hours)
            .await;
        if !status.valid {
            return None;
        }
        let entry = self.cache.load_entry(&options.principal, options.year).await?;
        if !entry.filters.covers(&options.filters) {
            info!("cached entry was collected with narrower filters; refetching");
            return None;
        }

        let result = options.filters.apply(entry.into_result());
        let age_hours = status.age_hours.unwrap_or_default();
        info!(age_hours, commits = result.commits.len(), "using cached collection");
        self.progress.report(&ProgressEvent::CacheHit {
            age_hours,
            commits: result.commits.len(),
        });
        Some(Collection {
            repos: result.repos,
            commits: result.commits,
            warnings: Vec::new(),
            from_cache: true,
            batches: 0,
        })
    }

    async fn fetch_batches(
        &self,
        repos: &[Repository],
        window: &YearWindow,
        options: &CollectOptions,
    ) -> Result<(Vec<CommitRecord>, Vec<String>, usize)> {
        let total = repos.len();
        let batch_count = total.div_ceil(options.batch_size);
        let author = Some(options.principal.as_str());

        let mut commits = Vec::new();
        let mut warnings = Vec::new();
        let mut processed = 0usize;
        let mut fetched_so_far = 0usize;

        for (index, batch) in repos.chunks(options.batch_size).enumerate() {
            if self.cancel.is_cancelled() {
                return Err(WrappedError::Cancelled);
            }
            self.progress.report(&ProgressEvent::BatchStarted {
                index,
                batches: batch_count,
                size: batch.len(),
            });

            let mut pending: FuturesUnordered<_> = batch
                .iter()
                .enumerate()
                .map(|(slot, repo)| {
                    let name = repo.full_name.as_str();
                    async move { (slot, name, self.source.fetch_commits(name, window, author).await) }
                })
                .collect();

            // Results land in repository order whatever the completion order.
            let mut slots: Vec<RepoCommits> = Vec::with_capacity(batch.len());
            slots.resize_with(batch.len(), || RepoCommits::Fetched(Vec::new()));
            while let Some((slot, name, outcome)) = pending.next().await {
                let outcome = outcome?;
                match &outcome {
                    RepoCommits::Fetched(fetched) => fetched_so_far += fetched.len(),
                    RepoCommits::Skipped { reason } => {
                        self.progress.report(&ProgressEvent::RepoSkipped {
                            label: name.to_string(),
                            reason: reason.clone(),
                        });
                    }
                }
                slots[slot] = outcome;
                processed += 1;
                self.progress.report(&ProgressEvent::RepoFinished {
                    label: name.to_string(),
                    processed,
                    total,
                    commits_so_far: fetched_so_far,
                });
            }

            for outcome in slots {
                match outcome {
                    RepoCommits::Fetched(mut fetched) => commits.append(&mut fetched),
                    RepoCommits::Skipped { reason } => warnings.push(reason),
                }
            }
        }

        Ok((commits, warnings, batch_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedSource {
        repos: Vec<Repository>,
        skipped: HashSet<String>,
        fatal: HashSet<String>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        list_calls: AtomicUsize,
        fetch_calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(count: usize) -> Self {
            let repos = (1..=count)
                .map(|i| Repository {
                    is_private: i % 2 == 0,
                    language: Some(if i % 3 == 0 { "Go" } else { "Rust" }.to_string()),
                    ..Repository::bare(&format!("me/repo{i}"))
                })
                .collect();
            Self {
                repos,
                skipped: HashSet::new(),
                fatal: HashSet::new(),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                list_calls: AtomicUsize::new(0),
                fetch_calls: AtomicUsize::new(0),
            }
        }

        fn skipping(mut self, repo: &str) -> Self {
            self.skipped.insert(repo.to_string());
            self
        }

        fn failing(mut self, repo: &str) -> Self {
            self.fatal.insert(repo.to_string());
            self
        }
    }

    #[async_trait]
    impl CommitSource for ScriptedSource {
        async fn list_repositories(&self, filters: &FilterSet) -> Result<Vec<Repository>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.repos.iter().filter(|r| filters.admits(r)).cloned().collect())
        }

        async fn repository(&self, full_name: &str) -> Result<Repository> {
            Ok(Repository::bare(full_name))
        }

        async fn fetch_commits(
            &self,
            repo_full_name: &str,
            window: &YearWindow,
            _author: Option<&str>,
        ) -> Result<RepoCommits> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fatal.contains(repo_full_name) {
                return Err(WrappedError::RateLimit { reset: None });
            }
            if self.skipped.contains(repo_full_name) {
                return Ok(RepoCommits::Skipped {
                    reason: format!("{repo_full_name}: access denied"),
                });
            }
            let commits = (0..2)
                .map(|i| CommitRecord {
                    sha: format!("{repo_full_name}-{i}"),
                    message: format!("work on {repo_full_name}"),
                    authored_at: window.since + Duration::days(i),
                    repo_full_name: repo_full_name.to_string(),
                })
                .collect();
            Ok(RepoCommits::Fetched(commits))
        }
    }

    fn options(batch_size: usize) -> CollectOptions {
        CollectOptions {
            principal: "me".to_string(),
            year: 2024,
            filters: FilterSet::default(),
            explicit_repo: None,
            batch_size,
            use_cache: true,
            cache_max_age_hours: 24.0,
        }
    }

    #[tokio::test]
    async fn failed_repository_does_not_abort_its_batch() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(dir.path());
        let source = ScriptedSource::new(7).skipping("me/repo4");
        let events = Mutex::new(Vec::new());
        let sink = |e: &ProgressEvent| events.lock().unwrap().push(e.clone());

        let collection = Collector::new(&source, &cache)
            .with_progress(&sink)
            .collect(&options(3))
            .await
            .unwrap();

        assert_eq!(collection.batches, 3);
        assert_eq!(collection.commits.len(), 12);
        let repos: HashSet<_> = collection
            .commits
            .iter()
            .map(|c| c.repo_full_name.as_str())
            .collect();
        assert_eq!(repos.len(), 6);
        assert!(!repos.contains("me/repo4"));
        let mut order: Vec<&str> = collection.commits.iter().map(|c| c.repo_full_name.as_str()).collect();
        order.dedup();
        assert_eq!(order, vec!["me/repo1", "me/repo2", "me/repo3", "me/repo5", "me/repo6", "me/repo7"]);
        assert_eq!(collection.warnings.len(), 1);

        let events = events.lock().unwrap();
        let sizes: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::BatchStarted { size, .. } => Some(*size),
                _ => None,
            })
            .collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        let finished = events
            .iter()
            .filter(|e| matches!(e, ProgressEvent::RepoFinished { .. }))
            .count();
        assert_eq!(finished, 7);
        assert!(matches!(
            events.last(),
            Some(ProgressEvent::Finished { commits: 12, repos: 7 })
        ));
    }

    #[tokio::test]
    async fn in_flight_fetches_never_exceed_batch_size() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(dir.path());
        let source = ScriptedSource::new(10);

        Collector::new(&source, &cache).collect(&options(4)).await.unwrap();

        let max = source.max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 4, "max in flight was {max}");
        assert!(max > 1, "batch members should overlap");
        assert_eq!(source.fetch_calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn fatal_fetch_error_propagates_without_caching() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(dir.path());
        let source = ScriptedSource::new(5).failing("me/repo2");

        let err = Collector::new(&source, &cache)
            .collect(&options(2))
            .await
            .unwrap_err();
        assert!(matches!(err, WrappedError::RateLimit { .. }));
        assert!(cache.load("me", 2024).await.is_none());
    }

    #[tokio::test]
    async fn valid_cache_skips_the_remote() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(dir.path());
        let first = ScriptedSource::new(3);
        Collector::new(&first, &cache).collect(&options(5)).await.unwrap();

        let second = ScriptedSource::new(3);
        let collection = Collector::new(&second, &cache).collect(&options(5)).await.unwrap();
        assert!(collection.from_cache);
        assert_eq!(collection.commits.len(), 6);
        assert_eq!(second.list_calls.load(Ordering::SeqCst), 0);
        assert_eq!(second.fetch_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn refresh_bypasses_cache_but_rewrites_it() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(dir.path());
        let old = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        cache
            .save_at("me", 2024, &FilterSet::default(), &CollectionResult::default(), old)
            .await
            .unwrap();

        let source = ScriptedSource::new(2);
        let mut opts = options(5);
        opts.use_cache = false;
        let collection = Collector::new(&source, &cache).collect(&opts).await.unwrap();
        assert!(!collection.from_cache);
        assert_eq!(source.list_calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.load("me", 2024).await.unwrap().commits.len(), 4);
    }

    #[tokio::test]
    async fn broader_cached_entry_is_refiltered() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(dir.path());
        let source = ScriptedSource::new(4);
        Collector::new(&source, &cache).collect(&options(5)).await.unwrap();

        let mut public = options(5);
        public.filters = FilterSet::new(true, vec!["me/repo1".to_string()]);
        let again = ScriptedSource::new(4);
        let collection = Collector::new(&again, &cache).collect(&public).await.unwrap();

        assert!(collection.from_cache);
        let names: Vec<_> = collection.repos.iter().map(|r| r.full_name.as_str()).collect();
        assert_eq!(names, vec!["me/repo3"]);
        assert!(collection.commits.iter().all(|c| c.repo_full_name == "me/repo3"));
        assert_eq!(again.list_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn narrower_cached_entry_is_refetched() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(dir.path());
        let mut public = options(5);
        public.filters = FilterSet::new(true, Vec::new());
        Collector::new(&ScriptedSource::new(4), &cache)
            .collect(&public)
            .await
            .unwrap();

        let source = ScriptedSource::new(4);
        let collection = Collector::new(&source, &cache).collect(&options(5)).await.unwrap();
        assert!(!collection.from_cache);
        assert_eq!(collection.repos.len(), 4);
        assert_eq!(source.list_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn explicit_repository_bypasses_lister_and_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(dir.path());
        let source = ScriptedSource::new(4);
        let mut opts = options(5);
        opts.explicit_repo = Some("other/thing".to_string());

        let collection = Collector::new(&source, &cache).collect(&opts).await.unwrap();
        assert_eq!(collection.repos, vec![Repository::bare("other/thing")]);
        assert_eq!(collection.commits.len(), 2);
        assert_eq!(source.list_calls.load(Ordering::SeqCst), 0);
        assert!(cache.load("me", 2024).await.is_none());
    }

    #[tokio::test]
    async fn malformed_explicit_repository_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(dir.path());
        let mut opts = options(5);
        opts.explicit_repo = Some("not-a-repo".to_string());

        let err = Collector::new(&ScriptedSource::new(1), &cache)
            .collect(&opts)
            .await
            .unwrap_err();
        assert!(matches!(err, WrappedError::Validation(_)));
    }

    #[tokio::test]
    async fn cancellation_is_honored_at_batch_boundaries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(dir.path());
        let source = ScriptedSource::new(6);
        let token = CancellationToken::new();
        let cancel_after_first = {
            let token = token.clone();
            move |e: &ProgressEvent| {
                if let ProgressEvent::RepoFinished { processed: 2, .. } = e {
                    token.cancel();
                }
            }
        };

        let err = Collector::new(&source, &cache)
            .with_progress(&cancel_after_first)
            .with_cancellation(token)
            .collect(&options(2))
            .await
            .unwrap_err();
        assert!(matches!(err, WrappedError::Cancelled));
        assert_eq!(source.fetch_calls.load(Ordering::SeqCst), 2);
        assert!(cache.load("me", 2024).await.is_none());
    }

    #[tokio::test]
    async fn cache_write_failure_is_only_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();
        let cache = CacheStore::new(&blocker);

        let collection = Collector::new(&ScriptedSource::new(2), &cache)
            .collect(&options(5))
            .await
            .unwrap();
        assert_eq!(collection.commits.len(), 4);
        assert_eq!(collection.warnings.len(), 1);
        assert!(collection.warnings[0].contains("Failed to write cache entry"));
    }
}
