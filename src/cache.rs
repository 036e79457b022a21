use crate::error::{Result, WrappedError};
use crate::model::{CacheEntry, CollectionResult, FilterSet};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// One JSON file per `(principal, year)` under a cache directory.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStatus {
    pub valid: bool,
    pub age_hours: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheListing {
    pub principal: String,
    pub year: i32,
    pub path: PathBuf,
    pub age_hours: Option<f64>,
    /// Set when the file is named like an entry but does not parse as one.
    pub corrupt: Option<String>,
}

impl CacheStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_path(&self, principal: &str, year: i32) -> PathBuf {
        self.dir.join(format!("{}-{year}.json", file_key(principal)))
    }

    pub async fn is_valid(&self, principal: &str, year: i32, max_age_hours: f64) -> CacheStatus {
        self.is_valid_at(principal, year, max_age_hours, Utc::now()).await
    }

    pub async fn is_valid_at(
        &self,
        principal: &str,
        year: i32,
        max_age_hours: f64,
        now: DateTime<Utc>,
    ) -> CacheStatus {
        match self.load_entry(principal, year).await {
            Some(entry) => {
                let age = age_hours(&entry, now);
                CacheStatus {
                    valid: age.map(|a| a < max_age_hours).unwrap_or(false),
                    age_hours: age,
                }
            }
            None => CacheStatus {
                valid: false,
                age_hours: None,
            },
        }
    }

    pub async fn load(&self, principal: &str, year: i32) -> Option<CollectionResult> {
        self.load_entry(principal, year).await.map(CacheEntry::into_result)
    }

    /// Reads an entry. Unreadable, unparseable or undated entries are
    /// deleted and reported as absent.
    pub async fn load_entry(&self, principal: &str, year: i32) -> Option<CacheEntry> {
        let path = self.entry_path(principal, year);
        match read_entry(&path).await {
            Ok(entry) => entry,
            Err(reason) => {
                self.discard(&path, reason).await;
                None
            }
        }
    }

    async fn discard(&self, path: &Path, reason: String) {
        let err = WrappedError::CacheCorruption {
            path: path.to_path_buf(),
            reason,
        };
        warn!("{err}; deleting");
        if let Err(e) = fs::remove_file(path).await {
            debug!(path = %path.display(), error = %e, "could not delete corrupt cache entry");
        }
    }

    pub async fn save(
        &self,
        principal: &str,
        year: i32,
        filters: &FilterSet,
        result: &CollectionResult,
    ) -> Result<PathBuf> {
        self.save_at(principal, year, filters, result, Utc::now()).await
    }

    pub async fn save_at(
        &self,
        principal: &str,
        year: i32,
        filters: &FilterSet,
        result: &CollectionResult,
        now: DateTime<Utc>,
    ) -> Result<PathBuf> {
        let path = self.entry_path(principal, year);
        let entry = CacheEntry {
            principal: principal.to_string(),
            year,
            fetched_at: Some(now.timestamp_millis()),
            filters: filters.clone(),
            repos: result.repos.clone(),
            commits: result.commits.clone(),
        };
        let data = serde_json::to_string_pretty(&entry)?;
        write_atomic(&path, data.as_bytes())
            .await
            .map_err(|source| WrappedError::CacheWrite {
                path: path.clone(),
                source,
            })?;
        info!(path = %path.display(), commits = entry.commits.len(), "cache written");
        Ok(path)
    }

    /// Removes everything, every year of one principal, or one entry.
    /// Only files holding a cache entry are touched; anything else in the
    /// directory is left alone even when its name fits the pattern.
    pub async fn clear(&self, principal: Option<&str>, year: Option<i32>) -> Result<Vec<PathBuf>> {
        let mut deleted = Vec::new();
        for listing in self.scan().await? {
            let principal_matches = principal
                .map(|p| file_key(p) == listing.principal)
                .unwrap_or(true);
            let year_matches = year.map(|y| y == listing.year).unwrap_or(true);
            if principal_matches && year_matches && holds_entry(&listing.path).await {
                fs::remove_file(&listing.path).await?;
                deleted.push(listing.path);
            }
        }
        deleted.sort();
        Ok(deleted)
    }

    /// Read-only listing; corrupt entries are reported, not deleted.
    pub async fn entries(&self) -> Result<Vec<CacheListing>> {
        let now = Utc::now();
        let mut listings = Vec::new();
        for mut listing in self.scan().await? {
            match read_entry(&listing.path).await {
                Ok(Some(entry)) => listing.age_hours = age_hours(&entry, now),
                Ok(None) => continue,
                Err(reason) => listing.corrupt = Some(reason),
            }
            listings.push(listing);
        }
        listings.sort_by(|a, b| (&a.principal, a.year).cmp(&(&b.principal, b.year)));
        Ok(listings)
    }

    async fn scan(&self) -> Result<Vec<CacheListing>> {
        let mut listings = Vec::new();
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(listings),
            Err(e) => return Err(e.into()),
        };
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            let Some(stem) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(".json"))
            else {
                continue;
            };
            let Some((principal, year)) = stem.rsplit_once('-') else {
                continue;
            };
            let Ok(year) = year.parse::<i32>() else {
                continue;
            };
            listings.push(CacheListing {
                principal: principal.to_string(),
                year,
                path,
                age_hours: None,
                corrupt: None,
            });
        }
        Ok(listings)
    }
}

/// `Ok(None)` when the file does not exist; `Err` carries the reason an
/// existing file is unusable.
async fn read_entry(path: &Path) -> std::result::Result<Option<CacheEntry>, String> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.to_string()),
    };
    let entry = serde_json::from_str::<CacheEntry>(&content).map_err(|e| e.to_string())?;
    if entry.fetched_at.is_none() {
        return Err("missing fetchedAt".to_string());
    }
    Ok(Some(entry))
}

async fn holds_entry(path: &Path) -> bool {
    match fs::read_to_string(path).await {
        Ok(content) => serde_json::from_str::<CacheEntry>(&content).is_ok(),
        Err(_) => false,
    }
}

fn file_key(principal: &str) -> String {
    principal
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

fn age_hours(entry: &CacheEntry, now: DateTime<Utc>) -> Option<f64> {
    entry
        .fetched_at
        .map(|fetched| (now.timestamp_millis() - fetched) as f64 / MILLIS_PER_HOUR)
}

async fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, data).await?;
    fs::rename(&tmp, path).await
}
