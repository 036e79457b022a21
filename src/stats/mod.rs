//! Pure aggregations over a flat commit list. Nothing here depends on the
//! order of the input except where a ranking documents its tie-break.

pub mod messages;
pub mod streak;

use crate::model::{
    CommitRecord, DayCount, HourCount, LanguageCount, MonthCount, RepoCount, Repository,
    Statistics, WeekdayCount,
};
use chrono::{Datelike, Local, NaiveDate, TimeZone, Timelike};
use std::collections::{BTreeMap, HashMap, HashSet};

pub use messages::analyze_messages;
pub use streak::longest_streak;

pub const DEFAULT_TOP_N: usize = 5;
pub const UNKNOWN_LANGUAGE: &str = "Unknown";
const LANGUAGE_TOP_N: usize = 5;
const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// All metrics, bucketed by the local timezone.
pub fn compute_statistics(commits: &[CommitRecord], languages: &HashMap<String, String>) -> Statistics {
    compute_statistics_in(commits, languages, DEFAULT_TOP_N, &Local)
}

pub fn compute_statistics_in<Tz: TimeZone>(
    commits: &[CommitRecord],
    languages: &HashMap<String, String>,
    top_n: usize,
    tz: &Tz,
) -> Statistics {
    let active_days: HashSet<NaiveDate> = commits.iter().map(|c| local_date(c, tz)).collect();
    let repos_with_commits: HashSet<&str> = commits.iter().map(|c| c.repo_full_name.as_str()).collect();

    Statistics {
        total: commits.len(),
        top_repos: top_repositories(commits, top_n),
        most_active_day: most_active_day(commits, tz),
        most_active_month: most_active_month(commits, tz),
        longest_streak: longest_streak(commits, tz),
        by_weekday: commits_by_weekday(commits, tz),
        by_hour: commits_by_hour(commits, tz),
        language_breakdown: language_breakdown(commits, languages),
        active_days: active_days.len(),
        repos_with_commits: repos_with_commits.len(),
    }
}

pub fn top_repositories(commits: &[CommitRecord], n: usize) -> Vec<RepoCount> {
    let total = commits.len();
    ranked(commits.iter().map(|c| c.repo_full_name.as_str()))
        .into_iter()
        .take(n)
        .map(|(repo, count)| RepoCount {
            repo,
            count,
            percentage: percentage(count, total),
        })
        .collect()
}

/// Ties go to the earliest date.
pub fn most_active_day<Tz: TimeZone>(commits: &[CommitRecord], tz: &Tz) -> Option<DayCount> {
    let mut days: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for commit in commits {
        *days.entry(local_date(commit, tz)).or_insert(0) += 1;
    }
    first_max(days).map(|(date, count)| DayCount { date, count })
}

/// Ties go to the earliest month.
pub fn most_active_month<Tz: TimeZone>(commits: &[CommitRecord], tz: &Tz) -> Option<MonthCount> {
    let mut months: BTreeMap<(i32, u32), usize> = BTreeMap::new();
    for commit in commits {
        let date = local_date(commit, tz);
        *months.entry((date.year(), date.month())).or_insert(0) += 1;
    }
    first_max(months).map(|((year, month), count)| MonthCount {
        month: format!("{year:04}-{month:02}"),
        count,
    })
}

/// Always seven buckets, Monday first.
pub fn commits_by_weekday<Tz: TimeZone>(commits: &[CommitRecord], tz: &Tz) -> Vec<WeekdayCount> {
    let mut buckets = [0usize; 7];
    for commit in commits {
        let weekday = commit.authored_at.with_timezone(tz).weekday();
        buckets[weekday.num_days_from_monday() as usize] += 1;
    }
    WEEKDAYS
        .iter()
        .zip(buckets)
        .map(|(name, count)| WeekdayCount {
            weekday: name.to_string(),
            count,
        })
        .collect()
}

/// Always 24 buckets, hour 0 first.
pub fn commits_by_hour<Tz: TimeZone>(commits: &[CommitRecord], tz: &Tz) -> Vec<HourCount> {
    let mut buckets = [0usize; 24];
    for commit in commits {
        buckets[commit.authored_at.with_timezone(tz).hour() as usize] += 1;
    }
    buckets
        .into_iter()
        .enumerate()
        .map(|(hour, count)| HourCount {
            hour: hour as u32,
            count,
        })
        .collect()
}

pub fn language_breakdown(
    commits: &[CommitRecord],
    languages: &HashMap<String, String>,
) -> Vec<LanguageCount> {
    let total = commits.len();
    ranked(commits.iter().map(|c| {
        languages
            .get(&c.repo_full_name)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_LANGUAGE)
    }))
    .into_iter()
    .take(LANGUAGE_TOP_N)
    .map(|(language, count)| LanguageCount {
        language,
        count,
        percentage: percentage(count, total),
    })
    .collect()
}

/// `full_name -> language` for repositories that report one.
pub fn language_map(repos: &[Repository]) -> HashMap<String, String> {
    repos
        .iter()
        .filter_map(|r| r.language.clone().map(|l| (r.full_name.clone(), l)))
        .collect()
}

/// Counts keys and orders them by count descending; equal counts keep
/// the order in which keys were first seen.
pub(crate) fn ranked<'a, I>(keys: I) -> Vec<(String, usize)>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut index: HashMap<&'a str, usize> = HashMap::new();
    let mut counts: Vec<(&'a str, usize)> = Vec::new();
    for key in keys {
        match index.get(key) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(key, counts.len());
                counts.push((key, 1));
            }
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.into_iter().map(|(k, c)| (k.to_string(), c)).collect()
}

pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        round1(100.0 * count as f64 / total as f64)
    }
}

fn first_max<K>(buckets: BTreeMap<K, usize>) -> Option<(K, usize)> {
    buckets.into_iter().fold(None, |best, (key, count)| match best {
        Some((_, best_count)) if best_count >= count => best,
        _ => Some((key, count)),
    })
}

fn local_date<Tz: TimeZone>(commit: &CommitRecord, tz: &Tz) -> NaiveDate {
    commit.authored_at.with_timezone(tz).date_naive()
}
