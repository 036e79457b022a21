use crate::model::{CommitRecord, StreakInterval};
use chrono::{NaiveDate, TimeZone};
use std::collections::BTreeSet;

/// Longest run of consecutive calendar days with at least one commit,
/// with days taken in `tz`. Several commits on one day count once.
pub fn longest_streak<Tz: TimeZone>(commits: &[CommitRecord], tz: &Tz) -> Option<StreakInterval> {
    longest_run(commits.iter().map(|c| c.authored_at.with_timezone(tz).date_naive()))
}

/// The earliest run wins when two runs have the same length.
pub fn longest_run<I>(dates: I) -> Option<StreakInterval>
where
    I: IntoIterator<Item = NaiveDate>,
{
    let days: BTreeSet<NaiveDate> = dates.into_iter().collect();
    let mut iter = days.into_iter();
    let first = iter.next()?;

    let mut best = StreakInterval {
        length_days: 1,
        start_date: first,
        end_date: first,
    };
    let mut run_start = first;
    let mut run_len = 1u32;
    let mut prev = first;

    for day in iter {
        if (day - prev).num_days() == 1 {
            run_len += 1;
        } else {
            run_len = 1;
            run_start = day;
        }
        if run_len > best.length_days {
            best = StreakInterval {
                length_days: run_len,
                start_date: run_start,
                end_date: day,
            };
        }
        prev = day;
    }

    Some(best)
}
