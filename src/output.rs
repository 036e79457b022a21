use crate::cache::CacheListing;
use crate::collect::Collection;
use crate::model::{MessageAnalysis, Statistics, WrappedOutput, SCHEMA_VERSION};
use anyhow::Result;
use chrono::Utc;
use console::style;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub fn build_output(
    principal: &str,
    year: i32,
    collection: &Collection,
    statistics: Statistics,
    messages: MessageAnalysis,
) -> WrappedOutput {
    WrappedOutput {
        version: SCHEMA_VERSION,
        generated_at: Utc::now(),
        principal: principal.to_string(),
        year,
        from_cache: collection.from_cache,
        statistics,
        messages,
        warnings: collection.warnings.clone(),
    }
}

pub fn output_json(output: &WrappedOutput) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(output)?);
    Ok(())
}

pub fn output_summary(output: &WrappedOutput) -> Result<()> {
    let stats = &output.statistics;
    let msgs = &output.messages;

    println!(
        "{}",
        style(format!("{} in {}", output.principal, output.year)).bold()
    );
    println!("{}", "─".repeat(50));

    if stats.total == 0 {
        println!("No commits found for {}", output.year);
        print_warnings(&output.warnings);
        return Ok(());
    }

    println!(
        "Commits: {}  across {} repositories on {} active days",
        style(stats.total).cyan(),
        style(stats.repos_with_commits).cyan(),
        style(stats.active_days).cyan()
    );
    if let Some(streak) = &stats.longest_streak {
        println!(
            "Longest streak: {} days ({} to {})",
            style(streak.length_days).green(),
            streak.start_date,
            streak.end_date
        );
    }
    if let Some(day) = &stats.most_active_day {
        println!("Busiest day: {} ({} commits)", day.date, day.count);
    }
    if let Some(month) = &stats.most_active_month {
        println!("Busiest month: {} ({} commits)", month.month, month.count);
    }

    println!("\n{}", style("Top repositories").bold());
    for repo in &stats.top_repos {
        println!("  {:<40} {:>5} {:>6.1}%", repo.repo, repo.count, repo.percentage);
    }

    println!("\n{}", style("By weekday").bold());
    let max = stats.by_weekday.iter().map(|w| w.count).max().unwrap_or(0);
    for day in &stats.by_weekday {
        println!(
            "  {:<10} {} {}",
            day.weekday,
            style(bar(day.count, max, 30)).green(),
            day.count
        );
    }

    if !stats.language_breakdown.is_empty() {
        println!("\n{}", style("Languages").bold());
        for lang in &stats.language_breakdown {
            println!("  {:<20} {:>5} {:>6.1}%", lang.language, lang.count, lang.percentage);
        }
    }

    println!("\n{}", style("Commit messages").bold());
    println!("  Average length: {} words", msgs.avg_length);
    if let Some(shortest) = &msgs.shortest_message {
        println!("  Shortest: {}", style(shortest).dim());
    }
    if let Some(longest) = &msgs.longest_message {
        println!("  Longest:  {}", style(longest).dim());
    }
    if !msgs.top_words.is_empty() {
        let words: Vec<String> = msgs
            .top_words
            .iter()
            .map(|w| format!("{} ({})", w.word, w.count))
            .collect();
        println!("  Top words: {}", words.join(", "));
    }
    if !msgs.top_first_words.is_empty() {
        let words: Vec<String> = msgs
            .top_first_words
            .iter()
            .map(|w| format!("{} ({})", w.word, w.count))
            .collect();
        println!("  Favourite openers: {}", words.join(", "));
    }

    print_warnings(&output.warnings);
    if output.from_cache {
        println!("\n{}", style("Served from cache; pass --refresh to refetch.").dim());
    }
    Ok(())
}

fn print_warnings(warnings: &[String]) {
    if warnings.is_empty() {
        return;
    }
    println!("\n{} {}", style("Warnings").yellow().bold(), warnings.len());
    for w in warnings {
        println!("  {}", style(w).yellow());
    }
}

pub fn output_cache_status(dir: &Path, listings: &[CacheListing], max_age_hours: f64) {
    println!("{} {}", style("Cache directory").bold(), dir.display());
    if listings.is_empty() {
        println!("  (empty)");
        return;
    }
    for listing in listings {
        let age = listing
            .age_hours
            .map(format_age)
            .unwrap_or_else(|| "unknown".to_string());
        let fresh = listing.age_hours.is_some_and(|h| h < max_age_hours);
        let state = if listing.corrupt.is_some() {
            style("corrupt").red()
        } else if fresh {
            style("fresh").green()
        } else {
            style("stale").yellow()
        };
        println!("  {:<24} {:>6} {:>12} {}", listing.principal, listing.year, age, state);
    }
}

pub fn output_cleared(deleted: &[PathBuf]) {
    if deleted.is_empty() {
        println!("No cache entries matched");
        return;
    }
    for path in deleted {
        println!("removed {}", path.display());
    }
}

/// Whole minutes, rendered by humantime (`3h 5m`).
fn format_age(hours: f64) -> String {
    let minutes = (hours.max(0.0) * 60.0).round() as u64;
    humantime::format_duration(Duration::from_secs(minutes * 60)).to_string()
}

fn bar(count: usize, max: usize, width: usize) -> String {
    if max == 0 {
        return String::new();
    }
    let filled = (count * width).div_ceil(max);
    "█".repeat(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{analyze_messages, compute_statistics};
    use std::collections::HashMap;

    #[test]
    fn bar_scales_to_width() {
        assert_eq!(bar(0, 0, 10), "");
        assert_eq!(bar(10, 10, 10).chars().count(), 10);
        assert_eq!(bar(1, 10, 10).chars().count(), 1);
        assert_eq!(bar(0, 10, 10), "");
    }

    #[test]
    fn ages_round_to_minutes() {
        assert_eq!(format_age(0.0), "0s");
        assert_eq!(format_age(1.5), "1h 30m");
        assert_eq!(format_age(25.0), "1day 1h");
    }

    #[test]
    fn json_document_shape() {
        let collection = Collection {
            warnings: vec!["me/x skipped".to_string()],
            from_cache: true,
            ..Collection::default()
        };
        let output = build_output(
            "me",
            2024,
            &collection,
            compute_statistics(&[], &HashMap::new()),
            analyze_messages(&[]),
        );
        let value = serde_json::to_value(&output).unwrap();
        assert_eq!(value["principal"], "me");
        assert_eq!(value["fromCache"], true);
        assert_eq!(value["statistics"]["byWeekday"].as_array().unwrap().len(), 7);
        assert_eq!(value["warnings"][0], "me/x skipped");
    }
}
