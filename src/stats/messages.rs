use super::{ranked, round1};
use crate::model::{CommitRecord, MessageAnalysis, WordCount};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

pub const DEFAULT_TOP_WORDS: usize = 10;
const TOP_FIRST_WORDS: usize = 5;
const MIN_WORD_LEN: usize = 3;
const PREVIEW_CHARS: usize = 80;

static VERSION_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^v?\d+\.\d+(\.\d+)?$").expect("valid version regex"));

static STOPWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "the", "and", "for", "with", "from", "into", "onto", "this", "that", "these", "those",
        "are", "was", "were", "been", "being", "has", "have", "had", "does", "did", "not",
        "but", "nor", "yet", "its", "our", "ours", "your", "yours", "their", "them", "they",
        "you", "she", "him", "her", "his", "who", "whom", "what", "which", "when", "where",
        "why", "how", "all", "any", "some", "can", "will", "would", "should", "could", "may",
        "might", "must", "shall", "just", "also", "than", "then", "there", "here", "out",
        "off", "over", "under", "about", "after", "before", "via", "per", "use", "using",
        "more", "most", "very", "too", "only", "own", "same", "such", "each", "other",
        "now",
    ]
    .into_iter()
    .collect()
});

/// Lowercases, replaces every character that is neither alphanumeric nor
/// whitespace with a space and splits on whitespace.
pub fn tokenize(message: &str) -> Vec<String> {
    message
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Tokens that survive stopword, length and version-number filtering.
/// Version-shaped words (`v1.2.3`) are dropped whole, before punctuation
/// would split them into fragments.
pub fn significant_words(message: &str) -> Vec<String> {
    message
        .split_whitespace()
        .filter(|raw| !VERSION_SHAPE.is_match(&raw.to_lowercase()))
        .flat_map(tokenize)
        .filter(|token| is_significant(token))
        .collect()
}

fn is_significant(token: &str) -> bool {
    token.chars().count() >= MIN_WORD_LEN
        && !STOPWORDS.contains(token)
        && !VERSION_SHAPE.is_match(token)
}

/// Most frequent significant words; ties keep first-seen order.
pub fn top_words(commits: &[CommitRecord], n: usize) -> Vec<WordCount> {
    let words: Vec<String> = commits
        .iter()
        .flat_map(|c| significant_words(&c.message))
        .collect();
    to_word_counts(ranked(words.iter().map(String::as_str)), n)
}

pub fn analyze_messages(commits: &[CommitRecord]) -> MessageAnalysis {
    analyze_messages_top(commits, DEFAULT_TOP_WORDS)
}

pub fn analyze_messages_top(commits: &[CommitRecord], n: usize) -> MessageAnalysis {
    if commits.is_empty() {
        return MessageAnalysis {
            top_words: Vec::new(),
            avg_length: 0.0,
            shortest_message: None,
            longest_message: None,
            top_first_words: Vec::new(),
        };
    }

    let token_total: usize = commits.iter().map(|c| tokenize(&c.message).len()).sum();
    let avg_length = round1(token_total as f64 / commits.len() as f64);

    let mut shortest = &commits[0].message;
    let mut longest = &commits[0].message;
    for commit in &commits[1..] {
        let len = commit.message.chars().count();
        if len < shortest.chars().count() {
            shortest = &commit.message;
        }
        if len > longest.chars().count() {
            longest = &commit.message;
        }
    }

    let first_words: Vec<String> = commits
        .iter()
        .filter_map(|c| significant_words(&c.message).into_iter().next())
        .collect();

    MessageAnalysis {
        top_words: top_words(commits, n),
        avg_length,
        shortest_message: Some(preview(shortest)),
        longest_message: Some(preview(longest)),
        top_first_words: to_word_counts(ranked(first_words.iter().map(String::as_str)), TOP_FIRST_WORDS),
    }
}

/// At most 80 characters, with `...` appended when cut.
pub fn preview(message: &str) -> String {
    if message.chars().count() <= PREVIEW_CHARS {
        return message.to_string();
    }
    let mut cut: String = message.chars().take(PREVIEW_CHARS).collect();
    cut.push_str("...");
    cut
}

fn to_word_counts(ranked: Vec<(String, usize)>, n: usize) -> Vec<WordCount> {
    ranked
        .into_iter()
        .take(n)
        .map(|(word, count)| WordCount { word, count })
        .collect()
}
