use crate::model::FilterSet;
use std::path::PathBuf;

pub const DEFAULT_BATCH_SIZE: usize = 5;
pub const DEFAULT_CACHE_MAX_AGE_HOURS: f64 = 24.0;
const TOKEN_ENV_VARS: [&str; 2] = ["GITHUB_TOKEN", "GH_TOKEN"];

/// Validated inputs for one collector run.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectOptions {
    pub principal: String,
    pub year: i32,
    pub filters: FilterSet,
    pub explicit_repo: Option<String>,
    pub batch_size: usize,
    pub use_cache: bool,
    pub cache_max_age_hours: f64,
}

/// Token precedence: explicit value, then `GITHUB_TOKEN`, then `GH_TOKEN`.
/// Blank values count as absent.
pub fn resolve_token(explicit: Option<&str>) -> Option<String> {
    resolve_token_with(explicit, |name| std::env::var(name).ok())
}

fn resolve_token_with<F>(explicit: Option<&str>, lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    explicit
        .map(str::to_string)
        .into_iter()
        .chain(TOKEN_ENV_VARS.iter().filter_map(|name| lookup(name)))
        .map(|t| t.trim().to_string())
        .find(|t| !t.is_empty())
}

pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("ghwrapped")
}
