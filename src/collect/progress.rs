use indicatif::{ProgressBar, ProgressStyle};

/// Progress notifications emitted by the collector. Delivered
/// synchronously, in order, from the collecting task.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    CacheHit {
        age_hours: f64,
        commits: usize,
    },
    ReposResolved {
        total: usize,
    },
    BatchStarted {
        index: usize,
        batches: usize,
        size: usize,
    },
    RepoFinished {
        label: String,
        processed: usize,
        total: usize,
        commits_so_far: usize,
    },
    RepoSkipped {
        label: String,
        reason: String,
    },
    Finished {
        commits: usize,
        repos: usize,
    },
}

pub trait ProgressSink: Send + Sync {
    fn report(&self, event: &ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn report(&self, event: &ProgressEvent) {
        self(event)
    }
}

pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _event: &ProgressEvent) {}
}

/// Terminal progress bar, one tick per repository.
pub struct BarProgress {
    pb: ProgressBar,
}

impl BarProgress {
    pub fn new() -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message("Listing repositories...");
        Self { pb }
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for BarProgress {
    fn report(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::CacheHit { age_hours, commits } => {
                self.pb.finish_with_message(format!(
                    "Using cached data ({commits} commits, {age_hours:.1}h old)"
                ));
            }
            ProgressEvent::ReposResolved { total } => {
                self.pb.set_length(*total as u64);
                self.pb.set_style(
                    ProgressStyle::default_bar()
                        .template("{bar:30.cyan/blue} {pos}/{len} {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_bar()),
                );
            }
            ProgressEvent::BatchStarted { index, batches, .. } => {
                self.pb.set_message(format!("batch {}/{}", index + 1, batches));
            }
            ProgressEvent::RepoFinished {
                label,
                commits_so_far,
                ..
            } => {
                self.pb.inc(1);
                self.pb.set_message(format!("{label} ({commits_so_far} commits)"));
            }
            ProgressEvent::RepoSkipped { label, .. } => {
                self.pb.set_message(format!("{label} skipped"));
            }
            ProgressEvent::Finished { commits, repos } => {
                self.pb
                    .finish_with_message(format!("Collected {commits} commits from {repos} repositories"));
            }
        }
    }
}
