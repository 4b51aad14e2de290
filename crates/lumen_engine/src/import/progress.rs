//! Progress of a long-running import
//!
//! One report per import, shared through an `Arc` with whoever draws the
//! progress bar. All fields are atomics so readers never block the import.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

/// Determinate progress of one job
#[derive(Debug, Default)]
pub struct ProgressReport {
    job_count: AtomicUsize,
    jobs_done: AtomicUsize,
    loading: AtomicBool,
    status: Mutex<String>,
}

impl ProgressReport {
    /// Create an idle report
    pub fn new() -> Self {
        Self::default()
    }

    /// Back to zero, not loading, no status
    pub fn reset(&self) {
        self.job_count.store(0, Ordering::Relaxed);
        self.jobs_done.store(0, Ordering::Relaxed);
        self.loading.store(false, Ordering::Relaxed);
        self.status.lock().clear();
    }

    /// Whether a job is running
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    /// Mark the job as running or finished
    pub fn set_loading(&self, loading: bool) {
        self.loading.store(loading, Ordering::Release);
    }

    /// Current status line
    pub fn status(&self) -> String {
        self.status.lock().clone()
    }

    /// Replace the status line
    pub fn set_status(&self, status: impl Into<String>) {
        *self.status.lock() = status.into();
    }

    /// Total number of steps
    pub fn job_count(&self) -> usize {
        self.job_count.load(Ordering::Relaxed)
    }

    /// Set the total number of steps
    pub fn set_job_count(&self, count: usize) {
        self.job_count.store(count, Ordering::Relaxed);
    }

    /// Steps finished so far
    pub fn jobs_done(&self) -> usize {
        self.jobs_done.load(Ordering::Relaxed)
    }

    /// Set the number of finished steps
    pub fn set_jobs_done(&self, done: usize) {
        self.jobs_done.store(done, Ordering::Relaxed);
    }

    /// One more step finished
    pub fn increment_jobs_done(&self) {
        self.jobs_done.fetch_add(1, Ordering::Relaxed);
    }

    /// Fraction done in 0..=1
    #[allow(clippy::cast_precision_loss)]
    pub fn percentage(&self) -> f32 {
        let count = self.job_count();
        if count == 0 {
            return 0.0;
        }
        (self.jobs_done() as f32 / count as f32).clamp(0.0, 1.0)
    }

    /// Importer callback while the file is being read
    pub fn update_file_read(&self, file_name: &str, step: usize, total: usize) {
        self.set_status(format!("Loading \"{file_name}\" from disk..."));
        self.set_jobs_done(step);
        self.set_job_count(total);
    }

    /// Importer callback while the file is being post-processed
    pub fn update_post_process(&self, file_name: &str, step: usize, total: usize) {
        self.set_status(format!("Post-Processing \"{file_name}\""));
        self.set_jobs_done(step);
        self.set_job_count(total);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_percentage() {
        let progress = ProgressReport::new();
        assert_relative_eq!(progress.percentage(), 0.0);
        progress.set_job_count(4);
        progress.increment_jobs_done();
        assert_relative_eq!(progress.percentage(), 0.25);
    }

    #[test]
    fn test_callbacks_set_status_and_steps() {
        let progress = ProgressReport::new();
        progress.update_file_read("ship.obj", 1, 2);
        assert_eq!(progress.status(), "Loading \"ship.obj\" from disk...");
        assert_eq!((progress.jobs_done(), progress.job_count()), (1, 2));

        progress.reset();
        assert_eq!(progress.job_count(), 0);
        assert!(progress.status().is_empty());
    }
}
