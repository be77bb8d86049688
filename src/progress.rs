//! Stage-scoped progress reporting.
//!
//! A `Progress` is created per stage invocation and handed explicitly to the
//! workers; increments are atomic so any thread may advance it.

use std::sync::atomic::{AtomicUsize, Ordering};

type Callback = Box<dyn Fn(usize, usize) + Send + Sync>;

/// Monotonic, thread-safe progress counter with an optional observer.
pub struct Progress {
    done: AtomicUsize,
    total: AtomicUsize,
    callback: Option<Callback>,
}

impl Progress {
    /// Creates a silent counter.
    pub fn new() -> Self {
        Self {
            done: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            callback: None,
        }
    }

    /// Creates a counter that calls `callback(done, total)` after every step.
    pub fn with_callback<F>(callback: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        Self {
            callback: Some(Box::new(callback)),
            ..Self::new()
        }
    }

    /// Resets the counter for a new unit of work of `total` steps.
    pub fn restart(&self, total: usize) {
        self.total.store(total, Ordering::Relaxed);
        self.done.store(0, Ordering::Relaxed);
    }

    /// Advances the counter by one step.
    pub fn inc(&self) {
        let done = self.done.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(callback) = &self.callback {
            callback(done, self.total.load(Ordering::Relaxed));
        }
    }

    /// Steps completed since the last restart.
    pub fn done(&self) -> usize {
        self.done.load(Ordering::Acquire)
    }

    /// Total steps announced by the last restart.
    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress")
            .field("done", &self.done())
            .field("total", &self.total())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::Progress;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn counts_from_many_threads() {
        let progress = Arc::new(Progress::new());
        progress.restart(400);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let progress = Arc::clone(&progress);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        progress.inc();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(progress.done(), 400);
        assert_eq!(progress.total(), 400);
    }

    #[test]
    fn callback_sees_every_step() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_cb = Arc::clone(&seen);
        let progress = Progress::with_callback(move |done, total| {
            assert!(done <= total);
            seen_cb.fetch_add(1, Ordering::Relaxed);
        });
        progress.restart(3);
        progress.inc();
        progress.inc();
        progress.inc();
        assert_eq!(seen.load(Ordering::Relaxed), 3);
    }
}
