//! Bounded worker pool with an explicit "wait for everything in flight"
//! barrier, built on `rayon::ThreadPool`. Generalizes a one-shot `par_iter`
//! batch into a long-lived submit/wait job queue, since the reconciliation
//! engine issues agent operations incrementally rather than all at once.

use std::sync::{Arc, Condvar, Mutex};

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::warn;

/// Submits closures to a bounded thread pool and can block until every
/// submitted job (not just those already running) has finished.
pub struct JobExecutor {
    pool: ThreadPool,
    outstanding: Arc<(Mutex<usize>, Condvar)>,
}

impl JobExecutor {
    pub fn new(workers: usize) -> Self {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .build()
            .expect("thread pool construction with a bounded worker count cannot fail");
        Self { pool, outstanding: Arc::new((Mutex::new(0), Condvar::new())) }
    }

    /// Submit a job. Failures are logged and swallowed — a single failed
    /// agent call (nonzero exit, timeout) must not abort the whole pass.
    pub fn submit<F>(&self, label: &'static str, job: F)
    where
        F: FnOnce() -> Result<(), crate::error::AgentError> + Send + 'static,
    {
        {
            let (count, _) = &*self.outstanding;
            *count.lock().expect("executor mutex poisoned") += 1;
        }

        let outstanding = Arc::clone(&self.outstanding);
        self.pool.spawn(move || {
            if let Err(err) = job() {
                warn!(job = label, error = %err, "agent job failed");
            }
            let (count, cvar) = &*outstanding;
            let mut count = count.lock().expect("executor mutex poisoned");
            *count -= 1;
            if *count == 0 {
                cvar.notify_all();
            }
        });
    }

    /// Block until every job submitted so far has completed. This is the
    /// barrier the reconciliation engine calls at the three named suspension
    /// points (after move-matching, before classification; after a rename
    /// before the dependent copy; after a delete before a rename reusing the
    /// freed name).
    pub fn wait(&self) {
        let (count, cvar) = &*self.outstanding;
        let mut count = count.lock().expect("executor mutex poisoned");
        while *count > 0 {
            count = cvar.wait(count).expect("executor mutex poisoned");
        }
    }
}
