//! Fixed-size pool of lint workers pulling repositories from a shared queue

use crossbeam_channel as channel;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, error, warn};

use super::engine::LintOptions;
use super::router::{LintUnit, UnitOutcome};

pub struct WorkerPool {
    workers: usize,
}

impl WorkerPool {
    /// A pool of `workers` threads (at least one)
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Lint every repository exactly once
    ///
    /// Each worker pops a repository, lints it to completion and records its
    /// outcome, until the queue is drained. `progress(completed, total)` is
    /// called after every repository. Outcomes come back in input order.
    pub fn run<P>(
        &self,
        repos: &[String],
        unit: &dyn LintUnit,
        options: &LintOptions,
        progress: P,
    ) -> Vec<UnitOutcome>
    where
        P: Fn(usize, usize) + Sync,
    {
        let total = repos.len();
        if total == 0 {
            return Vec::new();
        }

        let (queue_tx, queue_rx) = channel::unbounded::<(usize, String)>();
        for entry in repos.iter().cloned().enumerate() {
            let _ = queue_tx.send(entry);
        }
        drop(queue_tx);

        let (result_tx, result_rx) = channel::unbounded::<(usize, UnitOutcome)>();
        let completed = AtomicUsize::new(0);
        let worker_count = self.workers.min(total);

        let work = || {
            while let Ok((index, repo)) = queue_rx.recv() {
                let outcome = run_isolated(unit, &repo, options);
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                progress(done, total);
                let _ = result_tx.send((index, outcome));
            }
        };

        match rayon::ThreadPoolBuilder::new()
            .num_threads(worker_count)
            .thread_name(|idx| format!("lint-worker-{idx}"))
            .build()
        {
            Ok(pool) => {
                debug!("Linting {} repos with {} workers", total, worker_count);
                pool.scope(|s| {
                    for _ in 0..worker_count {
                        s.spawn(|_| work());
                    }
                });
            }
            Err(e) => {
                warn!("Couldn't start lint workers, linting inline: {}", e);
                work();
            }
        }
        drop(result_tx);

        let mut outcomes: Vec<(usize, UnitOutcome)> = result_rx.iter().collect();
        outcomes.sort_by_key(|(index, _)| *index);
        outcomes.into_iter().map(|(_, outcome)| outcome).collect()
    }
}

/// A panicking unit fails its own repository only
fn run_isolated(unit: &dyn LintUnit, repo: &str, options: &LintOptions) -> UnitOutcome {
    panic::catch_unwind(AssertUnwindSafe(|| unit.run(repo, options))).unwrap_or_else(|_| {
        error!("Lint worker panicked on {}", repo);
        UnitOutcome::failed(repo)
    })
}

/// Lint `repos` with `workers` concurrent workers
pub fn lint_with_workers<P>(
    repos: &[String],
    workers: usize,
    unit: &dyn LintUnit,
    options: &LintOptions,
    progress: P,
) -> Vec<UnitOutcome>
where
    P: Fn(usize, usize) + Sync,
{
    WorkerPool::new(workers).run(repos, unit, options, progress)
}
