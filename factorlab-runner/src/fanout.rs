//! Bounded fan-out with per-unit timeouts and panic isolation.
//!
//! Every unit of work (one family, or one symbol) runs on a private rayon
//! pool and reports back over a channel. The caller waits on the channel
//! with a deadline per unit, measured from the moment the unit starts
//! executing. A unit that misses its deadline is abandoned: its thread
//! finishes in the background and its late result is dropped.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use tracing::debug;

/// How one unit of work ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Completed(T),
    TimedOut { after: Duration },
    Panicked(String),
}

enum Message<T> {
    Started(usize, Instant),
    Finished(usize, Result<T, String>),
}

/// Named rayon pool that never touches the global pool.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    name: String,
    threads: usize,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("threads", &self.threads)
            .finish()
    }
}

impl WorkerPool {
    pub fn new(name: &str, threads: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let prefix = name.to_string();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(move |i| format!("{prefix}-{i}"))
            .build()?;
        Ok(Self {
            pool,
            name: name.to_string(),
            threads: threads.max(1),
        })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run every job and return `(index, outcome)` pairs in completion
    /// order. `timeout(index)` is that job's budget once it starts.
    ///
    /// Jobs still queued behind busy workers have no deadline yet; they wait
    /// for a free thread.
    pub fn run_all<T, F>(&self, jobs: Vec<F>, timeout: impl Fn(usize) -> Duration) -> Vec<(usize, Outcome<T>)>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let total = jobs.len();
        let (tx, rx) = mpsc::channel::<Message<T>>();
        for (index, job) in jobs.into_iter().enumerate() {
            let tx = tx.clone();
            self.pool.spawn(move || {
                // The receiver may be gone if the caller stopped waiting.
                let _ = tx.send(Message::Started(index, Instant::now()));
                let result = catch_unwind(AssertUnwindSafe(job)).map_err(panic_message);
                let _ = tx.send(Message::Finished(index, result));
            });
        }
        drop(tx);

        let mut results = Vec::with_capacity(total);
        let mut running: HashMap<usize, Instant> = HashMap::new();
        let mut settled = vec![false; total];
        let mut remaining = total;

        while remaining > 0 {
            let next_deadline = running
                .iter()
                .filter_map(|(i, started)| deadline(*started, timeout(*i)))
                .min();
            let message = match next_deadline {
                Some(deadline) => {
                    let wait = deadline.saturating_duration_since(Instant::now());
                    rx.recv_timeout(wait)
                }
                None => rx.recv().map_err(|_| mpsc::RecvTimeoutError::Disconnected),
            };

            match message {
                Ok(Message::Started(index, at)) => {
                    if !settled[index] {
                        running.insert(index, at);
                    }
                }
                Ok(Message::Finished(index, result)) => {
                    running.remove(&index);
                    if settled[index] {
                        debug!(pool = %self.name, index, "discarding late result");
                        continue;
                    }
                    settled[index] = true;
                    remaining -= 1;
                    results.push((
                        index,
                        match result {
                            Ok(value) => Outcome::Completed(value),
                            Err(message) => Outcome::Panicked(message),
                        },
                    ));
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    let now = Instant::now();
                    let expired: Vec<(usize, Instant)> = running
                        .iter()
                        .filter(|(i, started)| deadline(**started, timeout(**i)).is_some_and(|d| now >= d))
                        .map(|(i, s)| (*i, *s))
                        .collect();
                    for (index, started) in expired {
                        running.remove(&index);
                        settled[index] = true;
                        remaining -= 1;
                        results.push((
                            index,
                            Outcome::TimedOut {
                                after: now.duration_since(started),
                            },
                        ));
                    }
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    // Every sender is gone; nothing else will report.
                    for (index, done) in settled.iter_mut().enumerate() {
                        if !*done {
                            *done = true;
                            results.push((index, Outcome::Panicked("worker exited without reporting".into())));
                        }
                    }
                    break;
                }
            }
        }
        results
    }
}

/// `None` when the budget reaches past what `Instant` can represent; such a
/// unit never times out.
fn deadline(started: Instant, budget: Duration) -> Option<Instant> {
    started.checked_add(budget)
}

/// Run jobs one after another on the calling thread, in order. Panics are
/// contained; there are no timeouts.
pub fn run_sequential<T, F>(jobs: Vec<F>) -> Vec<(usize, Outcome<T>)>
where
    F: FnOnce() -> T,
{
    jobs.into_iter()
        .enumerate()
        .map(|(index, job)| {
            let outcome = match catch_unwind(AssertUnwindSafe(job)) {
                Ok(value) => Outcome::Completed(value),
                Err(payload) => Outcome::Panicked(panic_message(payload)),
            };
            (index, outcome)
        })
        .collect()
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
