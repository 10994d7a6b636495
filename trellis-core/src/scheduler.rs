//! Job Scheduler
//!
//! The scheduler batches re-runs that do not need to happen synchronously
//! with the write that caused them.
//!
//! # Algorithm
//!
//! Jobs are queued into one of three lanes: `pre`, `main` and `post`. Each
//! lane is an insertion-ordered set keyed by [`JobId`], so queueing the same
//! job twice before it runs is a no-op. The first job queued after a flush
//! requests exactly one new flush from the configured driver.
//!
//! A flush runs in passes until every lane is empty:
//!
//! 1. Take and run the `pre` lane
//! 2. Take and run the `main` lane
//! 3. Take and run the `post` lane
//!
//! Jobs queued while a pass runs land in the next pass. A job that runs more
//! than [`crate::config::Config::recursion_limit`] times within one flush is
//! dropped and the flush reports [`ReactiveError::RecursionLimit`].
//!
//! # Drivers
//!
//! With [`FlushStrategy::Manual`] the host calls [`flush_jobs`] from its own
//! event loop. With [`FlushStrategy::TokioLocal`] each requested flush is a
//! `spawn_local` task, which runs once the current task yields.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use crate::config::{config, FlushStrategy};
use crate::error::{ReactiveError, Result};
use crate::reactive::{Subscriber, SubscriberId};

/// Deduplication key of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobId {
    /// Re-run of a subscriber.
    Subscriber(SubscriberId),
    /// Any other job.
    Custom(u64),
}

impl JobId {
    /// A fresh id that no other job shares.
    pub fn unique() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        JobId::Custom(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// A unit of deferred work.
#[derive(Clone)]
pub struct Job {
    id: JobId,
    run: Rc<dyn Fn()>,
}

impl Job {
    /// A job with a unique id.
    pub fn new(run: impl Fn() + 'static) -> Self {
        Self::with_id(JobId::unique(), run)
    }

    pub fn with_id(id: JobId, run: impl Fn() + 'static) -> Self {
        Self {
            id,
            run: Rc::new(run),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn run(&self) {
        (self.run)()
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job").field("id", &self.id).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lane {
    Pre,
    Main,
    Post,
}

#[derive(Default)]
struct JobQueue {
    pre: IndexMap<JobId, Job>,
    main: IndexMap<JobId, Job>,
    post: IndexMap<JobId, Job>,
    flush_pending: bool,
    flushing: bool,
}

impl JobQueue {
    fn lane(&mut self, lane: Lane) -> &mut IndexMap<JobId, Job> {
        match lane {
            Lane::Pre => &mut self.pre,
            Lane::Main => &mut self.main,
            Lane::Post => &mut self.post,
        }
    }

    fn is_empty(&self) -> bool {
        self.pre.is_empty() && self.main.is_empty() && self.post.is_empty()
    }
}

thread_local! {
    static QUEUE: RefCell<JobQueue> = RefCell::new(JobQueue::default());
}

fn enqueue(lane: Lane, job: Job) {
    let request = QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        queue.lane(lane).entry(job.id).or_insert(job);
        if queue.flush_pending || queue.flushing {
            false
        } else {
            queue.flush_pending = true;
            true
        }
    });

    if request {
        request_flush();
    }
}

fn request_flush() {
    match config().flush {
        FlushStrategy::Manual => tracing::trace!("flush requested"),
        FlushStrategy::TokioLocal => {
            tokio::task::spawn_local(async {
                if let Err(err) = flush_jobs() {
                    tracing::error!(error = %err, "scheduled flush failed");
                }
            });
        }
    }
}

/// Queue a job for the main lane.
pub fn queue_job(job: Job) {
    enqueue(Lane::Main, job);
}

/// Queue a job that runs before the main lane of the next pass.
pub fn queue_pre_flush(job: Job) {
    enqueue(Lane::Pre, job);
}

/// Queue a job that runs after the main lane of the next pass.
pub fn queue_post_flush(job: Job) {
    enqueue(Lane::Post, job);
}

/// Scheduler that defers a subscriber's re-run to the next flush.
///
/// Pass it to [`crate::reactive::SubscribeOptions::scheduler`].
pub fn queue_subscriber<T: 'static>(subscriber: &Subscriber<T>) {
    queue_job(subscriber.job());
}

/// Whether any job is waiting to run.
pub fn has_pending_jobs() -> bool {
    QUEUE
        .try_with(|queue| !queue.borrow().is_empty())
        .unwrap_or(false)
}

/// Whether a flush has been requested and not yet run.
pub fn is_flush_pending() -> bool {
    QUEUE
        .try_with(|queue| queue.borrow().flush_pending)
        .unwrap_or(false)
}

struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        let _ = QUEUE.try_with(|queue| {
            let mut queue = queue.borrow_mut();
            queue.flushing = false;
            queue.flush_pending = false;
        });
    }
}

/// Run every pending job. Returns how many jobs ran.
///
/// Calling this from inside a running job does nothing and returns `Ok(0)`;
/// the outer flush picks up whatever was queued.
pub fn flush_jobs() -> Result<usize> {
    let started = QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        !std::mem::replace(&mut queue.flushing, true)
    });
    if !started {
        return Ok(0);
    }
    let _guard = FlushGuard;

    let limit = config().recursion_limit;
    let mut counts: HashMap<JobId, usize> = HashMap::new();
    let mut ran = 0;
    let mut overflow = None;

    loop {
        let mut progressed = false;

        for lane in [Lane::Pre, Lane::Main, Lane::Post] {
            let batch = QUEUE.with(|queue| std::mem::take(queue.borrow_mut().lane(lane)));
            if batch.is_empty() {
                continue;
            }
            progressed = true;

            for (id, job) in batch {
                let count = counts.entry(id).or_insert(0);
                *count += 1;
                if *count > limit {
                    if overflow.is_none() {
                        tracing::error!(job = ?id, limit, "job exceeded the recursion limit");
                        overflow = Some(ReactiveError::RecursionLimit {
                            job: format!("{id:?}"),
                            limit,
                        });
                    }
                    continue;
                }

                job.run();
                ran += 1;
            }
        }

        if !progressed {
            break;
        }
    }

    tracing::debug!(ran, "job flush complete");
    match overflow {
        Some(err) => Err(err),
        None => Ok(ran),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn log_job(log: &Rc<RefCell<Vec<&'static str>>>, id: u64, name: &'static str) -> Job {
        let log = log.clone();
        Job::with_id(JobId::Custom(id), move || log.borrow_mut().push(name))
    }

    #[test]
    fn duplicate_jobs_run_once() {
        let log = Rc::new(RefCell::new(Vec::new()));
        queue_job(log_job(&log, 1, "a"));
        queue_job(log_job(&log, 1, "a"));
        assert!(has_pending_jobs());
        assert!(is_flush_pending());

        assert_eq!(flush_jobs().unwrap(), 1);
        assert_eq!(*log.borrow(), vec!["a"]);
        assert!(!has_pending_jobs());
        assert!(!is_flush_pending());
    }

    #[test]
    fn lanes_run_in_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        queue_post_flush(log_job(&log, 10, "post"));
        queue_job(log_job(&log, 11, "main"));
        queue_pre_flush(log_job(&log, 12, "pre"));

        flush_jobs().unwrap();
        assert_eq!(*log.borrow(), vec!["pre", "main", "post"]);
    }

    #[test]
    fn jobs_queued_during_flush_run_in_same_flush() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let inner = log_job(&log, 21, "second");
        let outer_log = log.clone();
        queue_job(Job::with_id(JobId::Custom(20), move || {
            outer_log.borrow_mut().push("first");
            queue_job(inner.clone());
        }));

        assert_eq!(flush_jobs().unwrap(), 2);
        assert_eq!(*log.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn nested_flush_is_noop() {
        let nested = Rc::new(RefCell::new(None));
        let slot = nested.clone();
        queue_job(Job::new(move || {
            *slot.borrow_mut() = Some(flush_jobs().ok());
        }));

        flush_jobs().unwrap();
        assert_eq!(*nested.borrow(), Some(Some(0)));
    }

    #[test]
    fn self_requeueing_job_hits_limit() {
        crate::config::configure(crate::config::Config {
            recursion_limit: 5,
            ..Default::default()
        })
        .unwrap();

        let runs = Rc::new(RefCell::new(0));
        let job: Rc<RefCell<Option<Job>>> = Rc::new(RefCell::new(None));
        let (counter, me) = (runs.clone(), job.clone());
        *job.borrow_mut() = Some(Job::with_id(JobId::Custom(30), move || {
            *counter.borrow_mut() += 1;
            if let Some(job) = me.borrow().clone() {
                queue_job(job);
            }
        }));

        if let Some(first) = job.borrow().clone() {
            queue_job(first);
        }
        let err = flush_jobs().unwrap_err();
        assert!(matches!(err, ReactiveError::RecursionLimit { limit: 5, .. }));
        assert_eq!(*runs.borrow(), 5);
        assert!(!has_pending_jobs());

        // Break the job's reference to itself.
        job.borrow_mut().take();
    }
}
