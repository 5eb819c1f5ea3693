/*!
A bounded-queue, fixed-worker thread pool.

Translated from the classic `pthread_mutex` / `pthread_cond` design in
`threadpool.c` (Clemson University, 2014): `n` worker threads park on a
consumer condition variable, pop tasks from either a FIFO ring buffer or a
comparator-ordered binary max-heap, and a producer condition variable
provides back-pressure when the queue is bounded.

The boxed `FnOnce() + Send` closure plays the role of the C `(routine, arg)`
pair — the same substitution `other_examples` makes for the equivalent
`TPool_job` in the LZ4 reference thread pool.
*/

mod error;
mod queue;

pub use error::{JoinPanic, PoolError};
pub(crate) use queue::Task;

use queue::{Comparator, Queue};
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

/// A unit of work submitted to the pool: a thunk with no return value.
///
/// Mirrors the C `void (*routine)(void *arg)` signature, minus the `void*`
/// anti-pattern — the closure already captures everything it needs.
pub type Routine = Box<dyn FnOnce() + Send + 'static>;

struct Inner<K> {
    queue: Queue<K>,
    stop: bool,
    running: usize,
    qmax: usize,
}

struct Shared<K> {
    inner: Mutex<Inner<K>>,
    not_empty: Condvar,
    not_full: Condvar,
}

/// A fixed-size worker pool with a bounded (or growable) task queue.
///
/// `K` is the ordering key used in priority mode; FIFO pools use `K = ()`.
/// Constructed idle with workers parked on the consumer condition
/// (`spec.md` §3 `ThreadPool` lifecycle); `shutdown` consumes the pool so it
/// cannot be submitted to again at the type level.
pub struct ThreadPool<K = ()> {
    shared: Arc<Shared<K>>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool<()> {
    /// Construct a FIFO pool. `qmax = 0` means unbounded (the ring buffer
    /// grows by doubling, up to the growth ceiling).
    pub fn new(n: usize, stack_size: Option<usize>, qmax: usize) -> Result<Self, PoolError> {
        assert!(n > 0, "thread pool requires at least one worker");
        Self::build(n, stack_size, qmax, Queue::Fifo(VecDeque::new()))
    }

    /// Submit a task with no ordering key (FIFO mode).
    pub fn submit(&self, routine: Routine) -> Result<(), PoolError> {
        self.submit_task(Task::new(routine, ()))
    }
}

impl<K: Send + 'static> ThreadPool<K> {
    /// Construct a priority pool. Tasks are popped in the order defined by
    /// `cmp`: `cmp(a, b) == Greater` means `a` runs before `b`
    /// (`spec.md` §4.1: "positive ⇒ a higher priority").
    pub fn with_priority<F>(
        n: usize,
        stack_size: Option<usize>,
        qmax: usize,
        cmp: F,
    ) -> Result<Self, PoolError>
    where
        F: Fn(&K, &K) -> Ordering + Send + Sync + 'static,
    {
        assert!(n > 0, "thread pool requires at least one worker");
        Self::build(
            n,
            stack_size,
            qmax,
            Queue::Priority {
                heap: Vec::new(),
                cmp: Box::new(cmp) as Box<Comparator<K>>,
            },
        )
    }

    fn build(
        n: usize,
        stack_size: Option<usize>,
        qmax: usize,
        queue: Queue<K>,
    ) -> Result<Self, PoolError> {
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                queue,
                stop: false,
                running: 0,
                qmax,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        });

        let mut workers = Vec::with_capacity(n);
        for id in 0..n {
            let shared = Arc::clone(&shared);
            let mut builder = thread::Builder::new().name(format!("mtpt-worker-{id}"));
            if let Some(size) = stack_size {
                builder = builder.stack_size(size);
            }
            let handle = builder
                .spawn(move || worker_loop(&shared))
                .map_err(PoolError::SpawnFailed)?;
            workers.push(handle);
        }

        log::debug!("thread pool started with {n} workers");
        Ok(Self { shared, workers })
    }

    /// Submit a task with an explicit ordering key.
    ///
    /// Blocks only when the pool is FIFO, bounded (`qmax > 0`), and full;
    /// priority pools never block a submitter (`spec.md` §4.1 Submit:
    /// priority mode always grows rather than waiting).
    pub(crate) fn submit_task(&self, task: Task<K>) -> Result<(), PoolError> {
        submit_task_impl(&self.shared, task)
    }

    /// A cheap, cloneable submit-only handle that does not carry the
    /// worker `JoinHandle`s — safe to share into `'static` task closures
    /// without dragging the whole pool (and its non-`Sync` join state)
    /// along for the ride.
    pub(crate) fn submitter(&self) -> Submitter<K> {
        Submitter { shared: Arc::clone(&self.shared) }
    }

    /// Set the stop flag, wake every worker, and join them all.
    ///
    /// After this returns no new submissions are possible and no worker
    /// remains alive (`spec.md` §8 "Shutdown cleanliness"). Tasks already
    /// dequeued run to completion; tasks still queued are dropped unrun.
    pub fn shutdown(mut self) -> Result<(), PoolError> {
        {
            let mut inner = self.shared.inner.lock().unwrap();
            inner.stop = true;
        }
        self.shared.not_empty.notify_all();
        self.shared.not_full.notify_all();

        for handle in self.workers.drain(..) {
            let name = handle.thread().name().unwrap_or("worker").to_owned();
            handle.join().map_err(|payload| {
                PoolError::JoinFailed(JoinPanic(panic_message(&payload, &name)))
            })?;
        }
        log::debug!("thread pool shut down cleanly");
        Ok(())
    }

    /// Number of tasks currently executing (not merely queued).
    pub fn running(&self) -> usize {
        self.shared.inner.lock().unwrap().running
    }
}

/// A cloneable handle that can submit tasks but cannot shut the pool down or
/// observe its worker count. Pairs with [`ThreadPool::submitter`].
pub(crate) struct Submitter<K> {
    shared: Arc<Shared<K>>,
}

impl<K> Clone for Submitter<K> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<K: Send + 'static> Submitter<K> {
    pub(crate) fn submit_task(&self, task: Task<K>) -> Result<(), PoolError> {
        submit_task_impl(&self.shared, task)
    }
}

fn submit_task_impl<K>(shared: &Shared<K>, task: Task<K>) -> Result<(), PoolError> {
    let mut inner = shared.inner.lock().unwrap();
    if inner.stop {
        return Err(PoolError::Stopped);
    }

    if let Queue::Fifo(_) = &inner.queue {
        if inner.qmax > 0 {
            while inner.queue.len() == inner.qmax {
                inner = shared.not_full.wait(inner).unwrap();
                if inner.stop {
                    return Err(PoolError::Stopped);
                }
            }
        }
    }

    let was_empty = inner.queue.is_empty();
    inner.queue.push(task)?;
    if was_empty {
        shared.not_empty.notify_one();
    }
    Ok(())
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>, worker: &str) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("worker {worker} panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("worker {worker} panicked: {s}")
    } else {
        format!("worker {worker} panicked with a non-string payload")
    }
}

fn worker_loop<K>(shared: &Shared<K>) {
    let mut guard = shared.inner.lock().unwrap();
    loop {
        while guard.queue.is_empty() && !guard.stop {
            guard = shared.not_empty.wait(guard).unwrap();
        }
        if guard.queue.is_empty() && guard.stop {
            return;
        }

        let was_full =
            matches!(&guard.queue, Queue::Fifo(_)) && guard.qmax > 0 && guard.queue.len() == guard.qmax;
        let task = guard.queue.pop().expect("queue was checked non-empty");
        guard.running += 1;
        drop(guard);

        if was_full {
            shared.not_full.notify_one();
        }

        if let Err(payload) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(task.routine)) {
            log::error!(
                "thread pool task panicked: {}",
                panic_message(&payload, thread::current().name().unwrap_or("worker"))
            );
        }

        guard = shared.inner.lock().unwrap();
        guard.running -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    #[test]
    fn fifo_runs_every_task_exactly_once() {
        let pool = ThreadPool::new(4, None, 0).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..200 {
            let counter = Arc::clone(&counter);
            pool.submit(Box::new(move || {
                counter.fetch_add(1, AtomicOrdering::SeqCst);
            }))
            .unwrap();
        }
        pool.shutdown().unwrap();
        assert_eq!(counter.load(AtomicOrdering::SeqCst), 200);
    }

    #[test]
    fn bounded_queue_applies_backpressure_without_deadlock() {
        let pool = ThreadPool::new(2, None, 1).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..50 {
            let counter = Arc::clone(&counter);
            pool.submit(Box::new(move || {
                counter.fetch_add(1, AtomicOrdering::SeqCst);
            }))
            .unwrap();
        }
        pool.shutdown().unwrap();
        assert_eq!(counter.load(AtomicOrdering::SeqCst), 50);
    }

    #[test]
    fn submit_after_shutdown_fails() {
        let pool = ThreadPool::new(1, None, 0).unwrap();
        let shared = Arc::clone(&pool.shared);
        pool.shutdown().unwrap();
        let inner = shared.inner.lock().unwrap();
        assert!(inner.stop);
    }

    #[test]
    fn priority_mode_runs_higher_priority_first() {
        let pool: ThreadPool<i32> =
            ThreadPool::with_priority(1, None, 0, |a: &i32, b: &i32| a.cmp(b)).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));
        // Submit while the single worker is busy so the heap actually
        // accumulates more than one pending task.
        let gate = Arc::new((Mutex::new(false), Condvar::new()));
        {
            let gate = Arc::clone(&gate);
            pool.submit_task(Task::new(
                Box::new(move || {
                    let (lock, cvar) = &*gate;
                    let mut ready = lock.lock().unwrap();
                    while !*ready {
                        ready = cvar.wait(ready).unwrap();
                    }
                }),
                0,
            ))
            .unwrap();
        }
        for key in [1, 5, 3] {
            let order = Arc::clone(&order);
            pool.submit_task(Task::new(
                Box::new(move || order.lock().unwrap().push(key)),
                key,
            ))
            .unwrap();
        }
        {
            let (lock, cvar) = &*gate;
            *lock.lock().unwrap() = true;
            cvar.notify_all();
        }
        pool.shutdown().unwrap();
        assert_eq!(*order.lock().unwrap(), vec![5, 3, 1]);
    }

    #[test]
    fn worker_panic_does_not_poison_the_pool() {
        let pool = ThreadPool::new(1, None, 0).unwrap();
        pool.submit(Box::new(|| panic!("boom"))).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let counter = Arc::clone(&counter);
            pool.submit(Box::new(move || {
                counter.fetch_add(1, AtomicOrdering::SeqCst);
            }))
            .unwrap();
        }
        pool.shutdown().unwrap();
        assert_eq!(counter.load(AtomicOrdering::SeqCst), 1);
    }
}
