/*!
The path-traversal coordinator: a join-style task graph rooted at a single
path, dispatched onto a [`crate::pool::ThreadPool`], with four user callbacks
invoked at well-defined points (`spec.md` §4.2).

A `DirTask` is born when its `dir_enter` task runs, reads the directory,
dispatches one task per child, and transitions to its `dir_exit` task once
every dispatched child has published a value. The parent/child edges form an
arena rooted at the call's [`RootState`]; children hold an index-based
back-reference into their parent's entry table for the lifetime of their
single callback invocation, matching the ownership sketch in `spec.md` §9.
*/

mod callbacks;
mod error;
mod options;
mod task;

pub use callbacks::{Continuation, Entry};
pub use error::{EntryError, WalkError};
pub use options::{Config, TraverseOptions, TraverseOptionsBuilder};

use callbacks::Callbacks;
use crate::pool::{PoolError, Routine, Submitter, Task as PoolTask, ThreadPool};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;
use task::{DirTask, FileTask, Output, PriorityKey, RootState, TaskKind};

/// Owns the worker threads; lives only on `traverse`'s stack, never inside
/// the shared context, since its `JoinHandle`s are not `Sync`.
enum Pool {
    Fifo(ThreadPool),
    Priority(ThreadPool<PriorityKey>),
}

impl Pool {
    fn handle(&self) -> SubmitHandle {
        match self {
            Self::Fifo(pool) => SubmitHandle::Fifo(pool.submitter()),
            Self::Priority(pool) => SubmitHandle::Priority(pool.submitter()),
        }
    }

    fn shutdown(self) -> Result<(), PoolError> {
        match self {
            Self::Fifo(pool) => pool.shutdown(),
            Self::Priority(pool) => pool.shutdown(),
        }
    }
}

/// The cheap, `Send + Sync` half of [`Pool`] that every task closure carries
/// — a clone of the pool's submit-side state with none of its join state.
enum SubmitHandle {
    Fifo(Submitter<()>),
    Priority(Submitter<PriorityKey>),
}

impl SubmitHandle {
    fn submit(&self, kind: TaskKind, path: &std::path::Path, routine: Routine) -> Result<(), PoolError> {
        match self {
            Self::Fifo(submitter) => submitter.submit_task(PoolTask::new(routine, ())),
            Self::Priority(submitter) => submitter.submit_task(PoolTask::new(
                routine,
                PriorityKey { kind, path: path.to_path_buf() },
            )),
        }
    }
}

/// Everything a running task needs, shared read-only (plus one atomic
/// counter) across every worker for the lifetime of one `traverse` call.
struct TraverseCtx<U, V> {
    user_arg: U,
    callbacks: Callbacks<U, V>,
    config: Config,
    submit: SubmitHandle,
    /// `spec.md` §3/§4.2.1: initialised to `n`, decremented when a worker
    /// enters the dir-exit re-enqueue loop, restored on success.
    spinlock_countdown: AtomicUsize,
}

/// Run one traversal to completion and return the root's published value.
///
/// `Ok(None)` means the root contributed no value: either the root is a
/// directory whose `dir_enter` declined to descend (`spec.md` §9 "Open
/// question" resolution), or the relevant callback (`file`/`dir_exit`) was
/// not supplied. Any other error is one of the three unrecoverable
/// conditions in `spec.md` §7: root-stat failure, pool-init failure, or
/// pool-shutdown failure.
pub fn traverse<U, V>(options: TraverseOptions<U, V>) -> Result<Option<V>, WalkError>
where
    U: Send + Sync + 'static,
    V: Send + 'static,
{
    // The root argument follows symlinks (`mtpt.c:239` calls `stat`, not
    // `lstat`); every child encountered during traversal does not
    // (`symlink_metadata` below at the child-stat site), per `spec.md`'s
    // "symlinks are not followed as directories" Non-goal, which is about
    // descending into symlinked directories found during traversal, not
    // about resolving the root path itself.
    let root_metadata = std::fs::metadata(&options.path).map_err(|source| WalkError::RootStat {
        path: options.path.clone(),
        source,
    })?;

    if !root_metadata.is_dir() {
        let value = options
            .callbacks
            .file
            .as_ref()
            .map(|f| f(&options.user_arg, &options.path, &root_metadata));
        return Ok(value);
    }

    let n = options.threads.max(1);
    let pool = build_pool(n, options.stack_size, options.config)?;

    let ctx = Arc::new(TraverseCtx {
        user_arg: options.user_arg,
        callbacks: options.callbacks,
        config: options.config,
        submit: pool.handle(),
        spinlock_countdown: AtomicUsize::new(n),
    });

    let root_state = Arc::new(RootState::new());
    let root_task = DirTask::new(
        options.path,
        root_metadata,
        0,
        Output::Root(Arc::clone(&root_state)),
    );

    // A failure here can only be the pool's own growth-ceiling OutOfMemory,
    // since nothing has been submitted yet to stop it; treat it the same as
    // any other pool bootstrap failure and shut the idle pool back down.
    if let Err(source) = submit_dir_enter(&ctx, root_task) {
        let _ = pool.shutdown();
        return Err(WalkError::PoolInit(source));
    }
    root_state.wait();

    pool.shutdown().map_err(WalkError::PoolShutdown)?;
    let result = root_state.data.lock().unwrap().take();
    Ok(result)
}

fn build_pool(n: usize, stack_size: Option<usize>, config: Config) -> Result<Pool, WalkError> {
    if config.contains(Config::SORT) {
        ThreadPool::with_priority(n, stack_size, 0, task::compare_priority)
            .map(Pool::Priority)
            .map_err(WalkError::PoolInit)
    } else {
        ThreadPool::new(n, stack_size, 0)
            .map(Pool::Fifo)
            .map_err(WalkError::PoolInit)
    }
}

fn invoke_file<U, V>(ctx: &TraverseCtx<U, V>, path: &std::path::Path, metadata: &std::fs::Metadata) -> Option<V> {
    ctx.callbacks.file.as_ref().map(|f| f(&ctx.user_arg, path, metadata))
}

fn invoke_error<U, V>(
    ctx: &TraverseCtx<U, V>,
    err: &EntryError,
    metadata: Option<&std::fs::Metadata>,
    continuation: Option<&Continuation>,
) -> Option<V> {
    ctx.callbacks
        .error
        .as_ref()
        .map(|f| f(&ctx.user_arg, err, metadata, continuation))
}

/// Submit a directory's dir-enter task. Used both for the root and for every
/// child directory discovered in a dir-enter task body.
fn submit_dir_enter<U, V>(ctx: &Arc<TraverseCtx<U, V>>, child: Arc<DirTask<V>>) -> Result<(), PoolError>
where
    U: Send + Sync + 'static,
    V: Send + 'static,
{
    let path = child.path.clone();
    let submit_ctx = Arc::clone(ctx);
    let routine: Routine = Box::new(move || run_dir_enter_task(submit_ctx, child));
    ctx.submit.submit(TaskKind::DirEnter, &path, routine)
}

/// Submit a non-directory child's task when `FILE_TASKS` is set.
fn submit_file_task<U, V>(ctx: &Arc<TraverseCtx<U, V>>, file_task: FileTask<V>) -> Result<(), PoolError>
where
    U: Send + Sync + 'static,
    V: Send + 'static,
{
    let path = file_task.path.clone();
    let submit_ctx = Arc::clone(ctx);
    let routine: Routine = Box::new(move || run_file_task(submit_ctx, file_task));
    ctx.submit.submit(TaskKind::File, &path, routine)
}

fn submit_dir_exit<U, V>(ctx: &Arc<TraverseCtx<U, V>>, task: Arc<DirTask<V>>) -> Result<(), PoolError>
where
    U: Send + Sync + 'static,
    V: Send + 'static,
{
    let path = task.path.clone();
    let submit_ctx = Arc::clone(ctx);
    let routine: Routine = Box::new(move || run_dir_exit_task(submit_ctx, task));
    ctx.submit.submit(TaskKind::DirExit, &path, routine)
}

/// Submit `task`'s dir-exit task while still holding `task`'s own pending
/// counter lock, per `spec.md` §4.2 "Child-completion notification" step 4:
/// the mutex is released only once the submission has succeeded or the
/// re-enqueue loop has taken over permanently (i.e. never, short of abort).
fn submit_dir_exit_locked<U, V>(
    ctx: &Arc<TraverseCtx<U, V>>,
    task: Arc<DirTask<V>>,
    _pending_guard: std::sync::MutexGuard<'_, task::DirTaskInner<V>>,
) where
    U: Send + Sync + 'static,
    V: Send + 'static,
{
    if submit_dir_exit(ctx, Arc::clone(&task)).is_err() {
        reenqueue_loop(ctx, task);
    }
}

/// `spec.md` §4.2.1: retry a failed dir-exit submission until it succeeds,
/// aborting the process if every worker is simultaneously stuck here.
fn reenqueue_loop<U, V>(ctx: &Arc<TraverseCtx<U, V>>, task: Arc<DirTask<V>>)
where
    U: Send + Sync + 'static,
    V: Send + 'static,
{
    let before = ctx.spinlock_countdown.fetch_sub(1, AtomicOrdering::SeqCst);
    if before == 1 {
        log::error!(
            "mtpt: livelock — every worker is stuck retrying the dir-exit submission for {}; aborting",
            task.path.display()
        );
        std::process::abort();
    }

    loop {
        std::thread::sleep(Duration::from_secs(1));
        if submit_dir_exit(ctx, Arc::clone(&task)).is_ok() {
            break;
        }
    }
    ctx.spinlock_countdown.fetch_add(1, AtomicOrdering::SeqCst);
}

/// Publish a finished task's value into its output slot and propagate
/// completion: up to the parent's pending counter, or out through the root
/// barrier (`spec.md` §4.2 "Child-completion notification").
fn complete<U, V>(ctx: &Arc<TraverseCtx<U, V>>, output: &Output<V>, value: Option<V>)
where
    U: Send + Sync + 'static,
    V: Send + 'static,
{
    match output {
        Output::Root(root) => root.publish(value),
        Output::Entry { parent, index } => {
            {
                let mut inner = parent.inner.lock().unwrap();
                inner.entries[*index].data = value;
            }
            notify_parent_done(ctx, Arc::clone(parent));
        }
    }
}

fn notify_parent_done<U, V>(ctx: &Arc<TraverseCtx<U, V>>, parent: Arc<DirTask<V>>)
where
    U: Send + Sync + 'static,
    V: Send + 'static,
{
    let mut inner = parent.inner.lock().unwrap();
    inner.pending -= 1;
    if inner.pending == 0 {
        submit_dir_exit_locked(ctx, Arc::clone(&parent), inner);
    }
}

/// `spec.md` §4.2 "Dir-enter task body".
fn run_dir_enter_task<U, V>(ctx: Arc<TraverseCtx<U, V>>, task: Arc<DirTask<V>>)
where
    U: Send + Sync + 'static,
    V: Send + 'static,
{
    let parent_guard = task.parent_dir().map(|parent| parent.continuation.lock().unwrap());
    let parent_continuation = parent_guard.as_ref().and_then(|guard| guard.as_ref());

    let (should_descend, my_continuation) = match &ctx.callbacks.dir_enter {
        Some(f) => f(&ctx.user_arg, &task.path, &task.metadata, parent_continuation),
        None => (true, None),
    };
    drop(parent_guard);
    *task.continuation.lock().unwrap() = my_continuation;

    if !should_descend {
        complete(&ctx, &task.output, None);
        return;
    }

    let read_dir = match std::fs::read_dir(&task.path) {
        Ok(rd) => rd,
        Err(source) => {
            let err = EntryError::OpenDir { path: task.path.clone(), source };
            let continuation = task.continuation.lock().unwrap();
            let value = invoke_error(&ctx, &err, Some(&task.metadata), continuation.as_ref());
            drop(continuation);
            complete(&ctx, &task.output, value);
            return;
        }
    };

    let mut children: Vec<(std::ffi::OsString, std::path::PathBuf)> = Vec::new();
    for entry in read_dir {
        match entry {
            Ok(entry) => children.push((entry.file_name(), entry.path())),
            Err(source) => {
                let err = EntryError::ReadDir { path: task.path.clone(), source };
                let continuation = task.continuation.lock().unwrap();
                let value = invoke_error(&ctx, &err, Some(&task.metadata), continuation.as_ref());
                drop(continuation);
                complete(&ctx, &task.output, value);
                return;
            }
        }
    }

    if ctx.config.contains(Config::SORT) {
        children.sort_by(|a, b| a.0.cmp(&b.0));
    }

    let mut inner = task.inner.lock().unwrap();
    inner.entries = children
        .iter()
        .map(|(name, _)| Entry::new(name.clone()))
        .collect();

    for (index, (_, child_path)) in children.iter().enumerate() {
        let metadata = match std::fs::symlink_metadata(child_path) {
            Ok(metadata) => metadata,
            Err(source) if source.kind() == io::ErrorKind::NotFound => continue,
            Err(source) => {
                let err = EntryError::Stat { path: child_path.clone(), source };
                inner.entries[index].data = invoke_error(&ctx, &err, None, None);
                continue;
            }
        };

        if metadata.is_dir() {
            let child = DirTask::new(
                child_path.clone(),
                metadata,
                task.depth + 1,
                Output::Entry { parent: Arc::clone(&task), index },
            );
            let child_metadata_for_error = child.metadata.clone();
            match submit_dir_enter(&ctx, child) {
                Ok(()) => inner.pending += 1,
                Err(source) => {
                    let err = EntryError::Submit { path: child_path.clone(), source };
                    inner.entries[index].data =
                        invoke_error(&ctx, &err, Some(&child_metadata_for_error), None);
                }
            }
        } else if ctx.config.contains(Config::FILE_TASKS) {
            let file_task = FileTask {
                path: child_path.clone(),
                metadata: metadata.clone(),
                output: Output::Entry { parent: Arc::clone(&task), index },
            };
            match submit_file_task(&ctx, file_task) {
                Ok(()) => inner.pending += 1,
                Err(source) => {
                    let err = EntryError::Submit { path: child_path.clone(), source };
                    inner.entries[index].data = invoke_error(&ctx, &err, Some(&metadata), None);
                }
            }
        } else {
            inner.entries[index].data = invoke_file(&ctx, child_path, &metadata);
        }
    }

    // `spec.md` §4.2 step 6: no child was successfully dispatched (an empty
    // or all-declined directory), so there is nothing else for this worker
    // to wait on. Run the dir-exit path in this worker directly rather than
    // round-tripping through the queue — no re-queue needed.
    if inner.pending == 0 {
        drop(inner);
        run_dir_exit_task(ctx, task);
    }
}

/// `spec.md` §4.2 "Dir-exit task body".
fn run_dir_exit_task<U, V>(ctx: Arc<TraverseCtx<U, V>>, task: Arc<DirTask<V>>)
where
    U: Send + Sync + 'static,
    V: Send + 'static,
{
    // Handshake: the sibling that decremented pending to zero may still be
    // about to release the task mutex; acquiring and dropping it here
    // ensures that release has happened.
    drop(task.inner.lock().unwrap());

    let continuation = task.continuation.lock().unwrap().take();
    let mut inner = task.inner.lock().unwrap();
    let value = ctx.callbacks.dir_exit.as_ref().map(|f| {
        f(
            &ctx.user_arg,
            &task.path,
            &task.metadata,
            continuation,
            inner.entries.as_mut_slice(),
        )
    });
    drop(inner);

    complete(&ctx, &task.output, value);
}

fn run_file_task<U, V>(ctx: Arc<TraverseCtx<U, V>>, file_task: FileTask<V>)
where
    U: Send + Sync + 'static,
    V: Send + 'static,
{
    let value = invoke_file(&ctx, &file_task.path, &file_task.metadata);
    complete(&ctx, &file_task.output, value);
}
