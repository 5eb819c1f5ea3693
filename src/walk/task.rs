use super::callbacks::{Continuation, Entry};
use std::cmp::Ordering;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};

/// Shared completion barrier and output slot for the root of a traversal
/// (`spec.md` §3 `TraversalState`: "Completion signal that releases the
/// calling thread when the root task finishes").
pub(crate) struct RootState<V> {
    pub(crate) data: Mutex<Option<V>>,
    done: Mutex<bool>,
    cond: Condvar,
}

impl<V> RootState<V> {
    pub(crate) fn new() -> Self {
        Self {
            data: Mutex::new(None),
            done: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    pub(crate) fn publish(&self, value: Option<V>) {
        *self.data.lock().unwrap() = value;
        *self.done.lock().unwrap() = true;
        self.cond.notify_all();
    }

    pub(crate) fn wait(&self) {
        let mut done = self.done.lock().unwrap();
        while !*done {
            done = self.cond.wait(done).unwrap();
        }
    }
}

/// One directory instance in the tree (`spec.md` §3 `DirTask`).
pub(crate) struct DirTask<V> {
    pub(crate) path: PathBuf,
    pub(crate) metadata: Metadata,
    pub(crate) depth: usize,
    /// Where this task's published value is written: the root out-parameter,
    /// or a slot in a parent directory's entry table.
    pub(crate) output: Output<V>,
    /// Value deposited by `dir_enter`, consumed by the matching `dir_exit`
    /// and read (not consumed) by every child's `dir_enter` in the meantime.
    pub(crate) continuation: Mutex<Option<Continuation>>,
    pub(crate) inner: Mutex<DirTaskInner<V>>,
}

pub(crate) struct DirTaskInner<V> {
    pub(crate) entries: Vec<Entry<V>>,
    pub(crate) pending: usize,
}

/// Where a finished child (file task or dir-exit) writes its published
/// value: either the caller's root out-parameter, or a specific slot in a
/// parent directory's entry table (`spec.md` §3 "Output slot").
#[derive(Clone)]
pub(crate) enum Output<V> {
    Root(Arc<RootState<V>>),
    Entry {
        parent: Arc<DirTask<V>>,
        index: usize,
    },
}

impl<V> DirTask<V> {
    pub(crate) fn new(
        path: PathBuf,
        metadata: Metadata,
        depth: usize,
        output: Output<V>,
    ) -> Arc<Self> {
        Arc::new(Self {
            path,
            metadata,
            depth,
            output,
            continuation: Mutex::new(None),
            inner: Mutex::new(DirTaskInner {
                entries: Vec::new(),
                pending: 0,
            }),
        })
    }

    pub(crate) fn as_path(&self) -> &Path {
        &self.path
    }

    /// The directory this task's `dir_enter` reads its `parent_continuation`
    /// from, if any (`spec.md` §4.2 `dir_enter` contract). `None` at the
    /// root, which has no enclosing directory.
    pub(crate) fn parent_dir(&self) -> Option<&Arc<DirTask<V>>> {
        match &self.output {
            Output::Root(_) => None,
            Output::Entry { parent, .. } => Some(parent),
        }
    }
}

/// A single non-directory child dispatched as its own pool task when
/// `FILE_TASKS` is set (`spec.md` §3 `FileTask`).
pub(crate) struct FileTask<V> {
    pub(crate) path: PathBuf,
    pub(crate) metadata: Metadata,
    pub(crate) output: Output<V>,
}

/// The ordering key used when `SORT` selects priority-mode scheduling
/// (`spec.md` §4.2 "Priority ordering"): dir-exit drains before file before
/// dir-enter, ties broken by path so that a deeper/later path in the same
/// class runs first, producing stable in-order delivery to `dir_exit`
/// within one subtree.
#[derive(Clone, PartialEq, Eq)]
pub(crate) struct PriorityKey {
    pub(crate) kind: TaskKind,
    pub(crate) path: PathBuf,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskKind {
    DirEnter,
    File,
    DirExit,
}

impl TaskKind {
    const fn rank(self) -> u8 {
        match self {
            Self::DirEnter => 0,
            Self::File => 1,
            Self::DirExit => 2,
        }
    }
}

pub(crate) fn compare_priority(a: &PriorityKey, b: &PriorityKey) -> Ordering {
    a.kind
        .rank()
        .cmp(&b.kind.rank())
        .then_with(|| a.path.cmp(&b.path))
}
