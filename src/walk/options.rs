use super::callbacks::{Callbacks, DirEnterFn, DirExitFn, ErrorFn, FileFn};
use std::path::{Path, PathBuf};

bitflags::bitflags! {
    /// Bitwise configuration for [`super::traverse`] (`spec.md` §6).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Config: u8 {
        /// Dispatch each non-directory child as its own pool task instead
        /// of processing it inline on the parent's worker.
        const FILE_TASKS = 0x1;
        /// Present siblings to `dir_exit` in lexicographic order.
        const SORT = 0x2;
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::empty()
    }
}

/// Bundled arguments for one `traverse` call — the idiomatic replacement for
/// the nine-parameter C `mtpt()` function, built with
/// [`TraverseOptionsBuilder`] in the same method-chaining style the teacher
/// uses for `FinderBuilder`.
pub struct TraverseOptions<U, V> {
    pub(crate) threads: usize,
    pub(crate) stack_size: Option<usize>,
    pub(crate) config: Config,
    pub(crate) path: PathBuf,
    pub(crate) user_arg: U,
    pub(crate) callbacks: Callbacks<U, V>,
}

/// Builder for [`TraverseOptions`].
#[must_use]
pub struct TraverseOptionsBuilder<U, V> {
    threads: usize,
    stack_size: Option<usize>,
    config: Config,
    user_arg: U,
    callbacks: Callbacks<U, V>,
}

impl<U, V> TraverseOptionsBuilder<U, V> {
    /// Start a builder with the given user argument. Defaults to one worker
    /// thread per available core, no stack-size hint, and no config bits.
    pub fn new(user_arg: U) -> Self {
        let threads = std::thread::available_parallelism().map_or(1, |n| n.get());
        Self {
            threads,
            stack_size: None,
            config: Config::empty(),
            user_arg,
            callbacks: Callbacks::default(),
        }
    }

    /// Set the worker count, defaults to `available_parallelism()`.
    pub const fn threads(mut self, n: usize) -> Self {
        self.threads = n;
        self
    }

    /// Set a per-worker stack-size hint in bytes.
    pub const fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Dispatch non-directory children as separate pool tasks.
    pub fn file_tasks(mut self, enabled: bool) -> Self {
        self.config.set(Config::FILE_TASKS, enabled);
        self
    }

    /// Present siblings to `dir_exit` in lexicographic order.
    pub fn sort(mut self, enabled: bool) -> Self {
        self.config.set(Config::SORT, enabled);
        self
    }

    pub fn dir_enter<F>(mut self, f: F) -> Self
    where
        F: Fn(&U, &Path, &std::fs::Metadata, Option<&super::Continuation>) -> (bool, Option<super::Continuation>)
            + Send
            + Sync
            + 'static,
    {
        self.callbacks.dir_enter = Some(Box::new(f) as Box<DirEnterFn<U>>);
        self
    }

    pub fn dir_exit<F>(mut self, f: F) -> Self
    where
        F: Fn(&U, &Path, &std::fs::Metadata, Option<super::Continuation>, &mut [super::Entry<V>]) -> V
            + Send
            + Sync
            + 'static,
    {
        self.callbacks.dir_exit = Some(Box::new(f) as Box<DirExitFn<U, V>>);
        self
    }

    pub fn file<F>(mut self, f: F) -> Self
    where
        F: Fn(&U, &Path, &std::fs::Metadata) -> V + Send + Sync + 'static,
    {
        self.callbacks.file = Some(Box::new(f) as Box<FileFn<U, V>>);
        self
    }

    pub fn error<F>(mut self, f: F) -> Self
    where
        F: Fn(&U, &super::EntryError, Option<&std::fs::Metadata>, Option<&super::Continuation>) -> V
            + Send
            + Sync
            + 'static,
    {
        self.callbacks.error = Some(Box::new(f) as Box<ErrorFn<U, V>>);
        self
    }

    /// Finalise the options and run the traversal at `path`.
    ///
    /// Returns `Ok(None)` if the root is a directory `dir_enter` declined,
    /// or if the root is a directory/file and the relevant callback was not
    /// set — there is no value to publish in either case.
    pub fn build(self, path: impl AsRef<Path>) -> Result<Option<V>, super::WalkError>
    where
        U: Send + Sync + 'static,
        V: Send + 'static,
    {
        let options = TraverseOptions {
            threads: self.threads.max(1),
            stack_size: self.stack_size,
            config: self.config,
            path: path.as_ref().to_path_buf(),
            user_arg: self.user_arg,
            callbacks: self.callbacks,
        };
        super::traverse(options)
    }
}
