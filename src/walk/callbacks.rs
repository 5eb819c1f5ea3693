use super::EntryError;
use std::any::Any;
use std::fs::Metadata;
use std::path::Path;

/// An opaque value produced by `dir_enter` and handed to the matching
/// `dir_exit` for the same directory (`spec.md` §9: "do not interpret").
pub type Continuation = Box<dyn Any + Send>;

/// `dir_enter(user_arg, path, stat, parent_continuation) -> (should_descend, my_continuation)`
pub type DirEnterFn<U> =
    dyn Fn(&U, &Path, &Metadata, Option<&Continuation>) -> (bool, Option<Continuation>)
        + Send
        + Sync;

/// `dir_exit(user_arg, path, stat, continuation, entries[]) -> value`
pub type DirExitFn<U, V> =
    dyn Fn(&U, &Path, &Metadata, Option<Continuation>, &mut [Entry<V>]) -> V + Send + Sync;

/// `file(user_arg, path, stat) -> value`
pub type FileFn<U, V> = dyn Fn(&U, &Path, &Metadata) -> V + Send + Sync;

/// `error(user_arg, path, maybe_stat, maybe_continuation) -> value`
pub type ErrorFn<U, V> =
    dyn Fn(&U, &EntryError, Option<&Metadata>, Option<&Continuation>) -> V + Send + Sync;

/// One `{name, data}` slot in a directory's child-entry table.
///
/// `data` defaults to "absent" (`None`) and is filled in by whichever
/// terminal callback runs for that child (`spec.md` §3 `DirTask`).
pub struct Entry<V> {
    pub name: std::ffi::OsString,
    pub data: Option<V>,
}

impl<V> Entry<V> {
    pub(crate) const fn new(name: std::ffi::OsString) -> Self {
        Self { name, data: None }
    }
}

/// The four nullable callback slots bundled for one `traverse` call
/// (`spec.md` §9: "four independent function slots, each nullable").
pub(crate) struct Callbacks<U, V> {
    pub dir_enter: Option<Box<DirEnterFn<U>>>,
    pub dir_exit: Option<Box<DirExitFn<U, V>>>,
    pub file: Option<Box<FileFn<U, V>>>,
    pub error: Option<Box<ErrorFn<U, V>>>,
}

impl<U, V> Default for Callbacks<U, V> {
    fn default() -> Self {
        Self {
            dir_enter: None,
            dir_exit: None,
            file: None,
            error: None,
        }
    }
}
