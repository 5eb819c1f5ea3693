/*!
A multi-threaded filesystem traversal engine.

Two pieces compose to form it:

- [`pool`]: a bounded-queue, fixed-worker thread pool translated from the
  classic `pthread_mutex`/`pthread_cond` design.
- [`walk`]: a join-style path-traversal coordinator built on top of it, with
  `dir_enter`/`dir_exit`/`file`/`error` callback slots.

Most callers only need [`walk::traverse`] and [`walk::TraverseOptionsBuilder`];
[`pool::ThreadPool`] is exposed directly for callers who want the bounded
worker pool without the traversal coordinator on top.
*/

pub mod pool;
pub mod walk;

pub use pool::{PoolError, ThreadPool};
pub use walk::{
    traverse, Config, Continuation, Entry, EntryError, TraverseOptions, TraverseOptionsBuilder,
    WalkError,
};
