use crate::pool::PoolError;
use std::io;
use std::path::PathBuf;

/// Failures that can cause `traverse` itself to return early.
///
/// Per `spec.md` §7, everything else (stat failures mid-tree, `opendir`
/// failures, submission failures for dir-enter/file tasks) is routed to the
/// caller's `error` callback instead and does not appear here — only the
/// three truly unrecoverable conditions do.
#[derive(Debug, thiserror::Error)]
pub enum WalkError {
    /// The root path could not be stat'd at all (`spec.md` §4.2 Startup
    /// step 1, §7 "Root stat failure").
    #[error("failed to stat root path {path:?}: {source}")]
    RootStat { path: PathBuf, source: io::Error },

    /// The worker pool backing the traversal could not be constructed.
    #[error("failed to initialise worker pool: {0}")]
    PoolInit(#[from] PoolError),

    /// Shutting down the pool after traversal failed.
    #[error("failed to shut down worker pool cleanly: {0}")]
    PoolShutdown(PoolError),
}

/// A single syscall-site failure surfaced to the caller's `error` callback.
///
/// `spec.md` §7: "The core never discards a reported error" — every variant
/// here corresponds to exactly one call-site in the coordinator.
#[derive(Debug, thiserror::Error)]
pub enum EntryError {
    #[error("lstat failed for {path:?}: {source}")]
    Stat { path: PathBuf, source: io::Error },

    #[error("opendir failed for {path:?}: {source}")]
    OpenDir { path: PathBuf, source: io::Error },

    #[error("reading directory entries of {path:?} failed: {source}")]
    ReadDir { path: PathBuf, source: io::Error },

    #[error("could not submit task for {path:?}: {source}")]
    Submit { path: PathBuf, source: PoolError },
}

impl EntryError {
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::Stat { path, .. }
            | Self::OpenDir { path, .. }
            | Self::ReadDir { path, .. }
            | Self::Submit { path, .. } => path,
        }
    }
}
