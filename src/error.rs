//! Error types for promise_tree
//!
//! Errors that describe misuse are returned to the caller. Errors raised while
//! resolving a node (a panicking handler, a refused task) are converted into
//! the node's rejection reason through `E: From<Error>`.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// `chain` was called without either handler
    #[error("chain requires an on_fulfilled or an on_rejected handler")]
    MissingHandler,

    /// A handler panicked while resolving a node
    #[error("handler panicked: {0}")]
    Panicked(String),

    /// The executor no longer accepts tasks
    #[error("executor has shut down")]
    ExecutorShutdown,

    /// Manual completion was attempted on a chained node
    #[error("only a root promise can be completed by hand")]
    NotRoot,

    /// Manual completion was attempted after the node was scheduled or settled
    #[error("promise is already scheduled or settled")]
    AlreadyScheduled,

    /// An unscheduled node lost its root, so nothing can ever schedule it
    #[error("root promise was dropped before the tree was executed")]
    RootDropped,

    /// A worker thread could not be spawned
    #[error("failed to spawn worker: {0}")]
    Spawn(String),

    /// The process-wide executor was initialized before `install_global`
    #[error("the global executor is already initialized")]
    GlobalExecutorAlreadySet,
}

impl From<Error> for String {
    fn from(e: Error) -> Self {
        e.to_string()
    }
}

/// Result type alias for promise_tree operations
pub type Result<T> = std::result::Result<T, Error>;
