//! Chainable promises organized as a tree and resolved on a worker pool.
//!
//! ```
//! use promise_tree::{Obligation, Promise};
//!
//! let root = Promise::<u32, String>::with_handler(|| Ok(5));
//! let next = root.then(|v| Ok(v + 1));
//! root.execute();
//! assert_eq!(next.wait(), Ok(6));
//! ```

pub mod error;
pub mod executor;
pub mod holder;
pub mod options;
pub mod promise;
pub mod safe_call;

pub use error::Error;
pub use executor::{Executor, ExecutorBuilder, ImmediateExecutor, Schedule, Task};
pub use holder::{Obligation, Phase, Transform};
pub use options::{Options, Routing};
pub use promise::{OnFulfilled, OnRejected, Promise, Settled};
pub use safe_call::safe_call;
