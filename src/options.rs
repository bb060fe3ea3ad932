//! Per-tree configuration.
//!
//! Options are given to a root and copied into every node chained below it.

use crate::executor::{self, Schedule};
use crate::holder::Transform;
use std::fmt;
use std::sync::Arc;

/// Decides which handler of a child receives its parent's rejection.
pub enum Routing<T, E> {
    /// The rejection reaches the child's rejection handler. A child chained
    /// with `then` passes the reason through and settles rejected.
    Rescuer,
    /// The reason is converted with the bridge and handed to the child's
    /// fulfillment handler, so rejection handlers never run on notification.
    Fulfillment(Arc<dyn Fn(E) -> T + Send + Sync>),
}

impl<T, E> Clone for Routing<T, E> {
    fn clone(&self) -> Self {
        match self {
            Routing::Rescuer => Routing::Rescuer,
            Routing::Fulfillment(bridge) => Routing::Fulfillment(bridge.clone()),
        }
    }
}

impl<T, E> fmt::Debug for Routing<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Routing::Rescuer => f.write_str("Rescuer"),
            Routing::Fulfillment(_) => f.write_str("Fulfillment"),
        }
    }
}

/// Configuration shared by a promise tree.
///
/// # Examples
///
/// ```
/// use promise_tree::{ImmediateExecutor, Options};
/// use std::sync::Arc;
///
/// let options: Options<Vec<u8>, String> = Options::new()
///     .executor(Arc::new(ImmediateExecutor))
///     .transform(|bytes: &Vec<u8>| bytes.clone());
/// ```
pub struct Options<T, E> {
    executor: Option<Arc<dyn Schedule>>,
    pub(crate) transform: Option<Transform<T>>,
    pub(crate) routing: Routing<T, E>,
}

impl<T, E> Default for Options<T, E> {
    fn default() -> Self {
        Self {
            executor: None,
            transform: None,
            routing: Routing::Rescuer,
        }
    }
}

impl<T, E> Clone for Options<T, E> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            transform: self.transform.clone(),
            routing: self.routing.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Options<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("executor", &self.executor.as_ref().map(|_| "custom"))
            .field("transform", &self.transform.is_some())
            .field("routing", &self.routing)
            .finish()
    }
}

impl<T, E> Options<T, E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run resolution tasks on `executor` instead of the global one
    pub fn executor(mut self, executor: Arc<dyn Schedule>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Dereference transform applied to fulfilled values on every read
    pub fn transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(&T) -> T + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }

    pub fn routing(mut self, routing: Routing<T, E>) -> Self {
        self.routing = routing;
        self
    }

    /// Shorthand for `routing(Routing::Fulfillment(bridge))`
    pub fn route_rejections_to_fulfillment<F>(self, bridge: F) -> Self
    where
        F: Fn(E) -> T + Send + Sync + 'static,
    {
        self.routing(Routing::Fulfillment(Arc::new(bridge)))
    }

    /// Pin the executor, falling back to the global one.
    pub(crate) fn resolve(mut self) -> (Self, Arc<dyn Schedule>) {
        let executor = self.executor.get_or_insert_with(executor::global).clone();
        (self, executor)
    }
}
