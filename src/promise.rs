//! A `Promise` is a node in a tree of deferred computations.
//!
//! Executing the root moves the whole tree to `Pending` and submits the root's
//! handler to the tree's executor. When a node settles it pushes its outcome
//! into each attached child, which submits its own handler in turn. A child's
//! handler therefore never starts before its parent's handler has finished;
//! siblings run in no particular order.
//!
//! Handlers return `Result<T, E>`. An `Err` or a panic settles the node
//! `Rejected`; nothing unwinds into the executor.
//!
//! # Examples
//!
//! ```
//! use promise_tree::{Obligation, Promise};
//!
//! let root = Promise::<i32, String>::with_handler(|| Ok(20));
//! let doubled = root.then(|v| Ok(v * 2));
//! let checked = doubled.then(|v| if v > 10 { Err(format!("{v} is too big")) } else { Ok(v) });
//! root.execute();
//!
//! assert_eq!(doubled.wait(), Ok(40));
//! assert_eq!(checked.wait(), Err("40 is too big".to_string()));
//! ```

use crate::error::Error;
use crate::executor::{Schedule, Task};
use crate::holder::{Holder, Obligation, Phase, State};
use crate::options::{Options, Routing};
use crate::safe_call::safe_call;
use parking_lot::Mutex;
use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Fulfillment-path handler of a chained node.
pub type OnFulfilled<T, E> = Box<dyn FnOnce(T) -> Result<T, E> + Send + 'static>;
/// Rejection-path handler (rescuer) of a chained node.
pub type OnRejected<T, E> = Box<dyn FnOnce(E) -> Result<T, E> + Send + 'static>;

type RootHandler<T, E> = Box<dyn FnOnce() -> Result<T, E> + Send + 'static>;

enum Body<T, E> {
    Root(RootHandler<T, E>),
    /// A root completed with `set`/`fail` instead of a handler
    Deferred,
    Chained {
        on_fulfilled: OnFulfilled<T, E>,
        on_rejected: OnRejected<T, E>,
    },
    Spent,
}

struct Links<T, E> {
    children: Vec<Promise<T, E>>,
    body: Body<T, E>,
}

struct Node<T, E> {
    parent: Option<Weak<Node<T, E>>>,
    holder: Holder<T, E, Links<T, E>>,
    options: Options<T, E>,
    /// How a rejection of the parent reaches this node
    inbound: Routing<T, E>,
    executor: Arc<dyn Schedule>,
}

/// Handle to a promise node. Clones refer to the same node.
///
/// A node owns its children; the link back to the parent is weak. Keep the
/// root alive for as long as you may call [`execute`](Self::execute) through
/// one of its descendants.
pub struct Promise<T, E> {
    node: Arc<Node<T, E>>,
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guarded = self.node.holder.lock();
        f.debug_struct("Promise")
            .field("phase", &guarded.state.phase())
            .field("root", &self.node.parent.is_none())
            .field("children", &guarded.links.children.len())
            .finish()
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + From<Error> + 'static,
{
    fn from_parts(
        parent: Option<Weak<Node<T, E>>>,
        state: State<T, E>,
        body: Body<T, E>,
        options: Options<T, E>,
    ) -> Self {
        let (options, executor) = options.resolve();
        let inbound = options.routing.clone();
        Self::from_parts_routed(parent, state, body, options, executor, inbound)
    }

    fn from_parts_routed(
        parent: Option<Weak<Node<T, E>>>,
        state: State<T, E>,
        body: Body<T, E>,
        options: Options<T, E>,
        executor: Arc<dyn Schedule>,
        inbound: Routing<T, E>,
    ) -> Self {
        let links = Links {
            children: Vec::new(),
            body,
        };
        let holder = Holder::new(state, links, options.transform.clone());
        Self {
            node: Arc::new(Node {
                parent,
                holder,
                options,
                executor,
                inbound,
            }),
        }
    }

    /// A root already fulfilled with `value`
    pub fn fulfilled(value: T) -> Self {
        Self::fulfilled_in(Options::default(), value)
    }

    pub fn fulfilled_in(options: Options<T, E>, value: T) -> Self {
        Self::from_parts(None, State::Fulfilled(value), Body::Spent, options)
    }

    /// A root already rejected with `reason`
    pub fn rejected(reason: E) -> Self {
        Self::rejected_in(Options::default(), reason)
    }

    pub fn rejected_in(options: Options<T, E>, reason: E) -> Self {
        Self::from_parts(None, State::Rejected(reason), Body::Spent, options)
    }

    /// An unscheduled root that runs `handler` once executed
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        Self::with_handler_in(Options::default(), handler)
    }

    pub fn with_handler_in<F>(options: Options<T, E>, handler: F) -> Self
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        Self::from_parts(
            None,
            State::Unscheduled,
            Body::Root(Box::new(handler)),
            options,
        )
    }

    /// An unscheduled root without a handler, completed by [`set`](Self::set)
    /// or [`fail`](Self::fail).
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_tree::{Obligation, Promise};
    ///
    /// let root = Promise::<&str, String>::deferred();
    /// let greeting = root.then(|name| Ok(name));
    /// root.set("hi").unwrap();
    /// assert_eq!(greeting.wait(), Ok("hi"));
    /// ```
    pub fn deferred() -> Self {
        Self::deferred_in(Options::default())
    }

    pub fn deferred_in(options: Options<T, E>) -> Self {
        Self::from_parts(None, State::Unscheduled, Body::Deferred, options)
    }

    /// `with_handler(handler).execute()`
    pub fn run_async<F>(handler: F) -> Self
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        Self::with_handler(handler).execute()
    }

    pub fn is_root(&self) -> bool {
        self.node.parent.is_none()
    }

    /// The parent node, if this is a chained node whose parent is still alive
    pub fn parent(&self) -> Option<Self> {
        let parent = self.node.parent.as_ref()?.upgrade()?;
        Some(Self { node: parent })
    }

    /// Attached children, in the order they were chained
    pub fn children(&self) -> Vec<Self> {
        self.node.holder.lock().links.children.clone()
    }

    fn root(&self) -> Option<Self> {
        let mut current = self.node.clone();
        while let Some(parent) = current.parent.clone() {
            current = parent.upgrade()?;
        }
        Some(Self { node: current })
    }

    /// Schedule the tree this node belongs to.
    ///
    /// On a root, moves it from `Unscheduled` to `Pending`, cascades `Pending`
    /// to every attached descendant and submits the root's handler. Later
    /// calls, concurrent or not, do nothing. On any other node the call is
    /// forwarded to the root. Returns without waiting for resolution.
    pub fn execute(&self) -> Self {
        if let Err(e) = self.try_execute() {
            warn!(error = %e, "nothing to execute");
        }
        self.clone()
    }

    /// Fails with [`Error::RootDropped`] when this node is still unscheduled
    /// and its root is gone, so nothing can ever schedule it.
    fn try_execute(&self) -> Result<(), Error> {
        match self.root() {
            Some(root) => {
                root.start();
                Ok(())
            }
            None if self.is_unscheduled() => Err(Error::RootDropped),
            // an ancestor already scheduled this node
            None => Ok(()),
        }
    }

    fn start(&self) {
        let (children, handler) = {
            let mut guarded = self.node.holder.lock();
            if !matches!(guarded.state, State::Unscheduled) {
                trace!(phase = %guarded.state.phase(), "root already scheduled");
                return;
            }
            guarded.state = State::Pending;
            let handler = match std::mem::replace(&mut guarded.links.body, Body::Spent) {
                Body::Root(handler) => Some(handler),
                other => {
                    guarded.links.body = other;
                    None
                }
            };
            (guarded.links.children.clone(), handler)
        };

        for child in children {
            child.cascade_pending();
        }

        debug!(deferred = handler.is_none(), "executing root promise");
        if let Some(handler) = handler {
            self.realize(handler);
        }
    }

    fn cascade_pending(&self) {
        let children = {
            let mut guarded = self.node.holder.lock();
            if !matches!(guarded.state, State::Unscheduled) {
                return;
            }
            guarded.state = State::Pending;
            guarded.links.children.clone()
        };
        for child in children {
            child.cascade_pending();
        }
    }

    /// Attach a child running `on_fulfilled` or `on_rejected` once this node
    /// settles. A missing handler passes the outcome through unchanged.
    ///
    /// Fails with [`Error::MissingHandler`] when both are `None`; use
    /// [`then`](Self::then) or [`rescue`](Self::rescue) for the one-sided forms.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_tree::{Obligation, OnRejected, Promise};
    ///
    /// let recover: OnRejected<i32, String> = Box::new(|reason| Ok(reason.len() as i32));
    /// let child = Promise::rejected("boom".to_string()).chain(None, Some(recover)).unwrap();
    /// assert_eq!(child.wait(), Ok(4));
    /// ```
    pub fn chain(
        &self,
        on_fulfilled: Option<OnFulfilled<T, E>>,
        on_rejected: Option<OnRejected<T, E>>,
    ) -> Result<Self, Error> {
        if on_fulfilled.is_none() && on_rejected.is_none() {
            return Err(Error::MissingHandler);
        }
        Ok(self.attach(
            on_fulfilled.unwrap_or_else(|| Box::new(Ok::<T, E>)),
            on_rejected.unwrap_or_else(|| Box::new(Err::<T, E>)),
        ))
    }

    /// Chain a fulfillment handler; rejections pass through
    pub fn then<F>(&self, on_fulfilled: F) -> Self
    where
        F: FnOnce(T) -> Result<T, E> + Send + 'static,
    {
        self.attach(Box::new(on_fulfilled), Box::new(Err::<T, E>))
    }

    /// Chain a rejection handler; values pass through
    pub fn rescue<R>(&self, on_rejected: R) -> Self
    where
        R: FnOnce(E) -> Result<T, E> + Send + 'static,
    {
        self.attach(Box::new(Ok::<T, E>), Box::new(on_rejected))
    }

    /// Same as [`rescue`](Self::rescue)
    pub fn catch<R>(&self, on_rejected: R) -> Self
    where
        R: FnOnce(E) -> Result<T, E> + Send + 'static,
    {
        self.rescue(on_rejected)
    }

    fn attach(&self, on_fulfilled: OnFulfilled<T, E>, on_rejected: OnRejected<T, E>) -> Self {
        self.attach_routed(on_fulfilled, on_rejected, self.node.options.routing.clone())
    }

    /// Like `attach`, but `inbound` decides how this node's rejection reaches
    /// the new child, whatever the tree's routing is.
    fn attach_routed(
        &self,
        on_fulfilled: OnFulfilled<T, E>,
        on_rejected: OnRejected<T, E>,
        inbound: Routing<T, E>,
    ) -> Self {
        let (child, phase) = {
            let mut guarded = self.node.holder.lock();
            let phase = guarded.state.phase();
            let state = match phase {
                Phase::Unscheduled => State::Unscheduled,
                _ => State::Pending,
            };
            let body = Body::Chained {
                on_fulfilled,
                on_rejected,
            };
            let child = Self::from_parts_routed(
                Some(Arc::downgrade(&self.node)),
                state,
                body,
                self.node.options.clone(),
                self.node.executor.clone(),
                inbound,
            );
            guarded.links.children.push(child.clone());
            (child, phase)
        };
        trace!(parent = %phase, "chained child promise");
        if phase.is_settled() {
            self.notify(&child);
        }
        child
    }

    /// Fulfill a root by hand instead of running its handler.
    ///
    /// Allowed while the root is `Unscheduled`, or `Pending` without a handler
    /// (a [`deferred`](Self::deferred) root that was executed). The handler,
    /// if any, is discarded.
    pub fn set(&self, value: T) -> Result<(), Error> {
        self.complete_by_hand(Ok(value))
    }

    /// Reject a root by hand. Same rules as [`set`](Self::set).
    pub fn fail(&self, reason: E) -> Result<(), Error> {
        self.complete_by_hand(Err(reason))
    }

    fn complete_by_hand(&self, outcome: Result<T, E>) -> Result<(), Error> {
        if !self.is_root() {
            return Err(Error::NotRoot);
        }
        let children = {
            let mut guarded = self.node.holder.lock();
            let open = match (&guarded.state, &guarded.links.body) {
                (State::Unscheduled, _) => true,
                (State::Pending, Body::Deferred) => true,
                _ => false,
            };
            if !open {
                return Err(Error::AlreadyScheduled);
            }
            guarded.state = State::Pending;
            guarded.links.body = Body::Spent;
            guarded.links.children.clone()
        };
        for child in children {
            child.cascade_pending();
        }
        self.complete(outcome);
        Ok(())
    }

    /// Submit `work` and settle this node with its outcome.
    fn realize<F>(&self, work: F)
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        let promise = self.clone();
        let task: Task = Box::new(move || {
            let outcome = safe_call(work);
            promise.complete(outcome);
        });
        if let Err(e) = self.node.executor.post(task) {
            warn!(error = %e, "resolution task refused, rejecting");
            self.complete(Err(E::from(e)));
        }
    }

    fn complete(&self, outcome: Result<T, E>) {
        let children = {
            let mut guarded = self.node.holder.lock();
            if !self.node.holder.settle(&mut guarded, outcome) {
                trace!("promise already settled, ignoring");
                return;
            }
            trace!(phase = %guarded.state.phase(), "promise settled");
            guarded.links.children.clone()
        };
        for child in &children {
            self.notify(child);
        }
    }

    /// Push this node's settled outcome into `child`.
    fn notify(&self, child: &Self) {
        let routing = &child.node.inbound;
        let signal = safe_call(|| {
            let signal = self.node.holder.peek().map(|outcome| match outcome {
                Ok(value) => Ok(value),
                Err(reason) => match routing {
                    Routing::Rescuer => Err(reason),
                    Routing::Fulfillment(bridge) => Ok(bridge(reason)),
                },
            });
            Ok::<_, E>(signal)
        });
        match signal {
            Ok(Some(Ok(value))) => child.on_fulfill(value),
            Ok(Some(Err(reason))) => child.on_reject(reason),
            Ok(None) => {}
            // the transform or the routing bridge panicked
            Err(reason) => child.complete(Err(reason)),
        }
    }

    fn take_body(&self) -> Body<T, E> {
        std::mem::replace(&mut self.node.holder.lock().links.body, Body::Spent)
    }

    fn on_fulfill(&self, value: T) {
        match self.take_body() {
            Body::Chained { on_fulfilled, .. } => self.realize(move || on_fulfilled(value)),
            _ => trace!("no fulfillment handler left to run"),
        }
    }

    fn on_reject(&self, reason: E) {
        match self.take_body() {
            Body::Chained { on_rejected, .. } => self.realize(move || on_rejected(reason)),
            _ => trace!("no rejection handler left to run"),
        }
    }

    /// A future resolving to this node's settled outcome
    pub fn settled(&self) -> Settled<T, E> {
        Settled {
            promise: self.clone(),
        }
    }

    /// Combine `promises` into one promise of all their values, in order.
    ///
    /// Every input is executed. The result fulfills once all inputs fulfill
    /// and rejects with the first rejection reason observed, whatever routing
    /// the inputs' trees use. An input that can no longer be scheduled because
    /// its root was dropped rejects the result with [`Error::RootDropped`]. An
    /// empty input fulfills with an empty vector.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_tree::{Obligation, Promise};
    ///
    /// let parts = vec![
    ///     Promise::<u32, String>::with_handler(|| Ok(1)),
    ///     Promise::fulfilled(2),
    /// ];
    /// assert_eq!(Promise::zip(parts.clone()).wait(), Ok(vec![1, 2]));
    /// ```
    pub fn zip(promises: Vec<Self>) -> Promise<Vec<T>, E> {
        Self::zip_in(Options::default(), promises)
    }

    pub fn zip_in(options: Options<Vec<T>, E>, promises: Vec<Self>) -> Promise<Vec<T>, E> {
        let combined = Promise::deferred_in(options);
        if promises.is_empty() {
            let _ = combined.set(Vec::new());
            return combined;
        }
        combined.execute();

        let slots = Arc::new(Mutex::new(ZipSlots {
            values: vec![None; promises.len()],
            remaining: promises.len(),
        }));
        for (index, promise) in promises.iter().enumerate() {
            let (slots, on_value, on_reason) = (slots.clone(), combined.clone(), combined.clone());
            promise.attach_routed(
                Box::new(move |value: T| {
                    let done = {
                        let mut slots = slots.lock();
                        slots.values[index] = Some(value.clone());
                        slots.remaining -= 1;
                        (slots.remaining == 0)
                            .then(|| slots.values.iter_mut().filter_map(Option::take).collect())
                    };
                    if let Some(values) = done {
                        let _ = on_value.set(values);
                    }
                    Ok(value)
                }),
                Box::new(move |reason: E| {
                    let _ = on_reason.fail(reason.clone());
                    Err(reason)
                }),
                Routing::Rescuer,
            );
            if let Err(e) = promise.try_execute() {
                warn!(error = %e, index, "zip input cannot be scheduled");
                let _ = combined.fail(E::from(e));
            }
        }
        combined
    }

    /// Same as [`zip`](Self::zip)
    pub fn all(promises: Vec<Self>) -> Promise<Vec<T>, E> {
        Self::zip(promises)
    }
}

struct ZipSlots<T> {
    values: Vec<Option<T>>,
    remaining: usize,
}

impl<T, E> Obligation<T, E> for Promise<T, E>
where
    T: Clone,
    E: Clone,
{
    fn phase(&self) -> Phase {
        self.node.holder.phase()
    }

    fn peek(&self) -> Option<Result<T, E>> {
        self.node.holder.peek()
    }

    fn wait(&self) -> Result<T, E> {
        self.node.holder.wait()
    }

    fn wait_timeout(&self, timeout: Duration) -> Option<Result<T, E>> {
        self.node.holder.wait_timeout(timeout)
    }
}

/// Future returned by [`Promise::settled`]
pub struct Settled<T, E> {
    promise: Promise<T, E>,
}

impl<T: Clone, E: Clone> Future for Settled<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.promise.node.holder.poll_settled(cx)
    }
}

impl<T, E> IntoFuture for Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + From<Error> + 'static,
{
    type Output = Result<T, E>;
    type IntoFuture = Settled<T, E>;

    fn into_future(self) -> Self::IntoFuture {
        Settled { promise: self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ImmediateExecutor;
    use futures::executor::block_on;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn inline<T, E>() -> Options<T, E> {
        Options::new().executor(Arc::new(ImmediateExecutor))
    }

    #[test]
    fn test_chain_without_handlers_is_refused() {
        let root = Promise::<i32, String>::fulfilled_in(inline(), 1);
        assert_eq!(root.chain(None, None).unwrap_err(), Error::MissingHandler);
        assert!(root.children().is_empty());
    }

    #[test]
    fn test_chain_defaults_missing_handler_to_passthrough() {
        let double: OnFulfilled<i32, String> = Box::new(|v| Ok(v * 2));
        let root = Promise::<i32, String>::fulfilled_in(inline(), 21);
        let child = root.chain(Some(double), None).unwrap();
        assert_eq!(child.wait(), Ok(42));

        let recover: OnFulfilled<i32, String> = Box::new(|v| Ok(v * 2));
        let failed = Promise::<i32, String>::rejected_in(inline(), "no".into());
        let passed = failed.chain(Some(recover), None).unwrap();
        assert_eq!(passed.wait(), Err("no".to_string()));
    }

    #[test]
    fn test_unscheduled_tree_is_left_alone_until_executed() {
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = ran.clone();
        let root = Promise::<i32, String>::with_handler_in(inline(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        });
        let child = root.then(|v| Ok(v + 1));
        assert!(root.is_unscheduled());
        assert!(child.is_unscheduled());
        assert_eq!(ran.load(Ordering::SeqCst), 0);

        child.execute();
        assert_eq!(child.peek(), Some(Ok(2)));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_execute_is_idempotent() {
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = ran.clone();
        let root = Promise::<(), String>::with_handler_in(inline(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        root.execute();
        root.execute();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rescue_and_catch_recover() {
        let root = Promise::<i32, String>::rejected_in(inline(), "bad".into());
        let rescued = root.rescue(|reason| Ok(reason.len() as i32));
        let caught = root.catch(|_| Ok(0));
        assert_eq!(rescued.wait(), Ok(3));
        assert_eq!(caught.wait(), Ok(0));

        let untouched = Promise::<i32, String>::fulfilled_in(inline(), 9).rescue(|_| Ok(0));
        assert_eq!(untouched.wait(), Ok(9));
    }

    #[test]
    fn test_panicking_handler_rejects_and_propagates() {
        let root = Promise::<i32, String>::with_handler_in(inline(), || panic!("kaboom"));
        let child = root.then(|v| Ok(v + 1));
        let grandchild = child.then(|v| Ok(v + 1));
        root.execute();
        let expected = Err("handler panicked: kaboom".to_string());
        assert_eq!(root.wait(), expected);
        assert_eq!(child.wait(), expected);
        assert_eq!(grandchild.wait(), expected);
    }

    #[test]
    fn test_fulfillment_routing_feeds_reason_to_fulfillment_handler() {
        let options = inline().route_rejections_to_fulfillment(|reason: String| reason);
        let root = Promise::<String, String>::rejected_in(options, "boom".into());
        let rescued = Arc::new(AtomicUsize::new(0));
        let counter = rescued.clone();
        let child = root.then(|v| Ok(format!("got {v}")));
        let rescuer = root.rescue(move |reason| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(reason)
        });
        assert_eq!(child.wait(), Ok("got boom".to_string()));
        assert_eq!(rescuer.wait(), Ok("boom".to_string()));
        assert_eq!(rescued.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_set_and_fail_rules() {
        let root = Promise::<i32, String>::with_handler_in(inline(), || Ok(1));
        let child = root.then(|v| Ok(v + 1));
        assert_eq!(child.set(5), Err(Error::NotRoot));
        root.set(10).unwrap();
        assert_eq!(child.wait(), Ok(11));
        assert_eq!(root.set(3), Err(Error::AlreadyScheduled));
        assert_eq!(root.fail("late".into()), Err(Error::AlreadyScheduled));
        assert_eq!(root.wait(), Ok(10));

        let executed = Promise::<i32, String>::deferred_in(inline()).execute();
        assert!(executed.is_pending());
        executed.fail("nope".into()).unwrap();
        assert_eq!(executed.reason(), Some("nope".to_string()));
    }

    #[test]
    fn test_transform_applies_to_children_and_readers() {
        let options = inline().transform(|v: &Vec<i32>| v.iter().map(|x| x * 10).collect());
        let root = Promise::<Vec<i32>, String>::fulfilled_in(options, vec![1, 2]);
        let child = root.then(Ok);
        assert_eq!(root.value(), Some(vec![10, 20]));
        assert_eq!(child.value(), Some(vec![100, 200]));
    }

    #[test]
    fn test_refused_task_rejects_node() {
        let executor = Arc::new(crate::Executor::builder().pool_size(1).build().unwrap());
        executor.shutdown();
        let options = Options::new().executor(executor);
        let root = Promise::<i32, String>::with_handler_in(options, || Ok(1));
        let child = root.then(|v| Ok(v + 1));
        root.execute();
        assert_eq!(root.reason(), Some("executor has shut down".to_string()));
        assert_eq!(child.reason(), Some("executor has shut down".to_string()));
    }

    #[test]
    fn test_settled_future_and_into_future() {
        let root = Promise::<i32, String>::fulfilled_in(inline(), 7);
        assert_eq!(block_on(root.settled()), Ok(7));
        assert_eq!(block_on(async { root.then(|v| Ok(v - 1)).await }), Ok(6));
    }

    #[test]
    fn test_zip_collects_in_order_and_rejects_first() {
        let parts = vec![
            Promise::<i32, String>::with_handler_in(inline(), || Ok(1)),
            Promise::fulfilled_in(inline(), 2),
            Promise::with_handler_in(inline(), || Ok(3)),
        ];
        assert_eq!(Promise::zip_in(inline(), parts).wait(), Ok(vec![1, 2, 3]));

        let parts = vec![
            Promise::<i32, String>::fulfilled_in(inline(), 1),
            Promise::rejected_in(inline(), "second".into()),
            Promise::rejected_in(inline(), "third".into()),
        ];
        assert_eq!(
            Promise::all(parts).wait_timeout(Duration::from_secs(5)),
            Some(Err("second".to_string()))
        );

        let empty = Promise::<i32, String>::zip(Vec::new());
        assert_eq!(empty.peek(), Some(Ok(vec![])));
    }

    #[test]
    fn test_zip_counts_rejection_even_when_inputs_bridge_to_fulfillment() {
        let bridged = || inline().route_rejections_to_fulfillment(|reason: String| reason);
        let parts = vec![
            Promise::<String, String>::fulfilled_in(bridged(), "a".into()),
            Promise::rejected_in(bridged(), "boom".into()),
        ];
        assert_eq!(
            Promise::zip_in(inline(), parts.clone()).wait_timeout(Duration::from_secs(2)),
            Some(Err("boom".to_string()))
        );

        // ordinary children of the same input still take the bridge
        assert_eq!(parts[1].then(Ok).wait(), Ok("boom".to_string()));
    }

    #[test]
    fn test_zip_rejects_input_whose_root_is_gone() {
        let orphan = Promise::<i32, String>::with_handler_in(inline(), || Ok(1)).then(|v| Ok(v + 1));
        assert!(orphan.is_unscheduled());
        assert_eq!(
            Promise::zip_in(inline(), vec![orphan]).wait_timeout(Duration::from_secs(2)),
            Some(Err(Error::RootDropped.to_string()))
        );

        // already settled before its root went away
        let settled = Promise::<i32, String>::fulfilled_in(inline(), 1).then(|v| Ok(v + 1));
        assert_eq!(
            Promise::zip_in(inline(), vec![settled]).wait_timeout(Duration::from_secs(2)),
            Some(Ok(vec![2]))
        );
    }

    #[test]
    fn test_debug_reports_phase() {
        let root = Promise::<i32, String>::fulfilled_in(inline(), 1);
        let _child = root.then(Ok);
        let rendered = format!("{root:?}");
        assert!(rendered.contains("Fulfilled"));
        assert!(rendered.contains("children: 1"));
    }
}
