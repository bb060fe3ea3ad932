//! Settled-value storage shared by every promise node.
//!
//! A [`Holder`] keeps a node's state behind one lock together with whatever
//! else the owner needs guarded by that same lock. Settlement happens at most
//! once and wakes both blocked threads (condvar) and pending futures (wakers).

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

/// Applied to a fulfilled value before it is handed to a reader or a child.
pub type Transform<T> = Arc<dyn Fn(&T) -> T + Send + Sync>;

/// The state of a promise without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Unscheduled,
    Pending,
    Fulfilled,
    Rejected,
}

impl Phase {
    pub fn is_settled(self) -> bool {
        matches!(self, Phase::Fulfilled | Phase::Rejected)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Unscheduled => "unscheduled",
            Phase::Pending => "pending",
            Phase::Fulfilled => "fulfilled",
            Phase::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub(crate) enum State<T, E> {
    Unscheduled,
    Pending,
    Fulfilled(T),
    Rejected(E),
}

impl<T, E> State<T, E> {
    pub(crate) fn phase(&self) -> Phase {
        match self {
            State::Unscheduled => Phase::Unscheduled,
            State::Pending => Phase::Pending,
            State::Fulfilled(_) => Phase::Fulfilled,
            State::Rejected(_) => Phase::Rejected,
        }
    }
}

impl<T, E> From<Result<T, E>> for State<T, E> {
    fn from(outcome: Result<T, E>) -> Self {
        match outcome {
            Ok(value) => State::Fulfilled(value),
            Err(reason) => State::Rejected(reason),
        }
    }
}

/// Everything behind a holder's lock. `links` belongs to the owner.
pub(crate) struct Guarded<T, E, L> {
    pub(crate) state: State<T, E>,
    pub(crate) links: L,
    wakers: Vec<Waker>,
}

pub(crate) struct Holder<T, E, L> {
    guard: Mutex<Guarded<T, E, L>>,
    settled: Condvar,
    transform: Option<Transform<T>>,
}

impl<T, E, L> Holder<T, E, L> {
    pub(crate) fn new(state: State<T, E>, links: L, transform: Option<Transform<T>>) -> Self {
        Self {
            guard: Mutex::new(Guarded {
                state,
                links,
                wakers: Vec::new(),
            }),
            settled: Condvar::new(),
            transform,
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Guarded<T, E, L>> {
        self.guard.lock()
    }

    /// Commit `outcome` unless the state is already terminal.
    ///
    /// Returns `false`, leaving the stored value untouched, when it was.
    pub(crate) fn settle(&self, guarded: &mut Guarded<T, E, L>, outcome: Result<T, E>) -> bool {
        if guarded.state.phase().is_settled() {
            return false;
        }
        guarded.state = outcome.into();
        self.settled.notify_all();
        for waker in guarded.wakers.drain(..) {
            waker.wake()
        }
        true
    }

    pub(crate) fn phase(&self) -> Phase {
        self.lock().state.phase()
    }
}

impl<T: Clone, E: Clone, L> Holder<T, E, L> {
    fn raw(state: &State<T, E>) -> Option<Result<T, E>> {
        match state {
            State::Fulfilled(value) => Some(Ok(value.clone())),
            State::Rejected(reason) => Some(Err(reason.clone())),
            _ => None,
        }
    }

    // The transform is user code, so it never runs under the lock.
    fn deref(&self, raw: Result<T, E>) -> Result<T, E> {
        match (raw, &self.transform) {
            (Ok(value), Some(transform)) => Ok(transform(&value)),
            (raw, _) => raw,
        }
    }

    pub(crate) fn peek(&self) -> Option<Result<T, E>> {
        let raw = Self::raw(&self.lock().state);
        raw.map(|raw| self.deref(raw))
    }

    pub(crate) fn wait(&self) -> Result<T, E> {
        let raw = {
            let mut guarded = self.lock();
            loop {
                if let Some(raw) = Self::raw(&guarded.state) {
                    break raw;
                }
                self.settled.wait(&mut guarded);
            }
        };
        self.deref(raw)
    }

    pub(crate) fn wait_timeout(&self, timeout: Duration) -> Option<Result<T, E>> {
        let deadline = Instant::now() + timeout;
        let raw = {
            let mut guarded = self.lock();
            loop {
                if let Some(raw) = Self::raw(&guarded.state) {
                    break Some(raw);
                }
                if self.settled.wait_until(&mut guarded, deadline).timed_out() {
                    break Self::raw(&guarded.state);
                }
            }
        };
        raw.map(|raw| self.deref(raw))
    }

    pub(crate) fn poll_settled(&self, cx: &mut Context<'_>) -> Poll<Result<T, E>> {
        let raw = {
            let mut guarded = self.lock();
            match Self::raw(&guarded.state) {
                Some(raw) => raw,
                None => {
                    if !guarded.wakers.iter().any(|w| w.will_wake(cx.waker())) {
                        guarded.wakers.push(cx.waker().clone());
                    }
                    return Poll::Pending;
                }
            }
        };
        Poll::Ready(self.deref(raw))
    }
}

/// Read access to a value that settles at most once.
///
/// The blocking methods wait on the holder's completion signal; they never
/// drive execution themselves, so waiting on a node whose tree was never
/// executed blocks until someone executes it.
pub trait Obligation<T, E> {
    fn phase(&self) -> Phase;

    /// The settled outcome, without blocking
    fn peek(&self) -> Option<Result<T, E>>;

    /// Block until settled
    fn wait(&self) -> Result<T, E>;

    /// Block until settled or until `timeout` elapses
    fn wait_timeout(&self, timeout: Duration) -> Option<Result<T, E>>;

    fn is_unscheduled(&self) -> bool {
        self.phase() == Phase::Unscheduled
    }

    fn is_pending(&self) -> bool {
        self.phase() == Phase::Pending
    }

    fn is_fulfilled(&self) -> bool {
        self.phase() == Phase::Fulfilled
    }

    fn is_rejected(&self) -> bool {
        self.phase() == Phase::Rejected
    }

    fn is_settled(&self) -> bool {
        self.phase().is_settled()
    }

    /// Block until settled; `None` if the promise was rejected
    fn value(&self) -> Option<T> {
        self.wait().ok()
    }

    /// Block until settled; `None` if the promise was fulfilled
    fn reason(&self) -> Option<E> {
        self.wait().err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use std::future::poll_fn;
    use std::thread;

    fn pending() -> Arc<Holder<String, String, ()>> {
        Arc::new(Holder::new(State::Pending, (), None))
    }

    #[test]
    fn test_settle_once() {
        let holder = pending();
        {
            let mut guarded = holder.lock();
            assert!(holder.settle(&mut guarded, Ok("first".into())));
            assert!(!holder.settle(&mut guarded, Err("second".into())));
        }
        assert_eq!(holder.phase(), Phase::Fulfilled);
        assert_eq!(holder.peek(), Some(Ok("first".to_string())));
    }

    #[test]
    fn test_wait_blocks_until_settled() {
        let holder = pending();
        let settler = holder.clone();
        let task = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            let mut guarded = settler.lock();
            settler.settle(&mut guarded, Err("late".into()));
        });
        assert_eq!(holder.wait(), Err("late".to_string()));
        task.join().expect("The settler thread has panicked");
    }

    #[test]
    fn test_wait_timeout_expires_on_pending() {
        let holder = pending();
        assert_eq!(holder.wait_timeout(Duration::from_millis(10)), None);
        assert_eq!(holder.phase(), Phase::Pending);
    }

    #[test]
    fn test_transform_applies_to_fulfilled_reads_only() {
        let upper: Transform<String> = Arc::new(|s: &String| s.to_uppercase());
        let holder: Holder<String, String, ()> =
            Holder::new(State::Fulfilled("quiet".into()), (), Some(upper));
        assert_eq!(holder.wait(), Ok("QUIET".to_string()));

        let upper: Transform<String> = Arc::new(|s: &String| s.to_uppercase());
        let rejected: Holder<String, String, ()> =
            Holder::new(State::Rejected("why".into()), (), Some(upper));
        assert_eq!(rejected.peek(), Some(Err("why".to_string())));
    }

    #[test]
    fn test_poll_settled_wakes_future() {
        let holder = pending();
        let settler = holder.clone();
        let task = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            let mut guarded = settler.lock();
            settler.settle(&mut guarded, Ok("ready".into()));
        });
        let outcome = block_on(poll_fn(|cx| holder.poll_settled(cx)));
        assert_eq!(outcome, Ok("ready".to_string()));
        task.join().expect("The settler thread has panicked");
    }

    #[test]
    fn test_repeated_polls_keep_one_waker() {
        let holder = pending();
        let mut cx = Context::from_waker(futures::task::noop_waker_ref());
        for _ in 0..3 {
            assert!(holder.poll_settled(&mut cx).is_pending());
        }
        assert_eq!(holder.lock().wakers.len(), 1);

        {
            let mut guarded = holder.lock();
            holder.settle(&mut guarded, Ok("done".into()));
            assert!(guarded.wakers.is_empty());
        }
        assert_eq!(holder.poll_settled(&mut cx), Poll::Ready(Ok("done".to_string())));
    }
}
