//! Blocking calls into an owner thread
//!
//! A [`Downlink`] posts a task and does not return until the task has run on
//! the owner thread. While it waits, the caller's [`WaitIndicator`] decides
//! what the calling thread does: an [`EventLoop`](crate::EventLoop) keeps
//! servicing its own events in a nested loop, [`BlockingWait`] simply parks
//! the thread.
//!
//! If the owner is torn down before the task runs, the task is dropped and
//! the call returns `LinkError::Unavailable` instead of blocking forever.

use crate::dispatcher::Dispatcher;
use crate::sender::RequestSender;
use crate::slave::{SlaveObject, SlaveSender};
use game_link_core::{LinkError, Result};
use std::cell::Cell;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use tracing::debug;

/// One-shot completion flag raised by a finished (or discarded) task
#[derive(Clone)]
pub struct Completion {
    inner: Arc<CompletionInner>,
}

struct CompletionInner {
    raised: Mutex<bool>,
    cond: Condvar,
    wake: Option<Arc<dyn Dispatcher>>,
}

impl Completion {
    /// Completion for a thread that parks while waiting
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Completion that also posts a wake-up job to `dispatcher` when raised,
    /// so a thread blocked in that dispatcher's loop re-checks it
    pub fn with_wake(dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self::build(Some(dispatcher))
    }

    fn build(wake: Option<Arc<dyn Dispatcher>>) -> Self {
        Self {
            inner: Arc::new(CompletionInner {
                raised: Mutex::new(false),
                cond: Condvar::new(),
                wake,
            }),
        }
    }

    /// Raise the flag. Callable from any thread.
    pub fn raise(&self) {
        *self.inner.raised.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.inner.cond.notify_all();
        if let Some(dispatcher) = &self.inner.wake {
            // A loop that is gone has nobody waiting on it
            let _ = dispatcher.post_job(Box::new(|| {}));
        }
    }

    pub fn is_raised(&self) -> bool {
        *self.inner.raised.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Park the current thread until the flag is raised
    pub fn wait_blocking(&self) {
        let mut raised = self.inner.raised.lock().unwrap_or_else(PoisonError::into_inner);
        while !*raised {
            raised = self
                .inner
                .cond
                .wait(raised)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}

/// What a calling thread does while a [`Downlink`] call is outstanding
pub trait WaitIndicator {
    /// Create the completion the posted task will raise
    fn completion(&self) -> Completion;

    /// Return once `completion` is raised
    fn wait(&self, completion: &Completion);

    /// Whether this thread keeps running its own dispatcher while waiting.
    ///
    /// A waiter that does not may never call into its own thread.
    fn dispatches_while_waiting(&self) -> bool {
        false
    }
}

/// Wait indicator for threads without an event loop
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockingWait;

impl WaitIndicator for BlockingWait {
    fn completion(&self) -> Completion {
        Completion::new()
    }

    fn wait(&self, completion: &Completion) {
        completion.wait_blocking();
    }
}

/// Result slot filled by the posted task; dropping it raises the completion
/// whether or not a value was stored.
struct ReplySlot<R> {
    value: Arc<Mutex<Option<R>>>,
    completion: Completion,
}

impl<R> ReplySlot<R> {
    fn fill(self, value: R) {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
    }
}

impl<R> Drop for ReplySlot<R> {
    fn drop(&mut self) {
        self.completion.raise();
    }
}

/// Clears the busy flag even if the call unwinds
struct BusyGuard<'a>(&'a Cell<bool>);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Synchronous bridge into an owner thread.
///
/// Lives on the caller's stack and borrows the caller's wait indicator. At
/// most one call may be outstanding per instance.
pub struct Downlink<'a, W: WaitIndicator + ?Sized> {
    indicator: &'a W,
    busy: Cell<bool>,
}

impl<'a, W: WaitIndicator + ?Sized> Downlink<'a, W> {
    pub fn new(indicator: &'a W) -> Self {
        Self {
            indicator,
            busy: Cell::new(false),
        }
    }

    /// Run `task` on the owner of `sender` and return its result.
    ///
    /// # Panics
    ///
    /// Panics if another call on this `Downlink` is still outstanding (for
    /// example when re-entered from the caller's nested loop), if the target
    /// runs on this thread and the indicator would block it, or if the target
    /// is busy running the very task that makes this call.
    pub fn call<T, R>(&self, sender: &RequestSender<T>, task: impl FnOnce(&mut T) -> R + Send + 'static) -> Result<R>
    where
        T: 'static,
        R: Send + 'static,
    {
        self.check_target(sender);
        self.run(|slot| {
            sender.post_new_request(move |object| slot.fill(task(object)));
        })
    }

    /// Run `task` on a slave object and return its result.
    ///
    /// Same contract as [`call`](Self::call). Returns `LinkError::Unavailable`
    /// if the slave or its master is gone.
    pub fn call_slave<T, S, R>(
        &self,
        sender: &SlaveSender<T, S>,
        task: impl FnOnce(&mut T, &mut S) -> R + Send + 'static,
    ) -> Result<R>
    where
        T: 'static,
        S: SlaveObject<T>,
        R: Send + 'static,
    {
        let handle = sender.handle();
        self.check_target(handle.master());
        self.run(|slot| {
            handle.post_new_request(move |master, slave| slot.fill(task(master, slave)));
        })
    }

    fn check_target<T: 'static>(&self, target: &RequestSender<T>) {
        assert!(
            self.indicator.dispatches_while_waiting() || !target.dispatcher().is_current_thread(),
            "blocking call into the calling thread would never complete"
        );
        assert!(
            !target.is_executing_here(),
            "blocking call into {} from inside one of its own tasks would never complete",
            std::any::type_name::<T>()
        );
    }

    fn run<R>(&self, post: impl FnOnce(ReplySlot<R>)) -> Result<R> {
        assert!(
            !self.busy.replace(true),
            "Downlink::call re-entered while a call is outstanding"
        );
        let _busy = BusyGuard(&self.busy);

        let value = Arc::new(Mutex::new(None));
        let completion = self.indicator.completion();
        post(ReplySlot {
            value: value.clone(),
            completion: completion.clone(),
        });
        self.indicator.wait(&completion);

        let result = value.lock().unwrap_or_else(PoisonError::into_inner).take();
        match result {
            Some(value) => Ok(value),
            None => {
                debug!("Downlink call target unavailable");
                Err(LinkError::Unavailable)
            }
        }
    }
}
