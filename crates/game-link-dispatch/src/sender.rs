//! Caller side of a request channel

use crate::dispatcher::Dispatcher;
use crate::receiver::{Owned, Shared};
use crate::task::{BoxedTask, Task};
use game_link_core::{LinkError, Result};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Capability to post tasks to a [`RequestReceiver`](crate::RequestReceiver).
///
/// Cheap to clone and usable from any thread. A sender never grants access
/// to the object itself; it can only enqueue work for the owner thread.
/// Tasks posted through one sender run in posting order.
pub struct RequestSender<T: 'static> {
    shared: Arc<Shared<T>>,
}

impl<T: 'static> Clone for RequestSender<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: 'static> std::fmt::Debug for RequestSender<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSender")
            .field("target", &std::any::type_name::<T>())
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl<T: 'static> RequestSender<T> {
    pub(crate) fn from_shared(shared: Arc<Shared<T>>) -> Self {
        Self { shared }
    }

    /// Post a task for fire-and-forget execution on the owner thread.
    ///
    /// Returns immediately. If the owner has been torn down the task is
    /// dropped without running.
    pub fn post_new_request(&self, task: impl FnOnce(&mut T) + Send + 'static) {
        self.post_boxed(Box::new(task));
    }

    /// Post an already boxed task
    pub fn post_boxed(&self, task: BoxedTask<T>) {
        self.post_owned(move |owned| task.run(&mut owned.object));
    }

    /// Post a call of `method` with `args`; the return value is dropped.
    ///
    /// ```ignore
    /// sender.post_request(Session::add_planet, Planet::new(4, "Rigel"));
    /// ```
    pub fn post_request<A, R>(&self, method: fn(&mut T, A) -> R, args: A)
    where
        A: Send + 'static,
        R: 'static,
    {
        self.post_new_request(move |object| {
            method(object, args);
        });
    }

    /// Run `task` on the owner thread and await its result.
    ///
    /// Suspends the calling future instead of blocking the thread. Resolves
    /// to `LinkError::Unavailable` if the task is dropped unexecuted.
    pub async fn call_async<R>(&self, task: impl FnOnce(&mut T) -> R + Send + 'static) -> Result<R>
    where
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.post_new_request(move |object| {
            // The caller may have stopped waiting
            let _ = reply_tx.send(task(object));
        });
        reply_rx.await.map_err(|_| LinkError::Unavailable)
    }

    /// Whether the receiver still accepts tasks
    pub fn is_alive(&self) -> bool {
        self.shared.is_open()
    }

    pub(crate) fn post_owned(&self, task: impl FnOnce(&mut Owned<T>) + Send + 'static) {
        self.shared.post(Box::new(task));
    }

    pub(crate) fn dispatcher(&self) -> &Arc<dyn Dispatcher> {
        self.shared.dispatcher()
    }

    pub(crate) fn is_executing_here(&self) -> bool {
        self.shared.is_executing_here()
    }
}
