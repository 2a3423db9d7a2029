//! Owner side of a request channel

use crate::dispatcher::Dispatcher;
use crate::home;
use crate::sender::RequestSender;
use crate::slave::SlaveTable;
use crate::task::{BoxedTask, TaskQueue};
use game_link_core::LinkConfig;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Everything a receiver owns on its home thread: the object and the slaves
/// attached to it.
pub(crate) struct Owned<T: 'static> {
    pub(crate) object: T,
    pub(crate) slaves: SlaveTable<T>,
}

/// Part of a receiver reachable from any thread. Holds no reference to the
/// object itself.
pub(crate) struct Shared<T: 'static> {
    id: u64,
    queue: Mutex<TaskQueue<Owned<T>>>,
    dispatcher: Arc<dyn Dispatcher>,
    config: LinkConfig,
    high_water_crossings: AtomicUsize,
}

impl<T: 'static> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, TaskQueue<Owned<T>>> {
        // Tasks never run under this lock, so a poisoned queue is still consistent
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a task and schedule a drain on the owner thread.
    ///
    /// If the owner is gone the task is dropped right here, unexecuted.
    pub(crate) fn post(self: &Arc<Self>, task: BoxedTask<Owned<T>>) {
        // Dropping a rejected task may post again, so the lock is released first
        let pushed = self.lock().push(task);
        let depth = match pushed {
            Ok(depth) => depth,
            Err(task) => {
                self.discard(1);
                drop(task);
                return;
            }
        };

        if self.config.is_high_water(depth) {
            self.high_water_crossings.fetch_add(1, Ordering::Relaxed);
            warn!(
                "Request queue for {} reached {} pending tasks",
                std::any::type_name::<T>(),
                depth
            );
        }

        let shared = Arc::clone(self);
        if let Err(e) = self.dispatcher.post_job(Box::new(move || shared.drain())) {
            debug!("Cannot schedule {}: {}", std::any::type_name::<T>(), e);
            let orphans = self.lock().close();
            self.discard(orphans.len());
        }
    }

    /// Run queued tasks until the queue is empty. Runs on the owner thread.
    fn drain(&self) {
        let Some(home) = home::lookup::<RefCell<Owned<T>>>(self.id) else {
            if self.lock().is_closed() {
                // Owner torn down between post and drain; nothing left to run
                return;
            }
            panic!(
                "request for {} dispatched on a thread other than its owner",
                std::any::type_name::<T>()
            );
        };

        loop {
            // A task for this owner is already executing further up the stack
            // (nested event loop); the outer drain picks up the rest.
            let Ok(mut owned) = home.try_borrow_mut() else {
                return;
            };
            let Some(task) = self.lock().pop() else {
                return;
            };
            task.run(&mut owned);
        }
    }

    fn discard(&self, count: usize) {
        if count > 0 && self.config.log_discarded_tasks {
            warn!(
                "Discarded {} task(s) for {}: owner is gone",
                count,
                std::any::type_name::<T>()
            );
        }
    }

    fn close(&self) -> VecDeque<BoxedTask<Owned<T>>> {
        self.lock().close()
    }

    pub(crate) fn is_open(&self) -> bool {
        !self.lock().is_closed()
    }

    pub(crate) fn dispatcher(&self) -> &Arc<dyn Dispatcher> {
        &self.dispatcher
    }

    /// Whether the object is bound to this thread and currently borrowed by a
    /// running task (or `with_object`). A task posted now could not start
    /// until that borrow ends.
    pub(crate) fn is_executing_here(&self) -> bool {
        home::lookup::<RefCell<Owned<T>>>(self.id).is_some_and(|home| home.try_borrow_mut().is_err())
    }
}

/// Owns an object of type `T` on its home thread and executes the tasks
/// posted to it.
///
/// The receiver is `!Send`: it is created, used and dropped on the thread
/// whose dispatcher it is bound to. Dropping it tears down every slave object
/// attached to it (running their `done` hook), discards pending tasks and
/// destroys `T`.
pub struct RequestReceiver<T: 'static> {
    shared: Arc<Shared<T>>,
    home: Rc<RefCell<Owned<T>>>,
}

impl<T: 'static> RequestReceiver<T> {
    /// Bind `instance` to `dispatcher` with default queue settings.
    ///
    /// `dispatcher` must run its jobs on the current thread.
    pub fn new(dispatcher: Arc<dyn Dispatcher>, instance: T) -> Self {
        Self::with_config(dispatcher, instance, &LinkConfig::default())
    }

    /// Bind `instance` to `dispatcher` using queue settings from `config`
    pub fn with_config(dispatcher: Arc<dyn Dispatcher>, instance: T, config: &LinkConfig) -> Self {
        let id = home::next_id();
        let home = Rc::new(RefCell::new(Owned {
            object: instance,
            slaves: SlaveTable::new(),
        }));
        home::register(id, home.clone());
        debug!("Bound receiver {} for {}", id, std::any::type_name::<T>());

        Self {
            shared: Arc::new(Shared {
                id,
                queue: Mutex::new(TaskQueue::new()),
                dispatcher,
                config: config.clone(),
                high_water_crossings: AtomicUsize::new(0),
            }),
            home,
        }
    }

    /// Create a sender for this receiver
    pub fn sender(&self) -> RequestSender<T> {
        RequestSender::from_shared(self.shared.clone())
    }

    /// Access the object directly from its home thread.
    ///
    /// # Panics
    ///
    /// Panics if called from inside a task running on this same receiver.
    pub fn with_object<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let Ok(mut owned) = self.home.try_borrow_mut() else {
            panic!(
                "with_object on {} called while one of its tasks is running",
                std::any::type_name::<T>()
            );
        };
        f(&mut owned.object)
    }

    /// Number of tasks waiting to run
    pub fn pending(&self) -> usize {
        self.shared.lock().len()
    }

    /// How many times the queue depth has reached the configured high-water mark
    pub fn high_water_crossings(&self) -> usize {
        self.shared.high_water_crossings.load(Ordering::Relaxed)
    }

    /// Number of slave objects currently attached to this receiver
    pub fn slave_count(&self) -> usize {
        self.home.borrow().slaves.len()
    }
}

impl<T: 'static> Drop for RequestReceiver<T> {
    fn drop(&mut self) {
        home::unregister(self.shared.id);
        let pending = self.shared.close();

        match self.home.try_borrow_mut() {
            Ok(mut owned) => {
                let Owned { object, slaves } = &mut *owned;
                slaves.teardown_all(object);
            }
            Err(_) => warn!(
                "Receiver for {} dropped while one of its tasks is running",
                std::any::type_name::<T>()
            ),
        }

        self.shared.discard(pending.len());
        drop(pending);
        debug!("Receiver {} for {} torn down", self.shared.id, std::any::type_name::<T>());
    }
}
