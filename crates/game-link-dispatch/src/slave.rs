//! Slave objects ("trampolines")
//!
//! A slave object lives on a master's owner thread, next to the master
//! object, and is reachable only through a [`SlaveSender`]. It is created by a
//! factory task posted to the master, and torn down by a final task posted
//! when the last `SlaveSender` clone is dropped. If the master receiver goes
//! away first, it tears down all of its slaves itself. Either way `done` runs
//! exactly once, on the owner thread, before the slave is dropped.
//!
//! Slave tasks are queued in the master's FIFO, so they are ordered with
//! respect to every other task for the master.
//!
//! Panics from the factory, from `init`/`done`, and from slave tasks are
//! caught and logged here; they never unwind into the dispatch loop.

use crate::home;
use crate::receiver::Owned;
use crate::sender::RequestSender;
use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::{debug, error};

/// A helper object living on the owner thread of a master object `T`.
pub trait SlaveObject<T: 'static>: Sized + 'static {
    /// Called once, right after construction. Typical use: read initial
    /// state from `master` and subscribe to its change signals, routing them
    /// back into this object through `handle`.
    fn init(&mut self, master: &mut T, handle: SlaveHandle<T, Self>) {
        let _ = (master, handle);
    }

    /// Called exactly once before the object is dropped. Release every
    /// subscription and reference into `master` here.
    fn done(&mut self, master: &mut T) {
        let _ = master;
    }
}

/// Type-erased slave as stored by the master receiver
pub(crate) trait SlaveEntry<T>: 'static {
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn done(&mut self, master: &mut T);
}

impl<T: 'static, S: SlaveObject<T>> SlaveEntry<T> for S {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn done(&mut self, master: &mut T) {
        SlaveObject::done(self, master)
    }
}

/// Slaves attached to one master object
pub(crate) struct SlaveTable<T: 'static> {
    entries: HashMap<u64, Box<dyn SlaveEntry<T>>>,
}

impl<T: 'static> SlaveTable<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    fn insert(&mut self, id: u64, entry: Box<dyn SlaveEntry<T>>) {
        self.entries.insert(id, entry);
    }

    fn get_mut<S: SlaveObject<T>>(&mut self, id: u64) -> Option<&mut S> {
        self.entries.get_mut(&id)?.as_any_mut().downcast_mut::<S>()
    }

    fn remove(&mut self, id: u64) -> Option<Box<dyn SlaveEntry<T>>> {
        self.entries.remove(&id)
    }

    /// Run `done` for every slave and drop them. Used by the master's teardown.
    pub(crate) fn teardown_all(&mut self, master: &mut T) {
        let mut entries: Vec<_> = self.entries.drain().collect();
        entries.sort_by_key(|(id, _)| *id);
        for (id, mut entry) in entries {
            guarded("done", || entry.done(master));
            debug!("Slave {} torn down with its master", id);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Run a hook, logging instead of unwinding if it panics. Returns `None` on panic.
fn guarded<R>(what: &str, f: impl FnOnce() -> R) -> Option<R> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".into());
            error!("Slave {} panicked: {}", what, message);
            None
        }
    }
}

/// Non-owning address of a slave object.
///
/// Posting through a handle never keeps the slave alive; once the slave is
/// torn down, tasks posted through its handles are dropped unexecuted. Use it
/// inside the slave itself (e.g. in signal handlers installed by `init`).
pub struct SlaveHandle<T: 'static, S> {
    master: RequestSender<T>,
    id: u64,
    _slave: PhantomData<fn() -> S>,
}

impl<T: 'static, S> Clone for SlaveHandle<T, S> {
    fn clone(&self) -> Self {
        Self {
            master: self.master.clone(),
            id: self.id,
            _slave: PhantomData,
        }
    }
}

impl<T: 'static, S: SlaveObject<T>> SlaveHandle<T, S> {
    /// Post a task that runs with the master object and this slave
    pub fn post_new_request(&self, task: impl FnOnce(&mut T, &mut S) + Send + 'static) {
        let id = self.id;
        self.master.post_owned(move |owned: &mut Owned<T>| {
            let Owned { object, slaves } = owned;
            match slaves.get_mut::<S>(id) {
                Some(slave) => {
                    guarded("request", || task(object, slave));
                }
                None => debug!("Slave {} is gone, request dropped", id),
            }
        });
    }

    /// Sender of the master this slave is attached to
    pub fn master(&self) -> &RequestSender<T> {
        &self.master
    }
}

/// Tears the slave down when the last `SlaveSender` clone goes away
struct SlaveLink<T: 'static, S: SlaveObject<T>> {
    handle: SlaveHandle<T, S>,
}

impl<T: 'static, S: SlaveObject<T>> Drop for SlaveLink<T, S> {
    fn drop(&mut self) {
        let id = self.handle.id;
        self.handle.master.post_owned(move |owned: &mut Owned<T>| {
            let Owned { object, slaves } = owned;
            if let Some(mut entry) = slaves.remove(id) {
                guarded("done", || entry.done(object));
                debug!("Slave {} torn down", id);
            }
        });
    }
}

/// Owning capability for a slave object `S` attached to master `T`.
///
/// Cloneable and `Send`; the slave lives until the last clone is dropped.
pub struct SlaveSender<T: 'static, S: SlaveObject<T>> {
    link: Arc<SlaveLink<T, S>>,
}

impl<T: 'static, S: SlaveObject<T>> Clone for SlaveSender<T, S> {
    fn clone(&self) -> Self {
        Self {
            link: self.link.clone(),
        }
    }
}

impl<T: 'static, S: SlaveObject<T>> SlaveSender<T, S> {
    /// Create a slave by posting `factory` to `master`.
    ///
    /// The factory runs on the owner thread; `init` follows immediately in
    /// the same task. Tasks posted through the new sender queue behind it.
    pub fn new(master: &RequestSender<T>, factory: impl FnOnce(&mut T) -> S + Send + 'static) -> Self {
        let handle = SlaveHandle {
            master: master.clone(),
            id: home::next_id(),
            _slave: PhantomData,
        };

        let init_handle = handle.clone();
        master.post_owned(move |owned: &mut Owned<T>| {
            let id = init_handle.id;
            let Owned { object, slaves } = owned;
            let Some(mut slave) = guarded("factory", || factory(object)) else {
                return;
            };
            guarded("init", || slave.init(object, init_handle));
            slaves.insert(id, Box::new(slave));
            debug!("Slave {} created ({})", id, std::any::type_name::<S>());
        });

        Self {
            link: Arc::new(SlaveLink { handle }),
        }
    }

    /// Post a task that runs with the master object and the slave
    pub fn post_new_request(&self, task: impl FnOnce(&mut T, &mut S) + Send + 'static) {
        self.link.handle.post_new_request(task);
    }

    /// Non-owning handle to the same slave
    pub fn handle(&self) -> SlaveHandle<T, S> {
        self.link.handle.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::testing::ManualDispatcher;
    use crate::receiver::RequestReceiver;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Master {
        value: i32,
        inits: u32,
        dones: u32,
        events: Vec<String>,
    }

    struct Probe {
        name: &'static str,
        seen: i32,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl SlaveObject<Master> for Probe {
        fn init(&mut self, master: &mut Master, _handle: SlaveHandle<Master, Self>) {
            master.inits += 1;
            self.seen = master.value;
            self.log.lock().unwrap().push(format!("{} init", self.name));
        }

        fn done(&mut self, master: &mut Master) {
            master.dones += 1;
            self.log.lock().unwrap().push(format!("{} done", self.name));
        }
    }

    impl Drop for Probe {
        fn drop(&mut self) {
            self.log.lock().unwrap().push(format!("{} drop", self.name));
        }
    }

    fn probe(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> impl FnOnce(&mut Master) -> Probe + Send + 'static {
        let log = log.clone();
        move |_: &mut Master| Probe { name, seen: 0, log }
    }

    #[test]
    fn test_lifecycle_init_request_done() {
        let dispatcher = Arc::new(ManualDispatcher::default());
        let receiver = RequestReceiver::new(dispatcher.clone(), Master {
            value: 7,
            ..Default::default()
        });
        let log = Arc::new(Mutex::new(Vec::new()));

        let slave = SlaveSender::new(&receiver.sender(), probe("a", &log));
        slave.post_new_request(|master, probe| {
            master.events.push(format!("seen {}", probe.seen));
        });
        let clone = slave.clone();
        drop(slave);
        dispatcher.run_all();
        assert_eq!(receiver.with_object(|m| m.dones), 0);

        drop(clone);
        dispatcher.run_all();

        receiver.with_object(|m| {
            assert_eq!(m.inits, 1);
            assert_eq!(m.dones, 1);
            assert_eq!(m.events, vec!["seen 7".to_string()]);
        });
        assert_eq!(*log.lock().unwrap(), vec!["a init", "a done", "a drop"]);
    }

    #[test]
    fn test_master_teardown_runs_done_once() {
        let dispatcher = Arc::new(ManualDispatcher::default());
        let receiver = RequestReceiver::new(dispatcher.clone(), Master::default());
        let log = Arc::new(Mutex::new(Vec::new()));

        let a = SlaveSender::new(&receiver.sender(), probe("a", &log));
        let b = SlaveSender::new(&receiver.sender(), probe("b", &log));
        dispatcher.run_all();
        assert_eq!(receiver.with_object(|m| m.inits), 2);
        assert_eq!(receiver.slave_count(), 2);

        drop(receiver);
        // Late teardown requests find the master gone and are ignored
        drop(a);
        drop(b);
        dispatcher.run_all();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["a init", "b init", "a done", "a drop", "b done", "b drop"]
        );
    }

    #[test]
    fn test_handle_does_not_keep_slave_alive() {
        let dispatcher = Arc::new(ManualDispatcher::default());
        let receiver = RequestReceiver::new(dispatcher.clone(), Master::default());
        let log = Arc::new(Mutex::new(Vec::new()));

        let slave = SlaveSender::new(&receiver.sender(), probe("a", &log));
        let handle = slave.handle();
        drop(slave);
        dispatcher.run_all();

        handle.post_new_request(|master, _| master.value = 99);
        dispatcher.run_all();
        assert_eq!(receiver.with_object(|m| m.value), 0);
        assert_eq!(receiver.with_object(|m| m.dones), 1);
    }

    struct Fragile;

    impl SlaveObject<Master> for Fragile {
        fn init(&mut self, _master: &mut Master, _handle: SlaveHandle<Master, Self>) {
            panic!("init failed");
        }

        fn done(&mut self, master: &mut Master) {
            master.dones += 1;
        }
    }

    #[test]
    fn test_panics_are_contained() {
        let dispatcher = Arc::new(ManualDispatcher::default());
        let receiver = RequestReceiver::new(dispatcher.clone(), Master::default());

        let slave = SlaveSender::new(&receiver.sender(), |_| Fragile);
        slave.post_new_request(|_, _| panic!("request failed"));
        slave.post_new_request(|master, _| master.value = 1);
        receiver.sender().post_new_request(|m| m.value += 1);
        dispatcher.run_all();

        // The dispatch loop survived both panics and kept going
        assert_eq!(receiver.with_object(|m| m.value), 2);

        drop(slave);
        dispatcher.run_all();
        assert_eq!(receiver.with_object(|m| m.dones), 1);
    }

    #[test]
    fn test_failed_factory_creates_nothing() {
        let dispatcher = Arc::new(ManualDispatcher::default());
        let receiver = RequestReceiver::new(dispatcher.clone(), Master::default());

        let slave: SlaveSender<Master, Fragile> = SlaveSender::new(&receiver.sender(), |_| panic!("no slave"));
        slave.post_new_request(|master, _| master.value = 5);
        drop(slave);
        dispatcher.run_all();

        receiver.with_object(|m| {
            assert_eq!(m.value, 0);
            assert_eq!(m.dones, 0);
        });
    }
}
