//! Per-thread table of objects owned by receivers bound on that thread.
//!
//! Drain jobs cross threads as plain `Send` closures carrying only a receiver
//! id; the object itself never leaves its home thread and is looked up here
//! when the job runs. A lookup from any other thread finds nothing.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static HOMES: RefCell<HashMap<u64, Rc<dyn Any>>> = RefCell::new(HashMap::new());
}

/// Allocate a process-unique id for a receiver or slave
pub(crate) fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

pub(crate) fn register(id: u64, object: Rc<dyn Any>) {
    HOMES.with(|homes| {
        homes.borrow_mut().insert(id, object);
    });
}

/// Remove an entry. Tolerates thread-local teardown at thread exit.
pub(crate) fn unregister(id: u64) -> Option<Rc<dyn Any>> {
    HOMES
        .try_with(|homes| homes.borrow_mut().remove(&id))
        .ok()
        .flatten()
}

/// Find the object registered under `id` on the current thread
pub(crate) fn lookup<O: 'static>(id: u64) -> Option<Rc<O>> {
    let found = HOMES
        .try_with(|homes| homes.borrow().get(&id).cloned())
        .ok()
        .flatten()?;
    found.downcast::<O>().ok()
}
