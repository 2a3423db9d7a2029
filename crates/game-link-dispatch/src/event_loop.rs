//! Caller-side event loop
//!
//! A minimal single-thread loop a UI thread (or a test) runs to service its
//! receivers. It can be entered recursively: a [`Downlink`](crate::Downlink)
//! call waits by running a nested iteration until its completion is raised.

use crate::dispatcher::{Dispatcher, Job};
use crate::wait::{Completion, WaitIndicator};
use game_link_core::{LinkError, Result};
use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread::{self, ThreadId};
use tracing::debug;

struct LoopDispatcher {
    tx: mpsc::Sender<Job>,
    thread: ThreadId,
}

impl Dispatcher for LoopDispatcher {
    fn post_job(&self, job: Job) -> Result<()> {
        self.tx
            .send(job)
            .map_err(|_| LinkError::Disconnected("event loop closed".into()))
    }

    fn is_current_thread(&self) -> bool {
        thread::current().id() == self.thread
    }
}

/// Decrements the nesting depth when a loop iteration ends, even on unwind
struct DepthGuard<'a>(&'a Cell<usize>);

impl<'a> DepthGuard<'a> {
    fn enter(depth: &'a Cell<usize>) -> Self {
        depth.set(depth.get() + 1);
        Self(depth)
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get() - 1);
    }
}

/// Job loop bound to the thread that created it.
///
/// Not `Send`: jobs posted through [`dispatcher`](Self::dispatcher) always run
/// on the creating thread.
pub struct EventLoop {
    dispatcher: Arc<LoopDispatcher>,
    rx: mpsc::Receiver<Job>,
    depth: Cell<usize>,
    _not_send: PhantomData<*const ()>,
}

impl EventLoop {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            dispatcher: Arc::new(LoopDispatcher {
                tx,
                thread: thread::current().id(),
            }),
            rx,
            depth: Cell::new(0),
            _not_send: PhantomData,
        }
    }

    /// Dispatcher to bind this thread's receivers to
    pub fn dispatcher(&self) -> Arc<dyn Dispatcher> {
        self.dispatcher.clone()
    }

    /// Run every job already queued, plus any they post, without blocking.
    /// Returns the number of jobs run.
    pub fn run_pending(&self) -> usize {
        let _depth = DepthGuard::enter(&self.depth);
        let mut count = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            count += 1;
        }
        count
    }

    /// Run jobs, blocking for new ones, until `done` returns true.
    ///
    /// `done` is checked before each wait, so whoever makes it true must
    /// also post a job (a [`Completion`] created by this loop does).
    pub fn run_until(&self, mut done: impl FnMut() -> bool) {
        let _depth = DepthGuard::enter(&self.depth);
        while !done() {
            // The loop holds its own sender, so the channel cannot disconnect
            let Ok(job) = self.rx.recv() else {
                return;
            };
            job();
        }
    }

    /// How many `run_*` frames are active on this loop
    pub fn nesting_depth(&self) -> usize {
        self.depth.get()
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitIndicator for EventLoop {
    fn completion(&self) -> Completion {
        Completion::with_wake(self.dispatcher())
    }

    fn wait(&self, completion: &Completion) {
        debug!("Entering nested loop at depth {}", self.nesting_depth());
        self.run_until(|| completion.is_raised());
    }

    fn dispatches_while_waiting(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receiver::RequestReceiver;
    use std::rc::Rc;
    use std::time::Duration;

    #[test]
    fn test_run_pending_runs_in_order() {
        let ui = EventLoop::new();
        let dispatcher = ui.dispatcher();
        let (tx, rx) = mpsc::channel();
        for i in 0..5 {
            let tx = tx.clone();
            dispatcher.post_job(Box::new(move || tx.send(i).unwrap())).unwrap();
        }
        assert_eq!(ui.run_pending(), 5);
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
        assert_eq!(ui.run_pending(), 0);
    }

    #[test]
    fn test_dispatcher_knows_its_thread() {
        let ui = EventLoop::new();
        let dispatcher = ui.dispatcher();
        assert!(dispatcher.is_current_thread());

        let remote = dispatcher.clone();
        let elsewhere = thread::spawn(move || remote.is_current_thread()).join().unwrap();
        assert!(!elsewhere);
    }

    #[test]
    fn test_post_from_other_thread_wakes_loop() {
        let ui = EventLoop::new();
        let dispatcher = ui.dispatcher();
        let flag = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let remote_flag = flag.clone();
        let poster = thread::spawn(move || {
            thread::sleep(Duration::from_millis(5));
            dispatcher
                .post_job(Box::new(move || {
                    remote_flag.store(true, std::sync::atomic::Ordering::SeqCst);
                }))
                .unwrap();
        });
        ui.run_until(|| flag.load(std::sync::atomic::Ordering::SeqCst));
        poster.join().unwrap();
    }

    #[test]
    fn test_nesting_depth() {
        let ui = Rc::new(EventLoop::new());
        assert_eq!(ui.nesting_depth(), 0);

        let receiver = RequestReceiver::new(ui.dispatcher(), (ui.clone(), Vec::new()));
        let sender = receiver.sender();
        sender.post_new_request(|(ui, seen): &mut (Rc<EventLoop>, Vec<usize>)| {
            seen.push(ui.nesting_depth());
            ui.run_pending();
            seen.push(ui.nesting_depth());
        });

        ui.run_pending();
        assert_eq!(receiver.with_object(|(_, seen)| seen.clone()), vec![1, 1]);
        assert_eq!(ui.nesting_depth(), 0);
    }

    #[test]
    fn test_post_after_drop_fails() {
        let ui = EventLoop::new();
        let dispatcher = ui.dispatcher();
        drop(ui);
        let result = dispatcher.post_job(Box::new(|| {}));
        assert!(matches!(result, Err(LinkError::Disconnected(_))));
    }
}
