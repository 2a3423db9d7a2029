//! Dispatcher abstraction
//!
//! A dispatcher is anything that can run a callback "soon" on one particular
//! thread. Receivers use it to schedule draining of their queues; waiters use
//! it to wake a thread that is blocked in a nested loop.

use game_link_core::Result;

/// A callback scheduled on a dispatcher's thread
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// The owner thread's ability to run posted callbacks
pub trait Dispatcher: Send + Sync + 'static {
    /// Schedule `job` to run on the dispatcher's thread.
    ///
    /// Jobs run in posting order. Fails with `LinkError::Disconnected` once
    /// the thread no longer accepts work; the job is dropped in that case.
    fn post_job(&self, job: Job) -> Result<()>;

    /// Whether the calling thread is the one this dispatcher runs jobs on
    fn is_current_thread(&self) -> bool {
        false
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use game_link_core::LinkError;
    use std::sync::Mutex;

    /// Dispatcher that collects jobs so a test decides where they run
    #[derive(Default)]
    pub(crate) struct ManualDispatcher {
        jobs: Mutex<Vec<Job>>,
        closed: Mutex<bool>,
    }

    impl ManualDispatcher {
        pub(crate) fn take(&self) -> Vec<Job> {
            std::mem::take(&mut *self.jobs.lock().unwrap())
        }

        pub(crate) fn run_all(&self) -> usize {
            let mut count = 0;
            loop {
                let jobs = self.take();
                if jobs.is_empty() {
                    return count;
                }
                for job in jobs {
                    job();
                    count += 1;
                }
            }
        }

        pub(crate) fn close(&self) {
            *self.closed.lock().unwrap() = true;
        }
    }

    impl Dispatcher for ManualDispatcher {
        fn post_job(&self, job: Job) -> Result<()> {
            if *self.closed.lock().unwrap() {
                return Err(LinkError::Disconnected("manual dispatcher".into()));
            }
            self.jobs.lock().unwrap().push(job);
            Ok(())
        }
    }
}
