//! Dedicated owner thread
//!
//! [`WorkerThread::spawn`] starts a named thread, constructs the owned object
//! on it and binds a receiver there. The thread then runs posted jobs until
//! shut down, at which point the receiver is torn down on that same thread:
//! slaves get their `done` call, queued tasks are discarded, the object is
//! dropped.

use crate::dispatcher::{Dispatcher, Job};
use crate::receiver::RequestReceiver;
use crate::sender::RequestSender;
use game_link_core::{LinkConfig, LinkError, Result};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

enum Message {
    Run(Job),
    Stop,
}

struct WorkerDispatcher {
    name: String,
    tx: mpsc::UnboundedSender<Message>,
    thread: OnceLock<ThreadId>,
}

impl Dispatcher for WorkerDispatcher {
    fn post_job(&self, job: Job) -> Result<()> {
        self.tx
            .send(Message::Run(job))
            .map_err(|_| LinkError::Disconnected(self.name.clone()))
    }

    fn is_current_thread(&self) -> bool {
        self.thread.get() == Some(&thread::current().id())
    }
}

/// Handle to a running owner thread.
///
/// Dropping the handle shuts the thread down and joins it.
pub struct WorkerThread {
    dispatcher: Arc<WorkerDispatcher>,
    handle: Option<JoinHandle<()>>,
}

impl WorkerThread {
    /// Start a worker named after `config.worker_name` owning the object
    /// built by `factory`, and return a sender to it.
    pub fn spawn<T, F>(config: &LinkConfig, factory: F) -> Result<(Self, RequestSender<T>)>
    where
        T: 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = Arc::new(WorkerDispatcher {
            name: config.worker_name.clone(),
            tx,
            thread: OnceLock::new(),
        });

        // Plain std channel: the caller may itself be inside a tokio runtime
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();
        let worker_dispatcher = dispatcher.clone();
        let worker_config = config.clone();

        let handle = thread::Builder::new()
            .name(config.worker_name.clone())
            .spawn(move || {
                let _ = worker_dispatcher.thread.set(thread::current().id());
                let receiver = RequestReceiver::with_config(worker_dispatcher.clone(), factory(), &worker_config);
                if ready_tx.send(receiver.sender()).is_err() {
                    return;
                }
                drop(worker_dispatcher);

                run_jobs(&mut rx);

                drop(receiver);
                rx.close();
                debug!("Worker loop finished");
            })
            .map_err(|e| LinkError::Thread(format!("Failed to spawn {}: {}", config.worker_name, e)))?;

        let sender = match ready_rx.recv() {
            Ok(sender) => sender,
            Err(_) => {
                // The factory panicked before the receiver was bound
                let _ = handle.join();
                return Err(LinkError::Thread(format!(
                    "Worker {} failed to start",
                    config.worker_name
                )));
            }
        };

        info!("Started worker thread {}", config.worker_name);
        Ok((
            Self {
                dispatcher,
                handle: Some(handle),
            },
            sender,
        ))
    }

    /// Dispatcher running jobs on the worker thread
    pub fn dispatcher(&self) -> Arc<dyn Dispatcher> {
        self.dispatcher.clone()
    }

    pub fn name(&self) -> &str {
        &self.dispatcher.name
    }

    /// Stop the loop, tear down the owned object and join the thread.
    ///
    /// Jobs queued before the call still run; tasks posted afterwards are
    /// discarded.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        // Already stopped if the thread exited on its own
        let _ = self.dispatcher.tx.send(Message::Stop);

        if self.dispatcher.is_current_thread() {
            debug!("Worker {} stopped from its own thread, not joining", self.name());
            return Ok(());
        }
        handle
            .join()
            .map_err(|_| LinkError::Thread(format!("Worker {} panicked", self.name())))?;
        info!("Worker thread {} stopped", self.name());
        Ok(())
    }
}

impl Drop for WorkerThread {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("{}", e);
        }
    }
}

fn run_jobs(rx: &mut mpsc::UnboundedReceiver<Message>) {
    while let Some(message) = rx.blocking_recv() {
        match message {
            Message::Run(job) => {
                if catch_unwind(AssertUnwindSafe(job)).is_err() {
                    error!("Task panicked on worker thread");
                }
            }
            Message::Stop => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_loop::EventLoop;
    use crate::wait::{BlockingWait, Downlink};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        value: u64,
    }

    #[test]
    fn test_fifo_per_sender_across_threads() {
        let (worker, sender) = WorkerThread::spawn(&LinkConfig::default(), Vec::<(usize, usize)>::new).unwrap();

        let producers: Vec<_> = (0..4)
            .map(|producer| {
                let sender = sender.clone();
                thread::spawn(move || {
                    for seq in 0..500 {
                        sender.post_new_request(move |log| log.push((producer, seq)));
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        let log = Downlink::new(&BlockingWait).call(&sender, |log| log.clone()).unwrap();
        assert_eq!(log.len(), 2000);
        for producer in 0..4 {
            let seqs: Vec<_> = log.iter().filter(|(p, _)| *p == producer).map(|(_, s)| *s).collect();
            assert_eq!(seqs, (0..500).collect::<Vec<_>>());
        }
        worker.shutdown().unwrap();
    }

    struct Exclusive {
        running: Arc<AtomicBool>,
        overlaps: Arc<AtomicUsize>,
    }

    #[test]
    fn test_tasks_never_overlap() {
        let running = Arc::new(AtomicBool::new(false));
        let overlaps = Arc::new(AtomicUsize::new(0));
        let (r, o) = (running.clone(), overlaps.clone());
        let (worker, sender) = WorkerThread::spawn(&LinkConfig::default(), move || Exclusive {
            running: r,
            overlaps: o,
        })
        .unwrap();

        let producers: Vec<_> = (0..4)
            .map(|_| {
                let sender = sender.clone();
                thread::spawn(move || {
                    for _ in 0..200 {
                        sender.post_new_request(|e: &mut Exclusive| {
                            if e.running.swap(true, Ordering::SeqCst) {
                                e.overlaps.fetch_add(1, Ordering::SeqCst);
                            }
                            thread::yield_now();
                            e.running.store(false, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        worker.shutdown().unwrap();
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_post_after_shutdown_has_no_effect() {
        let runs = Arc::new(AtomicUsize::new(0));
        let (worker, sender) = WorkerThread::spawn(&LinkConfig::default(), Counter::default).unwrap();
        worker.shutdown().unwrap();

        let counter = runs.clone();
        sender.post_new_request(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(!sender.is_alive());
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_increments_then_read() {
        for n in [0u64, 1, 100, 10_000] {
            let (worker, sender) = WorkerThread::spawn(&LinkConfig::default(), Counter::default).unwrap();
            for _ in 0..n {
                sender.post_new_request(|c| c.value += 1);
            }
            let ui = EventLoop::new();
            let value = Downlink::new(&ui).call(&sender, |c| c.value).unwrap();
            assert_eq!(value, n);
            worker.shutdown().unwrap();
        }
    }

    #[test]
    fn test_task_panic_keeps_worker_alive() {
        let (worker, sender) = WorkerThread::spawn(&LinkConfig::default(), Counter::default).unwrap();
        sender.post_new_request(|_| panic!("task failed"));
        sender.post_new_request(|c| c.value = 9);

        let value = Downlink::new(&BlockingWait).call(&sender, |c| c.value).unwrap();
        assert_eq!(value, 9);
        worker.shutdown().unwrap();
    }

    #[test]
    fn test_failed_factory_is_reported() {
        let config = LinkConfig {
            worker_name: "doomed".into(),
            ..Default::default()
        };
        let result = WorkerThread::spawn(&config, || -> Counter { panic!("no session") });
        assert!(matches!(result, Err(LinkError::Thread(_))));
    }

    #[test]
    fn test_worker_thread_is_named() {
        let config = LinkConfig {
            worker_name: "session-owner".into(),
            ..Default::default()
        };
        let (worker, sender) = WorkerThread::spawn(&config, Counter::default).unwrap();
        let name = Downlink::new(&BlockingWait)
            .call(&sender, |_| thread::current().name().map(str::to_string))
            .unwrap();
        assert_eq!(name.as_deref(), Some("session-owner"));
        assert_eq!(worker.name(), "session-owner");
        assert!(!worker.dispatcher().is_current_thread());
    }
}
