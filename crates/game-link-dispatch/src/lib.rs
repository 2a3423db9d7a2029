//! # game-link-dispatch
//!
//! Request/reply plumbing between one owner thread and any number of caller
//! threads.
//!
//! An object that must only be touched by one thread (the session, a
//! trampoline) lives inside a [`RequestReceiver`] on that thread. Other
//! threads hold [`RequestSender`] capabilities and post one-shot tasks that
//! the receiver runs one at a time, in order, on the owner thread.
//!
//! This crate provides:
//! - Tasks and the per-owner FIFO queue
//! - The [`Dispatcher`] abstraction plus two implementations: a dedicated
//!   [`WorkerThread`] and a re-entrant caller-side [`EventLoop`]
//! - [`SlaveSender`] for helper objects ("trampolines") that live on the owner
//!   thread alongside a master object
//! - [`Downlink`] for blocking calls that keep the caller's loop running
//! - [`Signal`] for same-thread change notification

pub mod dispatcher;
pub mod event_loop;
mod home;
pub mod receiver;
pub mod sender;
pub mod signal;
pub mod slave;
pub mod task;
pub mod wait;
pub mod worker;

pub use dispatcher::{Dispatcher, Job};
pub use event_loop::EventLoop;
pub use receiver::RequestReceiver;
pub use sender::RequestSender;
pub use signal::{Signal, SignalConnection};
pub use slave::{SlaveHandle, SlaveObject, SlaveSender};
pub use task::{BoxedTask, Task};
pub use wait::{BlockingWait, Completion, Downlink, WaitIndicator};
pub use worker::WorkerThread;
