//! UI-side proxies
//!
//! A proxy pairs a trampoline living next to the [`Session`](crate::Session)
//! on the worker thread with a receiver on the UI thread. Mutators and
//! refreshes travel down as trampoline tasks; status snapshots travel back up
//! as replies and are re-raised there as a local signal.

mod cargo;

pub use cargo::{CargoProxy, CargoStatus};
