//! # game-link-core
//!
//! Core types shared by every game-link crate.
//!
//! This crate provides:
//! - The substrate error type and `Result` alias
//! - Runtime configuration for worker threads and request queues

pub mod config;
pub mod error;

pub use config::LinkConfig;
pub use error::{LinkError, Result};
