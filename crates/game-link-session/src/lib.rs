//! # game-link-session
//!
//! The game session that lives on the worker thread, and the proxies UI code
//! uses to reach it.
//!
//! - [`Session`]: planets, their cargo, and a change signal
//! - [`CargoProxy`]: representative UI-side facade backed by a trampoline on
//!   the session thread

pub mod proxy;
pub mod session;

pub use proxy::{CargoProxy, CargoStatus};
pub use session::{CargoError, CargoHold, CargoKind, Planet, PlanetId, Session};
