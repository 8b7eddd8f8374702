//! Periodic maintenance of durable state.
//!
//! [`OutdatedSweeper`] terminates open alarms that stopped receiving
//! updates; [`GcSweeper`] expires the raw value cache.

pub mod gc;
pub mod outdated;

pub use gc::GcSweeper;
pub use outdated::OutdatedSweeper;
